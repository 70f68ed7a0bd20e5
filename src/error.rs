//! Error types for pkll.

use std::path::PathBuf;

use thiserror::Error;

/// pkll error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No engine binary is published for the host
    #[error("No compatible Pkl binary found for {platform}")]
    UnsupportedPlatform { platform: String },

    /// Fetching or installing the engine binary failed (network or filesystem)
    #[error("Download failed: {0}")]
    Download(String),

    /// Downloaded bytes do not match the pinned checksum
    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Transport used before `start`
    #[error("Engine not started; call start() first")]
    NotStarted,

    /// Spawning the engine process failed
    #[error("Failed to spawn {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// More than one output chunk was read in a single receive cycle
    #[error("Framing violation: {chunks} output chunks in one receive cycle")]
    FramingViolation { chunks: usize },

    /// A decoded message does not have the expected shape
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// msgpack encoding error
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// msgpack decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] rmpv::decode::Error),

    /// msgpack to typed value error
    #[error("Deserialize error: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),
}

/// Result type alias for pkll operations.
pub type Result<T> = std::result::Result<T, Error>;
