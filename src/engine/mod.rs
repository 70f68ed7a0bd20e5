//! Engine management for the Pkl evaluator.
//!
//! This module provides:
//! - Platform detection and the release descriptor table (`platform`)
//! - Binary download and installation (`fetch`)
//! - Process lifecycle management (`lifecycle`)
//! - Process pool and signal plumbing (`multiprocess`)

pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod multiprocess;
pub mod platform;

pub use config::EngineConfig;
pub use fetch::BinaryResolver;
pub use lifecycle::{EngineServer, ServerState};
pub use multiprocess::{ProcessHandle, ProcessPool};
pub use platform::Platform;
