//! pkll - runtime for launching and talking to the Pkl evaluation engine.

#[cfg(not(unix))]
compile_error!("pkll supervises the engine through Unix process APIs");

pub mod defaults;
pub mod error;

pub mod engine;
pub mod ipc;

pub use error::{Error, Result};

pub use engine::config::EngineConfig;
pub use engine::fetch::BinaryResolver;
pub use engine::lifecycle::{EngineServer, ServerState};
pub use engine::multiprocess::{ProcessHandle, ProcessPool};
pub use engine::platform::{Arch, LibcVariant, Os, Platform};

pub use ipc::client::{stderr_sink, Channel, DiagnosticSink};
pub use ipc::codes::MessageCode;
pub use ipc::serialization::{encode, Envelope, Messages};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
