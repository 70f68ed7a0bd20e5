//! IPC with the Pkl engine over its standard streams.
//!
//! Messages are msgpack values written back to back on stdin and read from
//! stdout.

pub mod client;
pub mod codes;
pub mod serialization;
