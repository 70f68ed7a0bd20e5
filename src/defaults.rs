//! Default values pinned at build time.

use std::time::Duration;

/// Engine release this crate speaks to.
pub const PKL_VERSION: &str = "0.25.2";

pub const RELEASE_BASE_URL: &str = "https://github.com/apple/pkl/releases/download";

/// Directory under the user's home holding downloaded engines.
pub const TOOL_DIR: &str = ".pkl";

/// Present on Alpine (musl) hosts.
pub const ALPINE_MARKER: &str = "/etc/alpine-release";

pub const DEBUG_ENV_VAR: &str = "PKL_DEBUG";

pub const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
pub const TERMINATE_GRACE_SECS: u64 = 5;
pub const RETRY_INTERVAL_MS: u64 = 1000;

pub fn download_timeout() -> Duration { Duration::from_secs(DOWNLOAD_TIMEOUT_SECS) }
pub fn terminate_grace() -> Duration { Duration::from_secs(TERMINATE_GRACE_SECS) }
pub fn retry_interval() -> Duration { Duration::from_millis(RETRY_INTERVAL_MS) }
