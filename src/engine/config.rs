//! Engine configuration: locations, pinned version and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use crate::defaults;

/// Settings shared by the resolver and the supervisor.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tool directory, `~/.pkl` by default.
    pub home: PathBuf,
    pub version: String,
    pub release_base_url: String,
    /// Use this binary instead of a downloaded one.
    pub executable: Option<PathBuf>,
    /// Expected SHA-256 (hex) of the downloaded binary.
    pub sha256: Option<String>,
    pub download_timeout: Duration,
    pub terminate_grace: Duration,
    /// Wait per attempt in `receive_with_retry`.
    pub retry_interval: Duration,
}

impl EngineConfig {
    pub fn new() -> Self {
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(defaults::TOOL_DIR);

        Self {
            home,
            version: defaults::PKL_VERSION.to_string(),
            release_base_url: defaults::RELEASE_BASE_URL.to_string(),
            executable: None,
            sha256: None,
            download_timeout: defaults::download_timeout(),
            terminate_grace: defaults::terminate_grace(),
            retry_interval: defaults::retry_interval(),
        }
    }

    /// Defaults, overridden by `PKL_EXEC` and `PKL_HOME` when set.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(exec) = std::env::var("PKL_EXEC") {
            if !exec.is_empty() {
                log::debug!("Using engine from PKL_EXEC: {}", exec);
                config.executable = Some(PathBuf::from(exec));
            }
        }
        if let Ok(home) = std::env::var("PKL_HOME") {
            if !home.is_empty() {
                config.home = PathBuf::from(home);
            }
        }

        config
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_release_base_url(mut self, url: impl Into<String>) -> Self {
        self.release_base_url = url.into();
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// `<home>/bin/<version>`
    pub fn bin_dir(&self) -> PathBuf {
        self.home.join("bin").join(&self.version)
    }

    /// `<base>/<version>/<filename>`
    pub fn download_url(&self, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            self.release_base_url.trim_end_matches('/'),
            self.version,
            filename
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
