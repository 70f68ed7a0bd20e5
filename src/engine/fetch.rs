//! Engine binary resolution and installation.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::engine::config::EngineConfig;
use crate::engine::platform::Platform;
use crate::error::{Error, Result};

/// Engine binary resolver.
///
/// Maps the host platform to a release artifact, downloads it on first use
/// and makes sure the local copy is executable.
pub struct BinaryResolver {
    config: EngineConfig,
    platform: Platform,
}

impl BinaryResolver {
    /// Create a resolver for the detected host platform.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_platform(config, Platform::detect())
    }

    /// Create a resolver for an explicit platform.
    pub fn with_platform(config: EngineConfig, platform: Platform) -> Self {
        Self { config, platform }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Where the engine for this platform lives once installed.
    pub fn binary_path(&self) -> Result<PathBuf> {
        let filename = self.platform.binary_name()?;
        Ok(self.config.bin_dir().join(filename))
    }

    /// Get the path to the engine binary, downloading if necessary.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(exec) = &self.config.executable {
            ensure_executable(exec)?;
            return Ok(exec.clone());
        }

        let filename = self.platform.binary_name()?;
        let binary_path = self.config.bin_dir().join(filename);

        if !binary_path.exists() {
            let dir = self.config.bin_dir();
            fs::create_dir_all(&dir).map_err(|e| fs_error("Creating", &dir, e))?;
            self.download(filename, &dir, &binary_path)?;
        }

        // The download may not have preserved the mode, so this runs every time.
        ensure_executable(&binary_path)?;

        Ok(binary_path)
    }

    fn download(&self, filename: &str, dir: &Path, target: &Path) -> Result<()> {
        let url = self.config.download_url(filename);
        log::info!("Downloading Pkl {} from {}", self.config.version, url);

        let content = self.download_file(&url)?;

        if let Some(expected) = &self.config.sha256 {
            let actual = hex::encode(Sha256::digest(&content));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::Integrity {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        // A private temp file per writer; concurrent resolvers never share one.
        let mut file =
            NamedTempFile::new_in(dir).map_err(|e| fs_error("Creating temp file in", dir, e))?;
        file.write_all(&content)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| fs_error("Writing", file.path(), e))?;

        match file.persist_noclobber(target) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                log::debug!("{:?} was installed by another resolver", target);
                return Ok(());
            }
            Err(e) => return Err(fs_error("Installing", target, e.error)),
        }

        log::info!("Installed Pkl {} at {:?}", self.config.version, target);
        Ok(())
    }

    fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        let client = Client::builder()
            .timeout(self.config.download_timeout)
            .build()
            .map_err(|e| Error::Download(format!("Building HTTP client failed: {}", e)))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| Error::Download(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "GET {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::Download(format!("Reading body of {} failed: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

fn fs_error(action: &str, path: &Path, e: io::Error) -> Error {
    Error::Download(format!("{} {:?} failed: {}", action, path, e))
}

/// Add the owner-execute bit, keeping every other mode bit.
pub fn ensure_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o100 == 0 {
        permissions.set_mode(mode | 0o100);
        fs::set_permissions(path, permissions)?;
        log::debug!("Marked {:?} executable", path);
    }
    Ok(())
}
