//! Host platform detection and the engine descriptor table.

use std::fmt;
use std::path::Path;

use crate::defaults::ALPINE_MARKER;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Other(String),
}

/// Non-default C library a Linux host may be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibcVariant {
    Musl,
}

/// One published engine artifact.
struct Descriptor {
    os: Os,
    arch: Arch,
    libc: Option<LibcVariant>,
    filename: &'static str,
}

const DESCRIPTORS: &[Descriptor] = &[
    Descriptor { os: Os::MacOs, arch: Arch::X86_64, libc: None, filename: "pkl-macos-amd64" },
    Descriptor { os: Os::MacOs, arch: Arch::Aarch64, libc: None, filename: "pkl-macos-aarch64" },
    Descriptor { os: Os::Linux, arch: Arch::X86_64, libc: None, filename: "pkl-linux-amd64" },
    Descriptor { os: Os::Linux, arch: Arch::Aarch64, libc: None, filename: "pkl-linux-aarch64" },
    Descriptor {
        os: Os::Linux,
        arch: Arch::X86_64,
        libc: Some(LibcVariant::Musl),
        filename: "pkl-alpine-linux-amd64",
    },
];

/// The (OS, architecture, libc) tuple used to pick an engine binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
    pub libc: Option<LibcVariant>,
}

impl Platform {
    pub fn new(os: Os, arch: Arch, libc: Option<LibcVariant>) -> Self {
        Self { os, arch, libc }
    }

    /// Detect the platform this process runs on.
    pub fn detect() -> Self {
        Self::detect_with_marker(Path::new(ALPINE_MARKER))
    }

    /// Detect the platform, treating `alpine_marker` as the musl indicator.
    pub fn detect_with_marker(alpine_marker: &Path) -> Self {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            other => Os::Other(other.to_string()),
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => Arch::Other(other.to_string()),
        };
        let libc = if os == Os::Linux && alpine_marker.is_file() {
            Some(LibcVariant::Musl)
        } else {
            None
        };

        Self { os, arch, libc }
    }

    /// Release artifact name for this platform.
    ///
    /// A libc-specific entry wins over the generic one for the same OS and
    /// architecture.
    pub fn binary_name(&self) -> Result<&'static str> {
        let lookup = |libc: Option<LibcVariant>| {
            DESCRIPTORS
                .iter()
                .find(|d| d.os == self.os && d.arch == self.arch && d.libc == libc)
                .map(|d| d.filename)
        };

        self.libc
            .and_then(|libc| lookup(Some(libc)))
            .or_else(|| lookup(None))
            .ok_or_else(|| Error::UnsupportedPlatform {
                platform: self.to_string(),
            })
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => f.write_str("linux"),
            Os::MacOs => f.write_str("macos"),
            Os::Other(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86_64 => f.write_str("x86_64"),
            Arch::Aarch64 => f.write_str("aarch64"),
            Arch::Other(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)?;
        if let Some(LibcVariant::Musl) = self.libc {
            f.write_str(" (musl)")?;
        }
        Ok(())
    }
}
