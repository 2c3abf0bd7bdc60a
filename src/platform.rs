//! Platform detection and Blender artifact naming
//!
//! Blender publishes one artifact per OS/architecture under each release
//! directory, named `blender-{version}-{os}-{arch}{ext}`:
//!
//! | OS      | Arch              | Extension |
//! |---------|-------------------|-----------|
//! | macOS   | `arm64` or `x64`  | `.dmg`    |
//! | Windows | `x64`             | `.zip`    |
//! | Linux   | `x64`             | `.tar.xz` |
//!
//! # Examples
//!
//! ```
//! use blenders::{Arch, Os, Platform};
//!
//! let platform = Platform::new(Os::Linux, Arch::X64);
//! assert_eq!(platform.artifact_name("4.2").unwrap(), "blender-4.2.0-linux-x64.tar.xz");
//! ```

use crate::version::normalize_version;
use crate::{Error, Result};
use std::env;
use std::fmt;

/// Operating system family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Windows,
    Linux,
    Other(String),
}

/// CPU architecture as it appears in artifact names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Arm64,
    X64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::X64 => "x64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the platform this process is running on
    ///
    /// Only macOS distinguishes Apple Silicon from Intel builds; Windows and
    /// Linux artifacts are always the x64 ones.
    pub fn detect() -> Self {
        let os = match env::consts::OS {
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            "linux" => Os::Linux,
            other => Os::Other(other.to_string()),
        };

        let arch = match (&os, env::consts::ARCH) {
            (Os::MacOs, "aarch64") => Arch::Arm64,
            _ => Arch::X64,
        };

        Self { os, arch }
    }

    /// OS segment of the artifact name
    pub fn os_slug(&self) -> Result<&'static str> {
        match &self.os {
            Os::MacOs => Ok("macos"),
            Os::Windows => Ok("windows"),
            Os::Linux => Ok("linux"),
            Os::Other(name) => Err(Error::UnsupportedPlatform(name.clone())),
        }
    }

    pub fn artifact_extension(&self) -> Result<&'static str> {
        match &self.os {
            Os::MacOs => Ok(".dmg"),
            Os::Windows => Ok(".zip"),
            Os::Linux => Ok(".tar.xz"),
            Os::Other(name) => Err(Error::UnsupportedPlatform(name.clone())),
        }
    }

    /// Artifact file name for `version`, padding two-component versions with `.0`
    pub fn artifact_name(&self, version: &str) -> Result<String> {
        let arch = match self.os {
            Os::MacOs => self.arch,
            _ => Arch::X64,
        };

        Ok(format!(
            "blender-{}-{}-{}{}",
            normalize_version(version),
            self.os_slug()?,
            arch.as_str(),
            self.artifact_extension()?
        ))
    }

    /// Name of the executable inside an extracted Windows/Linux build
    pub fn executable_name(&self) -> &'static str {
        match self.os {
            Os::Windows => "blender.exe",
            _ => "blender",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.os {
            Os::Other(name) => write!(f, "{}-{}", name, self.arch.as_str()),
            _ => write!(
                f,
                "{}-{}",
                self.os_slug().unwrap_or("unknown"),
                self.arch.as_str()
            ),
        }
    }
}

/// Name of the per-version directory under the install root
pub fn version_dir_name(version: &str) -> String {
    format!("Blender {}", version)
}
