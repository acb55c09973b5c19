//! Platform detection for selecting the correct CMake release archive.
//!
//! Kitware publishes one archive per desktop OS family. Each archive has its own
//! naming tag, container format, and layout once unpacked:
//!
//! | OS      | Tag               | Archive   | Binary directory          |
//! |---------|-------------------|-----------|---------------------------|
//! | macOS   | `macos-universal` | `.tar.gz` | `CMake.app/Contents/bin`  |
//! | Linux   | `linux-x86_64`    | `.tar.gz` | `bin`                     |
//! | Windows | `windows-x86_64`  | `.zip`    | `bin`                     |
//!
//! # Examples
//!
//! ```no_run
//! use install_cmake::platform::PlatformProfile;
//!
//! fn main() -> anyhow::Result<()> {
//!     let profile = PlatformProfile::detect()?;
//!     println!("Archive tag: {}", profile.tag);
//!     // Output: "linux-x86_64" on Linux
//!     Ok(())
//! }
//! ```

use std::path::Path;

use crate::error::{InstallError, Result};

/// Container format of a release archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::TarGz => ".tar.gz",
            ArchiveKind::Zip => ".zip",
        }
    }
}

/// Supported host operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Linux,
    Windows,
}

/// Naming and layout conventions of the release archive for one OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    pub os: Os,
    pub tag: &'static str,
    pub archive: ArchiveKind,
    /// Binary directory relative to the extracted top-level directory.
    pub bin_dir: &'static str,
}

pub const MACOS: PlatformProfile = PlatformProfile {
    os: Os::MacOs,
    tag: "macos-universal",
    archive: ArchiveKind::TarGz,
    bin_dir: "CMake.app/Contents/bin",
};

pub const LINUX: PlatformProfile = PlatformProfile {
    os: Os::Linux,
    tag: "linux-x86_64",
    archive: ArchiveKind::TarGz,
    bin_dir: "bin",
};

pub const WINDOWS: PlatformProfile = PlatformProfile {
    os: Os::Windows,
    tag: "windows-x86_64",
    archive: ArchiveKind::Zip,
    bin_dir: "bin",
};

impl PlatformProfile {
    /// Profile for the OS this binary was built for.
    pub fn detect() -> Result<Self> {
        Self::for_os(std::env::consts::OS)
    }

    /// Map an OS identifier (as in [`std::env::consts::OS`]) to its profile.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnsupportedPlatform`] for anything other than
    /// `macos`, `linux`, or `windows`.
    pub fn for_os(os: &str) -> Result<Self> {
        match os {
            "macos" => Ok(MACOS),
            "linux" => Ok(LINUX),
            "windows" => Ok(WINDOWS),
            other => Err(InstallError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Name of the CMake executable inside [`bin_dir`](Self::bin_dir).
    pub fn executable(&self) -> &'static str {
        match self.os {
            Os::Windows => "cmake.exe",
            Os::MacOs | Os::Linux => "cmake",
        }
    }

    /// Path of the CMake executable below an extracted release directory.
    pub fn executable_in(&self, bin_dir: &Path) -> std::path::PathBuf {
        bin_dir.join(self.executable())
    }
}
