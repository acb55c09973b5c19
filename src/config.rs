//! Installer configuration and the calling environment.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::api::{CMAKE_INDEX_URL, CMAKE_RELEASES_URL};
use crate::download::DownloadConfig;
use crate::error::Result;
use crate::release::ReleaseRequest;

/// Environment variable naming the CI path-list file.
pub const PATH_FILE_VAR: &str = "GITHUB_PATH";

/// Everything the installer needs to know about one run.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub request: ReleaseRequest,
    /// Directory receiving the archive and the extracted release.
    pub install_root: PathBuf,
    pub releases_url: String,
    pub index_url: String,
    pub verify_checksum: bool,
    pub download: DownloadConfig,
}

impl InstallConfig {
    pub fn new(request: ReleaseRequest, install_root: impl Into<PathBuf>) -> Self {
        Self {
            request,
            install_root: install_root.into(),
            releases_url: CMAKE_RELEASES_URL.to_string(),
            index_url: CMAKE_INDEX_URL.to_string(),
            verify_checksum: false,
            download: DownloadConfig::default(),
        }
    }
}

/// Directory holding the running executable, or the working directory.
pub fn default_install_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok())
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Values taken from the process environment, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallEnv {
    /// File that receives the binary directory, one path per line.
    pub path_file: Option<PathBuf>,
}

impl InstallEnv {
    pub fn from_env() -> Self {
        Self {
            path_file: std::env::var_os(PATH_FILE_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Append `bin_dir` to the path-list file.
    ///
    /// Returns `false` without doing anything when no path-list file is set.
    pub fn publish(&self, bin_dir: &Path) -> Result<bool> {
        let Some(path_file) = &self.path_file else {
            return Ok(false);
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path_file)?;
        writeln!(file, "{}", bin_dir.display())?;
        tracing::debug!("Added {} to {}", bin_dir.display(), path_file.display());
        Ok(true)
    }
}
