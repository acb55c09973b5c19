use std::path::PathBuf;

use thiserror::Error;

use crate::version::Version;

/// Where to ask for versions below the supported floor.
pub const SUPPORT_URL: &str = "https://github.com/ssrobins/install-cmake/issues";

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("CMake version '{0}' is not valid, it must be in the form of 3.24.3 or 3.25.0-rc4 for release candidates")]
    InvalidVersionFormat(String),

    #[error(
        "CMake version '{version}' is not supported, the version must be {minimum} or higher. \
         If you'd like to make a case for broader support, please post to: {support}",
        support = SUPPORT_URL
    )]
    BelowMinimumVersion { version: Version, minimum: Version },

    #[error("Unable to find the latest {mode} on {source_url}")]
    UnresolvableLatest { mode: String, source_url: String },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Download of {url} failed: {cause}")]
    DownloadFailure { url: String, cause: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Unsafe archive member '{member}': {reason}")]
    UnsafeArchive { member: String, reason: String },

    #[error("Extraction verification failed for {}: {reason}", .path.display())]
    ExtractionVerificationFailure { path: PathBuf, reason: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to read zip archive: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl InstallError {
    pub(crate) fn unsafe_member(member: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafeArchive {
            member: member.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InstallError>;
