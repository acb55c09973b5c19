//! Release archive download with retries and progress tracking

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{InstallError, Result};
use crate::platform::PlatformProfile;
use crate::version::Version;

/// Where a release archive comes from and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub version: Version,
    /// `cmake-<version>-<tag><ext>`
    pub archive_name: String,
    /// Top-level directory inside the archive, `cmake-<version>-<tag>`
    pub dir_name: String,
    pub url: String,
    pub archive_path: PathBuf,
    pub install_root: PathBuf,
    pub bin_dir: PathBuf,
}

impl DownloadTarget {
    pub fn new(
        version: Version,
        profile: &PlatformProfile,
        releases_url: &str,
        install_root: &Path,
    ) -> Self {
        let dir_name = format!("cmake-{}-{}", version, profile.tag);
        let archive_name = format!("{}{}", dir_name, profile.archive.extension());
        let url = format!(
            "{}/download/v{}/{}",
            releases_url.trim_end_matches('/'),
            version,
            archive_name
        );
        let bin_dir = install_root.join(&dir_name).join(profile.bin_dir);

        Self {
            version,
            archive_path: install_root.join(&archive_name),
            install_root: install_root.to_path_buf(),
            archive_name,
            dir_name,
            url,
            bin_dir,
        }
    }

    /// URL of the SHA-256 listing published next to the archive.
    pub fn checksum_url(&self) -> String {
        let base = self
            .url
            .rsplit_once('/')
            .map(|(base, _)| base)
            .unwrap_or(&self.url);
        format!("{}/cmake-{}-SHA-256.txt", base, self.version)
    }
}

/// Timeout and retry policy for downloads.
#[derive(Debug, Clone, Copy)]
pub struct DownloadConfig {
    /// Bound on connecting and on each wait for response data.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_base: Duration,
    pub show_progress: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 3,
            backoff_base: Duration::from_secs(10),
            show_progress: false,
        }
    }
}

/// Delay before retry number `retry` (0-based): `base * 2^retry`.
pub fn retry_delay(retry: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(retry))
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Why one attempt failed.
enum AttemptError {
    Retryable(String),
    Fatal(String),
    Io(std::io::Error),
}

/// Something that can fetch release archives and small text files.
pub trait ArchiveFetcher {
    /// Download the archive to [`DownloadTarget::archive_path`].
    fn fetch(&self, target: &DownloadTarget) -> impl Future<Output = Result<PathBuf>>;

    /// Fetch a small text resource such as a checksum listing.
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String>>;
}

/// HTTP downloader with bounded retries and exponential backoff.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(format!("install-cmake/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Download `url` to `dest`.
    ///
    /// The body is streamed to `<dest>.part` and renamed onto `dest` only once it
    /// is complete, so `dest` never holds a partial archive.
    ///
    /// # Errors
    ///
    /// [`InstallError::DownloadFailure`] with the URL and the last cause when a
    /// non-retryable status is returned or every attempt failed.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        let part = part_path(dest);
        let attempts = self.config.attempts.max(1);
        let mut last_cause = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, self.config.backoff_base);
                tracing::warn!(
                    "Download attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    attempts,
                    last_cause,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(url, &part).await {
                Ok(bytes) => {
                    fs::rename(&part, dest).await?;
                    tracing::debug!("Downloaded {} bytes to {}", bytes, dest.display());
                    return Ok(dest.to_path_buf());
                }
                Err(AttemptError::Retryable(cause)) => last_cause = cause,
                Err(AttemptError::Fatal(cause)) => {
                    let _ = fs::remove_file(&part).await;
                    return Err(InstallError::DownloadFailure {
                        url: url.to_string(),
                        cause,
                    });
                }
                Err(AttemptError::Io(e)) => {
                    let _ = fs::remove_file(&part).await;
                    return Err(e.into());
                }
            }
        }

        let _ = fs::remove_file(&part).await;
        Err(InstallError::DownloadFailure {
            url: url.to_string(),
            cause: format!("{} (gave up after {} attempts)", last_cause, attempts),
        })
    }

    async fn attempt(&self, url: &str, part: &Path) -> std::result::Result<u64, AttemptError> {
        let timeout = self.config.timeout;

        let mut response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| AttemptError::Retryable(format!("no response within {:?}", timeout)))?
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let cause = format!("HTTP status {}", status);
            return Err(if is_retryable_status(status) {
                AttemptError::Retryable(cause)
            } else {
                AttemptError::Fatal(cause)
            });
        }

        let pb = if self.config.show_progress {
            let pb = ProgressBar::new(response.content_length().unwrap_or(0));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(format!("⬇ {}", file_label(part)));
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut file = fs::File::create(part).await.map_err(AttemptError::Io)?;
        let mut downloaded: u64 = 0;

        loop {
            let chunk = tokio::time::timeout(timeout, response.chunk())
                .await
                .map_err(|_| AttemptError::Retryable(format!("no data received within {:?}", timeout)))?
                .map_err(|e| AttemptError::Retryable(e.to_string()))?;
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await.map_err(AttemptError::Io)?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await.map_err(AttemptError::Io)?;
        file.sync_all().await.map_err(AttemptError::Io)?;
        pb.finish_and_clear();

        Ok(downloaded)
    }

    /// GET a small text resource, without retries.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let failure = |cause: String| InstallError::DownloadFailure {
            url: url.to_string(),
            cause,
        };

        let response = tokio::time::timeout(self.config.timeout, self.client.get(url).send())
            .await
            .map_err(|_| failure(format!("no response within {:?}", self.config.timeout)))?
            .map_err(|e| failure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failure(format!("HTTP status {}", response.status())));
        }
        response.text().await.map_err(|e| failure(e.to_string()))
    }
}

impl ArchiveFetcher for Downloader {
    async fn fetch(&self, target: &DownloadTarget) -> Result<PathBuf> {
        if let Some(parent) = target.archive_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.download(&target.url, &target.archive_path).await
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn file_label(part: &Path) -> String {
    part.file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".part").to_string())
        .unwrap_or_default()
}

/// Find the expected digest for `file_name` in a `sha256sum`-style listing.
pub fn expected_checksum(listing: &str, file_name: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let name = fields.next()?.trim_start_matches('*');
        (name == file_name).then(|| digest.to_ascii_lowercase())
    })
}

/// SHA-256 of a file, hex encoded.
pub fn sha256_file(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare the archive's digest against the release listing.
///
/// # Errors
///
/// [`InstallError::ChecksumMismatch`] when the digests differ or the listing has
/// no entry for the archive.
pub fn verify_checksum(target: &DownloadTarget, listing: &str) -> Result<()> {
    let expected = expected_checksum(listing, &target.archive_name).ok_or_else(|| {
        InstallError::ChecksumMismatch {
            file: target.archive_name.clone(),
            expected: "<missing from listing>".to_string(),
            actual: String::new(),
        }
    })?;
    let actual = sha256_file(&target.archive_path)?;

    if actual == expected {
        Ok(())
    } else {
        Err(InstallError::ChecksumMismatch {
            file: target.archive_name.clone(),
            expected,
            actual,
        })
    }
}
