//! Install orchestration.
//!
//! One run walks these stages in order:
//!
//! ```text
//! Resolving -> Comparing -> Skip
//!                        -> Fetching -> Extracting -> Publishing -> Done
//! ```
//!
//! Any error moves the run to [`Stage::Failed`]; the error is logged with the
//! stage it happened in and returned to the caller. A skip touches neither the
//! network nor the filesystem.

use std::fmt;
use std::path::PathBuf;

use crate::config::{InstallConfig, InstallEnv};
use crate::download::{self, ArchiveFetcher, DownloadTarget};
use crate::error::{InstallError, Result};
use crate::extract;
use crate::platform::PlatformProfile;
use crate::release::{self, ReleaseRequest, ReleaseSource};
use crate::tool::{self, CommandRunner};
use crate::version::{MINIMUM_VERSION, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Comparing,
    Fetching,
    Extracting,
    Publishing,
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Comparing => "comparing",
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
            Stage::Skipped => "skipped",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The requested version is already the one on `PATH`.
    Skipped { version: Version },
    Installed {
        version: Version,
        bin_dir: PathBuf,
        /// Whether the binary directory was written to the path-list file.
        published: bool,
    },
}

/// Reject versions older than [`MINIMUM_VERSION`].
pub fn check_minimum(version: Version) -> Result<()> {
    if version < MINIMUM_VERSION {
        return Err(InstallError::BelowMinimumVersion {
            version,
            minimum: MINIMUM_VERSION,
        });
    }
    Ok(())
}

/// Drives one install from request to published binary directory.
#[derive(Debug)]
pub struct Installer<S, F, R> {
    config: InstallConfig,
    env: InstallEnv,
    profile: PlatformProfile,
    source: S,
    fetcher: F,
    runner: R,
}

impl<S, F, R> Installer<S, F, R>
where
    S: ReleaseSource,
    F: ArchiveFetcher,
    R: CommandRunner,
{
    pub fn new(
        config: InstallConfig,
        env: InstallEnv,
        profile: PlatformProfile,
        source: S,
        fetcher: F,
        runner: R,
    ) -> Self {
        Self {
            config,
            env,
            profile,
            source,
            fetcher,
            runner,
        }
    }

    /// Download target for `version` on this installer's platform and root.
    pub fn target(&self, version: Version) -> DownloadTarget {
        DownloadTarget::new(
            version,
            &self.profile,
            &self.config.releases_url,
            &self.config.install_root,
        )
    }

    /// Run every stage.
    pub async fn run(&self) -> Result<Outcome> {
        let mut stage = Stage::Resolving;
        let result = self.run_stages(&mut stage).await;
        if let Err(e) = &result {
            tracing::debug!("Install failed while {}: {}", stage, e);
            stage = Stage::Failed;
        }
        tracing::debug!("Installer finished in stage {}", stage);
        result
    }

    async fn run_stages(&self, stage: &mut Stage) -> Result<Outcome> {
        let version = self.resolve().await?;
        check_minimum(version)?;

        *stage = Stage::Comparing;
        tracing::info!("Stage {}: checking installed CMake", stage);
        match tool::installed_version(&self.runner) {
            Some(installed) if installed == version => {
                tracing::info!("Requested CMake {} matches what's already installed", version);
                *stage = Stage::Skipped;
                return Ok(Outcome::Skipped { version });
            }
            Some(installed) => tracing::info!(
                "Requested CMake is {} while {} is currently installed",
                version,
                installed
            ),
            None => tracing::info!("Requested CMake is {}, none currently installed", version),
        }

        let target = self.target(version);

        *stage = Stage::Fetching;
        tracing::info!("Stage {}: downloading {}", stage, target.url);
        let archive = self.fetcher.fetch(&target).await?;
        if self.config.verify_checksum {
            self.verify(&target).await?;
        }

        *stage = Stage::Extracting;
        tracing::info!(
            "Stage {}: extracting {} to {}",
            stage,
            target.archive_name,
            target.install_root.display()
        );
        extract::extract_archive(&archive, self.profile.archive, &target.install_root)?;
        extract::verify_bin_dir(&target.bin_dir)?;
        let executable = self.profile.executable_in(&target.bin_dir);
        let reported = tool::smoke_test(&self.runner, &executable)?;
        tracing::debug!("{} reports version {:?}", executable.display(), reported);

        *stage = Stage::Publishing;
        let published = self.env.publish(&target.bin_dir)?;
        if published {
            tracing::info!("Stage {}: added {} to the path list", stage, target.bin_dir.display());
        }

        *stage = Stage::Done;
        Ok(Outcome::Installed {
            version,
            bin_dir: target.bin_dir,
            published,
        })
    }

    /// Decide which version to install.
    pub async fn resolve(&self) -> Result<Version> {
        tracing::info!("Stage {}: {:?}", Stage::Resolving, self.config.request);
        match self.config.request {
            ReleaseRequest::Exact(version) => Ok(version),
            ReleaseRequest::Latest(channel) => {
                let index = self.source.fetch_index().await?;
                release::resolve_latest(&index, channel)
            }
        }
    }

    async fn verify(&self, target: &DownloadTarget) -> Result<()> {
        let listing = self.fetcher.fetch_text(&target.checksum_url()).await?;
        if let Err(e) = download::verify_checksum(target, &listing) {
            let _ = std::fs::remove_file(&target.archive_path);
            return Err(e);
        }
        tracing::debug!("Checksum verified for {}", target.archive_name);
        Ok(())
    }
}
