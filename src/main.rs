use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;

use install_cmake::api::ReleaseApi;
use install_cmake::colors;
use install_cmake::config::{self, InstallConfig, InstallEnv};
use install_cmake::download::{DownloadConfig, Downloader};
use install_cmake::platform::PlatformProfile;
use install_cmake::release::ReleaseRequest;
use install_cmake::selftest;
use install_cmake::tool::SystemRunner;
use install_cmake::{Installer, Outcome};

#[derive(Parser)]
#[command(name = "install-cmake")]
#[command(author, about = "Download and install a CMake release for this platform", long_about = None)]
struct Cli {
    /// CMake version in the form of 3.24.3 or 3.25.0-rc4 for release candidates
    #[arg(long)]
    version: Option<String>,

    /// Consider a release candidate when selecting the latest version
    #[arg(long)]
    rc: bool,

    /// Run the built-in self-tests before installing
    #[arg(long)]
    test: bool,

    /// Directory to download and extract into (defaults to the executable's directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Verify the archive against the release's published SHA-256 listing
    #[arg(long)]
    verify_checksum: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
    colors::init_colors();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.test {
        let failures = selftest::run();
        if !failures.is_empty() {
            for failure in &failures {
                eprintln!("  {} {}", "✗".red(), failure);
            }
            anyhow::bail!("{} self-test checks failed", failures.len());
        }
        println!("{} Self-tests passed", "✓".green());
    }

    let request = ReleaseRequest::from_args(cli.version.as_deref(), cli.rc)?;
    let profile = PlatformProfile::detect()?;

    let mut config = InstallConfig::new(
        request,
        cli.dir.unwrap_or_else(config::default_install_root),
    );
    config.verify_checksum = cli.verify_checksum;
    config.download = DownloadConfig {
        show_progress: std::io::IsTerminal::is_terminal(&std::io::stderr()),
        ..DownloadConfig::default()
    };

    let source = ReleaseApi::new(config.index_url.clone())?;
    let downloader = Downloader::new(config.download)?;
    let env = InstallEnv::from_env();

    println!("Installing CMake into {}", config.install_root.display().to_string().bold());
    let installer = Installer::new(config, env, profile, source, downloader, SystemRunner);

    match installer
        .run()
        .await
        .context("CMake installation failed")?
    {
        Outcome::Skipped { version } => {
            println!(
                "Requested CMake {} matches what's already installed",
                version.to_string().bold()
            );
            println!("Skipping install");
        }
        Outcome::Installed {
            version,
            bin_dir,
            published,
        } => {
            if version.is_release_candidate() {
                println!(
                    "  {} CMake {} is a release candidate",
                    "⚠".yellow(),
                    version.to_string().bold()
                );
            }
            println!(
                "  {} CMake {} installed to {}",
                "✓".green(),
                version.to_string().bold(),
                bin_dir.display()
            );
            if published {
                println!("  Added {} to {}", bin_dir.display(), config::PATH_FILE_VAR);
            }
        }
    }

    Ok(())
}
