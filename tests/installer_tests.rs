// Installer integration tests
//
// The release source, the fetcher and the command runner are replaced with
// in-memory doubles so whole runs can be driven without network access or a
// real cmake on the machine.


use std::cell::{Cell, RefCell};
use std::io;
use std::path::{Path, PathBuf};

use install_cmake::config::{InstallConfig, InstallEnv};
use install_cmake::download::{self, ArchiveFetcher, DownloadTarget};
use install_cmake::platform::{self, PlatformProfile};
use install_cmake::release::{Channel, ReleaseEntry, ReleaseIndex, ReleaseRequest, ReleaseSource};
use install_cmake::tool::{CommandOutput, CommandRunner};
use install_cmake::{InstallError, Installer, Outcome, Version};
use test_helpers::{Entry, TestEnvironment, linux_release, write_tar_gz};

const LINUX_URL: &str =
    "https://github.com/Kitware/CMake/releases/download/v3.24.3/cmake-3.24.3-linux-x86_64.tar.gz";

struct MockSource {
    index: ReleaseIndex,
    calls: Cell<u32>,
}

impl MockSource {
    fn new(index: ReleaseIndex) -> Self {
        Self {
            index,
            calls: Cell::new(0),
        }
    }
}

impl ReleaseSource for &MockSource {
    async fn fetch_index(&self) -> install_cmake::Result<ReleaseIndex> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.index.clone())
    }
}

/// Serves one prepared archive for every fetch.
struct MockFetcher {
    archive: PathBuf,
    listing: Option<String>,
    urls: RefCell<Vec<String>>,
}

impl MockFetcher {
    fn new(archive: PathBuf) -> Self {
        Self {
            archive,
            listing: None,
            urls: RefCell::new(Vec::new()),
        }
    }

    fn fetches(&self) -> usize {
        self.urls.borrow().len()
    }
}

impl ArchiveFetcher for &MockFetcher {
    async fn fetch(&self, target: &DownloadTarget) -> install_cmake::Result<PathBuf> {
        self.urls.borrow_mut().push(target.url.clone());
        std::fs::copy(&self.archive, &target.archive_path)?;
        Ok(target.archive_path.clone())
    }

    async fn fetch_text(&self, url: &str) -> install_cmake::Result<String> {
        self.listing.clone().ok_or_else(|| InstallError::DownloadFailure {
            url: url.to_string(),
            cause: "HTTP status 404 Not Found".to_string(),
        })
    }
}

/// Answers `cmake --version` with `installed` and any other binary with the
/// smoke-test result.
struct MockRunner {
    installed: Option<&'static str>,
    smoke_ok: bool,
    calls: RefCell<Vec<PathBuf>>,
}

impl MockRunner {
    fn new(installed: Option<&'static str>) -> Self {
        Self {
            installed,
            smoke_ok: true,
            calls: RefCell::new(Vec::new()),
        }
    }
}

fn output(success: bool, stdout: &str) -> CommandOutput {
    CommandOutput {
        success,
        code: Some(if success { 0 } else { 1 }),
        stdout: stdout.to_string(),
        stderr: if success { String::new() } else { "crashed".to_string() },
    }
}

impl CommandRunner for &MockRunner {
    fn run(&self, program: &Path, _args: &[&str]) -> io::Result<CommandOutput> {
        self.calls.borrow_mut().push(program.to_path_buf());
        if program == Path::new("cmake") {
            return match self.installed {
                Some(v) => Ok(output(true, &format!("cmake version {}\n", v))),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "cmake not found")),
            };
        }
        Ok(output(self.smoke_ok, "cmake version 3.24.3\n"))
    }
}

fn release_archive(env: &TestEnvironment) -> PathBuf {
    let archive = env.archives.join("release.tar.gz");
    write_tar_gz(
        &archive,
        &linux_release(
            "cmake-3.24.3-linux-x86_64/",
            "cmake-3.24.3-linux-x86_64/bin/",
            "cmake-3.24.3-linux-x86_64/bin/cmake",
        ),
    );
    archive
}

fn installer<'a>(
    env: &TestEnvironment,
    request: ReleaseRequest,
    verify_checksum: bool,
    source: &'a MockSource,
    fetcher: &'a MockFetcher,
    runner: &'a MockRunner,
) -> Installer<&'a MockSource, &'a MockFetcher, &'a MockRunner> {
    let mut config = InstallConfig::new(request, &env.root);
    config.verify_checksum = verify_checksum;
    let install_env = InstallEnv {
        path_file: Some(env.path_file.clone()),
    };
    let profile: PlatformProfile = platform::LINUX;
    Installer::new(config, install_env, profile, source, fetcher, runner)
}

fn exact(version: &str) -> ReleaseRequest {
    ReleaseRequest::Exact(version.parse().unwrap())
}

#[tokio::test]
async fn test_fresh_linux_install() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(Some("3.22.1"));

    let outcome = installer(&env, exact("3.24.3"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap();

    let Outcome::Installed {
        version,
        bin_dir,
        published,
    } = outcome
    else {
        panic!("expected an install, got {:?}", outcome);
    };
    assert_eq!(version, Version::new(3, 24, 3));
    assert!(bin_dir.ends_with("cmake-3.24.3-linux-x86_64/bin"));
    assert!(bin_dir.join("cmake").is_file());
    assert!(published);

    assert_eq!(*fetcher.urls.borrow(), vec![LINUX_URL.to_string()]);
    assert_eq!(source.calls.get(), 0);

    let lines = std::fs::read_to_string(&env.path_file).unwrap();
    assert_eq!(lines, format!("{}\n", bin_dir.display()));

    let calls = runner.calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], bin_dir.join("cmake"));
}

#[tokio::test]
async fn test_same_version_skips_twice() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(Some("3.24.3"));

    for _ in 0..2 {
        let outcome = installer(&env, exact("3.24.3"), false, &source, &fetcher, &runner)
            .run()
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Skipped {
                version: Version::new(3, 24, 3)
            }
        );
    }

    assert_eq!(fetcher.fetches(), 0);
    assert_eq!(source.calls.get(), 0);
    assert!(env.root_entries().is_empty());
    assert!(!env.path_file.exists());
}

#[tokio::test]
async fn test_missing_cmake_counts_as_not_installed() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(None);

    let outcome = installer(&env, exact("3.24.3"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Installed { .. }));
    assert_eq!(fetcher.fetches(), 1);
}

#[tokio::test]
async fn test_below_minimum_rejected_before_any_work() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(None);

    let err = installer(&env, exact("3.18.4"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InstallError::BelowMinimumVersion { version, .. } if version == Version::new(3, 18, 4)
    ));
    assert!(err.to_string().contains("3.20.0"));
    assert_eq!(fetcher.fetches(), 0);
    assert!(runner.calls.borrow().is_empty());
}

#[tokio::test]
async fn test_latest_stable_from_source() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::new(
        "https://cmake.org/download/",
        vec![
            ReleaseEntry::new("Release Candidate (3.25.0-rc4)"),
            ReleaseEntry::new("Latest Release (3.24.3)").with_anchor("latest"),
            ReleaseEntry::new("Previous Release (3.23.5)"),
        ],
    ));
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(Some("3.24.3"));

    let outcome = installer(
        &env,
        ReleaseRequest::Latest(Channel::Stable),
        false,
        &source,
        &fetcher,
        &runner,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped {
            version: Version::new(3, 24, 3)
        }
    );
    assert_eq!(source.calls.get(), 1);
}

#[tokio::test]
async fn test_latest_release_candidate_from_page() {
    let env = TestEnvironment::new();
    let page = r#"
        <h2 id="latest">Latest Release (3.24.3)</h2>
        <h2>Release Candidate (3.25.0-rc4)</h2>
    "#;
    let source = MockSource::new(ReleaseIndex::from_html("page", page));
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(Some("3.25.0-rc4"));

    let outcome = installer(
        &env,
        ReleaseRequest::Latest(Channel::ReleaseCandidate),
        false,
        &source,
        &fetcher,
        &runner,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped {
            version: Version::rc(3, 25, 0, 4)
        }
    );
}

#[tokio::test]
async fn test_release_candidate_falls_back_to_stable() {
    let env = TestEnvironment::new();
    let page = r#"<h2 id="latest">Latest Release (3.24.3)</h2>"#;
    let source = MockSource::new(ReleaseIndex::from_html("page", page));
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(Some("3.24.3"));

    let outcome = installer(
        &env,
        ReleaseRequest::Latest(Channel::ReleaseCandidate),
        false,
        &source,
        &fetcher,
        &runner,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped {
            version: Version::new(3, 24, 3)
        }
    );
}

#[tokio::test]
async fn test_unresolvable_latest() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::from_html(
        "https://cmake.org/download/",
        "<html><body>maintenance</body></html>",
    ));
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(None);

    let err = installer(
        &env,
        ReleaseRequest::Latest(Channel::Stable),
        false,
        &source,
        &fetcher,
        &runner,
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, InstallError::UnresolvableLatest { .. }));
    assert!(err.to_string().contains("https://cmake.org/download/"));
    assert_eq!(fetcher.fetches(), 0);
}

#[tokio::test]
async fn test_unsafe_archive_is_never_published() {
    let env = TestEnvironment::new();
    let archive = env.archives.join("evil.tar.gz");
    write_tar_gz(
        &archive,
        &[
            Entry::Dir("cmake-3.24.3-linux-x86_64/"),
            Entry::Dir("cmake-3.24.3-linux-x86_64/bin/"),
            Entry::File("cmake-3.24.3-linux-x86_64/bin/cmake", b"x"),
            Entry::File("../outside", b"x"),
        ],
    );
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(archive);
    let runner = MockRunner::new(None);

    let err = installer(&env, exact("3.24.3"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, InstallError::UnsafeArchive { ref member, .. } if member == "../outside"));
    assert!(!env.path_file.exists());
    assert_eq!(
        env.root_entries(),
        vec![PathBuf::from("cmake-3.24.3-linux-x86_64.tar.gz")]
    );
    assert!(!env.temp_dir.path().join("outside").exists());
}

#[tokio::test]
async fn test_missing_bin_dir_fails_verification() {
    let env = TestEnvironment::new();
    let archive = env.archives.join("nobin.tar.gz");
    write_tar_gz(
        &archive,
        &[
            Entry::Dir("cmake-3.24.3-linux-x86_64/"),
            Entry::File("cmake-3.24.3-linux-x86_64/README", b"x"),
        ],
    );
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(archive);
    let runner = MockRunner::new(None);

    let err = installer(&env, exact("3.24.3"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, InstallError::ExtractionVerificationFailure { .. }));
    assert!(!env.path_file.exists());
}

#[tokio::test]
async fn test_smoke_test_failure_is_not_published() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(release_archive(&env));
    let mut runner = MockRunner::new(None);
    runner.smoke_ok = false;

    let err = installer(&env, exact("3.24.3"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InstallError::ExtractionVerificationFailure { ref path, .. }
            if path.ends_with("cmake-3.24.3-linux-x86_64/bin/cmake")
    ));
    assert!(!env.path_file.exists());
}

#[tokio::test]
async fn test_checksum_verified_before_extraction() {
    let env = TestEnvironment::new();
    let archive = release_archive(&env);
    let digest = download::sha256_file(&archive).unwrap();

    let source = MockSource::new(ReleaseIndex::default());
    let mut fetcher = MockFetcher::new(archive);
    fetcher.listing = Some(format!(
        "{}  cmake-3.24.3-linux-x86_64.tar.gz\n{}  cmake-3.24.3-windows-x86_64.zip\n",
        digest,
        "0".repeat(64)
    ));
    let runner = MockRunner::new(None);

    let outcome = installer(&env, exact("3.24.3"), true, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Installed { .. }));
}

#[tokio::test]
async fn test_checksum_mismatch_removes_archive() {
    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let mut fetcher = MockFetcher::new(release_archive(&env));
    fetcher.listing = Some(format!(
        "{}  cmake-3.24.3-linux-x86_64.tar.gz\n",
        "f".repeat(64)
    ));
    let runner = MockRunner::new(None);

    let err = installer(&env, exact("3.24.3"), true, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, InstallError::ChecksumMismatch { .. }));
    assert!(env.root_entries().is_empty(), "archive must be removed");
    assert!(!env.path_file.exists());
}

#[derive(Clone, Default)]
struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failure_is_left_to_the_caller_at_default_level() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let env = TestEnvironment::new();
    let source = MockSource::new(ReleaseIndex::default());
    let fetcher = MockFetcher::new(release_archive(&env));
    let runner = MockRunner::new(None);

    let err = installer(&env, exact("3.18.4"), false, &source, &fetcher, &runner)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, InstallError::BelowMinimumVersion { .. }));
    assert!(
        log.0.lock().unwrap().is_empty(),
        "the error is reported once, by the caller"
    );
}
