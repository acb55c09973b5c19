//! Running CMake binaries and reading their versions.

use std::path::Path;
use std::process::Command;

use crate::error::{InstallError, Result};
use crate::version::{self, Version};

/// Captured result of running a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a program and captures its output.
pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Version of the `cmake` currently on `PATH`, if any.
///
/// A missing or failing `cmake` counts as nothing installed.
pub fn installed_version(runner: &impl CommandRunner) -> Option<Version> {
    match runner.run(Path::new("cmake"), &["--version"]) {
        Ok(output) if output.success => version::parse_version(&output.stdout),
        Ok(output) => {
            tracing::debug!("cmake --version exited with {:?}", output.code);
            None
        }
        Err(e) => {
            tracing::debug!("cmake not runnable: {}", e);
            None
        }
    }
}

/// Run the freshly extracted binary's `--version` and return what it reports.
///
/// # Errors
///
/// [`InstallError::ExtractionVerificationFailure`] if the binary cannot be started
/// or exits unsuccessfully.
pub fn smoke_test(runner: &impl CommandRunner, executable: &Path) -> Result<Option<Version>> {
    let failure = |reason: String| InstallError::ExtractionVerificationFailure {
        path: executable.to_path_buf(),
        reason,
    };

    let output = runner
        .run(executable, &["--version"])
        .map_err(|e| failure(format!("could not run: {}", e)))?;
    if !output.success {
        return Err(failure(format!(
            "exited with {}: {}",
            output
                .code
                .map_or_else(|| "a signal".to_string(), |c| format!("code {}", c)),
            output.stderr.trim()
        )));
    }

    Ok(version::parse_version(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Fixed(io::Result<CommandOutput>);

    impl CommandRunner for Fixed {
        fn run(&self, _program: &Path, _args: &[&str]) -> io::Result<CommandOutput> {
            match &self.0 {
                Ok(out) => Ok(out.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn ok(stdout: &str) -> Fixed {
        Fixed(Ok(CommandOutput {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }))
    }

    #[test]
    fn test_installed_version_parsed() {
        let runner = ok("cmake version 3.24.3\n\nCMake suite maintained by Kitware\n");
        assert_eq!(installed_version(&runner), Some(Version::new(3, 24, 3)));
    }

    #[test]
    fn test_installed_version_missing_tool() {
        let runner = Fixed(Err(io::Error::new(io::ErrorKind::NotFound, "not found")));
        assert_eq!(installed_version(&runner), None);
    }

    #[test]
    fn test_smoke_test_failure() {
        let runner = Fixed(Ok(CommandOutput {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: "boom".to_string(),
        }));
        let err = smoke_test(&runner, Path::new("/x/bin/cmake")).unwrap_err();
        assert!(matches!(
            err,
            InstallError::ExtractionVerificationFailure { ref reason, .. } if reason.contains("code 1")
        ));
    }

    #[test]
    fn test_smoke_test_success() {
        let runner = ok("cmake version 3.25.0-rc4");
        assert_eq!(
            smoke_test(&runner, Path::new("cmake")).unwrap(),
            Some(Version::rc(3, 25, 0, 4))
        );
    }
}
