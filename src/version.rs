//! CMake version parsing and ordering.
//!
//! CMake versions are always three numeric components, optionally followed by a
//! release-candidate suffix:
//! ```text
//! 3.24.3        stable
//! 3.25.0-rc4    fourth release candidate of 3.25.0
//! ```
//!
//! Versions are pulled out of free-form text (the output of `cmake --version`,
//! headings on the download page) by taking the *first* match, so callers never
//! need to pre-trim their input.
//!
//! # Ordering
//!
//! Components compare numerically, so `3.19.0-rc10 > 3.19.0-rc9` and a stable
//! release is newer than any of its release candidates:
//!
//! ```
//! use install_cmake::version::Version;
//!
//! let rc: Version = "3.19.0-rc3".parse().unwrap();
//! let stable: Version = "3.19.0".parse().unwrap();
//! assert!(rc < stable);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::InstallError;

/// Oldest release this tool will install.
pub const MINIMUM_VERSION: Version = Version::new(3, 20, 0);

// Components never carry leading zeros, so `3.024.3` is not a version
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-rc(0|[1-9]\d*))?")
        .expect("version pattern is valid")
});

static RC_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)-rc(0|[1-9]\d*)\b")
        .expect("rc version pattern is valid")
});

/// A CMake release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Release-candidate number; `None` for a stable release.
    pub rc: Option<u64>,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            rc: None,
        }
    }

    pub const fn rc(major: u64, minor: u64, patch: u64, rc: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            rc: Some(rc),
        }
    }

    pub fn is_release_candidate(&self) -> bool {
        self.rc.is_some()
    }

    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let number = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u64>());
        Some(Self {
            major: number(1)?.ok()?,
            minor: number(2)?.ok()?,
            patch: number(3)?.ok()?,
            rc: match number(4) {
                Some(rc) => Some(rc.ok()?),
                None => None,
            },
        })
    }
}

/// Extract the first version found in `text`.
///
/// Returns `None` when the text holds no `x.y.z` triple; `"cmake version 3.18"`
/// is not a match. A candidate glued to further digits (`03.24.3`, `3.24.03`) is
/// not a version, and one whose components overflow `u64` is skipped in favor of
/// the next candidate. Whatever is returned prints back as the matched text.
pub fn parse_version(text: &str) -> Option<Version> {
    VERSION_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let digit_before = text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit());
        let digit_after = text[whole.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());
        if digit_before || digit_after {
            return None;
        }
        Version::from_captures(&caps)
    })
}

/// Every release-candidate version mentioned anywhere in `text`, in document order.
pub fn scan_release_candidates(text: &str) -> Vec<Version> {
    RC_VERSION_RE
        .captures_iter(text)
        .filter_map(|caps| Version::from_captures(&caps))
        .collect()
}

impl FromStr for Version {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s).ok_or_else(|| InstallError::InvalidVersionFormat(s.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(rc) = self.rc {
            write!(f, "-rc{}", rc)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.rc, other.rc) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(&b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
