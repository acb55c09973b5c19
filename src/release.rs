//! Release resolution: deciding which CMake version to install.
//!
//! The download page is not an API. Its headings are scraped into a
//! [`ReleaseIndex`], a plain list of labeled entries, and resolution works only on
//! that list so the scraping can change (or be mocked) without touching the
//! selection rules:
//!
//! - **Stable**: the first entry marked as the latest release.
//! - **Release candidate**: the first entry labeled as a release candidate. When
//!   the page has no such label, every `x.y.z-rcN` string in the page is
//!   considered and the highest wins. With no candidates at all, the latest
//!   stable release is used.

use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{InstallError, Result};
use crate::version::{self, Version};

const LATEST_LABEL: &str = "Latest Release";
const CANDIDATE_LABEL: &str = "Release Candidate";
const LATEST_ANCHOR: &str = "latest";

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h2\b([^>]*)>(.*?)</h2\s*>").expect("heading pattern"));
static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bid\s*=\s*["']([^"']*)["']"#).expect("id pattern"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

/// Which line of releases to follow when no explicit version is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stable,
    ReleaseCandidate,
}

impl Channel {
    fn describe(self) -> &'static str {
        match self {
            Channel::Stable => "stable release",
            Channel::ReleaseCandidate => "release candidate",
        }
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRequest {
    Exact(Version),
    Latest(Channel),
}

impl ReleaseRequest {
    /// Build a request from the raw `--version` value and the `--rc` flag.
    ///
    /// # Errors
    ///
    /// [`InstallError::InvalidVersionFormat`] if a version was given but holds no
    /// `x.y.z` triple.
    pub fn from_args(version: Option<&str>, prefer_rc: bool) -> Result<Self> {
        match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => Ok(ReleaseRequest::Exact(raw.parse()?)),
            None if prefer_rc => Ok(ReleaseRequest::Latest(Channel::ReleaseCandidate)),
            None => Ok(ReleaseRequest::Latest(Channel::Stable)),
        }
    }
}

/// One labeled heading from the release index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub label: String,
    pub anchor: Option<String>,
}

impl ReleaseEntry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            anchor: None,
        }
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }
}

/// Entries of a release index in document order, plus the raw page text.
#[derive(Debug, Clone, Default)]
pub struct ReleaseIndex {
    pub source: String,
    pub entries: Vec<ReleaseEntry>,
    pub raw: String,
}

impl ReleaseIndex {
    pub fn new(source: impl Into<String>, entries: Vec<ReleaseEntry>) -> Self {
        Self {
            source: source.into(),
            entries,
            raw: String::new(),
        }
    }

    /// Scrape the `<h2>` headings of an HTML page into an index.
    pub fn from_html(source: impl Into<String>, html: &str) -> Self {
        let entries = HEADING_RE
            .captures_iter(html)
            .map(|caps| {
                let anchor = ID_ATTR_RE
                    .captures(&caps[1])
                    .map(|id| id[1].to_string());
                let text = TAG_RE.replace_all(&caps[2], " ");
                let label = text.split_whitespace().collect::<Vec<_>>().join(" ");
                ReleaseEntry { label, anchor }
            })
            .collect();

        Self {
            source: source.into(),
            entries,
            raw: html.to_string(),
        }
    }
}

/// Classification of a release index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseLabel {
    Latest,
    ReleaseCandidate,
}

impl ReleaseLabel {
    pub fn classify(entry: &ReleaseEntry) -> Option<Self> {
        if entry.label.contains(CANDIDATE_LABEL) {
            Some(ReleaseLabel::ReleaseCandidate)
        } else if entry.label.contains(LATEST_LABEL)
            || entry
                .anchor
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(LATEST_ANCHOR))
        {
            Some(ReleaseLabel::Latest)
        } else {
            None
        }
    }

    /// Whether an entry with this label satisfies a lookup on `channel`.
    pub fn accepts(self, channel: Channel) -> bool {
        matches!(
            (self, channel),
            (ReleaseLabel::Latest, Channel::Stable)
                | (ReleaseLabel::ReleaseCandidate, Channel::ReleaseCandidate)
        )
    }
}

/// Something that can produce the current release index.
pub trait ReleaseSource {
    fn fetch_index(&self) -> impl Future<Output = Result<ReleaseIndex>>;
}

/// Resolve the newest release on `channel` from `index`.
///
/// # Errors
///
/// - [`InstallError::InvalidVersionFormat`] when a matching heading exists but
///   carries no parsable version.
/// - [`InstallError::UnresolvableLatest`] when nothing suitable is on the page.
pub fn resolve_latest(index: &ReleaseIndex, channel: Channel) -> Result<Version> {
    match channel {
        Channel::Stable => labeled_version(index, Channel::Stable)?
            .ok_or_else(|| unresolvable(index, Channel::Stable)),
        Channel::ReleaseCandidate => {
            if let Some(version) = labeled_version(index, Channel::ReleaseCandidate)? {
                return Ok(version);
            }
            if let Some(version) = version::scan_release_candidates(&index.raw).into_iter().max()
            {
                tracing::debug!("No labeled release candidate, highest found in page: {}", version);
                return Ok(version);
            }
            tracing::debug!("No release candidate on {}, using latest stable", index.source);
            labeled_version(index, Channel::Stable)?
                .ok_or_else(|| unresolvable(index, Channel::ReleaseCandidate))
        }
    }
}

fn labeled_version(index: &ReleaseIndex, channel: Channel) -> Result<Option<Version>> {
    let Some(entry) = index
        .entries
        .iter()
        .find(|e| ReleaseLabel::classify(e).is_some_and(|label| label.accepts(channel)))
    else {
        return Ok(None);
    };

    version::parse_version(&entry.label)
        .map(Some)
        .ok_or_else(|| InstallError::InvalidVersionFormat(entry.label.clone()))
}

fn unresolvable(index: &ReleaseIndex, channel: Channel) -> InstallError {
    InstallError::UnresolvableLatest {
        mode: channel.describe().to_string(),
        source_url: index.source.clone(),
    }
}
