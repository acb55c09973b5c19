//! Client for the CMake release index page.
//!
//! Kitware has no JSON endpoint listing releases; the download page headings
//! ("Latest Release (3.24.3)", "Release Candidate (3.25.0-rc4)") are the source of
//! truth. [`ReleaseApi`] fetches that page and hands it to
//! [`ReleaseIndex::from_html`] for scraping.
//!
//! # Examples
//!
//! ```no_run
//! use install_cmake::api::ReleaseApi;
//! use install_cmake::release::{self, Channel, ReleaseSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = ReleaseApi::new(install_cmake::api::CMAKE_INDEX_URL)?;
//!     let index = api.fetch_index().await?;
//!     let latest = release::resolve_latest(&index, Channel::Stable)?;
//!     println!("Latest CMake: {}", latest);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use crate::error::Result;
use crate::release::{ReleaseIndex, ReleaseSource};

pub const CMAKE_INDEX_URL: &str = "https://cmake.org/download/";
pub const CMAKE_RELEASES_URL: &str = "https://github.com/Kitware/CMake/releases";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// cmake.org rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/72 (X11; Linux i686)";

/// Fetches the release index page.
#[derive(Debug, Clone)]
pub struct ReleaseApi {
    client: reqwest::Client,
    index_url: String,
}

impl ReleaseApi {
    pub fn new(index_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            index_url: index_url.into(),
        })
    }

    async fn fetch_page(&self) -> Result<String> {
        tracing::debug!("Fetching release index {}", self.index_url);
        let page = self
            .client
            .get(&self.index_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(page)
    }
}

impl ReleaseSource for ReleaseApi {
    async fn fetch_index(&self) -> Result<ReleaseIndex> {
        let page = self.fetch_page().await?;
        let index = ReleaseIndex::from_html(self.index_url.clone(), &page);
        tracing::debug!("Release index has {} headings", index.entries.len());
        Ok(index)
    }
}
