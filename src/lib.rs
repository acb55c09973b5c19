//! Library interface for install-cmake
//!
//! Resolves a CMake release, downloads it with retries, validates and unpacks the
//! archive, and publishes the binary directory for CI.

pub mod api;
pub mod colors;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod installer;
pub mod platform;
pub mod release;
pub mod selftest;
pub mod tool;
pub mod version;

// Re-export commonly used items
pub use error::{InstallError, Result};
pub use installer::{Installer, Outcome};
pub use version::{Version, parse_version};
