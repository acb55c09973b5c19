//! Validated extraction of release archives.
//!
//! Release archives are untrusted input. Before anything is written, every member
//! of the archive is enumerated and checked:
//! - **Absolute names** are rejected under every convention (`/x`, `\x`, `C:\x`,
//!   `C:/x`), since an archive built on one OS may be unpacked on another
//! - **Traversal**: the name is joined onto the destination and resolved
//!   lexically; the result must be the destination or a descendant of it
//! - **Links**: symlink and hardlink targets must be relative and must resolve
//!   inside the destination too
//! - **Link parents**: no member may live beneath a link member, and no name or
//!   link target may pass through a link member on its way, because the link
//!   would redirect where it lands
//! - **Special files** such as fifos and device nodes are refused outright
//!
//! Only when the whole member set passes is the archive unpacked. A single bad
//! member aborts the run with [`InstallError::UnsafeArchive`] and leaves the
//! destination untouched. Tar and zip archives go through the same checks.
//!
//! # Examples
//!
//! ```no_run
//! use install_cmake::extract;
//! use install_cmake::platform::ArchiveKind;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     extract::extract_archive(
//!         Path::new("cmake-3.24.3-linux-x86_64.tar.gz"),
//!         ArchiveKind::TarGz,
//!         Path::new("."),
//!     )?;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{InstallError, Result};
use crate::platform::ArchiveKind;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Kind of an archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    File,
    Directory,
    Symlink,
    Hardlink,
    Other,
}

impl MemberKind {
    pub fn is_link(self) -> bool {
        matches!(self, MemberKind::Symlink | MemberKind::Hardlink)
    }
}

/// One entry of an archive, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub kind: MemberKind,
    pub link_target: Option<String>,
}

impl ArchiveMember {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::File,
            link_target: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Directory,
            link_target: None,
        }
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Symlink,
            link_target: Some(target.into()),
        }
    }

    pub fn hardlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Hardlink,
            link_target: Some(target.into()),
        }
    }
}

/// Whether `name` is absolute on POSIX or Windows.
pub fn is_absolute_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    // Drive letters, both `C:\x` and the drive-relative `C:x`
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve `relative` against `base` without touching the filesystem.
///
/// Both `/` and `\` separate components; `..` pops and `.` is dropped.
fn resolve_lexically(base: &Path, relative: &str) -> PathBuf {
    let mut resolved = base.to_path_buf();
    for part in relative.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            part => resolved.push(part),
        }
    }
    resolved
}

/// Absolute, lexically normalized form of the extraction root.
fn normalized_root(dest: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(dest)?;
    let mut root = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::ParentDir => {
                root.pop();
            }
            std::path::Component::CurDir => {}
            other => root.push(other.as_os_str()),
        }
    }
    Ok(root)
}

/// Check one member and return where it would land.
///
/// `root` must already be absolute and normalized.
pub fn validate_member(member: &ArchiveMember, root: &Path) -> Result<PathBuf> {
    let name = member.name.as_str();

    if is_absolute_name(name) {
        return Err(InstallError::unsafe_member(name, "absolute path in archive"));
    }

    if member.kind == MemberKind::Other {
        return Err(InstallError::unsafe_member(
            name,
            "special files (fifos, devices) are not allowed",
        ));
    }

    let resolved = resolve_lexically(root, name);
    if !resolved.starts_with(root) {
        return Err(InstallError::unsafe_member(
            name,
            "path escapes the extraction directory",
        ));
    }

    if member.kind.is_link() {
        let target = member.link_target.as_deref().unwrap_or_default();
        if is_absolute_name(target) {
            return Err(InstallError::unsafe_member(
                name,
                format!("absolute link target not allowed: {}", target),
            ));
        }

        let member_dir = resolved.parent().unwrap_or(root);
        let escapes = !resolve_lexically(member_dir, target).starts_with(root)
            // Tar hardlink targets are relative to the archive root
            || (member.kind == MemberKind::Hardlink
                && !resolve_lexically(root, target).starts_with(root));
        if escapes {
            return Err(InstallError::unsafe_member(
                name,
                format!("link target escapes the extraction directory: {}", target),
            ));
        }
    }

    Ok(resolved)
}

/// Whether any intermediate step of `relative`, walked from `base` one component
/// at a time, lands on a link member. Catches `link/../x`, which resolves
/// lexically to a harmless path but is followed through the link on disk.
fn passes_through_link(base: &Path, relative: &str, links: &HashSet<PathBuf>) -> bool {
    let parts: Vec<&str> = relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    let mut current = base.to_path_buf();
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        if *part == ".." {
            current.pop();
        } else {
            current.push(part);
        }
        if links.contains(&current) {
            return true;
        }
    }
    false
}

/// Validate a full member set against `dest`. Nothing is written.
pub fn validate_members(members: &[ArchiveMember], dest: &Path) -> Result<()> {
    let root = normalized_root(dest)?;

    let mut links = HashSet::new();
    let mut resolved = Vec::with_capacity(members.len());
    for member in members {
        let path = validate_member(member, &root)?;
        if member.kind.is_link() {
            links.insert(path.clone());
        }
        resolved.push(path);
    }

    for (member, path) in members.iter().zip(&resolved) {
        let beneath_link = path
            .ancestors()
            .skip(1)
            .take_while(|ancestor| *ancestor != root.as_path())
            .any(|ancestor| links.contains(ancestor))
            || passes_through_link(&root, &member.name, &links);
        if beneath_link {
            return Err(InstallError::unsafe_member(
                &member.name,
                "member is nested beneath a link entry",
            ));
        }

        if let Some(target) = member.link_target.as_deref().filter(|_| member.kind.is_link()) {
            let member_dir = path.parent().unwrap_or(root.as_path());
            let through_link = passes_through_link(member_dir, target, &links)
                || (member.kind == MemberKind::Hardlink
                    && passes_through_link(&root, target, &links));
            if through_link {
                return Err(InstallError::unsafe_member(
                    &member.name,
                    format!("link target is routed through another link: {}", target),
                ));
            }
        }
    }

    tracing::debug!("Validated {} archive members", members.len());
    Ok(())
}

/// Enumerate the members of a gzip-compressed tar archive.
pub fn list_tar_members(archive_path: &Path) -> Result<Vec<ArchiveMember>> {
    let file = fs::File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut members = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let entry_type = entry.header().entry_type();
        let kind = match entry_type {
            EntryType::Directory => MemberKind::Directory,
            EntryType::Symlink => MemberKind::Symlink,
            EntryType::Link => MemberKind::Hardlink,
            EntryType::Regular | EntryType::Continuous => MemberKind::File,
            _ => MemberKind::Other,
        };
        let link_target = entry
            .link_name_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        members.push(ArchiveMember {
            name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
            kind,
            link_target: if kind.is_link() { link_target } else { None },
        });
    }

    Ok(members)
}

/// Enumerate the members of a zip archive.
pub fn list_zip_members(archive_path: &Path) -> Result<Vec<ArchiveMember>> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut members = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let is_symlink = entry
            .unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK);

        let member = if is_symlink {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;
            ArchiveMember::symlink(name, target)
        } else if entry.is_dir() {
            ArchiveMember::directory(name)
        } else {
            ArchiveMember::file(name)
        };
        members.push(member);
    }

    Ok(members)
}

/// Enumerate the members of an archive of the given kind.
pub fn list_members(archive_path: &Path, kind: ArchiveKind) -> Result<Vec<ArchiveMember>> {
    match kind {
        ArchiveKind::TarGz => list_tar_members(archive_path),
        ArchiveKind::Zip => list_zip_members(archive_path),
    }
}

/// Validate every member of `archive_path`, then unpack it into `dest`.
///
/// # Errors
///
/// [`InstallError::UnsafeArchive`] if any member fails validation, in which case
/// nothing has been extracted. IO and archive format errors are passed through.
pub fn extract_archive(archive_path: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    let members = list_members(archive_path, kind)?;
    validate_members(&members, dest)?;

    fs::create_dir_all(dest)?;
    let file = fs::File::open(archive_path)?;
    match kind {
        ArchiveKind::TarGz => {
            let mut archive = Archive::new(GzDecoder::new(file));
            archive.set_preserve_permissions(true);
            archive.set_overwrite(true);
            archive.unpack(dest)?;
        }
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(file)?;
            archive.extract(dest)?;
        }
    }

    tracing::debug!(
        "Extracted {} members from {} to {}",
        members.len(),
        archive_path.display(),
        dest.display()
    );
    Ok(())
}

/// Check that extraction produced the expected binary directory.
pub fn verify_bin_dir(bin_dir: &Path) -> Result<()> {
    if bin_dir.is_dir() {
        Ok(())
    } else {
        Err(InstallError::ExtractionVerificationFailure {
            path: bin_dir.to_path_buf(),
            reason: "binary directory does not exist after extraction".to_string(),
        })
    }
}
