//! Shared link cache
//!
//! With a link root configured, dependencies are not cloned into the project
//! directly. Each `(url, target)` pair gets one clone under the link root,
//! and `<root>/<modules_dir>/<name>` becomes a directory link to it, so
//! several projects share a single working copy per repository and target.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;
use crate::path::link_cache_key;

/// Shared on-disk clone store keyed by URL and target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCache {
    root: PathBuf,
}

impl LinkCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the clone of `url` at `target` lives.
    pub fn entry_path(&self, url: &str, target: &str) -> PathBuf {
        self.root.join(link_cache_key(url, target))
    }

    /// Whether an entry already holds a clone.
    pub fn has_entry(&self, url: &str, target: &str) -> bool {
        self.entry_path(url, target).join(".git").exists()
    }

    /// Make `at` a directory link to `entry`, replacing an existing link.
    pub fn link(&self, entry: &Path, at: &Path) -> Result<()> {
        if is_link(at) {
            unlink(at)?;
        }
        if let Some(parent) = at.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("linking {} -> {}", at.display(), entry.display());
        symlink_dir(entry, at)?;
        Ok(())
    }
}

/// Whether `path` itself is a symbolic link or junction.
pub fn is_link(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Remove a directory link without touching its target.
pub fn unlink(path: &Path) -> Result<()> {
    #[cfg(windows)]
    fs::remove_dir(path)?;
    #[cfg(not(windows))]
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

#[cfg(not(any(unix, windows)))]
fn symlink_dir(_src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory links are not supported on this platform",
    ))
}
