//! Path manipulation utilities for repotree

use std::path::{Path, PathBuf};

use crate::reference::normalize_url;

/// Encode a URL path to be filesystem-safe
///
/// This converts URL characters that are problematic for filesystems
/// into safe alternatives. Characters are replaced one for one.
pub fn encode_url_path(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            '/' => '-',
            '\\' => '-',
            ':' => '_',
            '*' => '_',
            '?' => '_',
            '"' => '_',
            '<' => '_',
            '>' => '_',
            '|' => '_',
            // Keep alphanumeric, dots, dashes, underscores and the key separator as-is
            c if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' || c == '~' => c,
            // Replace other characters with underscores
            _ => '_',
        })
        .collect()
}

/// The link-cache directory name for a repository at a target:
/// `<url>~<target>` with scheme and credentials stripped, then encoded.
pub fn link_cache_key(url: &str, target: &str) -> String {
    encode_url_path(&format!("{}~{}", normalize_url(url), target))
}

/// The first `<dir>.old-<n>` path that does not exist yet.
pub fn aside_path(dir: &Path) -> PathBuf {
    let file_name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repository".to_string());
    let mut n = 1;
    loop {
        let candidate = dir.with_file_name(format!("{}.old-{}", file_name, n));
        if !candidate.exists() && candidate.symlink_metadata().is_err() {
            return candidate;
        }
        n += 1;
    }
}
