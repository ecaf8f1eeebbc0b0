//! Default values for repotree configuration.
//!
//! Centralized so the config layer, the commands and the tests agree.

use std::path::PathBuf;

/// Configuration file looked up in the root project.
pub const CONFIG_FILENAME: &str = ".repotree.yaml";

/// Manifest file name in every repository.
pub const DEFAULT_MANIFEST_FILENAME: &str = "repotree.json";

/// Dependency directory, relative to the root project.
pub const DEFAULT_MODULES_DIR: &str = "modules";

/// Upper bound on convergence passes before a run gives up.
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Prefix of the branches the release executor cuts.
pub const DEFAULT_RELEASE_BRANCH_PREFIX: &str = "release/";

/// Environment variable overriding the link root.
pub const LINK_ROOT_ENV: &str = "REPOTREE_LINK_ROOT";

/// Returns the default link cache root.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/repotree` (XDG Base Directory)
/// - macOS: `~/Library/Caches/repotree`
/// - Windows: `{FOLDERID_LocalAppData}\repotree`
///
/// Falls back to `.repotree-cache` in the current directory if the
/// platform cache directory cannot be determined.
pub fn default_link_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".repotree-cache"))
        .join("repotree")
}
