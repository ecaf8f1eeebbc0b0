//! # CLI Command Implementations
//!
//! One module per subcommand. Each defines an `Args` struct derived with
//! `clap` and an `execute` function that builds a [`Context`] from the
//! [`Session`] and calls into the `repotree` library.

pub mod clone;
pub mod release;
pub mod status;
pub mod tree;
pub mod update;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use repotree::config::{self, Context};
use repotree::link::LinkCache;
use repotree::output::OutputConfig;

/// Global options shared by every command
#[derive(Debug, Clone)]
pub struct Session {
    /// Project directory (`-C`, else the current directory).
    pub directory: PathBuf,
    /// `--link-root` or `REPOTREE_LINK_ROOT`; overrides the config file.
    pub link_root: Option<PathBuf>,
    pub output: OutputConfig,
}

impl Session {
    /// Load `.repotree.yaml` of `root` and build the run context.
    ///
    /// Prompts are only enabled when `interactive` is set and stderr is a
    /// terminal.
    pub fn context_for(&self, root: &Path, interactive: bool) -> Result<Context> {
        let config = config::load(root)
            .with_context(|| format!("Failed to load configuration of {}", root.display()))?;
        let mut ctx = Context::new(root, &config)?;
        if let Some(link_root) = &self.link_root {
            ctx = ctx.with_link_cache(Some(LinkCache::new(link_root)));
        }
        Ok(ctx.interactive(interactive && console::Term::stderr().is_term()))
    }

    pub fn context(&self, interactive: bool) -> Result<Context> {
        self.context_for(&self.directory, interactive)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_reads_config_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".repotree.yaml"),
            "manifest: deps.json\nmodules_dir: vendor\n",
        )
        .unwrap();

        let ctx = test_support::session(temp.path()).context(false).unwrap();
        assert_eq!(ctx.manifest_file, "deps.json");
        assert_eq!(ctx.modules_root(), temp.path().join("vendor"));
        assert!(!ctx.interactive);
    }

    #[test]
    fn test_link_root_flag_overrides_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".repotree.yaml"), "link_root: /from/file\n").unwrap();

        let mut session = test_support::session(temp.path());
        session.link_root = Some(temp.path().join("links"));
        let ctx = session.context(false).unwrap();
        assert_eq!(
            ctx.link_cache.unwrap().root(),
            temp.path().join("links").as_path()
        );
    }

    #[test]
    fn test_context_rejects_missing_directory() {
        let temp = TempDir::new().unwrap();
        let session = test_support::session(&temp.path().join("absent"));
        assert!(session.context(false).is_err());
    }

    #[test]
    fn test_bad_config_is_reported_with_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".repotree.yaml"), "unknown_key: 1\n").unwrap();

        let err = test_support::session(temp.path()).context(false).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load configuration"));
    }
}
