//! # Configuration and Run Context
//!
//! This module defines the optional `.repotree.yaml` file that sits next to
//! the root project's manifest, and the [`Context`] object every component
//! receives instead of reading global state.
//!
//! ## `.repotree.yaml`
//!
//! ```yaml
//! manifest: repotree.json        # manifest file name in every repository
//! modules_dir: modules           # where dependencies are placed, relative to the root
//! link_root: ~/.cache/repotree   # optional shared link cache
//! version_files: [bower.json]    # sibling descriptors bumped with the manifest
//! include_dev_dependencies: true # main project's devDependencies are walked too
//! max_passes: 64                 # convergence guard
//! node_failure_policy: skip-node # or abort-run
//! release_branch_prefix: release/
//! ```
//!
//! Every key is optional. Command-line flags and environment variables take
//! precedence over the file, which takes precedence over the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    CONFIG_FILENAME, DEFAULT_MANIFEST_FILENAME, DEFAULT_MAX_PASSES, DEFAULT_MODULES_DIR,
    DEFAULT_RELEASE_BRANCH_PREFIX,
};
use crate::error::{Error, Result};
use crate::git::{GitRunner, SystemGit};
use crate::link::LinkCache;
use crate::prompt::{NonInteractive, Prompter, TerminalPrompter};

/// What the convergence loop does when one repository fails mid-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeFailurePolicy {
    /// Log the failure, leave the repository as is for this pass and carry on.
    #[default]
    SkipNode,
    /// Stop the whole run on the first failing repository.
    AbortRun,
}

/// Contents of `.repotree.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub manifest: String,
    pub modules_dir: PathBuf,
    pub link_root: Option<PathBuf>,
    pub version_files: Vec<String>,
    pub include_dev_dependencies: bool,
    pub max_passes: usize,
    pub node_failure_policy: NodeFailurePolicy,
    pub release_branch_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: DEFAULT_MANIFEST_FILENAME.to_string(),
            modules_dir: PathBuf::from(DEFAULT_MODULES_DIR),
            link_root: None,
            version_files: Vec::new(),
            include_dev_dependencies: true,
            max_passes: DEFAULT_MAX_PASSES,
            node_failure_policy: NodeFailurePolicy::default(),
            release_branch_prefix: DEFAULT_RELEASE_BRANCH_PREFIX.to_string(),
        }
    }
}

/// Parse a configuration from YAML text
pub fn parse(yaml_content: &str) -> Result<Config> {
    if yaml_content.trim().is_empty() {
        return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(yaml_content).map_err(|e| {
        let message = e.to_string();
        let hint = message.contains("unknown field").then(|| {
            "known keys are manifest, modules_dir, link_root, version_files, \
             include_dev_dependencies, max_passes, node_failure_policy, release_branch_prefix"
                .to_string()
        });
        Error::ConfigParse { message, hint }
    })?;

    if config.manifest.trim().is_empty() {
        return Err(Error::ConfigParse {
            message: "manifest file name must not be empty".to_string(),
            hint: None,
        });
    }
    if config.max_passes == 0 {
        return Err(Error::ConfigParse {
            message: "max_passes must be at least 1".to_string(),
            hint: None,
        });
    }

    Ok(config)
}

/// Parse a configuration from a YAML file path
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Load `<root>/.repotree.yaml`, or the defaults when there is none.
pub fn load(root: &Path) -> Result<Config> {
    let path = root.join(CONFIG_FILENAME);
    if path.is_file() {
        from_file(path)
    } else {
        Ok(Config::default())
    }
}

/// Everything a run needs, passed explicitly to every component.
#[derive(Clone)]
pub struct Context {
    /// Root project working copy.
    pub root: PathBuf,
    /// Dependency directory, relative to `root`.
    pub modules_dir: PathBuf,
    pub manifest_file: String,
    pub version_files: Vec<String>,
    pub include_dev_dependencies: bool,
    pub link_cache: Option<LinkCache>,
    /// Whether the operator may be asked questions.
    pub interactive: bool,
    /// Resolve conflicts to the preferred reference without asking.
    pub force_latest: bool,
    pub max_passes: usize,
    pub node_failure_policy: NodeFailurePolicy,
    pub release_branch_prefix: String,
    pub git: Rc<dyn GitRunner>,
    pub prompter: Rc<dyn Prompter>,
}

impl Context {
    /// Build a context for the project at `root`.
    ///
    /// Fails with [`Error::State`] when `root` is not an existing directory.
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() || !root.is_dir() {
            return Err(Error::State {
                message: format!("{} is not a directory", root.display()),
            });
        }

        Ok(Self {
            root,
            modules_dir: config.modules_dir.clone(),
            manifest_file: config.manifest.clone(),
            version_files: config.version_files.clone(),
            include_dev_dependencies: config.include_dev_dependencies,
            link_cache: config.link_root.as_ref().map(LinkCache::new),
            interactive: false,
            force_latest: false,
            max_passes: config.max_passes,
            node_failure_policy: config.node_failure_policy,
            release_branch_prefix: config.release_branch_prefix.clone(),
            git: Rc::new(SystemGit::new()),
            prompter: Rc::new(NonInteractive),
        })
    }

    /// Enable operator prompts on the terminal.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self.prompter = if interactive {
            Rc::new(TerminalPrompter)
        } else {
            Rc::new(NonInteractive)
        };
        self
    }

    pub fn force_latest(mut self, force_latest: bool) -> Self {
        self.force_latest = force_latest;
        self
    }

    pub fn with_git(mut self, git: Rc<dyn GitRunner>) -> Self {
        self.git = git;
        self
    }

    /// Use a specific prompter; the run counts as interactive.
    pub fn with_prompter(mut self, prompter: Rc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self.interactive = true;
        self
    }

    pub fn with_link_cache(mut self, link_cache: Option<LinkCache>) -> Self {
        self.link_cache = link_cache;
        self
    }

    pub fn with_node_failure_policy(mut self, policy: NodeFailurePolicy) -> Self {
        self.node_failure_policy = policy;
        self
    }

    /// Absolute directory holding the dependencies.
    pub fn modules_root(&self) -> PathBuf {
        self.root.join(&self.modules_dir)
    }

    /// Where the dependency `name` lives.
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.modules_root().join(name)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("modules_dir", &self.modules_dir)
            .field("manifest_file", &self.manifest_file)
            .field("link_cache", &self.link_cache)
            .field("interactive", &self.interactive)
            .field("force_latest", &self.force_latest)
            .field("node_failure_policy", &self.node_failure_policy)
            .finish_non_exhaustive()
    }
}
