//! Shared fixtures for integration and E2E tests.
//!
//! Tests drive the real `git` against bare repositories created in a
//! temporary directory and addressed with `file://` URLs, so no network is
//! needed. Every test should start with [`skip_without_git`].
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     if skip_without_git() {
//!         return;
//!     }
//!     let ws = Workspace::new();
//!     let lib = ws.create_repo("lib", json!({"name": "lib"}));
//!     let app = ws.create_repo("app", json!({"name": "app", "dependencies": {"lib": lib.at("master")}}));
//!     let root = ws.checkout(&app);
//!     // ... run an update in `root`
//! }
//! ```

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use repotree::config::{Config, Context};
use repotree::error::Result;
use repotree::git::{GitRunner, ProcessOutput, RunOptions, SystemGit};
use serde_json::Value;
use tempfile::TempDir;

pub mod prelude {
    pub use super::{skip_without_git, RecordingGit, Remote, Workspace};
    pub use serde_json::json;
}

const IDENTITY: [(&str, &str); 4] = [
    ("GIT_AUTHOR_NAME", "repotree tests"),
    ("GIT_AUTHOR_EMAIL", "tests@example.com"),
    ("GIT_COMMITTER_NAME", "repotree tests"),
    ("GIT_COMMITTER_EMAIL", "tests@example.com"),
];

/// Returns `true` (and says so) when `git` cannot be run.
pub fn skip_without_git() -> bool {
    if repotree::git::git_available() {
        return false;
    }
    println!("Skipping: git is not available");
    true
}

/// A `SystemGit` with a fixed identity, so commits and tags work anywhere.
pub fn test_git() -> SystemGit {
    IDENTITY
        .iter()
        .fold(SystemGit::new(), |git, (key, value)| git.env(*key, *value))
        .env("GIT_CONFIG_NOSYSTEM", "1")
}

/// Run a fixture git command, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .envs(IDENTITY)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("failed to start git");
    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository plus a seed clone used to push upstream changes.
#[derive(Debug, Clone)]
pub struct Remote {
    pub name: String,
    pub bare: PathBuf,
    pub seed: PathBuf,
}

impl Remote {
    pub fn url(&self) -> String {
        format!("file://{}", self.bare.display())
    }

    /// `<url>#<target>`
    pub fn at(&self, target: &str) -> String {
        format!("{}#{}", self.url(), target)
    }

    /// Commit `content` to `file` on the seed's current branch and push it.
    pub fn commit_file(&self, file: &str, content: &str, message: &str) {
        fs::write(self.seed.join(file), content).unwrap();
        git(&self.seed, &["add", file]);
        git(&self.seed, &["commit", "-m", message]);
        git(&self.seed, &["push", "origin", "HEAD"]);
    }

    pub fn write_manifest(&self, manifest: Value, message: &str) {
        self.commit_file(
            "repotree.json",
            &serde_json::to_string_pretty(&manifest).unwrap(),
            message,
        );
    }

    /// Annotated tag on the seed's HEAD, pushed.
    pub fn tag(&self, tag: &str) {
        git(&self.seed, &["tag", "-a", tag, "-m", tag]);
        git(&self.seed, &["push", "origin", &format!("refs/tags/{}", tag)]);
    }

    /// Create `branch` at the seed's HEAD and push it, staying on the
    /// current branch.
    pub fn push_branch(&self, branch: &str) {
        git(&self.seed, &["branch", branch]);
        git(&self.seed, &["push", "origin", branch]);
    }

    pub fn delete_branch(&self, branch: &str) {
        git(&self.bare, &["branch", "-D", branch]);
    }

    /// Replace `master` upstream with a commit that shares no history.
    pub fn rewrite_history(&self, manifest: Value) {
        git(&self.seed, &["checkout", "--orphan", "rewritten"]);
        git(&self.seed, &["rm", "-rf", "--quiet", "."]);
        fs::write(
            self.seed.join("repotree.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
        git(&self.seed, &["add", "repotree.json"]);
        git(&self.seed, &["commit", "-m", "Start over"]);
        git(&self.seed, &["push", "--force", "origin", "rewritten:master"]);
    }

    /// Commit id of `rev` in the bare repository.
    pub fn rev(&self, rev: &str) -> String {
        git(&self.bare, &["rev-parse", rev])
    }

    pub fn tags(&self) -> Vec<String> {
        git(&self.bare, &["tag", "--list"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Temporary directory holding remotes and working copies.
pub struct Workspace {
    temp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        for dir in ["remotes", "seeds", "work"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        Self { temp }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// A new remote on `master` whose only commit adds `manifest`.
    pub fn create_repo(&self, name: &str, manifest: Value) -> Remote {
        let bare = self.path().join("remotes").join(format!("{}.git", name));
        let seed = self.path().join("seeds").join(name);
        fs::create_dir_all(&bare).unwrap();
        fs::create_dir_all(&seed).unwrap();
        git(&bare, &["init", "--bare", "--quiet"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["checkout", "-b", "master"]);

        let remote = Remote {
            name: name.to_string(),
            bare,
            seed,
        };
        fs::write(
            remote.seed.join("repotree.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
        git(&remote.seed, &["add", "repotree.json"]);
        git(&remote.seed, &["commit", "-m", "Initial commit"]);
        git(&remote.seed, &["remote", "add", "origin", &remote.url()]);
        git(&remote.seed, &["push", "-u", "origin", "master"]);
        remote
    }

    /// Clone `remote` into `work/<name>` and return the working copy.
    pub fn checkout(&self, remote: &Remote) -> PathBuf {
        let dir = self.path().join("work").join(&remote.name);
        git(
            &self.path().join("work"),
            &["clone", "--quiet", &remote.url(), &remote.name],
        );
        dir
    }

    /// Non-interactive context for the project at `root`.
    pub fn context(&self, root: &Path) -> Context {
        Context::new(root, &Config::default())
            .unwrap()
            .with_git(Rc::new(test_git()))
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps [`SystemGit`] and records every argument list it runs.
pub struct RecordingGit {
    inner: SystemGit,
    calls: RefCell<Vec<Vec<String>>>,
}

impl RecordingGit {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            inner: test_git(),
            calls: RefCell::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Recorded calls whose subcommand is one of `subcommands`.
    pub fn calls_of(&self, subcommands: &[&str]) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|args| {
                args.first()
                    .is_some_and(|sub| subcommands.contains(&sub.as_str()))
            })
            .map(|args| args.join(" "))
            .collect()
    }
}

impl GitRunner for RecordingGit {
    fn run(&self, dir: &Path, args: &[&str], options: RunOptions) -> Result<ProcessOutput> {
        self.calls
            .borrow_mut()
            .push(args.iter().map(|a| a.to_string()).collect());
        self.inner.run(dir, args, options)
    }
}
