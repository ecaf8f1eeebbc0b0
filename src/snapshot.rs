//! # Repository Snapshots
//!
//! A [`Snapshot`] is the cached view of one dependency working copy. Every
//! accessor runs `git` at most once and serves the memoized value afterwards;
//! every mutator goes through [`Snapshot::mutated`], which evicts exactly the
//! facts listed for it in [`Mutation::evicts`] and advances the change id.
//!
//! Snapshots are shared as `Rc<Snapshot>` and kept in a [`SnapshotPool`] so a
//! rebuilt dependency graph reuses the instances, their caches and their
//! change ids.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::cache::{Fact, FactCache, FactValue, Mutation};
use crate::config::Context;
use crate::error::{Error, Result};
use crate::git::{GitRunner, ProcessOutput, RunOptions};
use crate::link::{self, LinkCache};
use crate::manifest::{DependencyMap, Manifest};
use crate::path::aside_path;
use crate::reference::{RepoRef, Target};

/// Fallback when the remote does not advertise its HEAD.
pub const FALLBACK_DEFAULT_BRANCH: &str = "master";

const UNRELATED_HISTORIES: &str = "refusing to merge unrelated histories";

/// Whether a working copy exists on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Missing,
    Installed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Missing => write!(f, "missing"),
            Status::Installed => write!(f, "installed"),
        }
    }
}

/// Cached, invalidation-aware view of one working copy
pub struct Snapshot {
    name: String,
    dir: PathBuf,
    git: Rc<dyn GitRunner>,
    manifest_file: String,
    include_dev_dependencies: bool,
    cache: FactCache,
    change_id: Cell<u64>,
    // Tags never move, their manifests stay valid for the whole run
    tag_manifests: RefCell<HashMap<String, Option<Manifest>>>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("change_id", &self.change_id.get())
            .finish_non_exhaustive()
    }
}

fn mismatch(fact: Fact) -> Error {
    Error::State {
        message: format!("cached value for {:?} has the wrong type", fact),
    }
}

impl Snapshot {
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        git: Rc<dyn GitRunner>,
        manifest_file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            git,
            manifest_file: manifest_file.into(),
            include_dev_dependencies: false,
            cache: FactCache::new(),
            change_id: Cell::new(0),
            tag_manifests: RefCell::new(HashMap::new()),
        }
    }

    /// Also walk `devDependencies`; only the main project does.
    pub fn include_dev_dependencies(mut self, include: bool) -> Self {
        self.include_dev_dependencies = include;
        self
    }

    /// Snapshot of the root project.
    pub fn main(ctx: &Context) -> Self {
        let name = ctx
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        Self::new(name, &ctx.root, ctx.git.clone(), &ctx.manifest_file)
            .include_dev_dependencies(ctx.include_dev_dependencies)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.manifest_file)
    }

    /// Advances once per logical state-changing operation.
    pub fn change_id(&self) -> u64 {
        self.change_id.get()
    }

    fn git(&self, args: &[&str]) -> Result<ProcessOutput> {
        self.git.run(&self.dir, args, RunOptions::capture())
    }

    fn probe(&self, args: &[&str]) -> Result<ProcessOutput> {
        self.git.run(&self.dir, args, RunOptions::probe())
    }

    /// Record a mutation: evict its facts and bump the change id.
    fn mutated(&self, mutation: Mutation) {
        self.cache.apply(mutation);
        if mutation.changes_working_copy() {
            self.change_id.set(self.change_id.get() + 1);
        }
    }

    // Accessors

    pub fn status(&self) -> Status {
        let installed = self
            .cache
            .get_or_compute(Fact::Status, || {
                Ok(FactValue::Flag(self.dir.join(".git").exists()))
            })
            .ok()
            .and_then(FactValue::into_flag)
            .unwrap_or(false);
        if installed {
            Status::Installed
        } else {
            Status::Missing
        }
    }

    pub fn is_installed(&self) -> bool {
        self.status() == Status::Installed
    }

    /// The checked-out branch, else the exact tag at HEAD, else the commit.
    ///
    /// `None` for a missing working copy.
    pub fn target(&self) -> Result<Option<Target>> {
        if !self.is_installed() {
            return Ok(None);
        }
        self.cache
            .get_or_compute(Fact::Target, || {
                let branch = self.probe(&["symbolic-ref", "--short", "-q", "HEAD"])?;
                if branch.success() && !branch.text().is_empty() {
                    return Ok(FactValue::Target(Some(Target::Branch(
                        branch.text().to_string(),
                    ))));
                }
                let tag = self.probe(&["describe", "--tags", "--exact-match", "HEAD"])?;
                if tag.success() && !tag.text().is_empty() {
                    return Ok(FactValue::Target(Some(Target::Tag(tag.text().to_string()))));
                }
                let commit = self.probe(&["rev-parse", "HEAD"])?;
                if commit.success() && !commit.text().is_empty() {
                    return Ok(FactValue::Target(Some(Target::Commit(
                        commit.text().to_string(),
                    ))));
                }
                Err(Error::TargetUnresolvable {
                    name: self.name.clone(),
                    dir: self.dir.display().to_string(),
                })
            })?
            .into_target()
            .ok_or_else(|| mismatch(Fact::Target))
    }

    /// The `origin` URL, if there is one.
    pub fn bare_url(&self) -> Result<Option<String>> {
        if !self.is_installed() {
            return Ok(None);
        }
        let url = self
            .cache
            .get_or_compute(Fact::BareUrl, || {
                let out = self.probe(&["config", "--get", "remote.origin.url"])?;
                Ok(FactValue::Text(if out.success() {
                    out.text().to_string()
                } else {
                    String::new()
                }))
            })?
            .into_text()
            .ok_or_else(|| mismatch(Fact::BareUrl))?;
        Ok(Some(url).filter(|u| !u.is_empty()))
    }

    /// `<bare url>#<target>`
    pub fn url(&self) -> Result<Option<String>> {
        match (self.bare_url()?, self.target()?) {
            (Some(url), Some(target)) => Ok(Some(format!("{}#{}", url, target))),
            _ => Ok(None),
        }
    }

    pub fn manifest(&self) -> Result<Option<Manifest>> {
        if !self.is_installed() {
            return Ok(None);
        }
        self.cache
            .get_or_compute(Fact::Manifest, || {
                Ok(FactValue::Manifest(Manifest::read(&self.manifest_path())?))
            })?
            .into_manifest()
            .ok_or_else(|| mismatch(Fact::Manifest))
    }

    /// Repository dependencies declared by the current manifest.
    pub fn dependencies(&self) -> Result<DependencyMap> {
        self.cache
            .get_or_compute(Fact::Dependencies, || {
                let deps = self
                    .manifest()?
                    .map(|m| m.repository_dependencies(self.include_dev_dependencies))
                    .unwrap_or_default();
                Ok(FactValue::Dependencies(deps))
            })?
            .into_dependencies()
            .ok_or_else(|| mismatch(Fact::Dependencies))
    }

    /// Repository dependencies `manifest` would declare for this snapshot.
    pub fn declared_dependencies(&self, manifest: &Manifest) -> DependencyMap {
        manifest.repository_dependencies(self.include_dev_dependencies)
    }

    /// Local tag names, remote tags included once fetched.
    pub fn tags(&self) -> Result<Vec<String>> {
        if !self.is_installed() {
            return Ok(Vec::new());
        }
        self.cache
            .get_or_compute(Fact::Tags, || {
                Ok(FactValue::List(self.git(&["tag", "--list"])?.lines()))
            })?
            .into_list()
            .ok_or_else(|| mismatch(Fact::Tags))
    }

    /// True iff the working copy has no differences against HEAD.
    pub fn is_working_copy_clean(&self) -> Result<bool> {
        if !self.is_installed() {
            return Ok(true);
        }
        self.cache
            .get_or_compute(Fact::Clean, || {
                let out = self.probe(&["diff", "--quiet", "HEAD"])?;
                match out.exit_code {
                    0 => Ok(FactValue::Flag(true)),
                    1 => Ok(FactValue::Flag(false)),
                    code => Err(Error::GitCommand {
                        command: "diff --quiet HEAD".to_string(),
                        dir: self.dir.display().to_string(),
                        code: Some(code),
                        stderr: out.stderr.trim().to_string(),
                    }),
                }
            })?
            .into_flag()
            .ok_or_else(|| mismatch(Fact::Clean))
    }

    /// True iff git reports unmerged paths.
    pub fn is_conflicted(&self) -> Result<bool> {
        if !self.is_installed() {
            return Ok(false);
        }
        self.cache
            .get_or_compute(Fact::Conflicted, || {
                let out = self.git(&["diff", "--name-only", "--diff-filter=U"])?;
                Ok(FactValue::Flag(!out.lines().is_empty()))
            })?
            .into_flag()
            .ok_or_else(|| mismatch(Fact::Conflicted))
    }

    /// Commit at HEAD; `None` when missing or without commits.
    pub fn head_commit(&self) -> Result<Option<String>> {
        if !self.is_installed() {
            return Ok(None);
        }
        let commit = self
            .cache
            .get_or_compute(Fact::HeadCommit, || {
                let out = self.probe(&["rev-parse", "HEAD"])?;
                Ok(FactValue::Text(if out.success() {
                    out.text().to_string()
                } else {
                    String::new()
                }))
            })?
            .into_text()
            .ok_or_else(|| mismatch(Fact::HeadCommit))?;
        Ok(Some(commit).filter(|c| !c.is_empty()))
    }

    /// Fetch branches and tags from `origin`, once until evicted.
    pub fn fetch(&self) -> Result<()> {
        if self.cache.contains(Fact::Fetched) || !self.is_installed() {
            return Ok(());
        }
        if self.bare_url()?.is_none() {
            return Ok(());
        }
        self.git(&["fetch", "--prune", "origin"])?;
        self.git(&["fetch", "--tags", "origin"])?;
        self.mutated(Mutation::Fetch);
        self.cache.insert(Fact::Fetched, FactValue::Flag(true));
        Ok(())
    }

    /// Whether a branch checkout has nothing to pull.
    ///
    /// Tags and commits never move and are always up to date.
    pub fn is_up_to_date(&self) -> Result<bool> {
        let branch = match self.target()? {
            Some(Target::Branch(branch)) => branch,
            Some(_) => return Ok(true),
            None => return Ok(false),
        };
        if let Some(FactValue::Flag(flag)) = self.cache.get(Fact::UpToDate) {
            return Ok(flag);
        }
        self.fetch()?;
        let behind = self.commits_between("HEAD", &branch)?;
        let up_to_date = behind == 0;
        self.cache.insert(Fact::UpToDate, FactValue::Flag(up_to_date));
        Ok(up_to_date)
    }

    /// Local commits not on the upstream branch.
    pub fn unpushed(&self) -> Result<u32> {
        let branch = match self.target()? {
            Some(Target::Branch(branch)) => branch,
            _ => return Ok(0),
        };
        self.cache
            .get_or_compute(Fact::Unpushed, || {
                Ok(FactValue::Count(self.commits_ahead(&branch)?))
            })?
            .into_count()
            .ok_or_else(|| mismatch(Fact::Unpushed))
    }

    fn upstream_ref(&self, branch: &str) -> Result<Option<String>> {
        let tracked = self.probe(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])?;
        if tracked.success() && !tracked.text().is_empty() {
            return Ok(Some(tracked.text().to_string()));
        }
        let remote = format!("origin/{}", branch);
        let exists = self.probe(&["rev-parse", "--verify", "-q", &remote])?;
        Ok(exists.success().then_some(remote))
    }

    /// Commits in the upstream of `branch` that `from` lacks.
    fn commits_between(&self, from: &str, branch: &str) -> Result<u32> {
        let Some(upstream) = self.upstream_ref(branch)? else {
            return Ok(0);
        };
        let range = format!("{}..{}", from, upstream);
        let out = self.git(&["rev-list", "--count", &range])?;
        Ok(out.text().parse().unwrap_or(0))
    }

    fn commits_ahead(&self, branch: &str) -> Result<u32> {
        let Some(upstream) = self.upstream_ref(branch)? else {
            return Ok(0);
        };
        let range = format!("{}..HEAD", upstream);
        let out = self.git(&["rev-list", "--count", &range])?;
        Ok(out.text().parse().unwrap_or(0))
    }

    /// Branch names on `origin`, queried live.
    pub fn remote_branches(&self) -> Result<Vec<String>> {
        if self.bare_url()?.is_none() {
            return Ok(Vec::new());
        }
        self.cache
            .get_or_compute(Fact::RemoteBranches, || {
                let out = self.git(&["ls-remote", "--heads", "origin"])?;
                let branches = out
                    .lines()
                    .iter()
                    .filter_map(|line| line.split_whitespace().nth(1))
                    .filter_map(|r| r.strip_prefix("refs/heads/"))
                    .map(str::to_string)
                    .collect();
                Ok(FactValue::List(branches))
            })?
            .into_list()
            .ok_or_else(|| mismatch(Fact::RemoteBranches))
    }

    pub fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        Ok(self.remote_branches()?.iter().any(|b| b == branch))
    }

    /// Whether `tag` exists locally right now, bypassing the cached tag list.
    pub fn has_local_tag(&self, tag: &str) -> Result<bool> {
        if !self.is_installed() {
            return Ok(false);
        }
        let tag_ref = format!("refs/tags/{}", tag);
        let out = self.probe(&["rev-parse", "--verify", "--quiet", &tag_ref])?;
        Ok(out.success())
    }

    /// The commit a tag or commit id points at.
    ///
    /// `None` for branch names, which move, and for unknown names.
    pub fn pinned_commit(&self, target: &str) -> Result<Option<String>> {
        if !self.is_installed() {
            return Ok(None);
        }
        for branch_ref in [
            format!("refs/heads/{}", target),
            format!("refs/remotes/origin/{}", target),
        ] {
            if self.probe(&["rev-parse", "--verify", "--quiet", &branch_ref])?.success() {
                return Ok(None);
            }
        }
        let object = format!("{}^{{commit}}", target);
        let out = self.probe(&["rev-parse", "--verify", "--quiet", &object])?;
        Ok(Some(out.text().to_string()).filter(|c| out.success() && !c.is_empty()))
    }

    /// The branch `origin` has checked out as HEAD.
    pub fn default_branch(&self) -> Result<String> {
        if self.bare_url()?.is_none() {
            return Ok(FALLBACK_DEFAULT_BRANCH.to_string());
        }
        self.cache
            .get_or_compute(Fact::DefaultBranch, || {
                let out = self.probe(&["ls-remote", "--symref", "origin", "HEAD"])?;
                Ok(FactValue::Text(parse_symref_head(&out)))
            })?
            .into_text()
            .ok_or_else(|| mismatch(Fact::DefaultBranch))
    }

    /// Files tracked at HEAD.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        if !self.is_installed() {
            return Ok(Vec::new());
        }
        self.cache
            .get_or_compute(Fact::TrackedFiles, || {
                Ok(FactValue::List(self.git(&["ls-files"])?.lines()))
            })?
            .into_list()
            .ok_or_else(|| mismatch(Fact::TrackedFiles))
    }

    /// The manifest recorded at `tag`, read without checking it out.
    pub fn manifest_at(&self, tag: &str) -> Result<Option<Manifest>> {
        if let Some(cached) = self.tag_manifests.borrow().get(tag) {
            return Ok(cached.clone());
        }
        let object = format!("{}:{}", tag, self.manifest_file);
        let out = self.probe(&["show", &object])?;
        let manifest = if out.success() {
            Some(Manifest::parse(&out.stdout, &object)?)
        } else {
            None
        };
        self.tag_manifests
            .borrow_mut()
            .insert(tag.to_string(), manifest.clone());
        Ok(manifest)
    }

    // Mutators

    /// Clone `reference` into this snapshot's directory.
    ///
    /// With a link cache the clone goes to the shared entry and the directory
    /// becomes a link to it.
    pub fn install(&self, reference: &RepoRef, links: Option<&LinkCache>) -> Result<()> {
        match links {
            Some(links) => {
                let target = match &reference.target {
                    Some(target) => target.clone(),
                    None => remote_default_branch(self.git.as_ref(), &reference.url)?,
                };
                let entry = links.entry_path(&reference.url, &target);
                if links.has_entry(&reference.url, &target) {
                    debug!("{}: reusing {}", self.name, entry.display());
                } else {
                    clone_into(self.git.as_ref(), &self.name, reference, &entry)?;
                }
                links.link(&entry, &self.dir)?;
            }
            None => clone_into(self.git.as_ref(), &self.name, reference, &self.dir)?,
        }
        info!("{}: cloned {}", self.name, reference);
        self.mutated(Mutation::Clone);
        self.pull_lfs_if_needed()
    }

    /// Switch to `reference`'s target.
    ///
    /// A linked working copy is re-linked to the cache entry for the new
    /// target instead of checking out inside the shared clone.
    pub fn switch_to(&self, reference: &RepoRef, links: Option<&LinkCache>) -> Result<()> {
        let target = match &reference.target {
            Some(target) => target.clone(),
            None => self.default_branch()?,
        };
        if links.is_some() && link::is_link(&self.dir) {
            return self.install(&reference.with_target(target), links);
        }
        self.checkout(&target)
    }

    /// Check out a branch, tag or commit, fetching first.
    pub fn checkout(&self, target: &str) -> Result<()> {
        self.fetch()?;
        let out = self.probe(&["checkout", target])?;
        if !out.success() {
            return Err(Error::RefResolution {
                name: self.name.clone(),
                target: target.to_string(),
            });
        }
        info!("{}: switched to {}", self.name, target);
        self.mutated(Mutation::Checkout);
        self.pull_lfs_if_needed()
    }

    /// Create and check out `branch` starting at `start`.
    pub fn create_branch(&self, branch: &str, start: &str) -> Result<()> {
        self.git(&["checkout", "-b", branch, start])?;
        self.mutated(Mutation::Checkout);
        Ok(())
    }

    /// Pull the current branch from `origin`.
    ///
    /// Returns whether HEAD advanced. Fails with
    /// [`Error::UnrelatedHistory`] when git refuses to merge.
    pub fn pull(&self) -> Result<bool> {
        let branch = match self.target()? {
            Some(Target::Branch(branch)) => branch,
            _ => return Ok(false),
        };
        let before = self.head_commit()?;
        let out = self.probe(&["pull", "--no-rebase", "--no-edit", "origin", &branch])?;
        if !out.success() {
            // A failed merge may leave conflicts behind
            self.mutated(Mutation::Stash);
            if out.stderr.contains(UNRELATED_HISTORIES) || out.stdout.contains(UNRELATED_HISTORIES)
            {
                return Err(Error::UnrelatedHistory {
                    name: self.name.clone(),
                });
            }
            return Err(Error::GitCommand {
                command: format!("pull --no-rebase --no-edit origin {}", branch),
                dir: self.dir.display().to_string(),
                code: Some(out.exit_code),
                stderr: out.stderr.trim().to_string(),
            });
        }

        // HEAD is read fresh, the cached value predates the pull
        let after = self.probe(&["rev-parse", "HEAD"])?;
        let advanced = before.as_deref() != Some(after.text());
        if advanced {
            info!("{}: pulled {}", self.name, branch);
            self.mutated(Mutation::PullAdvanced);
        } else {
            self.mutated(Mutation::PullNoop);
        }
        Ok(advanced)
    }

    /// Discard local history and files, moving HEAD to `to`.
    pub fn reset_hard(&self, to: &str) -> Result<()> {
        self.git(&["reset", "--hard", to])?;
        self.mutated(Mutation::ResetHard);
        Ok(())
    }

    /// Recover from a pull refused for unrelated histories.
    ///
    /// A clean working copy is hard-reset to its upstream branch and pulled
    /// again. A dirty one is left alone and the error is returned.
    pub fn fix_unrelated_history(&self) -> Result<bool> {
        let branch = match self.target()? {
            Some(Target::Branch(branch)) => branch,
            _ => return Ok(false),
        };
        if !self.is_working_copy_clean()? {
            warn!(
                "{}: upstream history was rewritten but the working copy has local changes, leaving it untouched",
                self.name
            );
            return Err(Error::UnrelatedHistory {
                name: self.name.clone(),
            });
        }

        // Refetch, the cached fetch predates the rewrite
        self.cache.apply(Mutation::Fetch);
        self.fetch()?;
        let upstream = format!("origin/{}", branch);
        warn!(
            "{}: upstream history was rewritten, resetting {} to {} (local commits are discarded)",
            self.name, branch, upstream
        );
        self.reset_hard(&upstream)?;
        self.pull()
    }

    /// Stage `files` and commit them.
    pub fn add_and_commit(&self, files: &[&str], message: &str) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(files);
        self.git(&args)?;
        self.git(&["commit", "-m", message])?;
        self.mutated(Mutation::AddAndCommit);
        Ok(())
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        manifest.write(&self.manifest_path())?;
        self.mutated(Mutation::WriteManifest);
        Ok(())
    }

    /// Set `version` in sibling descriptor files that are tracked here.
    ///
    /// Returns the files that were rewritten.
    pub fn write_version_files(&self, files: &[String], version: &str) -> Result<Vec<String>> {
        let tracked = self.tracked_files()?;
        let mut written = Vec::new();
        for file in files.iter().filter(|f| tracked.contains(f)) {
            crate::manifest::set_version_in_file(&self.dir.join(file), version)?;
            written.push(file.clone());
        }
        if !written.is_empty() {
            self.mutated(Mutation::WriteManifest);
        }
        Ok(written)
    }

    /// Create an annotated tag at HEAD.
    pub fn create_tag(&self, tag: &str, message: &str) -> Result<()> {
        self.git(&["tag", "-a", tag, "-m", message])?;
        self.mutated(Mutation::CreateTag);
        Ok(())
    }

    /// Push one ref to `origin`.
    pub fn push(&self, refspec: &str) -> Result<()> {
        self.git.run(
            &self.dir,
            &["push", "origin", refspec],
            RunOptions::capture(),
        )?;
        self.mutated(Mutation::Push);
        Ok(())
    }

    /// Rename the working copy to the first free `<name>.old-<n>`.
    pub fn move_aside(&self) -> Result<PathBuf> {
        let aside = aside_path(&self.dir);
        fs::rename(&self.dir, &aside)?;
        warn!(
            "{}: moved previous working copy aside to {}",
            self.name,
            aside.display()
        );
        self.mutated(Mutation::Clone);
        Ok(aside)
    }

    /// Run `op` with local changes stashed.
    ///
    /// Nothing is stashed on a clean working copy. On success the stash is
    /// popped; when `op` fails it is left in place for the operator.
    pub fn with_stash<T>(&self, op: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if !self.is_installed() || self.is_working_copy_clean()? {
            return op(self);
        }

        self.git(&["stash", "push", "-m", "repotree"])?;
        self.mutated(Mutation::Stash);
        debug!("{}: stashed local changes", self.name);

        let result = op(self);
        if result.is_err() {
            warn!(
                "{}: local changes were left in the stash, restore them with `git stash pop`",
                self.name
            );
            return result;
        }

        let popped = self.probe(&["stash", "pop"]);
        self.mutated(Mutation::Stash);
        match popped {
            Ok(out) if out.success() => result,
            Ok(out) => Err(Error::GitCommand {
                command: "stash pop".to_string(),
                dir: self.dir.display().to_string(),
                code: Some(out.exit_code),
                stderr: out.stderr.trim().to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    fn pull_lfs_if_needed(&self) -> Result<()> {
        if self.manifest()?.map(|m| m.lfs).unwrap_or(false) {
            info!("{}: fetching LFS objects", self.name);
            self.git(&["lfs", "pull"])?;
        }
        Ok(())
    }
}

/// Parse `ls-remote --symref <remote> HEAD` output.
fn parse_symref_head(out: &ProcessOutput) -> String {
    if !out.success() {
        return FALLBACK_DEFAULT_BRANCH.to_string();
    }
    out.lines()
        .iter()
        .find_map(|line| {
            line.strip_prefix("ref:")
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|r| r.strip_prefix("refs/heads/"))
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string())
}

/// Default branch of a repository that is not cloned yet.
pub fn remote_default_branch(git: &dyn GitRunner, url: &str) -> Result<String> {
    let cwd = std::env::temp_dir();
    let out = git.run(&cwd, &["ls-remote", "--symref", url, "HEAD"], RunOptions::probe())?;
    Ok(parse_symref_head(&out))
}

fn clone_into(git: &dyn GitRunner, name: &str, reference: &RepoRef, dir: &Path) -> Result<()> {
    let parent = dir.parent().ok_or_else(|| Error::State {
        message: format!("{} has no parent directory", dir.display()),
    })?;
    fs::create_dir_all(parent)?;
    let dest = dir.to_string_lossy().into_owned();

    let Some(target) = reference.target.as_deref() else {
        git.run(parent, &["clone", &reference.url, &dest], RunOptions::capture())?;
        return Ok(());
    };

    // Branches and tags clone directly; commits need a full clone first
    let direct = git.run(
        parent,
        &["clone", "--branch", target, &reference.url, &dest],
        RunOptions::probe(),
    )?;
    if direct.success() {
        return Ok(());
    }
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    git.run(parent, &["clone", &reference.url, &dest], RunOptions::capture())?;
    let checkout = git.run(dir, &["checkout", target], RunOptions::probe())?;
    if !checkout.success() {
        fs::remove_dir_all(dir)?;
        return Err(Error::RefResolution {
            name: name.to_string(),
            target: target.to_string(),
        });
    }
    Ok(())
}

/// Snapshots by case-insensitive name, reused across graph rebuilds.
#[derive(Debug, Default)]
pub struct SnapshotPool {
    snapshots: RefCell<HashMap<String, Rc<Snapshot>>>,
}

impl SnapshotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot for dependency `name`, created on first request.
    pub fn snapshot(&self, ctx: &Context, name: &str) -> Rc<Snapshot> {
        let key = name.to_lowercase();
        if let Some(existing) = self.snapshots.borrow().get(&key) {
            return Rc::clone(existing);
        }
        let snapshot = Rc::new(Snapshot::new(
            name,
            ctx.module_path(name),
            ctx.git.clone(),
            &ctx.manifest_file,
        ));
        self.snapshots
            .borrow_mut()
            .insert(key, Rc::clone(&snapshot));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.snapshots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::SystemGit;
    use tempfile::TempDir;

    fn output(stdout: &str, exit_code: i32) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code,
        }
    }

    #[test]
    fn test_parse_symref_head() {
        let out = output("ref: refs/heads/main\tHEAD\nabc123\tHEAD\n", 0);
        assert_eq!(parse_symref_head(&out), "main");
        assert_eq!(parse_symref_head(&output("", 2)), FALLBACK_DEFAULT_BRANCH);
        assert_eq!(parse_symref_head(&output("abc\tHEAD\n", 0)), FALLBACK_DEFAULT_BRANCH);
    }

    #[test]
    fn test_missing_snapshot_does_not_probe() {
        let temp = TempDir::new().unwrap();
        let snapshot = Snapshot::new(
            "lib",
            temp.path().join("lib"),
            Rc::new(SystemGit::new()),
            "repotree.json",
        );
        assert_eq!(snapshot.status(), Status::Missing);
        assert_eq!(snapshot.target().unwrap(), None);
        assert_eq!(snapshot.manifest().unwrap(), None);
        assert!(snapshot.dependencies().unwrap().is_empty());
        assert!(snapshot.tags().unwrap().is_empty());
        assert_eq!(snapshot.change_id(), 0);
    }

    fn test_git() -> SystemGit {
        SystemGit::new()
            .env("GIT_AUTHOR_NAME", "repotree tests")
            .env("GIT_AUTHOR_EMAIL", "tests@example.com")
            .env("GIT_COMMITTER_NAME", "repotree tests")
            .env("GIT_COMMITTER_EMAIL", "tests@example.com")
            .env("GIT_CONFIG_NOSYSTEM", "1")
    }

    /// A repository on `master` with one commit adding the manifest.
    fn local_repo(temp: &TempDir) -> Snapshot {
        let dir = temp.path().join("lib");
        std::fs::create_dir_all(&dir).unwrap();
        let git = test_git();
        for args in [&["init", "--quiet"][..], &["checkout", "-q", "-b", "master"][..]] {
            git.run(&dir, args, RunOptions::capture()).unwrap();
        }
        std::fs::write(dir.join("repotree.json"), "{\"name\": \"lib\", \"version\": \"1.0.0\"}\n")
            .unwrap();
        let snapshot = Snapshot::new("lib", &dir, Rc::new(git), "repotree.json");
        snapshot.add_and_commit(&["repotree.json"], "Initial commit").unwrap();
        snapshot
    }

    #[test]
    fn test_install_clones_reference_target() {
        if !crate::git::git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let source = local_repo(&temp);
        source.create_tag("1.0.0", "Release").unwrap();
        let url = format!("file://{}", source.dir().display());
        let reference = RepoRef::parse(&format!("{}#1.0.0", url)).unwrap();

        let copy = Snapshot::new(
            "copy",
            temp.path().join("copy"),
            Rc::new(test_git()),
            "repotree.json",
        );
        assert!(!copy.is_installed());
        copy.install(&reference, None).unwrap();
        assert!(copy.is_installed());
        assert_eq!(copy.target().unwrap(), Some(Target::Tag("1.0.0".to_string())));
        assert_eq!(copy.head_commit().unwrap(), source.head_commit().unwrap());
    }

    #[test]
    fn test_pinned_commit_ignores_branches() {
        if !crate::git::git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let snapshot = local_repo(&temp);
        snapshot.create_tag("1.0.0", "Release").unwrap();
        let head = snapshot.head_commit().unwrap().unwrap();

        assert_eq!(snapshot.pinned_commit("1.0.0").unwrap(), Some(head.clone()));
        assert_eq!(snapshot.pinned_commit(&head).unwrap(), Some(head));
        assert_eq!(snapshot.pinned_commit("master").unwrap(), None);
        assert_eq!(snapshot.pinned_commit("missing").unwrap(), None);
    }

    #[test]
    fn test_target_probes_branch_then_tag_then_commit() {
        if !crate::git::git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let snapshot = local_repo(&temp);
        assert_eq!(
            snapshot.target().unwrap(),
            Some(Target::Branch("master".to_string()))
        );
        assert_eq!(snapshot.bare_url().unwrap(), None);

        snapshot.create_tag("1.0.0", "Release").unwrap();
        snapshot.checkout("1.0.0").unwrap();
        assert_eq!(snapshot.target().unwrap(), Some(Target::Tag("1.0.0".to_string())));
        assert!(snapshot.is_up_to_date().unwrap());

        std::fs::write(snapshot.dir().join("NOTES"), "detached\n").unwrap();
        snapshot.add_and_commit(&["NOTES"], "Detached commit").unwrap();
        let head = snapshot.head_commit().unwrap().unwrap();
        assert_eq!(snapshot.target().unwrap(), Some(Target::Commit(head)));
    }

    #[test]
    fn test_with_stash_restores_local_changes() {
        if !crate::git::git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let snapshot = local_repo(&temp);
        let before = snapshot.change_id();
        std::fs::write(snapshot.manifest_path(), "{\"name\": \"lib\", \"version\": \"2.0.0\"}\n")
            .unwrap();
        assert!(!snapshot.is_working_copy_clean().unwrap());

        let clean_inside = snapshot
            .with_stash(|s| s.is_working_copy_clean())
            .unwrap();
        assert!(clean_inside);
        assert!(!snapshot.is_working_copy_clean().unwrap());
        assert_eq!(
            snapshot.manifest().unwrap().unwrap().version.as_deref(),
            Some("2.0.0")
        );
        // Stashing is not a logical change
        assert_eq!(snapshot.change_id(), before);
    }

    #[test]
    fn test_with_stash_keeps_stash_on_failure() {
        if !crate::git::git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let snapshot = local_repo(&temp);
        std::fs::write(snapshot.manifest_path(), "{}\n").unwrap();

        let result: Result<()> = snapshot.with_stash(|_| {
            Err(Error::State {
                message: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(snapshot.is_working_copy_clean().unwrap());
        let stashes = snapshot.git(&["stash", "list"]).unwrap();
        assert_eq!(stashes.lines().len(), 1);
    }

    #[test]
    fn test_commit_bumps_change_id_once() {
        if !crate::git::git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let snapshot = local_repo(&temp);
        let before = snapshot.change_id();
        std::fs::write(snapshot.dir().join("NOTES"), "x\n").unwrap();
        snapshot.add_and_commit(&["NOTES"], "Notes").unwrap();
        assert_eq!(snapshot.change_id(), before + 1);
        assert_eq!(snapshot.tracked_files().unwrap(), vec!["NOTES", "repotree.json"]);
    }

    #[test]
    fn test_pool_reuses_case_insensitively() {
        let temp = TempDir::new().unwrap();
        let ctx = Context::new(temp.path(), &crate::config::Config::default()).unwrap();
        let pool = SnapshotPool::new();
        let first = pool.snapshot(&ctx, "Lib");
        let second = pool.snapshot(&ctx, "lib");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "Lib");
        assert_eq!(pool.len(), 1);
    }
}
