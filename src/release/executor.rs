//! Carry out a [`TagPlan`].
//!
//! Fixed order:
//! 1. Bump, commit and push the mainline version of flagged repositories.
//! 2. For every new tag: branch from the original target, rewrite the
//!    manifest (version, child references, stamp), commit, tag, and return to
//!    the original target.
//! 3. Once every repository is tagged locally, push branches and tags.
//!
//! Pushes are not transactional across repositories. Failed pushes are
//! collected into [`Error::PushIncomplete`]; nothing is rolled back.

use log::{info, warn};

use super::{TagPlan, TagPlanEntry};
use crate::config::Context;
use crate::defaults::DEFAULT_RELEASE_BRANCH_PREFIX;
use crate::error::{Error, Result};
use crate::manifest::{Manifest, TagStamp};
use crate::reference::RepoRef;

/// What a release did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Repositories whose mainline version was bumped.
    pub bumped: Vec<String>,
    /// `(name, tag)` for every tag cut.
    pub created: Vec<(String, String)>,
    /// Refs pushed in the last step.
    pub pushed: Vec<String>,
}

/// Executes tag plans
pub struct ReleaseExecutor<'a> {
    ctx: &'a Context,
}

impl<'a> ReleaseExecutor<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn run(&self, plan: &TagPlan) -> Result<ReleaseReport> {
        let mut report = ReleaseReport::default();

        for entry in plan.entries().iter().filter(|e| e.increment_master_version) {
            if self.bump_mainline(entry)? {
                report.bumped.push(entry.name.clone());
            }
        }

        for entry in plan.created() {
            self.cut_release(entry, plan)?;
            report.created.push((entry.name.clone(), entry.tag.clone()));
        }

        let mut failures = Vec::new();
        for entry in plan.created() {
            let mut refs = vec![format!("refs/tags/{}", entry.tag)];
            if let Some(branch) = &entry.branch {
                refs.insert(0, format!("refs/heads/{}", branch));
            }
            for refspec in refs {
                match entry.snapshot.push(&refspec) {
                    Ok(()) => report.pushed.push(format!("{} {}", entry.name, refspec)),
                    Err(e) => {
                        warn!("{}: pushing {} failed: {}", entry.name, refspec, e);
                        failures.push(format!("{} {}", entry.name, refspec));
                    }
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::PushIncomplete { failures });
        }
        Ok(report)
    }

    /// Set the mainline version to the planned tag and push it.
    ///
    /// Returns false when the version already matches.
    fn bump_mainline(&self, entry: &TagPlanEntry) -> Result<bool> {
        let snapshot = &entry.snapshot;
        let Some(branch) = entry.original_target.branch() else {
            return Ok(false);
        };
        let mut manifest = self.manifest_of(entry)?;
        if manifest.version.as_deref() == Some(entry.tag.as_str()) {
            return Ok(false);
        }

        manifest.set_version(&entry.tag);
        snapshot.write_manifest(&manifest)?;
        let written = snapshot.write_version_files(&self.ctx.version_files, &entry.tag)?;

        let mut files = vec![self.ctx.manifest_file.as_str()];
        files.extend(written.iter().map(String::as_str));
        snapshot.add_and_commit(&files, &format!("Bump version to {}", entry.tag))?;
        snapshot.push(&format!("HEAD:refs/heads/{}", branch))?;
        info!("{}: mainline version bumped to {}", entry.name, entry.tag);
        Ok(true)
    }

    fn cut_release(&self, entry: &TagPlanEntry, plan: &TagPlan) -> Result<()> {
        let snapshot = &entry.snapshot;
        if snapshot.has_local_tag(&entry.tag)? {
            return Err(Error::TagCollision {
                name: entry.name.clone(),
                tag: entry.tag.clone(),
            });
        }

        let original = entry.original_target.name().to_string();
        let commit = snapshot.head_commit()?.ok_or_else(|| Error::State {
            message: format!("{} has no commits", entry.name),
        })?;
        let branch = entry
            .branch
            .clone()
            .unwrap_or_else(|| format!("{}{}", DEFAULT_RELEASE_BRANCH_PREFIX, entry.tag));
        snapshot.create_branch(&branch, &original)?;

        let mut manifest = self.manifest_of(entry)?;
        manifest.set_version(&entry.tag);
        let declared: Vec<(String, String)> = manifest
            .dependencies
            .iter()
            .chain(manifest.dev_dependencies.iter())
            .map(|(n, r)| (n.to_string(), r.to_string()))
            .collect();
        for (name, reference) in declared {
            let Some(child) = plan.get(&name) else {
                continue;
            };
            if let Ok(parsed) = RepoRef::parse(&reference) {
                let pinned = parsed.with_target(&child.tag).to_string();
                manifest.set_dependency_reference(&name, &pinned);
            }
        }
        manifest.set_tag_stamp(TagStamp {
            commit,
            target: original.clone(),
        })?;
        snapshot.write_manifest(&manifest)?;
        let written = snapshot.write_version_files(&self.ctx.version_files, &entry.tag)?;

        let mut files = vec![self.ctx.manifest_file.as_str()];
        files.extend(written.iter().map(String::as_str));
        let message = format!("Release {}", entry.tag);
        snapshot.add_and_commit(&files, &message)?;
        snapshot.create_tag(&entry.tag, &message)?;
        snapshot.checkout(&original)?;
        info!("{}: tagged {} on {}", entry.name, entry.tag, branch);
        Ok(())
    }

    fn manifest_of(&self, entry: &TagPlanEntry) -> Result<Manifest> {
        match entry.snapshot.manifest()? {
            Some(manifest) => Ok(manifest),
            None => Manifest::parse(
                &format!("{{\"name\": {}}}", serde_json::to_string(&entry.name)?),
                &self.ctx.manifest_file,
            ),
        }
    }
}
