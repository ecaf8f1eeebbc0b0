//! Decide, per repository, between reusing a tag and cutting a new one.
//!
//! A tag is reused when it provably captures the current state:
//! - the working copy has it checked out, or a tag's manifest carries a stamp
//!   naming the current target and HEAD commit (newest version first); a
//!   checked-out tag that fails the checks below still finds the release
//!   stamped from it, and
//! - its manifest declares the same dependency names as the working copy, and
//!   every dependency reference it records points at the tag independently
//!   planned for that child, recursively.
//!
//! Otherwise the next tag is a patch increment of the live version, skipping
//! names that already exist.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};
use semver::Version;

use super::{ReleaseOptions, TagPlan, TagPlanEntry};
use crate::config::Context;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::reference::{RepoRef, Target};
use crate::snapshot::Snapshot;
use crate::version::{
    find_latest_version, increment, next_unused, sort_tags_descending, tag_exists, Increment,
};

/// Builds a [`TagPlan`] for a dependency graph
pub struct TagPlanner<'a> {
    ctx: &'a Context,
    graph: &'a DependencyGraph,
    options: ReleaseOptions,
    recycled: RefCell<HashMap<String, Option<String>>>,
}

impl<'a> TagPlanner<'a> {
    pub fn new(ctx: &'a Context, graph: &'a DependencyGraph, options: ReleaseOptions) -> Self {
        Self {
            ctx,
            graph,
            options,
            recycled: RefCell::new(HashMap::new()),
        }
    }

    fn snapshot(&self, name: &str) -> Option<Rc<Snapshot>> {
        if name.eq_ignore_ascii_case(self.graph.main().name()) {
            return Some(Rc::clone(self.graph.main()));
        }
        self.graph.get(name).map(|n| Rc::clone(&n.snapshot))
    }

    /// Plan every repository of the graph, main project included.
    pub fn determine_tags(&self) -> Result<TagPlan> {
        let mut plan = TagPlan::default();
        let main = self.graph.main().name().to_string();
        self.plan_node(&main, &mut plan)?;
        Ok(plan)
    }

    fn plan_node(&self, name: &str, plan: &mut TagPlan) -> Result<()> {
        if plan.get(name).is_some() {
            return Ok(());
        }
        for child in self.graph.children_of(name).to_vec() {
            self.plan_node(&child, plan)?;
        }

        let snapshot = self.snapshot(name).ok_or_else(|| Error::State {
            message: format!("{} is not part of the dependency graph", name),
        })?;
        let original_target = snapshot.target()?.ok_or_else(|| Error::State {
            message: format!("{} is not installed, run update first", name),
        })?;

        let entry = match self.recycled_tag(name)? {
            Some(tag) => {
                info!("{}: reusing tag {}", name, tag);
                TagPlanEntry {
                    name: snapshot.name().to_string(),
                    tag,
                    original_target,
                    create: false,
                    branch: None,
                    increment_master_version: false,
                    snapshot,
                }
            }
            None => {
                let tag = self.fresh_tag(&snapshot)?;
                let increment_master_version = self.options.bump_mainline
                    && original_target.is_branch()
                    && snapshot.bare_url()?.is_some()
                    && snapshot.is_up_to_date()?;
                info!("{}: new tag {}", name, tag);
                TagPlanEntry {
                    name: snapshot.name().to_string(),
                    branch: Some(format!("{}{}", self.options.branch_prefix, tag)),
                    tag,
                    original_target,
                    create: true,
                    increment_master_version,
                    snapshot,
                }
            }
        };
        plan.push(entry);
        Ok(())
    }

    /// The accepted reusable tag of `name`, memoized.
    pub fn recycled_tag(&self, name: &str) -> Result<Option<String>> {
        let key = name.to_lowercase();
        if let Some(known) = self.recycled.borrow().get(&key) {
            return Ok(known.clone());
        }

        let snapshot = self.snapshot(name).ok_or_else(|| Error::State {
            message: format!("{} is not part of the dependency graph", name),
        })?;
        let accepted = match snapshot.target()? {
            Some(Target::Tag(tag)) if self.validate_recycled_tag_dependencies(&snapshot, &tag)? => {
                Some(tag)
            }
            Some(target) => {
                if let Target::Tag(tag) = &target {
                    debug!("{}: tag {} no longer matches its dependencies", name, tag);
                }
                self.stamped_tag(&snapshot, target.name())?
            }
            None => None,
        };

        self.recycled.borrow_mut().insert(key, accepted.clone());
        Ok(accepted)
    }

    /// The newest tag stamped with `target` and the HEAD commit, if its
    /// dependencies still hold.
    fn stamped_tag(&self, snapshot: &Snapshot, target: &str) -> Result<Option<String>> {
        let Some(head) = snapshot.head_commit()? else {
            return Ok(None);
        };

        snapshot.fetch()?;
        for tag in sort_tags_descending(&snapshot.tags()?) {
            let stamp = snapshot.manifest_at(&tag)?.and_then(|m| m.tag_stamp);
            let Some(stamp) = stamp else {
                continue;
            };
            if stamp.target != target || stamp.commit != head {
                continue;
            }
            if self.validate_recycled_tag_dependencies(snapshot, &tag)? {
                return Ok(Some(tag));
            }
            debug!("{}: tag {} no longer matches its dependencies", snapshot.name(), tag);
            return Ok(None);
        }
        Ok(None)
    }

    /// The tag's manifest declares the same dependency names, and each
    /// recorded reference points at the child's own reusable tag.
    fn validate_recycled_tag_dependencies(&self, snapshot: &Snapshot, tag: &str) -> Result<bool> {
        let current = snapshot.dependencies()?;
        let tagged = snapshot
            .manifest_at(tag)?
            .map(|m| snapshot.declared_dependencies(&m))
            .unwrap_or_default();
        if !tagged.same_names(&current) {
            return Ok(false);
        }

        for (child, reference) in tagged.iter() {
            let Some(child_tag) = self.recycled_tag(child)? else {
                return Ok(false);
            };
            let recorded = RepoRef::parse(reference)?.target;
            if recorded.as_deref() != Some(child_tag.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Patch increment of the live version, avoiding existing tags.
    fn fresh_tag(&self, snapshot: &Snapshot) -> Result<String> {
        snapshot.fetch()?;
        let tags = snapshot.tags()?;
        let live = match snapshot.manifest()?.and_then(|m| m.version) {
            Some(version) => Version::parse(version.trim_start_matches('v'))?,
            None => find_latest_version(&tags)
                .map(|(_, v)| v)
                .unwrap_or_else(|| Version::new(0, 0, 0)),
        };

        let candidate = increment(&live, Increment::Patch);
        if !tag_exists(&candidate, &tags) {
            return Ok(candidate.to_string());
        }

        info!("{}: tag {} already exists", snapshot.name(), candidate);
        if !self.ctx.interactive {
            return Ok(next_unused(&live, &tags, Increment::Patch).to_string());
        }
        self.ask_for_tag(snapshot.name(), &candidate, &live, &tags)
    }

    fn ask_for_tag(
        &self,
        name: &str,
        taken: &Version,
        live: &Version,
        tags: &[String],
    ) -> Result<String> {
        let next_patch = next_unused(live, tags, Increment::Patch);
        let next_major = next_unused(live, tags, Increment::Major);
        let items = vec![
            format!("{} (next unused {})", next_patch, Increment::Patch),
            format!("{} (next unused {})", next_major, Increment::Major),
            "enter a version".to_string(),
        ];
        let prompt = format!(
            "Tag {} of {} already exists, which tag should be created?",
            taken, name
        );
        match self.ctx.prompter.select(&prompt, &items, 0)? {
            0 => Ok(next_patch.to_string()),
            1 => Ok(next_major.to_string()),
            _ => {
                let validate = |answer: &str| -> std::result::Result<(), String> {
                    let version = Version::parse(answer.trim_start_matches('v'))
                        .map_err(|e| format!("not a version: {}", e))?;
                    if tag_exists(&version, tags) {
                        Err(Error::TagCollision {
                            name: name.to_string(),
                            tag: answer.to_string(),
                        }
                        .to_string())
                    } else {
                        Ok(())
                    }
                };
                let answer = self.ctx.prompter.input(
                    &format!("Tag for {}", name),
                    &next_patch.to_string(),
                    &validate,
                )?;
                Ok(answer.trim().to_string())
            }
        }
    }
}
