//! Releasing a dependency tree.
//!
//! ## Overview
//!
//! A release runs in two stages:
//! 1. Planning ([`TagPlanner`]) - For every repository decide whether an
//!    existing tag already captures its current state and can be reused, or
//!    a new tag must be cut. Nothing is modified.
//! 2. Execution ([`ReleaseExecutor`]) - Bump mainline versions, cut release
//!    branches and tags locally for the whole tree, then push.

mod executor;
mod planner;

pub use executor::{ReleaseExecutor, ReleaseReport};
pub use planner::TagPlanner;

use std::fmt;
use std::rc::Rc;

use crate::defaults::DEFAULT_RELEASE_BRANCH_PREFIX;
use crate::reference::Target;
use crate::snapshot::Snapshot;

/// Release behavior switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Raise the mainline version of up-to-date branches to the new tag.
    pub bump_mainline: bool,
    /// Release branches are named `<prefix><tag>`.
    pub branch_prefix: String,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            bump_mainline: true,
            branch_prefix: DEFAULT_RELEASE_BRANCH_PREFIX.to_string(),
        }
    }
}

/// The decision for one repository
#[derive(Debug, Clone)]
pub struct TagPlanEntry {
    pub name: String,
    pub tag: String,
    /// What the repository had checked out when the plan was made.
    pub original_target: Target,
    /// A new tag must be cut; otherwise `tag` is reused as is.
    pub create: bool,
    /// Release branch to cut, for new tags.
    pub branch: Option<String>,
    /// Bump and push the mainline version before cutting the release.
    pub increment_master_version: bool,
    pub snapshot: Rc<Snapshot>,
}

/// Decisions for every repository of a tree, children before parents
#[derive(Debug, Clone, Default)]
pub struct TagPlan {
    entries: Vec<TagPlanEntry>,
}

impl TagPlan {
    pub fn push(&mut self, entry: TagPlanEntry) {
        self.entries.push(entry);
    }

    /// The entry for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&TagPlanEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn entries(&self) -> &[TagPlanEntry] {
        &self.entries
    }

    /// Entries that cut a new tag.
    pub fn created(&self) -> impl Iterator<Item = &TagPlanEntry> {
        self.entries.iter().filter(|e| e.create)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for TagPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let action = if entry.create { "create" } else { "reuse" };
            write!(
                f,
                "{} {} {} (from {} {})",
                entry.name,
                action,
                entry.tag,
                entry.original_target.kind(),
                entry.original_target
            )?;
            if entry.increment_master_version {
                write!(f, ", bump mainline")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
