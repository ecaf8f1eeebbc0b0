//! # Conflict Resolution
//!
//! When several references are declared for one dependency, or the working
//! copy on disk no longer matches its single declared reference, the
//! [`ConflictResolver`] decides which reference wins:
//!
//! 1. An explicit `resolutions[name]` in the main manifest, unconditionally.
//! 2. Otherwise the preferred candidate: the highest semantic version when
//!    every target is one, else the reference pointing at the default branch.
//! 3. Without prompts, or with force-latest, the preferred candidate (or the
//!    first one).
//! 4. Otherwise the operator picks, with the preferred candidate pre-selected.
//!
//! Decisions are remembered per name and candidate set, so the operator is
//! asked once per distinct conflict in a run.

use std::cell::RefCell;
use std::collections::HashMap;

use log::{debug, info};

use crate::config::Context;
use crate::error::Result;
use crate::manifest::DependencyMap;
use crate::reference::{normalize_url, RepoRef, Target};
use crate::snapshot::Snapshot;
use crate::version::tag_version;

/// How an installed working copy differs from a desired reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoChange {
    /// A different repository; the old directory must be moved aside.
    Url,
    /// Same repository, other branch, tag or commit.
    Target,
    None,
}

/// Classify how `snapshot` differs from `desired`.
///
/// A missing target in `desired` means the repository's default branch.
pub fn has_repo_changed(snapshot: &Snapshot, desired: &RepoRef) -> Result<RepoChange> {
    let Some(bare_url) = snapshot.bare_url()? else {
        return Ok(RepoChange::Url);
    };
    if normalize_url(&bare_url) != desired.normalized_url() {
        return Ok(RepoChange::Url);
    }

    let desired_target = match &desired.target {
        Some(target) => target.clone(),
        None => snapshot.default_branch()?,
    };
    match snapshot.target()? {
        Some(current) if current.matches(&desired_target) => Ok(RepoChange::None),
        // A tagged HEAD probes as its tag; compare commits for pinned targets
        Some(Target::Tag(_) | Target::Commit(_)) => {
            let head = snapshot.head_commit()?;
            if head.is_some() && head == snapshot.pinned_commit(&desired_target)? {
                Ok(RepoChange::None)
            } else {
                Ok(RepoChange::Target)
            }
        }
        _ => Ok(RepoChange::Target),
    }
}

/// Index of the preferred reference among `refs`.
///
/// The highest semantic version when every target parses as one, otherwise
/// the first reference whose target is `default_branch` (or omitted).
pub fn preferred_reference(refs: &[String], default_branch: &str) -> Option<usize> {
    let targets: Vec<Option<String>> = refs
        .iter()
        .map(|r| RepoRef::parse(r).ok().and_then(|r| r.target))
        .collect();

    let versions: Vec<_> = targets
        .iter()
        .map(|t| t.as_deref().and_then(tag_version))
        .collect();
    if !versions.is_empty() && versions.iter().all(Option::is_some) {
        return versions
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
            // max_by keeps the last maximum, reverse to keep the first
            .rev()
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(i, _)| i);
    }

    targets
        .iter()
        .position(|t| t.as_deref().map_or(true, |t| t == default_branch))
}

/// Picks one reference per conflicting dependency
pub struct ConflictResolver<'a> {
    ctx: &'a Context,
    memo: RefCell<HashMap<(String, Vec<String>), String>>,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            memo: RefCell::new(HashMap::new()),
        }
    }

    fn remembered(&self, name: &str, refs: &[String]) -> Option<String> {
        self.memo
            .borrow()
            .get(&(name.to_lowercase(), refs.to_vec()))
            .cloned()
    }

    fn remember(&self, name: &str, refs: &[String], choice: &str) {
        self.memo
            .borrow_mut()
            .insert((name.to_lowercase(), refs.to_vec()), choice.to_string());
    }

    /// Choose among the distinct references declared for `name`.
    pub fn resolve(
        &self,
        name: &str,
        refs: &[String],
        resolutions: &DependencyMap,
        default_branch: &str,
    ) -> Result<String> {
        if let Some(choice) = self.remembered(name, refs) {
            debug!("{}: reusing earlier decision {}", name, choice);
            return Ok(choice);
        }

        let choice = self.decide(name, refs, resolutions, default_branch)?;
        self.remember(name, refs, &choice);
        Ok(choice)
    }

    fn decide(
        &self,
        name: &str,
        refs: &[String],
        resolutions: &DependencyMap,
        default_branch: &str,
    ) -> Result<String> {
        if let Some(resolution) = resolutions.get_ignore_case(name) {
            info!("{}: using resolution {}", name, resolution);
            return Ok(resolution.to_string());
        }

        let preferred = preferred_reference(refs, default_branch);
        if !self.ctx.interactive || self.ctx.force_latest {
            let index = preferred.unwrap_or(0);
            info!(
                "{}: {} references declared, using {}",
                name,
                refs.len(),
                refs[index]
            );
            return Ok(refs[index].clone());
        }

        let prompt = format!("Conflicting references for {}, which one should be used?", name);
        let index = self
            .ctx
            .prompter
            .select(&prompt, refs, preferred.unwrap_or(0))?;
        Ok(refs[index].clone())
    }

    /// Decide between the declared reference and the working copy on disk.
    ///
    /// Without prompts the declared reference wins.
    pub fn resolve_drift(
        &self,
        name: &str,
        declared: &str,
        on_disk: &str,
        resolutions: &DependencyMap,
    ) -> Result<String> {
        if let Some(resolution) = resolutions.get_ignore_case(name) {
            return Ok(resolution.to_string());
        }
        let candidates = vec![declared.to_string(), on_disk.to_string()];
        if let Some(choice) = self.remembered(name, &candidates) {
            return Ok(choice);
        }

        let choice = if !self.ctx.interactive || self.ctx.force_latest {
            declared.to_string()
        } else {
            let prompt = format!("{} is at {}, switch to the declared reference?", name, on_disk);
            let index = self.ctx.prompter.select(&prompt, &candidates, 0)?;
            candidates[index].clone()
        };
        self.remember(name, &candidates, &choice);
        Ok(choice)
    }
}
