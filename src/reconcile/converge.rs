//! The fixpoint loop of `update`.

use std::rc::Rc;

use log::{debug, info, warn};

use super::{ReconciliationEngine, UpdateOptions, UpdateReport};
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, DependencyNode, GraphWalker};
use crate::manifest::DependencyMap;
use crate::reference::{RepoRef, Target};
use crate::resolver::{has_repo_changed, RepoChange};
use crate::snapshot::Snapshot;

enum PullOutcome {
    Pulled(bool),
    Unrelated,
}

impl<'a> ReconciliationEngine<'a> {
    pub(super) fn converge(&self, options: UpdateOptions, report: &mut UpdateReport) -> Result<()> {
        loop {
            if report.passes >= self.ctx.max_passes {
                return Err(Error::ConvergenceLimit {
                    passes: report.passes,
                });
            }
            report.passes += 1;
            debug!("update: pass {}", report.passes);

            // Rebuilt every pass, a changed node may declare different dependencies
            let mut graph = self.graph()?;
            if !self.pass(&mut graph, options, report)? {
                return Ok(());
            }
        }
    }

    /// One pass over the graph. Returns whether anything changed.
    fn pass(
        &self,
        graph: &mut DependencyGraph,
        options: UpdateOptions,
        report: &mut UpdateReport,
    ) -> Result<bool> {
        let mut changed = self.clone_missing(graph, report)?;
        changed |= self.resolve_conflicts(graph, report)?;
        if options.remote_reset {
            changed |= self.reset_deleted_branches(graph, report)?;
        }
        if options.switch {
            changed |= self.correct_drift(graph, report)?;
        }
        changed |= self.pull_all(graph, report)?;
        Ok(changed)
    }

    /// The reference a node should be at, asking the resolver on conflicts.
    fn desired_reference(&self, graph: &DependencyGraph, node: &DependencyNode) -> Result<String> {
        if !node.has_conflict() {
            return Ok(node.refs[0].clone());
        }
        let default_branch = if node.snapshot.is_installed() {
            node.snapshot.default_branch()?
        } else {
            crate::snapshot::FALLBACK_DEFAULT_BRANCH.to_string()
        };
        self.resolver
            .resolve(node.name(), &node.refs, &graph.resolutions()?, &default_branch)
    }

    fn clone_missing(
        &self,
        graph: &mut DependencyGraph,
        report: &mut UpdateReport,
    ) -> Result<bool> {
        let walker = GraphWalker::new(self.ctx, &self.pool);
        let mut changed = false;

        // The graph grows while cloning, new nodes are visited in this pass
        let mut index = 0;
        loop {
            let next = graph.nodes().nth(index).cloned();
            let Some(node) = next else {
                break;
            };
            index += 1;
            if node.snapshot.is_installed() || self.is_skipped(node.name()) {
                continue;
            }
            let cloned = self.desired_reference(graph, &node).and_then(|reference| {
                let reference = RepoRef::parse(&reference)?;
                node.snapshot
                    .install(&reference, self.ctx.link_cache.as_ref())
            });
            match cloned {
                Ok(()) => {
                    changed = true;
                    report.cloned.push(node.name().to_string());
                    walker.walk(graph, &node.snapshot)?;
                }
                Err(e) => self.node_failed(node.name(), e, report)?,
            }
        }
        Ok(changed)
    }

    fn resolve_conflicts(
        &self,
        graph: &DependencyGraph,
        report: &mut UpdateReport,
    ) -> Result<bool> {
        let mut changed = false;
        let conflicted: Vec<DependencyNode> = graph
            .nodes()
            .filter(|n| n.has_conflict() && n.snapshot.is_installed())
            .filter(|n| !self.is_skipped(n.name()))
            .cloned()
            .collect();

        for node in conflicted {
            let result = self
                .desired_reference(graph, &node)
                .and_then(|reference| self.clone_or_switch(&node.snapshot, &reference, report));
            match result {
                Ok(switched) => changed |= switched,
                Err(e) => self.node_failed(node.name(), e, report)?,
            }
        }
        Ok(changed)
    }

    /// Move nodes whose upstream branch is gone to the declared branch when
    /// it exists remotely, else to the default branch.
    fn reset_deleted_branches(
        &self,
        graph: &DependencyGraph,
        report: &mut UpdateReport,
    ) -> Result<bool> {
        let mut changed = false;
        let installed: Vec<DependencyNode> = graph
            .nodes()
            .filter(|n| n.snapshot.is_installed() && !self.is_skipped(n.name()))
            .cloned()
            .collect();

        for node in installed {
            let result = self
                .desired_reference(graph, &node)
                .and_then(|reference| self.reset_deleted_branch(&node.snapshot, &reference));
            match result {
                Ok(true) => {
                    changed = true;
                    report.switched.push(node.name().to_string());
                }
                Ok(false) => {}
                Err(e) => self.node_failed(node.name(), e, report)?,
            }
        }
        Ok(changed)
    }

    fn reset_deleted_branch(&self, snapshot: &Rc<Snapshot>, reference: &str) -> Result<bool> {
        let Some(Target::Branch(branch)) = snapshot.target()? else {
            return Ok(false);
        };
        if snapshot.bare_url()?.is_none() || snapshot.remote_branch_exists(&branch)? {
            return Ok(false);
        }

        let declared = RepoRef::parse(reference)?.target;
        let default_branch = snapshot.default_branch()?;
        let replacement = match declared {
            Some(target) if target != branch && snapshot.remote_branch_exists(&target)? => target,
            _ => default_branch.clone(),
        };

        warn!(
            "{}: branch {} no longer exists on the remote, switching to {}",
            snapshot.name(),
            branch,
            replacement
        );
        let switched = snapshot.with_stash(|s| s.checkout(&replacement));
        match switched {
            Err(Error::RefResolution { .. }) if replacement != default_branch => {
                warn!(
                    "{}: {} cannot be checked out, switching to {}",
                    snapshot.name(),
                    replacement,
                    default_branch
                );
                snapshot.with_stash(|s| s.checkout(&default_branch))?;
            }
            other => other?,
        }
        Ok(true)
    }

    /// Re-check single-reference nodes against their declaration.
    fn correct_drift(&self, graph: &DependencyGraph, report: &mut UpdateReport) -> Result<bool> {
        let mut changed = false;
        let resolutions = graph.resolutions()?;
        let installed: Vec<DependencyNode> = graph
            .nodes()
            .filter(|n| !n.has_conflict() && n.snapshot.is_installed())
            .filter(|n| !self.is_skipped(n.name()))
            .cloned()
            .collect();

        for node in installed {
            match self.correct_node_drift(&node, &resolutions, report) {
                Ok(switched) => changed |= switched,
                Err(e) => self.node_failed(node.name(), e, report)?,
            }
        }
        Ok(changed)
    }

    fn correct_node_drift(
        &self,
        node: &DependencyNode,
        resolutions: &DependencyMap,
        report: &mut UpdateReport,
    ) -> Result<bool> {
        let declared = &node.refs[0];
        if has_repo_changed(&node.snapshot, &RepoRef::parse(declared)?)? == RepoChange::None {
            return Ok(false);
        }
        let on_disk = node.snapshot.url()?.unwrap_or_default();
        let choice = self
            .resolver
            .resolve_drift(node.name(), declared, &on_disk, resolutions)?;
        self.clone_or_switch(&node.snapshot, &choice, report)
    }

    /// Bring an installed node to `reference`. Returns whether it changed.
    fn clone_or_switch(
        &self,
        snapshot: &Rc<Snapshot>,
        reference: &str,
        report: &mut UpdateReport,
    ) -> Result<bool> {
        let desired = RepoRef::parse(reference)?;
        let links = self.ctx.link_cache.as_ref();

        if !snapshot.is_installed() {
            snapshot.install(&desired, links)?;
            report.cloned.push(snapshot.name().to_string());
            return Ok(true);
        }

        match has_repo_changed(snapshot, &desired)? {
            RepoChange::None => Ok(false),
            RepoChange::Url => {
                let aside = snapshot.move_aside()?;
                report
                    .moved_aside
                    .push((snapshot.name().to_string(), aside));
                snapshot.install(&desired, links)?;
                report.cloned.push(snapshot.name().to_string());
                Ok(true)
            }
            RepoChange::Target => {
                info!("{}: switching to {}", snapshot.name(), reference);
                snapshot.with_stash(|s| s.switch_to(&desired, links))?;
                report.switched.push(snapshot.name().to_string());
                Ok(true)
            }
        }
    }

    fn pull_all(&self, graph: &DependencyGraph, report: &mut UpdateReport) -> Result<bool> {
        let mut changed = false;
        let installed: Vec<Rc<Snapshot>> = graph
            .nodes()
            .filter(|n| n.snapshot.is_installed() && !self.is_skipped(n.name()))
            .map(|n| Rc::clone(&n.snapshot))
            .collect();

        for snapshot in installed {
            match self.pull_if_behind(&snapshot, report) {
                Ok(node_changed) => changed |= node_changed,
                Err(e) => self.node_failed(snapshot.name(), e, report)?,
            }
        }
        Ok(changed)
    }

    /// Pull a branch checkout that is behind its upstream. Returns whether
    /// the node changed or now declares different dependencies.
    fn pull_if_behind(&self, snapshot: &Snapshot, report: &mut UpdateReport) -> Result<bool> {
        let on_branch = matches!(snapshot.target()?, Some(Target::Branch(_)));
        if !on_branch || snapshot.bare_url()?.is_none() || snapshot.is_up_to_date()? {
            return Ok(false);
        }

        let before_id = snapshot.change_id();
        let before_deps = snapshot.dependencies()?;
        if self.pull_node(snapshot)? {
            report.pulled.push(snapshot.name().to_string());
        }
        Ok(snapshot.change_id() != before_id || snapshot.dependencies()? != before_deps)
    }

    /// stash, pull, pop; recovers from rewritten upstream history when the
    /// working copy was clean. Returns whether HEAD advanced.
    pub(super) fn pull_node(&self, snapshot: &Snapshot) -> Result<bool> {
        let was_clean = snapshot.is_working_copy_clean()?;
        let outcome = snapshot.with_stash(|s| match s.pull() {
            Ok(advanced) => Ok(PullOutcome::Pulled(advanced)),
            Err(Error::UnrelatedHistory { .. }) if was_clean => {
                s.fix_unrelated_history().map(|_| PullOutcome::Pulled(true))
            }
            Err(Error::UnrelatedHistory { .. }) => Ok(PullOutcome::Unrelated),
            Err(e) => Err(e),
        })?;

        match outcome {
            PullOutcome::Pulled(advanced) => Ok(advanced),
            PullOutcome::Unrelated => {
                warn!(
                    "{}: upstream history was rewritten and local changes exist, not resetting",
                    snapshot.name()
                );
                Err(Error::UnrelatedHistory {
                    name: snapshot.name().to_string(),
                })
            }
        }
    }
}
