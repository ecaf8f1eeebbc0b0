//! The `update` operation: drive the working tree to the declared graph.
//!
//! ## Overview
//!
//! A run moves through these states:
//! 1. Validating - Refuse to touch anything while a repository has unmerged
//!    files (or, on request, uncommitted changes). Every offender is reported.
//! 2. UpdatingMain - Pull the main project when it sits on a branch. A failure
//!    here is reported but dependencies are still processed.
//! 3. Converging - Repeat passes over a freshly built graph until a pass
//!    changes nothing: clone missing nodes, resolve conflicts, repair deleted
//!    upstream branches, correct drift on request, pull.
//! 4. Done
//!
//! A validation failure moves the run to Aborted before any mutation.
//!
//! Failures of a single repository during a pass follow the configured
//! [`NodeFailurePolicy`](crate::config::NodeFailurePolicy).

mod converge;
mod validate;

pub use validate::validate;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::config::{Context, NodeFailurePolicy};
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, GraphWalker};
use crate::resolver::ConflictResolver;
use crate::snapshot::{Snapshot, SnapshotPool};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Validating,
    UpdatingMain,
    Converging,
    Done,
    Aborted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Validating => "validating",
            EngineState::UpdatingMain => "updating main project",
            EngineState::Converging => "converging",
            EngineState::Done => "done",
            EngineState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Switches for one `update` run
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Also refuse to run while any repository has uncommitted changes.
    pub check_local: bool,
    /// Move nodes whose upstream branch was deleted to a branch that exists.
    pub remote_reset: bool,
    /// Re-check every node against its declared reference and correct drift.
    pub switch: bool,
}

/// A repository that failed during a pass and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub name: String,
    pub message: String,
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub passes: usize,
    pub cloned: Vec<String>,
    pub switched: Vec<String>,
    pub pulled: Vec<String>,
    pub moved_aside: Vec<(String, PathBuf)>,
    pub failures: Vec<NodeFailure>,
    /// Pull failure of the main project, if any.
    pub main_pull_error: Option<String>,
}

impl UpdateReport {
    /// Number of clones, switches and advancing pulls.
    pub fn mutations(&self) -> usize {
        self.cloned.len() + self.switched.len() + self.pulled.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || self.main_pull_error.is_some()
    }
}

/// Runs `update` over the dependency tree of one project
pub struct ReconciliationEngine<'a> {
    ctx: &'a Context,
    pool: SnapshotPool,
    main: Rc<Snapshot>,
    resolver: ConflictResolver<'a>,
    state: Cell<EngineState>,
    // Lowercased names of nodes that failed under SkipNode, left alone until the run ends
    skipped: RefCell<HashSet<String>>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            pool: SnapshotPool::new(),
            main: Rc::new(Snapshot::main(ctx)),
            resolver: ConflictResolver::new(ctx),
            state: Cell::new(EngineState::Validating),
            skipped: RefCell::new(HashSet::new()),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    fn enter(&self, state: EngineState) {
        debug!("update: {}", state);
        self.state.set(state);
    }

    pub fn main(&self) -> &Rc<Snapshot> {
        &self.main
    }

    /// Build the current dependency graph, reusing pooled snapshots.
    pub fn graph(&self) -> Result<DependencyGraph> {
        GraphWalker::new(self.ctx, &self.pool).build(Rc::clone(&self.main))
    }

    /// Run `update` to completion.
    pub fn run(&self, options: UpdateOptions) -> Result<UpdateReport> {
        let mut report = UpdateReport::default();
        self.skipped.borrow_mut().clear();

        self.enter(EngineState::Validating);
        let checked = self
            .graph()
            .and_then(|graph| validate(&graph, options.check_local));
        if let Err(e) = checked {
            self.enter(EngineState::Aborted);
            return Err(e);
        }

        self.enter(EngineState::UpdatingMain);
        self.update_main(&mut report);

        self.enter(EngineState::Converging);
        if let Err(e) = self.converge(options, &mut report) {
            self.enter(EngineState::Aborted);
            return Err(e);
        }

        self.enter(EngineState::Done);
        info!(
            "update finished after {} passes: {} cloned, {} switched, {} pulled",
            report.passes,
            report.cloned.len(),
            report.switched.len(),
            report.pulled.len()
        );
        Ok(report)
    }

    fn update_main(&self, report: &mut UpdateReport) {
        match self.pull_main() {
            Ok(true) => report.pulled.push(self.main.name().to_string()),
            Ok(false) => {}
            Err(e) => {
                warn!("{}: pull failed: {}", self.main.name(), e);
                report.main_pull_error = Some(e.to_string());
            }
        }
    }

    fn pull_main(&self) -> Result<bool> {
        if !self.main.is_installed() || self.main.bare_url()?.is_none() {
            return Ok(false);
        }
        if !matches!(self.main.target()?, Some(target) if target.is_branch()) {
            return Ok(false);
        }
        if self.main.is_up_to_date()? {
            return Ok(false);
        }
        self.pull_node(&self.main)
    }

    /// Apply the failure policy to an error raised while processing `name`.
    fn node_failed(&self, name: &str, error: Error, report: &mut UpdateReport) -> Result<()> {
        if self.ctx.node_failure_policy == NodeFailurePolicy::AbortRun || !error.is_node_scoped() {
            return Err(error);
        }
        warn!("{}: skipped for the rest of this run: {}", name, error);
        self.skipped.borrow_mut().insert(name.to_lowercase());
        report.failures.push(NodeFailure {
            name: name.to_string(),
            message: error.to_string(),
        });
        Ok(())
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.skipped.borrow().contains(&name.to_lowercase())
    }
}
