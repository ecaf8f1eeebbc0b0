//! # Status Command Implementation
//!
//! Prints one line per repository of the tree: name, checked-out target,
//! working copy state and whether a branch is behind its upstream.
//!
//! Read-only apart from fetching.

use anyhow::{Context as _, Result};
use clap::Args;

use repotree::output::{self, emoji, OutputConfig};
use repotree::reconcile::ReconciliationEngine;
use repotree::snapshot::Snapshot;

use super::Session;

/// Show the state of every repository
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Skip fetching, report sync state as of the last fetch
    #[arg(long)]
    pub offline: bool,
}

/// Execute the `status` command.
pub fn execute(args: StatusArgs, session: &Session) -> Result<()> {
    let ctx = session.context(false)?;
    let engine = ReconciliationEngine::new(&ctx);
    let graph = engine.graph().context("Failed to read the dependency tree")?;

    println!(
        "{} {} repositories",
        emoji(&session.output, "📋", "[STATUS]"),
        graph.len() + 1
    );
    let snapshots = std::iter::once(graph.main()).chain(graph.nodes().map(|n| &n.snapshot));
    for snapshot in snapshots {
        let line = status_line(&session.output, snapshot, !args.offline)
            .with_context(|| format!("Failed to inspect {}", snapshot.name()))?;
        println!("{}", line);
    }

    let conflicts = graph.conflicts();
    if !conflicts.is_empty() {
        println!(
            "{} conflicting references for: {}",
            emoji(&session.output, "⚠️", "[WARN]"),
            conflicts.join(", ")
        );
    }
    Ok(())
}

fn status_line(out: &OutputConfig, snapshot: &Snapshot, fetch: bool) -> Result<String> {
    let name = output::name(out, snapshot.name());
    let Some(target) = snapshot.target()? else {
        return Ok(format!("{:<24} {}", name, output::flag(out, false, "", "missing")));
    };

    let clean = snapshot.is_working_copy_clean()?;
    let mut line = format!(
        "{:<24} {:<8} {:<24} {}",
        name,
        target.kind(),
        target.name(),
        output::flag(out, clean, "clean", "dirty")
    );
    if target.is_branch() && snapshot.bare_url()?.is_some() {
        let synced = if fetch {
            snapshot.is_up_to_date()?
        } else {
            snapshot.unpushed()? == 0
        };
        let cell = if fetch {
            output::flag(out, synced, "up to date", "behind")
        } else {
            output::flag(out, synced, "pushed", "ahead")
        };
        line.push(' ');
        line.push_str(&cell);
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repotree::git::SystemGit;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[test]
    fn test_missing_repository_line() {
        let temp = TempDir::new().unwrap();
        let snapshot = Snapshot::new(
            "lib",
            temp.path().join("lib"),
            Rc::new(SystemGit::new()),
            "repotree.json",
        );
        let line = status_line(&OutputConfig::plain(), &snapshot, false).unwrap();
        assert!(line.starts_with("lib"));
        assert!(line.ends_with("missing"));
    }
}
