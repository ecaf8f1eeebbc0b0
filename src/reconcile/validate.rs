//! Pre-flight check before any mutation.

use log::error;

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::snapshot::Snapshot;

fn blocking_reason(snapshot: &Snapshot, check_local: bool) -> Result<Option<&'static str>> {
    if !snapshot.is_installed() {
        return Ok(None);
    }
    if snapshot.is_conflicted()? {
        return Ok(Some("unmerged files"));
    }
    if check_local && !snapshot.is_working_copy_clean()? {
        return Ok(Some("uncommitted changes"));
    }
    Ok(None)
}

/// Fail with [`Error::Conflict`] listing every repository that blocks an
/// update: unmerged files always, uncommitted changes with `check_local`.
pub fn validate(graph: &DependencyGraph, check_local: bool) -> Result<()> {
    let snapshots = std::iter::once(graph.main()).chain(graph.nodes().map(|n| &n.snapshot));

    let mut blocked = Vec::new();
    for snapshot in snapshots {
        if let Some(reason) = blocking_reason(snapshot, check_local)? {
            error!("{}: {}", snapshot.name(), reason);
            blocked.push(format!("{} ({})", snapshot.name(), reason));
        }
    }

    if blocked.is_empty() {
        Ok(())
    } else {
        Err(Error::Conflict { nodes: blocked })
    }
}
