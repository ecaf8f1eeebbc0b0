//! # Tree Command Implementation
//!
//! Displays the dependency tree of the project as declared by the manifests.
//! Each dependency is shown with every reference its parents declare; more
//! than one means the references conflict. `--depth` limits the output.
//!
//! This command is read-only and does not call git beyond inspecting
//! installed working copies.

use std::borrow::Cow;
use std::io::Write;

use anyhow::{Context as _, Result};
use clap::Args;
use ptree::{print_tree, Style, TreeItem};

use repotree::graph::DependencyGraph;
use repotree::output::emoji;
use repotree::reconcile::ReconciliationEngine;

use super::Session;

/// Display the dependency tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Maximum depth to display.
    ///
    /// 0 shows only the project itself, 1 its direct dependencies, and so on.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, session: &Session) -> Result<()> {
    let ctx = session.context(false)?;
    let engine = ReconciliationEngine::new(&ctx);
    let graph = engine.graph().context("Failed to read the dependency tree")?;

    println!(
        "{} Dependency tree of {}",
        emoji(&session.output, "🌳", "[TREE]"),
        ctx.root.display()
    );
    let root = build_tree_node(&graph, graph.main().name(), args.depth.unwrap_or(usize::MAX), 0);
    print_tree(&root).context("Failed to display tree")?;
    Ok(())
}

fn label(graph: &DependencyGraph, name: &str) -> String {
    let Some(node) = graph.get(name) else {
        return name.to_string();
    };
    let mut label = format!("{} @ {}", node.name(), node.refs.join(" | "));
    if node.has_conflict() {
        label.push_str(" (conflict)");
    }
    if !node.snapshot.is_installed() {
        label.push_str(" (missing)");
    }
    label
}

fn build_tree_node(
    graph: &DependencyGraph,
    name: &str,
    max_depth: usize,
    current_depth: usize,
) -> TreeNode {
    let children = if current_depth >= max_depth {
        Vec::new()
    } else {
        graph
            .children_of(name)
            .iter()
            .map(|child| build_tree_node(graph, child, max_depth, current_depth + 1))
            .collect()
    };
    TreeNode {
        label: label(graph, name),
        children,
    }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: Write>(&self, f: &mut W, _style: &Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}
