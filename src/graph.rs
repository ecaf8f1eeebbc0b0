//! # Dependency Graph
//!
//! [`GraphWalker`] reads manifests starting at the main project and builds a
//! [`DependencyGraph`]: one [`DependencyNode`] per dependency name, holding
//! every distinct reference string declared for it.
//!
//! - Names are unified case-insensitively; the first-seen spelling is kept.
//! - A node's own dependencies are walked only when the name is first
//!   discovered. Later declarations only add candidate references.
//! - A name that reappears on the active recursion path is a cycle and fails
//!   the walk with [`Error::CycleDetected`].
//!
//! Graphs are rebuilt, never patched, once a node's dependency set changes.
//! Snapshots come from a [`SnapshotPool`] so rebuilds keep their caches.

use std::rc::Rc;

use log::debug;

use crate::config::Context;
use crate::error::{Error, Result};
use crate::manifest::DependencyMap;
use crate::snapshot::{Snapshot, SnapshotPool};

/// One dependency in the graph
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub snapshot: Rc<Snapshot>,
    /// Distinct reference strings declared for this name, in discovery order.
    pub refs: Vec<String>,
    /// Canonical names of this node's own declared dependencies.
    pub children: Vec<String>,
}

impl DependencyNode {
    pub fn name(&self) -> &str {
        self.snapshot.name()
    }

    /// More than one distinct reference was declared.
    pub fn has_conflict(&self) -> bool {
        self.refs.len() > 1
    }
}

/// The main project and its transitive dependencies
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    main: Rc<Snapshot>,
    main_children: Vec<String>,
    nodes: Vec<DependencyNode>,
}

impl DependencyGraph {
    pub fn new(main: Rc<Snapshot>) -> Self {
        Self {
            main,
            main_children: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn main(&self) -> &Rc<Snapshot> {
        &self.main
    }

    /// Canonical names the main project declares.
    pub fn main_children(&self) -> &[String] {
        &self.main_children
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.name().eq_ignore_ascii_case(name))
    }

    /// The node for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&DependencyNode> {
        self.position(name).map(|i| &self.nodes[i])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut DependencyNode> {
        self.position(name).map(move |i| &mut self.nodes[i])
    }

    /// The spelling the graph uses for `name`.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.get(name).map(DependencyNode::name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name().to_string()).collect()
    }

    /// Names with more than one distinct declared reference.
    pub fn conflicts(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.has_conflict())
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Declared children of `name`; the main project's children for its own name.
    pub fn children_of(&self, name: &str) -> &[String] {
        if name.eq_ignore_ascii_case(self.main.name()) {
            return &self.main_children;
        }
        self.get(name).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// `resolutions` of the main manifest.
    pub fn resolutions(&self) -> Result<DependencyMap> {
        Ok(self
            .main
            .manifest()?
            .map(|m| m.resolutions)
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds dependency graphs from manifests
pub struct GraphWalker<'a> {
    ctx: &'a Context,
    pool: &'a SnapshotPool,
}

impl<'a> GraphWalker<'a> {
    pub fn new(ctx: &'a Context, pool: &'a SnapshotPool) -> Self {
        Self { ctx, pool }
    }

    /// Build a fresh graph rooted at `main`.
    pub fn build(&self, main: Rc<Snapshot>) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new(Rc::clone(&main));
        self.walk(&mut graph, &main)?;
        debug!("dependency graph has {} nodes", graph.len());
        Ok(graph)
    }

    /// Extend `graph` with the dependencies `from` declares.
    ///
    /// Used for the main project and for a node whose manifest just became
    /// available after a clone.
    pub fn walk(&self, graph: &mut DependencyGraph, from: &Rc<Snapshot>) -> Result<()> {
        let mut path = vec![from.name().to_string()];
        self.walk_from(graph, from, &mut path)
    }

    fn walk_from(
        &self,
        graph: &mut DependencyGraph,
        from: &Rc<Snapshot>,
        path: &mut Vec<String>,
    ) -> Result<()> {
        let main_names = self.main_names(graph)?;
        let deps = from.dependencies()?;
        let mut children = Vec::new();

        for (name, reference) in deps.iter() {
            let on_path = path.iter().any(|p| p.eq_ignore_ascii_case(name))
                || main_names.iter().any(|m| m.eq_ignore_ascii_case(name));
            if on_path {
                let mut cycle = path.clone();
                cycle.push(name.to_string());
                return Err(Error::CycleDetected {
                    cycle: cycle.join(" -> "),
                });
            }

            if let Some(node) = graph.get_mut(name) {
                if !node.refs.iter().any(|r| r == reference) {
                    node.refs.push(reference.to_string());
                }
                children.push(node.name().to_string());
                continue;
            }

            let snapshot = self.pool.snapshot(self.ctx, name);
            children.push(snapshot.name().to_string());
            graph.nodes.push(DependencyNode {
                snapshot: Rc::clone(&snapshot),
                refs: vec![reference.to_string()],
                children: Vec::new(),
            });

            path.push(snapshot.name().to_string());
            self.walk_from(graph, &snapshot, path)?;
            path.pop();
        }

        if Rc::ptr_eq(from, &graph.main) {
            graph.main_children = children;
        } else if let Some(node) = graph.get_mut(from.name()) {
            node.children = children;
        }
        Ok(())
    }

    /// Names the main project is known by: directory and manifest name.
    fn main_names(&self, graph: &DependencyGraph) -> Result<Vec<String>> {
        let mut names = vec![graph.main.name().to_string()];
        if let Some(name) = graph.main.manifest()?.and_then(|m| m.name) {
            names.push(name);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    // A fake working copy: an empty .git directory is enough for walking,
    // dependencies come from the manifest file alone
    fn fake_repo(dir: &Path, deps: &[(&str, &str)]) {
        fs::create_dir_all(dir.join(".git")).unwrap();
        let deps: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|(n, r)| (n.to_string(), serde_json::Value::String(r.to_string())))
            .collect();
        let name = dir.file_name().unwrap().to_string_lossy();
        let manifest = serde_json::json!({ "name": name, "dependencies": deps });
        fs::write(dir.join("repotree.json"), manifest.to_string()).unwrap();
    }

    struct Fixture {
        _temp: TempDir,
        ctx: Context,
        pool: SnapshotPool,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        fs::create_dir_all(&root).unwrap();
        let ctx = Context::new(&root, &Config::default()).unwrap();
        Fixture {
            _temp: temp,
            ctx,
            pool: SnapshotPool::new(),
        }
    }

    #[test]
    fn test_two_level_walk() {
        let f = fixture();
        fake_repo(&f.ctx.root, &[("dep1", "file:///a#master")]);
        fake_repo(&f.ctx.module_path("dep1"), &[("dep2", "file:///b#master")]);

        let walker = GraphWalker::new(&f.ctx, &f.pool);
        let graph = walker.build(Rc::new(Snapshot::main(&f.ctx))).unwrap();

        assert_eq!(graph.names(), vec!["dep1", "dep2"]);
        assert_eq!(graph.main_children(), &["dep1".to_string()]);
        assert_eq!(graph.children_of("dep1"), &["dep2".to_string()]);
        assert!(graph.conflicts().is_empty());
        // dep2 is not cloned, it is a leaf for now
        assert!(graph.children_of("dep2").is_empty());
    }

    #[test]
    fn test_names_unify_case_insensitively() {
        let f = fixture();
        fake_repo(
            &f.ctx.root,
            &[("Shared", "file:///s#1.0.0"), ("other", "file:///o#master")],
        );
        fake_repo(&f.ctx.module_path("other"), &[("shared", "file:///s#1.2.0")]);

        let walker = GraphWalker::new(&f.ctx, &f.pool);
        let graph = walker.build(Rc::new(Snapshot::main(&f.ctx))).unwrap();

        assert_eq!(graph.len(), 2);
        let node = graph.get("SHARED").unwrap();
        assert_eq!(node.name(), "Shared");
        assert_eq!(node.refs, vec!["file:///s#1.0.0", "file:///s#1.2.0"]);
        assert_eq!(graph.conflicts(), vec!["Shared"]);
        assert_eq!(graph.canonical_name("shared"), Some("Shared"));
    }

    #[test]
    fn test_identical_refs_are_not_duplicated() {
        let f = fixture();
        fake_repo(
            &f.ctx.root,
            &[("a", "file:///a#master"), ("b", "file:///b#master")],
        );
        fake_repo(&f.ctx.module_path("a"), &[("c", "file:///c#master")]);
        fake_repo(&f.ctx.module_path("b"), &[("c", "file:///c#master")]);

        let walker = GraphWalker::new(&f.ctx, &f.pool);
        let graph = walker.build(Rc::new(Snapshot::main(&f.ctx))).unwrap();
        assert_eq!(graph.get("c").unwrap().refs.len(), 1);
        assert!(graph.conflicts().is_empty());
    }

    #[test]
    fn test_second_discovery_does_not_recurse() {
        let f = fixture();
        fake_repo(
            &f.ctx.root,
            &[("a", "file:///a#master"), ("b", "file:///b#master")],
        );
        fake_repo(&f.ctx.module_path("a"), &[]);
        // b reaches a again with a different ref
        fake_repo(&f.ctx.module_path("b"), &[("a", "file:///a#dev")]);

        let walker = GraphWalker::new(&f.ctx, &f.pool);
        let graph = walker.build(Rc::new(Snapshot::main(&f.ctx))).unwrap();
        assert_eq!(graph.names(), vec!["a", "b"]);
        assert_eq!(graph.get("a").unwrap().refs.len(), 2);
        assert_eq!(graph.children_of("b"), &["a".to_string()]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let f = fixture();
        fake_repo(&f.ctx.root, &[("a", "file:///a#master")]);
        fake_repo(&f.ctx.module_path("a"), &[("b", "file:///b#master")]);
        fake_repo(&f.ctx.module_path("b"), &[("A", "file:///a#master")]);

        let walker = GraphWalker::new(&f.ctx, &f.pool);
        let err = walker
            .build(Rc::new(Snapshot::main(&f.ctx)))
            .unwrap_err();
        match err {
            Error::CycleDetected { cycle } => assert_eq!(cycle, "app -> a -> b -> A"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_dependency_on_main_is_a_cycle() {
        let f = fixture();
        fake_repo(&f.ctx.root, &[("a", "file:///a#master")]);
        fake_repo(&f.ctx.module_path("a"), &[("app", "file:///app#master")]);

        let walker = GraphWalker::new(&f.ctx, &f.pool);
        assert!(matches!(
            walker.build(Rc::new(Snapshot::main(&f.ctx))),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_rebuild_reuses_snapshots() {
        let f = fixture();
        fake_repo(&f.ctx.root, &[("a", "file:///a#master")]);
        let walker = GraphWalker::new(&f.ctx, &f.pool);
        let main = Rc::new(Snapshot::main(&f.ctx));
        let first = walker.build(Rc::clone(&main)).unwrap();
        let second = walker.build(main).unwrap();
        assert!(Rc::ptr_eq(
            &first.get("a").unwrap().snapshot,
            &second.get("a").unwrap().snapshot
        ));
    }
}
