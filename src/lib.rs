//! # repotree
//!
//! Keeps a tree of git repositories checked out at the references their
//! manifests declare, and releases the whole tree with consistent tags.
//!
//! ## Quick Example
//!
//! ```
//! use repotree::reference::{RepoRef, Target};
//! use repotree::version::{sort_tags_descending, tag_version};
//!
//! let reference = RepoRef::parse("git+https://example.com/org/lib.git#v1.2.0").unwrap();
//! assert_eq!(reference.target.as_deref(), Some("v1.2.0"));
//!
//! let tags = vec!["1.0.0".to_string(), "v1.10.0".to_string(), "1.9.0".to_string()];
//! assert_eq!(sort_tags_descending(&tags)[0], "v1.10.0");
//! assert_eq!(tag_version("refs/tags/v2.0.0").unwrap().major, 2);
//!
//! let branch = Target::Branch("master".to_string());
//! assert!(branch.is_branch());
//! ```
//!
//! ## Core Concepts
//!
//! - **Snapshots (`snapshot`, `cache`)**: lazily computed, cached facts about
//!   one working copy. Every mutation evicts exactly the facts it can change.
//! - **Graphs (`graph`)**: the dependency tree of the main project, keyed by
//!   case-insensitive name, with every declared reference kept per node.
//! - **Conflicts (`resolver`)**: picking one reference when several parents
//!   disagree, or when a working copy drifted from its declaration.
//! - **Reconciliation (`reconcile`)**: the `update` operation.
//! - **Releases (`release`)**: planning and cutting tags for the whole tree.
//!
//! Git is always reached through [`git::GitRunner`] and operator questions
//! through [`prompt::Prompter`], both carried by [`config::Context`].

pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod graph;
pub mod link;
pub mod manifest;
pub mod output;
pub mod path;
pub mod prompt;
pub mod reconcile;
pub mod reference;
pub mod release;
pub mod resolver;
pub mod snapshot;
pub mod version;

#[cfg(test)]
mod path_proptest;
