//! In-process memo of working-copy facts
//!
//! Each [`Snapshot`](crate::snapshot::Snapshot) owns a [`FactCache`]. A fact is
//! computed once from `git` output and served from the cache until a mutation
//! evicts it. Which facts a mutation evicts is fixed by [`Mutation::evicts`],
//! the single table every mutator goes through.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Result;
use crate::manifest::{DependencyMap, Manifest};
use crate::reference::Target;

/// Accessor identity used as cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fact {
    Status,
    Target,
    BareUrl,
    Manifest,
    Dependencies,
    Tags,
    Clean,
    Conflicted,
    HeadCommit,
    UpToDate,
    Fetched,
    DefaultBranch,
    RemoteBranches,
    TrackedFiles,
    Unpushed,
}

impl Fact {
    pub const ALL: [Fact; 15] = [
        Fact::Status,
        Fact::Target,
        Fact::BareUrl,
        Fact::Manifest,
        Fact::Dependencies,
        Fact::Tags,
        Fact::Clean,
        Fact::Conflicted,
        Fact::HeadCommit,
        Fact::UpToDate,
        Fact::Fetched,
        Fact::DefaultBranch,
        Fact::RemoteBranches,
        Fact::TrackedFiles,
        Fact::Unpushed,
    ];

    /// Facts a checkout leaves valid: the fetch marker, the origin URL and
    /// the tag list.
    pub fn survives_checkout(self) -> bool {
        matches!(self, Fact::Fetched | Fact::BareUrl | Fact::Tags)
    }
}

/// A cached fact value
#[derive(Debug, Clone, PartialEq)]
pub enum FactValue {
    Flag(bool),
    Text(String),
    Count(u32),
    Target(Option<Target>),
    Manifest(Option<Manifest>),
    Dependencies(DependencyMap),
    List(Vec<String>),
}

impl FactValue {
    pub fn into_flag(self) -> Option<bool> {
        match self {
            FactValue::Flag(flag) => Some(flag),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            FactValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_count(self) -> Option<u32> {
        match self {
            FactValue::Count(count) => Some(count),
            _ => None,
        }
    }

    pub fn into_target(self) -> Option<Option<Target>> {
        match self {
            FactValue::Target(target) => Some(target),
            _ => None,
        }
    }

    pub fn into_manifest(self) -> Option<Option<Manifest>> {
        match self {
            FactValue::Manifest(manifest) => Some(manifest),
            _ => None,
        }
    }

    pub fn into_dependencies(self) -> Option<DependencyMap> {
        match self {
            FactValue::Dependencies(deps) => Some(deps),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            FactValue::List(list) => Some(list),
            _ => None,
        }
    }
}

/// State-changing operations on a working copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Clone,
    Checkout,
    PullAdvanced,
    PullNoop,
    AddAndCommit,
    CreateTag,
    WriteManifest,
    Fetch,
    Push,
    ResetHard,
    Stash,
}

impl Mutation {
    /// The facts whose value may differ after this mutation.
    pub fn evicts(self) -> Vec<Fact> {
        match self {
            // Directory identity changes entirely
            Mutation::Clone => Fact::ALL.to_vec(),
            Mutation::Checkout => Fact::ALL
                .into_iter()
                .filter(|f| !f.survives_checkout())
                .collect(),
            Mutation::PullAdvanced | Mutation::ResetHard => Fact::ALL
                .into_iter()
                .filter(|f| *f != Fact::BareUrl)
                .collect(),
            Mutation::PullNoop => Vec::new(),
            // A commit on a detached HEAD leaves the tag or commit it was at
            Mutation::AddAndCommit => vec![
                Fact::Target,
                Fact::Conflicted,
                Fact::TrackedFiles,
                Fact::HeadCommit,
                Fact::Unpushed,
                Fact::Clean,
                Fact::UpToDate,
            ],
            Mutation::CreateTag => vec![Fact::Tags, Fact::Target, Fact::Unpushed],
            Mutation::WriteManifest => vec![Fact::Manifest, Fact::Dependencies, Fact::Clean],
            Mutation::Fetch => vec![
                Fact::Fetched,
                Fact::Tags,
                Fact::RemoteBranches,
                Fact::UpToDate,
                Fact::Unpushed,
            ],
            Mutation::Push => vec![Fact::Unpushed, Fact::RemoteBranches],
            Mutation::Stash => vec![
                Fact::Clean,
                Fact::Conflicted,
                Fact::Manifest,
                Fact::Dependencies,
            ],
        }
    }

    /// Whether this mutation changes local working-copy state, and so must
    /// advance the snapshot's change id.
    ///
    /// Stashing is scoped around another mutation and never counts on its own.
    pub fn changes_working_copy(self) -> bool {
        !matches!(
            self,
            Mutation::PullNoop | Mutation::Fetch | Mutation::Push | Mutation::Stash
        )
    }
}

/// Per-snapshot fact cache
#[derive(Debug, Default)]
pub struct FactCache {
    values: RefCell<HashMap<Fact, FactValue>>,
}

impl FactCache {
    /// Create a new empty fact cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached fact, or compute and cache it if not present.
    ///
    /// A failed computation caches nothing.
    pub fn get_or_compute<F>(&self, fact: Fact, compute: F) -> Result<FactValue>
    where
        F: FnOnce() -> Result<FactValue>,
    {
        if let Some(cached) = self.values.borrow().get(&fact) {
            return Ok(cached.clone());
        }

        // The borrow is released before computing, computations may consult
        // other facts of the same cache
        let value = compute()?;
        self.values.borrow_mut().insert(fact, value.clone());
        Ok(value)
    }

    /// Manually insert a value into the cache
    pub fn insert(&self, fact: Fact, value: FactValue) {
        self.values.borrow_mut().insert(fact, value);
    }

    /// Get a value from cache without computing
    pub fn get(&self, fact: Fact) -> Option<FactValue> {
        self.values.borrow().get(&fact).cloned()
    }

    pub fn contains(&self, fact: Fact) -> bool {
        self.values.borrow().contains_key(&fact)
    }

    /// Evict everything the mutation may have changed.
    pub fn apply(&self, mutation: Mutation) {
        let mut values = self.values.borrow_mut();
        for fact in mutation.evicts() {
            values.remove(&fact);
        }
    }

    /// Clear all cached entries
    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}
