//! # Error Handling
//!
//! This module defines the centralized error type for `repotree`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! mode of the snapshot layer, the reconciliation engine and the release
//! planner, with enough context in each variant to tell the operator which
//! repository failed and why.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Variants carry the repository name or
//!   directory they concern, and the captured output of `git` where one was
//!   involved.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Errors fall into two groups. Some are fatal for the whole run (`State`,
//! `Conflict`, `CycleDetected`, `ConvergenceLimit`), others are scoped to a
//! single repository (`TargetUnresolvable`, `RefResolution`,
//! `UnrelatedHistory`, `GitCommand`) and the reconciliation engine decides,
//! according to its node failure policy, whether they stop the run.

use thiserror::Error;

/// Main error type for repotree operations
#[derive(Error, Debug)]
pub enum Error {
    /// The working directory argument is missing or is not usable.
    #[error("Invalid working directory: {message}")]
    State { message: String },

    /// One or more repositories have unmerged files or uncommitted changes
    /// that block the requested operation.
    ///
    /// Every offending repository is listed, not only the first one found.
    #[error("{} repositories block this operation: {}", nodes.len(), nodes.join(", "))]
    Conflict { nodes: Vec<String> },

    /// None of the branch, tag or commit probes succeeded on an installed
    /// repository.
    #[error("Cannot determine the checked out branch, tag or commit of {name} ({dir})")]
    TargetUnresolvable { name: String, dir: String },

    /// A declared target is neither a tag, a branch nor a commit of the
    /// repository.
    #[error("Target {target} of {name} was not found as a tag, branch or commit")]
    RefResolution { name: String, target: String },

    /// A pull was refused because the local and remote histories are unrelated.
    #[error("Refusing to merge unrelated histories in {name}")]
    UnrelatedHistory { name: String },

    /// A `git` invocation failed or exited with a non-zero status.
    #[error("Git command failed in {dir}: git {command} (exit code {}) - {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    GitCommand {
        command: String,
        dir: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A computed release tag already exists.
    #[error("Tag {tag} already exists in {name}")]
    TagCollision { name: String, tag: String },

    /// A dependency cycle was found while walking manifests.
    #[error("Cycle detected in repository dependencies: {cycle}")]
    CycleDetected { cycle: String },

    /// A manifest file could not be parsed or failed validation.
    #[error("Manifest error in {path}: {message}")]
    ManifestParse { path: String, message: String },

    /// The `.repotree.yaml` configuration could not be parsed.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A repository reference string could not be parsed.
    #[error("Invalid repository reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    /// Reading an answer from the operator failed.
    #[error("Prompt failed: {message}")]
    Prompt { message: String },

    /// The convergence loop kept finding changes after the allowed number of
    /// passes.
    #[error("Dependency tree did not converge after {passes} passes")]
    ConvergenceLimit { passes: usize },

    /// Local release branches and tags were created but some pushes failed.
    ///
    /// Nothing is rolled back; the listed refs must be pushed manually.
    #[error("Push incomplete, push these refs manually: {}", failures.join(", "))]
    PushIncomplete { failures: Vec<String> },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Whether this error only concerns the repository it was raised for.
    ///
    /// Node-scoped errors may be skipped by the reconciliation engine; all
    /// other errors stop the run.
    pub fn is_node_scoped(&self) -> bool {
        matches!(
            self,
            Error::TargetUnresolvable { .. }
                | Error::RefResolution { .. }
                | Error::UnrelatedHistory { .. }
                | Error::GitCommand { .. }
                | Error::ManifestParse { .. }
        )
    }
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Prompt {
            message: err.to_string(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
