//! # Clone Command Implementation
//!
//! Clones a project and runs `update` in it, so the whole dependency tree is
//! installed in one step. The destination defaults to the repository name.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context as _, Result};
use clap::Args;

use repotree::defaults::DEFAULT_MANIFEST_FILENAME;
use repotree::git::SystemGit;
use repotree::output::emoji;
use repotree::reconcile::{ReconciliationEngine, UpdateOptions};
use repotree::reference::RepoRef;
use repotree::snapshot::Snapshot;

use super::update::print_report;
use super::Session;

/// Clone a project and install its dependencies
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Repository reference, `[transport+]url[#target]`
    #[arg(value_name = "REF")]
    pub reference: String,

    /// Destination directory, relative to -C
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Never prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Last path segment of a repository URL without `.git`.
fn repository_name(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(&['/', ':'][..]).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}

/// Execute the `clone` command.
pub fn execute(args: CloneArgs, session: &Session) -> Result<()> {
    let reference = RepoRef::parse(&args.reference)?;
    let dir = match args.dir {
        Some(dir) => session.directory.join(dir),
        None => {
            let Some(name) = repository_name(&reference.url) else {
                bail!("Cannot derive a directory name from {}, pass DIR", reference.url);
            };
            session.directory.join(name)
        }
    };
    if dir.exists() {
        bail!("Destination {} already exists", dir.display());
    }

    println!(
        "{} Cloning {} into {}",
        emoji(&session.output, "📥", "[CLONE]"),
        reference,
        dir.display()
    );
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Snapshot::new(name, &dir, Rc::new(SystemGit::new()), DEFAULT_MANIFEST_FILENAME)
        .install(&reference, None)
        .with_context(|| format!("Failed to clone {}", reference))?;

    let ctx = session.context_for(&dir, !args.yes)?;
    let report = ReconciliationEngine::new(&ctx)
        .run(UpdateOptions::default())
        .with_context(|| format!("Failed to install dependencies of {}", dir.display()))?;
    print_report(session, &report);
    if report.has_failures() {
        bail!("{} dependencies could not be installed", report.failures.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::session;
    use tempfile::TempDir;

    #[test]
    fn test_repository_name() {
        assert_eq!(
            repository_name("https://example.com/org/lib.git").as_deref(),
            Some("lib")
        );
        assert_eq!(
            repository_name("git@example.com:org/app").as_deref(),
            Some("app")
        );
        assert_eq!(repository_name("file:///srv/repos/tool/").as_deref(), Some("tool"));
        assert_eq!(repository_name(""), None);
    }

    #[test]
    fn test_existing_destination_is_refused() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("lib")).unwrap();
        let args = CloneArgs {
            reference: "file:///nowhere/lib.git".to_string(),
            dir: None,
            yes: true,
        };
        let err = execute(args, &session(temp.path())).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
