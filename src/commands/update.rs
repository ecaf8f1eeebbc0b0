//! # Update Command Implementation
//!
//! Runs the reconciliation engine on the project: validates the tree, pulls
//! the main project, then clones, switches and pulls dependencies until the
//! working tree matches what the manifests declare.
//!
//! - `--check-local` also refuses to start while any repository has
//!   uncommitted changes.
//! - `--remote-reset` moves repositories whose upstream branch was deleted.
//! - `--switch` corrects repositories that drifted from their declaration.
//! - `--force-latest` settles reference conflicts without asking.
//! - `--yes` never prompts; conflicts take the preferred reference.
//! - `--abort-on-error` stops at the first failing repository instead of
//!   skipping it.

use anyhow::{bail, Context as _, Result};
use clap::Args;

use repotree::config::NodeFailurePolicy;
use repotree::output::emoji;
use repotree::reconcile::{ReconciliationEngine, UpdateOptions, UpdateReport};

use super::Session;

/// Bring dependencies in line with the manifests
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Refuse to run while any repository has uncommitted changes
    #[arg(long)]
    pub check_local: bool,

    /// Move repositories whose upstream branch was deleted to one that exists
    #[arg(long)]
    pub remote_reset: bool,

    /// Check out the declared reference where a repository drifted from it
    #[arg(long)]
    pub switch: bool,

    /// Resolve reference conflicts to the highest version without asking
    #[arg(long)]
    pub force_latest: bool,

    /// Never prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Stop at the first repository that fails instead of skipping it
    #[arg(long)]
    pub abort_on_error: bool,
}

impl UpdateArgs {
    fn options(&self) -> UpdateOptions {
        UpdateOptions {
            check_local: self.check_local,
            remote_reset: self.remote_reset,
            switch: self.switch,
        }
    }
}

/// Execute the `update` command.
pub fn execute(args: UpdateArgs, session: &Session) -> Result<()> {
    let mut ctx = session.context(!args.yes)?.force_latest(args.force_latest);
    if args.abort_on_error {
        ctx = ctx.with_node_failure_policy(NodeFailurePolicy::AbortRun);
    }

    println!(
        "{} Updating {}",
        emoji(&session.output, "🔄", "[UPDATE]"),
        ctx.root.display()
    );

    let engine = ReconciliationEngine::new(&ctx);
    let report = engine
        .run(args.options())
        .with_context(|| format!("Update of {} failed", ctx.root.display()))?;

    print_report(session, &report);
    if report.has_failures() {
        bail!(
            "{} repositories could not be updated",
            report.failures.len() + usize::from(report.main_pull_error.is_some())
        );
    }
    Ok(())
}

pub(crate) fn print_report(session: &Session, report: &UpdateReport) {
    let out = &session.output;
    for name in &report.cloned {
        println!("   {} cloned {}", emoji(out, "📥", "+"), name);
    }
    for name in &report.switched {
        println!("   {} switched {}", emoji(out, "🔀", "~"), name);
    }
    for name in &report.pulled {
        println!("   {} pulled {}", emoji(out, "⬇️", "<"), name);
    }
    for (name, path) in &report.moved_aside {
        println!("   {} moved {} to {}", emoji(out, "📦", "!"), name, path.display());
    }
    for failure in &report.failures {
        println!("   {} {}: {}", emoji(out, "❌", "x"), failure.name, failure.message);
    }
    if let Some(error) = &report.main_pull_error {
        println!("   {} main project: {}", emoji(out, "❌", "x"), error);
    }

    if report.mutations() == 0 && !report.has_failures() {
        println!("{} Already up to date", emoji(out, "✅", "[OK]"));
    } else {
        println!(
            "{} Done after {} passes",
            emoji(out, "✅", "[OK]"),
            report.passes
        );
    }
}
