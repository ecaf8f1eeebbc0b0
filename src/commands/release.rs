//! # Release Command Implementation
//!
//! Tags the main project and every dependency in one go.
//!
//! The tree must be free of unmerged files and uncommitted changes. The
//! command prints the tag plan, asks for confirmation unless `--yes` is given,
//! and then bumps mainline versions, cuts release branches and tags, and
//! pushes them. `--dry-run` stops after printing the plan.

use anyhow::{Context as _, Result};
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Confirm};

use repotree::output::emoji;
use repotree::reconcile::{validate, ReconciliationEngine};
use repotree::release::{ReleaseExecutor, ReleaseOptions, TagPlanner};

use super::Session;

/// Tag the whole dependency tree
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Never prompt; tag collisions pick the next free patch version
    #[arg(short, long)]
    pub yes: bool,

    /// Do not raise the version on the current branches
    #[arg(long)]
    pub no_bump: bool,

    /// Print the tag plan without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

/// Execute the `release` command.
pub fn execute(args: ReleaseArgs, session: &Session) -> Result<()> {
    let ctx = session.context(!args.yes)?;
    let out = &session.output;

    let engine = ReconciliationEngine::new(&ctx);
    let graph = engine.graph().context("Failed to read the dependency tree")?;
    validate(&graph, true).context("The tree is not ready for a release")?;

    let options = ReleaseOptions {
        bump_mainline: !args.no_bump,
        branch_prefix: ctx.release_branch_prefix.clone(),
    };
    let plan = TagPlanner::new(&ctx, &graph, options)
        .determine_tags()
        .context("Failed to plan release tags")?;

    println!("{} Release plan", emoji(out, "🏷️", "[PLAN]"));
    print!("{}", plan);

    if plan.created().next().is_none() {
        println!("{} Every repository is already tagged", emoji(out, "✅", "[OK]"));
        return Ok(());
    }
    if args.dry_run {
        println!("{} Dry run, nothing was changed", emoji(out, "🔎", "[DRY RUN]"));
        return Ok(());
    }
    if ctx.interactive {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Create these tags?")
            .default(false)
            .interact()?;
        if !proceed {
            println!("Release cancelled");
            return Ok(());
        }
    }

    let report = ReleaseExecutor::new(&ctx)
        .run(&plan)
        .context("Release did not complete")?;

    for name in &report.bumped {
        println!("   {} bumped mainline version of {}", emoji(out, "⬆️", "^"), name);
    }
    for (name, tag) in &report.created {
        println!("   {} tagged {} {}", emoji(out, "🏷️", "+"), name, tag);
    }
    println!(
        "{} Released {} repositories",
        emoji(out, "✅", "[OK]"),
        report.created.len()
    );
    Ok(())
}
