//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use repotree::defaults::LINK_ROOT_ENV;
use repotree::output::OutputConfig;

use crate::commands::{self, Session};

/// repotree - Keep a tree of git repositories in step with its manifests
#[derive(Parser, Debug)]
#[command(name = "repotree")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Run as if started in DIR
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Clone dependencies into this shared cache and link them into the tree
    #[arg(long, global = true, value_name = "DIR", env = LINK_ROOT_ENV)]
    link_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring every dependency to the reference its parents declare
    Update(commands::update::UpdateArgs),

    /// Tag the main project and all of its dependencies
    Release(commands::release::ReleaseArgs),

    /// Show target, cleanliness and sync state of every repository
    Status(commands::status::StatusArgs),

    /// Display the declared dependency tree
    Tree(commands::tree::TreeArgs),

    /// Clone a project and install its dependencies
    Clone(commands::clone::CloneArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        let output = OutputConfig::from_env_and_flag(&self.color);
        output.apply();

        let directory = match self.directory {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let session = Session {
            directory,
            link_root: self.link_root,
            output,
        };

        match self.command {
            Commands::Update(args) => commands::update::execute(args, &session),
            Commands::Release(args) => commands::release::execute(args, &session),
            Commands::Status(args) => commands::status::execute(args, &session),
            Commands::Tree(args) => commands::tree::execute(args, &session),
            Commands::Clone(args) => commands::clone::execute(args, &session),
        }
    }
}

/// `RUST_LOG` still wins when set.
fn init_logging(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder
        .parse_filters(level)
        .format_timestamp(None)
        .format_target(false);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // a second init (tests driving execute twice) is harmless
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_flags() {
        let cli = Cli::try_parse_from([
            "repotree",
            "-C",
            "/tmp/project",
            "update",
            "--check-local",
            "--switch",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/project")));
        match cli.command {
            Commands::Update(args) => {
                assert!(args.check_local);
                assert!(args.switch);
                assert!(args.yes);
                assert!(!args.remote_reset);
                assert!(!args.force_latest);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_release_flags() {
        let cli = Cli::try_parse_from(["repotree", "release", "--no-bump", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Release(args) => {
                assert!(args.no_bump);
                assert!(args.dry_run);
                assert!(!args.yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["repotree", "tree", "--depth", "1", "--log-level", "debug"])
            .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Tree(ref args) if args.depth == Some(1)));
    }

    #[test]
    fn test_clone_requires_reference() {
        assert!(Cli::try_parse_from(["repotree", "clone"]).is_err());
    }
}
