//! # repotree CLI
//!
//! Binary entry point for the `repotree` command-line tool. It parses the
//! arguments with `clap` and hands over to the command modules, which are
//! thin wrappers around the `repotree` library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
