//! Subprocess primitive for running `git`.
//!
//! Every component that touches a working copy goes through [`GitRunner`],
//! a single invocation contract taking a directory, an argument list and a
//! fixed set of [`RunOptions`]. The default implementation, [`SystemGit`],
//! shells out to the system `git`, which automatically picks up:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Personal access tokens
//! - Any authentication configured in ~/.gitconfig
//!
//! Calls are synchronous: the caller blocks until the process exits, which
//! keeps the stash/pull/checkout sequence of each repository strictly ordered.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;
use semver::Version;

use crate::error::{Error, Result};

/// How a single `git` invocation treats its streams and exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Capture stdout instead of inheriting the parent's stdout.
    pub capture_stdout: bool,
    /// Capture stderr instead of inheriting the parent's stderr.
    pub capture_stderr: bool,
    /// Return the output even when git exits non-zero.
    pub ignore_exit_code: bool,
    /// Do not log the invocation.
    pub quiet: bool,
}

impl RunOptions {
    /// Capture both streams and fail on a non-zero exit.
    pub fn capture() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            ignore_exit_code: false,
            quiet: false,
        }
    }

    /// Capture both streams and hand back the exit code instead of failing.
    ///
    /// Used for probes where a non-zero exit is an answer, not an error.
    pub fn probe() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            ignore_exit_code: true,
            quiet: true,
        }
    }

    /// Let git print progress to the terminal, capturing only stderr so
    /// failures can be classified.
    pub fn interactive() -> Self {
        Self {
            capture_stdout: false,
            capture_stderr: true,
            ignore_exit_code: false,
            quiet: false,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Captured result of a finished `git` process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }

    /// Non-empty stdout lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Trait for git invocations - allows substituting the runner in tests
pub trait GitRunner {
    /// Run `git <args>` inside `dir`.
    ///
    /// Rejects with [`Error::GitCommand`] on a non-zero exit unless
    /// `options.ignore_exit_code` is set.
    fn run(&self, dir: &Path, args: &[&str], options: RunOptions) -> Result<ProcessOutput>;
}

/// The default implementation of `GitRunner`, which uses the system's `git`.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: OsString,
    envs: Vec<(String, String)>,
}

impl SystemGit {
    pub fn new() -> Self {
        Self {
            program: OsString::from("git"),
            envs: Vec::new(),
        }
    }

    /// Set an environment variable for every invocation.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRunner for SystemGit {
    fn run(&self, dir: &Path, args: &[&str], options: RunOptions) -> Result<ProcessOutput> {
        let command_line = args.join(" ");
        if !options.quiet {
            debug!("git {} (in {})", command_line, dir.display());
        }

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(if options.capture_stdout {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(if options.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::inherit()
            });
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let output = command.output().map_err(|e| Error::GitCommand {
            command: command_line.clone(),
            dir: dir.display().to_string(),
            code: None,
            stderr: e.to_string(),
        })?;

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !result.success() && !options.ignore_exit_code {
            return Err(Error::GitCommand {
                command: command_line,
                dir: dir.display().to_string(),
                code: output.status.code(),
                stderr: result.stderr.trim().to_string(),
            });
        }

        Ok(result)
    }
}

/// Whether a `git` executable can be started at all.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Parse a tag string into a semantic version
pub fn parse_semver_tag(tag: &str) -> Option<Version> {
    // Common tag formats: v1.0.0, 1.0.0
    let version_str = tag.strip_prefix('v').unwrap_or(tag);
    Version::parse(version_str).ok()
}
