//! # Output Configuration
//!
//! Decides whether the `repotree` binary decorates its output with colors
//! and emojis, and provides the small formatting helpers the commands share.
//!
//! `--color=always` and `--color=never` win outright. With `auto`, the
//! environment decides, checked in this order:
//! - `NO_COLOR` set (any value, per https://no-color.org/) turns decoration off
//! - `CLICOLOR=0` turns it off
//! - `CLICOLOR_FORCE` set to anything but `0` turns it on, even without a TTY
//! - `TERM=dumb` turns it off
//!
//! Otherwise the terminal's capabilities decide.
//!
//! ```rust,ignore
//! use repotree::output::{OutputConfig, emoji};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} Updating...", emoji(&config, "🔄", "[UPDATE]"));
//! ```

use std::env;

use console::style;

/// Value of the `--color` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorWhen {
    Always,
    Never,
    Auto,
}

impl ColorWhen {
    /// Case-insensitive; anything unrecognized means `Auto`.
    pub fn parse(flag: &str) -> Self {
        match flag.to_ascii_lowercase().as_str() {
            "always" => ColorWhen::Always,
            "never" => ColorWhen::Never,
            _ => ColorWhen::Auto,
        }
    }
}

/// What the environment says about decoration, `None` when it is silent.
fn env_preference(var: impl Fn(&str) -> Option<String>) -> Option<bool> {
    if var("NO_COLOR").is_some() {
        return Some(false);
    }
    if var("CLICOLOR").as_deref() == Some("0") {
        return Some(false);
    }
    if var("CLICOLOR_FORCE").is_some_and(|v| v != "0" && !v.is_empty()) {
        return Some(true);
    }
    if var("TERM").as_deref() == Some("dumb") {
        return Some(false);
    }
    None
}

/// Whether command output is decorated.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match ColorWhen::parse(color_flag) {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => env_preference(|key| env::var(key).ok())
                .unwrap_or_else(|| console::Term::stdout().features().colors_supported()),
        };
        Self { use_color }
    }

    /// Undecorated output, as in pipes and tests.
    pub fn plain() -> Self {
        Self { use_color: false }
    }

    pub fn decorated() -> Self {
        Self { use_color: true }
    }

    /// Make `console` styling follow this setting on both streams.
    pub fn apply(&self) {
        console::set_colors_enabled(self.use_color);
        console::set_colors_enabled_stderr(self.use_color);
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// The emoji when decorating, the plain marker otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji
    } else {
        plain
    }
}

/// A green `yes` or red `no` cell for status lines.
pub fn flag(config: &OutputConfig, value: bool, yes: &str, no: &str) -> String {
    match (config.use_color, value) {
        (true, true) => style(yes).green().to_string(),
        (true, false) => style(no).red().to_string(),
        (false, true) => yes.to_string(),
        (false, false) => no.to_string(),
    }
}

/// A bold repository name.
pub fn name(config: &OutputConfig, name: &str) -> String {
    if config.use_color {
        style(name).bold().to_string()
    } else {
        name.to_string()
    }
}
