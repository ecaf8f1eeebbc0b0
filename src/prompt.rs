//! Operator prompts
//!
//! The conflict resolver and the tag planner occasionally need a decision
//! from the operator. They ask through [`Prompter`], so non-interactive runs
//! and tests can answer without a terminal.

use std::cell::RefCell;
use std::collections::VecDeque;

use dialoguer::{theme::ColorfulTheme, Input, Select};

use crate::error::{Error, Result};

/// Asks the operator to choose or type a value
pub trait Prompter {
    /// Pick one of `items`; `default` is pre-selected.
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize>;

    /// Free-form answer; `validate` returns an error message for rejected input.
    fn input(
        &self,
        prompt: &str,
        default: &str,
        validate: &dyn Fn(&str) -> std::result::Result<(), String>,
    ) -> Result<String>;
}

/// Prompts on the controlling terminal with dialoguer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        let theme = ColorfulTheme::default();
        let choice = Select::with_theme(&theme)
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()?;
        Ok(choice)
    }

    fn input(
        &self,
        prompt: &str,
        default: &str,
        validate: &dyn Fn(&str) -> std::result::Result<(), String>,
    ) -> Result<String> {
        let theme = ColorfulTheme::default();
        let answer: String = Input::with_theme(&theme)
            .with_prompt(prompt)
            .default(default.to_string())
            .validate_with(|value: &String| validate(value))
            .interact_text()?;
        Ok(answer)
    }
}

/// Always takes the default answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn select(&self, _prompt: &str, _items: &[String], default: usize) -> Result<usize> {
        Ok(default)
    }

    fn input(
        &self,
        _prompt: &str,
        default: &str,
        validate: &dyn Fn(&str) -> std::result::Result<(), String>,
    ) -> Result<String> {
        validate(default).map_err(|message| Error::Prompt { message })?;
        Ok(default.to_string())
    }
}

/// A scripted answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Select(usize),
    Input(String),
    Default,
}

/// Replays queued answers and records every prompt it was shown.
///
/// Running out of answers is an error, so a test notices unexpected prompts.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<Answer>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Prompts shown so far, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    fn next(&self, prompt: &str) -> Result<Answer> {
        self.asked.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::Prompt {
                message: format!("no scripted answer for {:?}", prompt),
            })
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        match self.next(prompt)? {
            Answer::Select(index) if index < items.len() => Ok(index),
            Answer::Default => Ok(default),
            other => Err(Error::Prompt {
                message: format!("unexpected answer {:?} for selection {:?}", other, prompt),
            }),
        }
    }

    fn input(
        &self,
        prompt: &str,
        default: &str,
        validate: &dyn Fn(&str) -> std::result::Result<(), String>,
    ) -> Result<String> {
        let answer = match self.next(prompt)? {
            Answer::Input(text) => text,
            Answer::Default => default.to_string(),
            other => {
                return Err(Error::Prompt {
                    message: format!("unexpected answer {:?} for input {:?}", other, prompt),
                })
            }
        };
        validate(&answer).map_err(|message| Error::Prompt { message })?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(_: &str) -> std::result::Result<(), String> {
        Ok(())
    }

    #[test]
    fn test_non_interactive_takes_default() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(NonInteractive.select("pick", &items, 1).unwrap(), 1);
        assert_eq!(NonInteractive.input("name", "x", &accept).unwrap(), "x");
    }

    #[test]
    fn test_non_interactive_rejects_invalid_default() {
        let reject = |_: &str| Err("taken".to_string());
        assert!(NonInteractive.input("name", "x", &reject).is_err());
    }

    #[test]
    fn test_scripted_prompter_replays_and_records() {
        let prompter = ScriptedPrompter::new([Answer::Select(0), Answer::Input("2.0.0".into())]);
        let items = vec!["a".to_string(), "b".to_string()];

        assert_eq!(prompter.select("first", &items, 1).unwrap(), 0);
        assert_eq!(prompter.input("second", "1.0.1", &accept).unwrap(), "2.0.0");
        assert!(prompter.select("third", &items, 0).is_err());
        assert_eq!(prompter.asked(), vec!["first", "second", "third"]);
    }
}
