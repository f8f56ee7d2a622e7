// SPDX-License-Identifier: MIT OR Apache-2.0
//! subpiper-command
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The command a subpiper run launches: program, arguments and an optional
//! working directory, plus [`split_command_line`] for turning one
//! command-line string into an argument vector without involving a shell.

mod split;

pub use split::split_command_line;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors produced while building a [`Command`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The command line contained no words at all.
    #[error("command line is empty")]
    Empty,

    /// A quote was opened and never closed.
    #[error("unterminated {quote} quote in command line")]
    UnterminatedQuote {
        /// The quote character that was left open.
        quote: char,
    },
}

/// Program, arguments and working directory for one child process.
///
/// Built once and then read-only; the builder methods consume and return
/// `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<PathBuf>,
}

impl Command {
    /// Create a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Split `line` into words and build a command from them.
    ///
    /// The first word is the program, the rest are its arguments.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        Self::from_argv(split_command_line(line)?)
    }

    /// Build a command from an argument vector (`argv[0]` is the program).
    pub fn from_argv<I, S>(argv: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(CommandError::Empty)?;
        if program.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(Self {
            program,
            args: argv.collect(),
            cwd: None,
        })
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir` instead of the caller's working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The program name or path.
    pub fn get_program(&self) -> &str {
        &self.program
    }

    /// Arguments passed after the program.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Working directory override, if any.
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

impl std::str::FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_word(f, &self.program)?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_word(f, arg)?;
        }
        Ok(())
    }
}

fn write_word(f: &mut fmt::Formatter<'_>, word: &str) -> fmt::Result {
    let needs_quotes = word.is_empty()
        || word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if !needs_quotes {
        return f.write_str(word);
    }
    f.write_str("\"")?;
    for c in word.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}
