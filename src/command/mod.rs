//! Command runner abstraction used by the environment and fixture adapters.
//!
//! Everything that shells out (`docker`, `aws`) goes through
//! [`CommandRunner`] so tests can substitute scripted outputs.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }

    /// Converts a non-zero exit into [`CommandError::Failure`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Failure`] when the exit code is not zero.
    pub fn require_success(self, program: &str) -> Result<Self, CommandError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(CommandError::Failure {
            program: program.to_owned(),
            status: self.code,
            status_text: self.status_text(),
            stderr: self.stderr,
        })
    }
}

/// Errors raised while running external commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when the program cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that could not be started.
        program: String,
        /// Error reported by the operating system.
        message: String,
    },
    /// Raised when the program exits with a non-zero status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    Failure {
        /// Program that failed.
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds an owned argument vector from string slices.
#[must_use]
pub fn args<I, S>(values: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    values.into_iter().map(Into::into).collect()
}
