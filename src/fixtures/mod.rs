//! Remote fixture adapters used to seed and inspect transfer targets.
//!
//! [`SshFixture`] edits files inside the SSH test container through
//! `docker exec`; [`BucketFixture`] clears object-storage prefixes through
//! the `aws` CLI.

use std::borrow::Cow;

use camino::Utf8Path;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::debug;

use crate::command::{CommandError, CommandOutput, CommandRunner, args};

/// Errors raised by fixture adapters.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FixtureError {
    /// An underlying command failed.
    #[error("{action} failed: {source}")]
    Command {
        /// Fixture step that failed.
        action: String,
        /// Command error.
        #[source]
        source: CommandError,
    },
}

fn run_checked<R: CommandRunner>(
    runner: &R,
    program: &str,
    action: &str,
    arguments: &[std::ffi::OsString],
) -> Result<CommandOutput, FixtureError> {
    runner
        .run(program, arguments)
        .and_then(|output| output.require_success(program))
        .map_err(|source| FixtureError::Command {
            action: action.to_owned(),
            source,
        })
}

/// File primitives inside the SSH test container.
#[derive(Clone, Debug)]
pub struct SshFixture<R: CommandRunner> {
    docker_bin: String,
    container: String,
    runner: R,
}

impl<R: CommandRunner> SshFixture<R> {
    /// Creates a fixture for `container`.
    #[must_use]
    pub fn new(docker_bin: impl Into<String>, container: impl Into<String>, runner: R) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            container: container.into(),
            runner,
        }
    }

    fn exec(&self, action: &str, command: &[&str]) -> Result<CommandOutput, FixtureError> {
        let mut arguments = args(["exec", self.container.as_str()]);
        arguments.extend(args(command.iter().copied()));
        run_checked(&self.runner, &self.docker_bin, action, &arguments)
    }

    /// Writes `content` plus a trailing newline to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Command`] when the write fails.
    pub fn write_file(&self, path: &Utf8Path, content: &str) -> Result<(), FixtureError> {
        let script = format!(
            "printf '%s\\n' {} > {}",
            escape(Cow::Borrowed(content)),
            escape(Cow::Borrowed(path.as_str()))
        );
        debug!(container = %self.container, %path, "writing fixture file");
        self.exec("write file", &["sh", "-c", script.as_str()])
            .map(|_| ())
    }

    /// Returns the contents of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Command`] when the file cannot be read.
    pub fn read_file(&self, path: &Utf8Path) -> Result<String, FixtureError> {
        self.exec("read file", &["cat", path.as_str()])
            .map(|output| output.stdout)
    }

    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Command`] when the directory cannot be created.
    pub fn mkdir(&self, path: &Utf8Path) -> Result<(), FixtureError> {
        self.exec("create directory", &["mkdir", "-p", path.as_str()])
            .map(|_| ())
    }
}

/// Object-storage bucket used as a transfer target.
#[derive(Clone, Debug)]
pub struct BucketFixture<R: CommandRunner> {
    aws_bin: String,
    bucket: String,
    runner: R,
}

impl<R: CommandRunner> BucketFixture<R> {
    /// Creates a fixture for `bucket`.
    #[must_use]
    pub fn new(aws_bin: impl Into<String>, bucket: impl Into<String>, runner: R) -> Self {
        Self {
            aws_bin: aws_bin.into(),
            bucket: bucket.into(),
            runner,
        }
    }

    /// URI of `prefix` within the bucket.
    #[must_use]
    pub fn uri(&self, prefix: &str) -> String {
        format!("s3://{}/{}", self.bucket, prefix.trim_start_matches('/'))
    }

    /// Deletes every object under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Command`] when the deletion fails.
    pub fn clear(&self, prefix: &str) -> Result<(), FixtureError> {
        let uri = self.uri(prefix);
        debug!(%uri, "clearing bucket prefix");
        run_checked(
            &self.runner,
            &self.aws_bin,
            "clear bucket",
            &args(["s3", "rm", uri.as_str(), "--recursive"]),
        )
        .map(|_| ())
    }
}
