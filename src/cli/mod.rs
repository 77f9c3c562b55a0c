//! Command-line interface definitions for the `opwatch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `opwatch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "opwatch",
    about = "Wait for a data server to come up and follow push and pull operations to completion",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Wait until the server answers API requests.
    #[command(name = "wait-server", about = "Wait until the server answers API requests")]
    WaitServer(WaitServerCommand),
    /// Wait until an SSH endpoint accepts sessions.
    #[command(name = "wait-ssh", about = "Wait until an SSH endpoint accepts sessions")]
    WaitSsh(WaitSshCommand),
    /// Wait until a volume is ready.
    #[command(name = "wait-volume", about = "Wait until a volume is ready")]
    WaitVolume(ResourceCommand),
    /// Wait until a commit is ready.
    #[command(name = "wait-commit", about = "Wait until a commit is ready")]
    WaitCommit(ResourceCommand),
    /// Push a commit to a remote.
    #[command(name = "push", about = "Push a commit to a remote")]
    Push(TransferCommand),
    /// Pull a commit from a remote.
    #[command(name = "pull", about = "Pull a commit from a remote")]
    Pull(TransferCommand),
    /// Follow an existing operation to completion.
    #[command(name = "track", about = "Follow an existing operation to completion")]
    Track(TrackCommand),
    /// Request cancellation of an operation.
    #[command(name = "abort", about = "Request cancellation of an operation")]
    Abort(OperationCommand),
    /// List the operations of a repository.
    #[command(name = "operations", about = "List the operations of a repository")]
    Operations(RepositoryCommand),
}

/// Arguments for `opwatch wait-server`.
#[derive(Debug, Parser)]
pub(crate) struct WaitServerCommand {
    /// Attach the server container's logs when the wait times out.
    #[arg(long)]
    pub(crate) container_logs: bool,
}

/// Arguments for `opwatch wait-ssh`.
#[derive(Debug, Parser)]
pub(crate) struct WaitSshCommand {
    /// Host running the SSH server.
    #[arg(long, default_value = "localhost")]
    pub(crate) host: String,
    /// Port the SSH server listens on.
    #[arg(long, default_value_t = 22)]
    pub(crate) port: u16,
    /// Container whose logs are attached when the wait times out.
    #[arg(long, value_name = "CONTAINER")]
    pub(crate) container_logs: Option<String>,
}

/// Arguments for `opwatch wait-volume` and `opwatch wait-commit`.
#[derive(Debug, Parser)]
pub(crate) struct ResourceCommand {
    /// Repository owning the resource.
    pub(crate) repository: String,
    /// Volume name or commit identifier.
    pub(crate) name: String,
}

/// Arguments for `opwatch push` and `opwatch pull`.
#[derive(Debug, Parser)]
pub(crate) struct TransferCommand {
    /// Repository owning the commit.
    pub(crate) repository: String,
    /// Remote to transfer to or from.
    pub(crate) remote: String,
    /// Commit to transfer.
    pub(crate) commit: String,
    /// Remote provider (for example `nop`, `ssh`, `s3`).
    #[arg(long, default_value = "nop")]
    pub(crate) provider: String,
    /// Provider property as KEY=VALUE; repeatable. Values that parse as
    /// JSON (numbers, booleans) are sent as such.
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub(crate) properties: Vec<(String, String)>,
    /// Transfer only descriptive tags, not data.
    #[arg(long)]
    pub(crate) metadata_only: bool,
    /// Print the operation id and return without waiting.
    #[arg(long)]
    pub(crate) detach: bool,
    /// Exit successfully when the operation is aborted.
    #[arg(long)]
    pub(crate) allow_abort: bool,
}

/// Arguments for `opwatch track`.
#[derive(Debug, Parser)]
pub(crate) struct TrackCommand {
    /// Repository owning the operation.
    pub(crate) repository: String,
    /// Operation identifier.
    pub(crate) operation: String,
    /// Exit successfully when the operation is aborted.
    #[arg(long)]
    pub(crate) allow_abort: bool,
}

/// Arguments for `opwatch abort`.
#[derive(Debug, Parser)]
pub(crate) struct OperationCommand {
    /// Repository owning the operation.
    pub(crate) repository: String,
    /// Operation identifier.
    pub(crate) operation: String,
}

/// Arguments for `opwatch operations`.
#[derive(Debug, Parser)]
pub(crate) struct RepositoryCommand {
    /// Repository to list.
    pub(crate) repository: String,
}

/// Splits a `KEY=VALUE` provider property.
pub(crate) fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
