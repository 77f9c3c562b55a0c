//! Provisioning of the server under test.
//!
//! [`Provisioner`] is the narrow interface the readiness waits need from
//! whatever brings the server up. [`DockerProvisioner`] runs the server as a
//! detached container through the `docker` CLI and doubles as the
//! [`DiagnosticSource`] consulted when a boot wait times out.
//! [`ContainerLogs`] reads the logs of any other named container, such as the
//! SSH server a remote endpoint wait targets.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{info, warn};

use crate::command::{CommandError, CommandOutput, CommandRunner, args};
use crate::config::EnvironmentConfig;
use crate::poller::{DiagnosticError, DiagnosticFuture, DiagnosticSource};

/// Future returned by provisioning operations.
pub type ProvisionFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProvisionError>> + Send + 'a>>;

/// Errors raised while starting or stopping the environment.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// An underlying command failed.
    #[error("{action} failed: {source}")]
    Command {
        /// Provisioning step that failed.
        action: String,
        /// Command error.
        #[source]
        source: CommandError,
    },
}

/// Brings the server under test up and down.
pub trait Provisioner: Send + Sync {
    /// Starts the server.
    fn start(&self) -> ProvisionFuture<'_, ()>;

    /// Stops the server and removes its data. With `force`, individual
    /// failures are logged and skipped.
    fn stop(&self, force: bool) -> ProvisionFuture<'_, ()>;

    /// Restarts the running server in place, keeping its data.
    fn restart(&self) -> ProvisionFuture<'_, ()>;

    /// Returns `true` while the server process is running.
    fn is_reachable(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// [`Provisioner`] backed by the Docker CLI.
#[derive(Clone, Debug)]
pub struct DockerProvisioner<R: CommandRunner> {
    config: EnvironmentConfig,
    runner: R,
}

impl<R> DockerProvisioner<R>
where
    R: CommandRunner + Send + Sync,
{
    /// Creates a provisioner for the configured identity.
    #[must_use]
    pub const fn new(config: EnvironmentConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Environment settings in use.
    #[must_use]
    pub const fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    fn docker(&self, action: &str, arguments: Vec<OsString>) -> Result<CommandOutput, ProvisionError> {
        let program = self.config.docker_bin.as_str();
        self.runner
            .run(program, &arguments)
            .and_then(|output| output.require_success(program))
            .map_err(|source| ProvisionError::Command {
                action: action.to_owned(),
                source,
            })
    }

    fn start_blocking(&self) -> Result<(), ProvisionError> {
        let container = self.config.server_container();
        let volume = self.config.data_volume();
        self.docker("create data volume", args(["volume", "create", volume.as_str()]))?;
        let mount = format!("{volume}:/var/lib/{}", self.config.identity);
        let publish = format!("{}:5001", self.config.port);
        self.docker(
            "start server container",
            args([
                "run",
                "-d",
                "--restart",
                "always",
                "--name",
                container.as_str(),
                "-v",
                mount.as_str(),
                "-p",
                publish.as_str(),
                self.config.image.as_str(),
            ]),
        )?;
        info!(container = %container, image = %self.config.image, "server container started");
        Ok(())
    }

    fn stop_blocking(&self, force: bool) -> Result<(), ProvisionError> {
        let container = self.config.server_container();
        let volume = self.config.data_volume();
        let steps = [
            ("remove server container", args(["rm", "-f", container.as_str()])),
            ("remove data volume", args(["volume", "rm", volume.as_str()])),
        ];
        for (action, arguments) in steps {
            match self.docker(action, arguments) {
                Ok(_) => {}
                Err(err) if force => warn!(error = %err, "ignoring teardown failure"),
                Err(err) => return Err(err),
            }
        }
        info!(container = %container, "server container stopped");
        Ok(())
    }

    fn restart_blocking(&self) -> Result<(), ProvisionError> {
        let container = self.config.server_container();
        self.docker("restart server container", args(["restart", container.as_str()]))?;
        info!(container = %container, "server container restarted");
        Ok(())
    }

    fn running(&self) -> bool {
        let container = self.config.server_container();
        self.docker(
            "inspect server container",
            args(["inspect", "-f", "{{.State.Running}}", container.as_str()]),
        )
        .is_ok_and(|output| output.stdout.trim() == "true")
    }

    fn logs(&self) -> Result<String, DiagnosticError> {
        let container = self.config.server_container();
        read_logs(&self.runner, &self.config.docker_bin, &container)
    }
}

impl<R> Provisioner for DockerProvisioner<R>
where
    R: CommandRunner + Send + Sync,
{
    fn start(&self) -> ProvisionFuture<'_, ()> {
        Box::pin(async move { self.start_blocking() })
    }

    fn stop(&self, force: bool) -> ProvisionFuture<'_, ()> {
        Box::pin(async move { self.stop_blocking(force) })
    }

    fn restart(&self) -> ProvisionFuture<'_, ()> {
        Box::pin(async move { self.restart_blocking() })
    }

    fn is_reachable(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.running() })
    }
}

impl<R> DiagnosticSource for DockerProvisioner<R>
where
    R: CommandRunner + Send + Sync,
{
    fn collect(&self) -> DiagnosticFuture<'_> {
        Box::pin(async move { self.logs() })
    }
}

/// [`DiagnosticSource`] that reads `docker logs` for a named container.
#[derive(Clone, Debug)]
pub struct ContainerLogs<R: CommandRunner> {
    docker_bin: String,
    container: String,
    runner: R,
}

impl<R> ContainerLogs<R>
where
    R: CommandRunner + Send + Sync,
{
    /// Creates a log source for `container`, invoking `docker_bin`.
    #[must_use]
    pub fn new(docker_bin: impl Into<String>, container: impl Into<String>, runner: R) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            container: container.into(),
            runner,
        }
    }
}

impl<R> DiagnosticSource for ContainerLogs<R>
where
    R: CommandRunner + Send + Sync,
{
    fn collect(&self) -> DiagnosticFuture<'_> {
        Box::pin(async move { read_logs(&self.runner, &self.docker_bin, &self.container) })
    }
}

/// Runs `docker logs` for `container`, joining its stdout and stderr.
fn read_logs<R: CommandRunner>(
    runner: &R,
    docker_bin: &str,
    container: &str,
) -> Result<String, DiagnosticError> {
    let output = runner
        .run(docker_bin, &args(["logs", container]))
        .and_then(|output| output.require_success(docker_bin))
        .map_err(|err| DiagnosticError::new(format!("read logs of {container} failed: {err}")))?;
    let mut text = output.stdout;
    if !output.stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&output.stderr);
    }
    Ok(text)
}
