//! Binary entry point for the opwatch CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use opwatch::{
    ApiError, Completion, ConfigError, ContainerLogs, DockerProvisioner, DomainApi, EnvironmentConfig,
    HttpDomainApi, Operation, OperationHandle, OperationKind, OperationRequest, OperationTracker,
    Outcome, ProcessCommandRunner, ProgressEntry, ProgressKind, ReadinessPoller,
    RemoteParameters, ResourceRef, TrackerError, WatchConfig, wait_for_resource,
    wait_for_service, wait_for_ssh,
};

mod cli;

use cli::{
    Cli, OperationCommand, RepositoryCommand, ResourceCommand, TrackCommand, TransferCommand,
    WaitServerCommand, WaitSshCommand,
};

const EXIT_FAILURE: i32 = 1;
const EXIT_ABORTED: i32 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Wait(String),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            EXIT_FAILURE
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config = WatchConfig::load_without_cli_args()?;
    config.validate()?;
    match cli {
        Cli::WaitServer(command) => wait_server(&config, &command).await,
        Cli::WaitSsh(command) => wait_ssh(&config, &command).await,
        Cli::WaitVolume(command) => {
            let resource = ResourceRef::volume(command.repository.clone(), command.name.clone());
            wait_resource(&config, &command, resource).await
        }
        Cli::WaitCommit(command) => {
            let resource = ResourceRef::commit(command.repository.clone(), command.name.clone());
            wait_resource(&config, &command, resource).await
        }
        Cli::Push(command) => transfer(&config, OperationKind::Push, &command).await,
        Cli::Pull(command) => transfer(&config, OperationKind::Pull, &command).await,
        Cli::Track(command) => track(&config, &command).await,
        Cli::Abort(command) => abort(&config, &command).await,
        Cli::Operations(command) => list_operations(&config, &command).await,
    }
}

fn api_client(config: &WatchConfig) -> Result<HttpDomainApi, CliError> {
    Ok(HttpDomainApi::new(
        config.server_url.as_str(),
        config.http_timeout(),
    )?)
}

async fn wait_server(config: &WatchConfig, command: &WaitServerCommand) -> Result<i32, CliError> {
    let api = api_client(config)?;
    let mut poller = ReadinessPoller::new(config.service_policy());
    if command.container_logs {
        let environment = EnvironmentConfig::load_without_cli_args()?;
        environment.validate()?;
        poller = poller.with_diagnostics(Arc::new(DockerProvisioner::new(
            environment,
            ProcessCommandRunner,
        )));
    }
    wait_for_service(&api, &poller)
        .await
        .map_err(|err| CliError::Wait(err.to_string()))?;
    writeln!(io::stdout(), "server ready at {}", api.base_url()).ok();
    Ok(0)
}

async fn wait_ssh(config: &WatchConfig, command: &WaitSshCommand) -> Result<i32, CliError> {
    let mut poller = ReadinessPoller::new(config.service_policy());
    if let Some(container) = &command.container_logs {
        let environment = EnvironmentConfig::load_without_cli_args()?;
        environment.validate()?;
        poller = poller.with_diagnostics(Arc::new(ContainerLogs::new(
            environment.docker_bin,
            container.as_str(),
            ProcessCommandRunner,
        )));
    }
    let banner = wait_for_ssh(
        &command.host,
        command.port,
        config.ssh_connect_timeout(),
        &poller,
    )
    .await
    .map_err(|err| CliError::Wait(err.to_string()))?;
    writeln!(io::stdout(), "{banner}").ok();
    Ok(0)
}

async fn wait_resource(
    config: &WatchConfig,
    command: &ResourceCommand,
    resource: ResourceRef,
) -> Result<i32, CliError> {
    let api = api_client(config)?;
    let poller = ReadinessPoller::new(config.resource_policy());
    let label = resource.to_string();
    wait_for_resource(&api, resource, &poller)
        .await
        .map_err(|err| CliError::Wait(err.to_string()))?;
    writeln!(io::stdout(), "{label} ready in {}", command.repository).ok();
    Ok(0)
}

fn remote_parameters(command: &TransferCommand) -> RemoteParameters {
    command
        .properties
        .iter()
        .fold(RemoteParameters::new(command.provider.as_str()), |params, (key, value)| {
            let parsed = serde_json::from_str::<serde_json::Value>(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            params.property(key.as_str(), parsed)
        })
}

async fn transfer(
    config: &WatchConfig,
    kind: OperationKind,
    command: &TransferCommand,
) -> Result<i32, CliError> {
    let api = api_client(config)?;
    let request = OperationRequest::new(
        kind,
        command.repository.as_str(),
        command.remote.as_str(),
        command.commit.as_str(),
        remote_parameters(command),
    )
    .metadata_only(command.metadata_only);

    if command.detach {
        let operation = api.start_operation(&request).await?;
        writeln!(io::stdout(), "{}", operation.id).ok();
        return Ok(0);
    }

    let mut tracker = OperationTracker::start(&api, &request)
        .await?
        .with_policy(config.operation_policy());
    let completion = tracker.await_completion_with(print_entry).await?;
    Ok(completion_exit_code(&completion, command.allow_abort))
}

async fn track(config: &WatchConfig, command: &TrackCommand) -> Result<i32, CliError> {
    let api = api_client(config)?;
    let handle = OperationHandle::new(command.repository.as_str(), command.operation.as_str());
    let mut tracker =
        OperationTracker::new(&api, handle).with_policy(config.operation_policy());
    let completion = tracker.await_completion_with(print_entry).await?;
    Ok(completion_exit_code(&completion, command.allow_abort))
}

async fn abort(config: &WatchConfig, command: &OperationCommand) -> Result<i32, CliError> {
    let api = api_client(config)?;
    let handle = OperationHandle::new(command.repository.as_str(), command.operation.as_str());
    OperationTracker::new(&api, handle.clone()).abort().await?;
    writeln!(io::stdout(), "abort requested for {handle}").ok();
    Ok(0)
}

async fn list_operations(config: &WatchConfig, command: &RepositoryCommand) -> Result<i32, CliError> {
    let api = api_client(config)?;
    let operations = api.list_operations(&command.repository).await?;
    let mut stdout = io::stdout();
    for operation in &operations {
        writeln!(stdout, "{}", render_operation(operation)).ok();
    }
    Ok(0)
}

fn print_entry(entry: &ProgressEntry) {
    writeln!(io::stdout(), "{}", render_entry(entry)).ok();
}

fn render_entry(entry: &ProgressEntry) -> String {
    match (&entry.kind, entry.message.as_deref(), entry.percent) {
        (ProgressKind::Message, Some(message), _) => message.to_owned(),
        (_, Some(message), Some(percent)) => format!("{}: {message} ({percent}%)", entry.kind),
        (_, Some(message), None) => format!("{}: {message}", entry.kind),
        (_, None, Some(percent)) => format!("{}: {percent}%", entry.kind),
        (_, None, None) => entry.kind.to_string(),
    }
}

fn render_operation(operation: &Operation) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        operation.id, operation.kind, operation.state, operation.remote, operation.commit_id
    )
}

const fn completion_exit_code(completion: &Completion, allow_abort: bool) -> i32 {
    match completion.outcome {
        Outcome::Complete => 0,
        Outcome::Aborted { .. } if allow_abort => 0,
        Outcome::Aborted { .. } => EXIT_ABORTED,
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
