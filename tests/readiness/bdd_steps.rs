//! BDD step definitions for readiness waits.

use std::time::Duration;

use opwatch::{
    PollPolicy, ReadinessPoller, ResourceRef, ResourceStatus, wait_for_resource,
    wait_for_service,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::ReadinessContext;

const INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn wait_on(
    mut readiness_context: ReadinessContext,
    resource: ResourceRef,
) -> Result<ReadinessContext, StepError> {
    let api = readiness_context.api.clone();
    let poller = ReadinessPoller::new(PollPolicy::bounded(INTERVAL, 10));
    let result = runtime()?.block_on(async move {
        wait_for_resource(&api, resource, &poller)
            .await
            .map(|_| ())
            .map_err(|err| err.to_string())
    });
    readiness_context.outcome = Some(result);
    Ok(readiness_context)
}

#[given("a server that refuses the first {count:u32} requests")]
fn refusing_server(readiness_context: ReadinessContext, count: u32) -> ReadinessContext {
    readiness_context.api.fail_list_repositories(count);
    readiness_context
}

#[given("volume \"{name}\" in repository \"{repository}\" becomes ready after {checks:usize} checks")]
fn volume_becomes_ready(
    readiness_context: ReadinessContext,
    name: String,
    repository: String,
    checks: usize,
) -> ReadinessContext {
    let mut answers = vec![Ok(ResourceStatus::new(false, "")); checks];
    answers.push(Ok(ResourceStatus::new(true, "")));
    readiness_context
        .api
        .script_status(ResourceRef::volume(repository.trim(), name.trim()), answers);
    readiness_context
}

#[given("commit \"{commit}\" in repository \"{repository}\" reports \"{message}\"")]
fn commit_reports_error(
    readiness_context: ReadinessContext,
    commit: String,
    repository: String,
    message: String,
) -> ReadinessContext {
    readiness_context.api.script_status(
        ResourceRef::commit(repository.trim(), commit.trim()),
        [Ok(ResourceStatus::new(false, message))],
    );
    readiness_context
}

#[when("I wait for the server with {attempts:u32} attempts")]
fn wait_for_server(
    mut readiness_context: ReadinessContext,
    attempts: u32,
) -> Result<ReadinessContext, StepError> {
    let api = readiness_context.api.clone();
    let poller = ReadinessPoller::new(PollPolicy::bounded(INTERVAL, attempts));
    let result = runtime()?.block_on(async move {
        wait_for_service(&api, &poller)
            .await
            .map_err(|err| err.to_string())
    });
    readiness_context.outcome = Some(result);
    Ok(readiness_context)
}

#[when("I wait for volume \"{name}\" in repository \"{repository}\"")]
fn wait_for_volume(
    readiness_context: ReadinessContext,
    name: String,
    repository: String,
) -> Result<ReadinessContext, StepError> {
    wait_on(
        readiness_context,
        ResourceRef::volume(repository.trim(), name.trim()),
    )
}

#[when("I wait for commit \"{commit}\" in repository \"{repository}\"")]
fn wait_for_commit(
    readiness_context: ReadinessContext,
    commit: String,
    repository: String,
) -> Result<ReadinessContext, StepError> {
    wait_on(
        readiness_context,
        ResourceRef::commit(repository.trim(), commit.trim()),
    )
}

#[then("the wait succeeds")]
fn wait_succeeds(readiness_context: &ReadinessContext) -> Result<(), StepError> {
    match readiness_context.outcome.as_ref() {
        Some(Ok(())) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected the wait to succeed, got {other:?}"
        ))),
    }
}

#[then("the wait fails with \"{message}\"")]
fn wait_fails(readiness_context: &ReadinessContext, message: String) -> Result<(), StepError> {
    match readiness_context.outcome.as_ref() {
        Some(Err(text)) if text.contains(&message) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a failure mentioning '{message}', got {other:?}"
        ))),
    }
}

#[then("the server was probed {count:u32} times")]
fn server_probed(readiness_context: &ReadinessContext, count: u32) -> Result<(), StepError> {
    let calls = readiness_context.api.calls("list_repositories");
    if calls == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} probes, got {calls}"
        )))
    }
}
