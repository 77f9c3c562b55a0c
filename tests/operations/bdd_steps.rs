//! BDD step definitions for operation tracking.

use opwatch::test_support::Step;
use opwatch::{
    DomainApi, OperationKind, OperationRequest, OperationTracker, Outcome, ProgressKind,
    RemoteParameters, TrackerError,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{FAST, OperationsContext, TrackResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn track_result(result: Result<opwatch::Completion, TrackerError>) -> TrackResult {
    match result {
        Ok(completion) => TrackResult::Finished(completion),
        Err(err) => TrackResult::Failure(err.to_string()),
    }
}

#[given("a server with repository \"{repository}\"")]
fn server_with_repository(
    mut operations_context: OperationsContext,
    repository: String,
) -> OperationsContext {
    operations_context.api = operations_context.api.with_repository(repository.trim());
    operations_context
}

#[given(
    "a pull of commit \"{commit}\" from remote \"{remote}\" delayed by {delay:u64} seconds is running"
)]
fn slow_pull_running(
    mut operations_context: OperationsContext,
    commit: String,
    remote: String,
    delay: u64,
) -> Result<OperationsContext, StepError> {
    let request = OperationRequest::new(
        OperationKind::Pull,
        "repo",
        remote.as_str(),
        commit.as_str(),
        RemoteParameters::new("nop").delay_secs(delay),
    );
    let api = operations_context.api.clone();
    let operation = runtime()?
        .block_on(async move { api.start_operation(&request).await })
        .map_err(|err| StepError::Assertion(format!("start failed: {err}")))?;
    operations_context.handle = Some(opwatch::OperationHandle::new("repo", operation.id));
    Ok(operations_context)
}

#[given("an operation \"{operation}\" that fails with \"{message}\"")]
fn failing_operation(
    operations_context: OperationsContext,
    operation: String,
    message: String,
) -> OperationsContext {
    operations_context.api.insert_operation(
        "repo",
        operation.trim(),
        OperationKind::Push,
        [
            Step::Entry(ProgressKind::Message, Some(String::from("copying"))),
            Step::Finish(ProgressKind::Failed, Some(message)),
        ],
    );
    operations_context
}

#[when("I push commit \"{commit}\" to remote \"{remote}\" and wait")]
fn push_and_wait(
    mut operations_context: OperationsContext,
    commit: String,
    remote: String,
) -> Result<OperationsContext, StepError> {
    let request = OperationRequest::new(
        OperationKind::Push,
        "repo",
        remote.as_str(),
        commit.as_str(),
        RemoteParameters::new("nop"),
    );
    let api = operations_context.api.clone();
    let (handle, result) = runtime()?.block_on(async move {
        match OperationTracker::start(&api, &request).await {
            Ok(tracker) => {
                let mut tracker = tracker.with_policy(FAST);
                let result = tracker.await_completion().await;
                (Some(tracker.handle().clone()), result)
            }
            Err(err) => (None, Err(err)),
        }
    });
    operations_context.handle = handle;
    operations_context.outcome = Some(track_result(result));
    Ok(operations_context)
}

#[when("I abort the operation and wait")]
fn abort_and_wait(mut operations_context: OperationsContext) -> Result<OperationsContext, StepError> {
    let handle = started_handle(&operations_context)?;
    let api = operations_context.api.clone();
    let result = runtime()?.block_on(async move {
        let mut tracker = OperationTracker::new(&api, handle).with_policy(FAST);
        tracker.abort().await?;
        tracker.await_completion().await
    });
    operations_context.outcome = Some(track_result(result));
    Ok(operations_context)
}

#[when("I push commit \"{commit}\" to remote \"{remote}\", wait, then abort it")]
fn push_wait_then_abort(
    mut operations_context: OperationsContext,
    commit: String,
    remote: String,
) -> Result<OperationsContext, StepError> {
    let request = OperationRequest::new(
        OperationKind::Push,
        "repo",
        remote.as_str(),
        commit.as_str(),
        RemoteParameters::new("nop"),
    );
    let api = operations_context.api.clone();
    let (result, abort) = runtime()?.block_on(async move {
        let mut tracker = match OperationTracker::start(&api, &request).await {
            Ok(tracker) => tracker.with_policy(FAST),
            Err(err) => return (Err(err), None),
        };
        let result = tracker.await_completion().await;
        let abort = tracker.abort().await.map_err(|err| err.to_string());
        (result, Some(abort))
    });
    operations_context.outcome = Some(track_result(result));
    operations_context.abort = abort;
    Ok(operations_context)
}

fn started_handle(
    operations_context: &OperationsContext,
) -> Result<opwatch::OperationHandle, StepError> {
    operations_context
        .handle
        .clone()
        .ok_or_else(|| StepError::Assertion(String::from("no operation was started")))
}

#[when("I abort the operation from a new tracker")]
fn abort_from_new_tracker(
    mut operations_context: OperationsContext,
) -> Result<OperationsContext, StepError> {
    let handle = started_handle(&operations_context)?;
    let api = operations_context.api.clone();
    let abort = runtime()?.block_on(async move {
        OperationTracker::new(&api, handle)
            .abort()
            .await
            .map_err(|err| err.to_string())
    });
    operations_context.abort = Some(abort);
    Ok(operations_context)
}

#[when("I track the same operation again")]
fn track_again(mut operations_context: OperationsContext) -> Result<OperationsContext, StepError> {
    let handle = started_handle(&operations_context)?;
    let api = operations_context.api.clone();
    let result = runtime()?.block_on(async move {
        OperationTracker::new(&api, handle)
            .with_policy(FAST)
            .await_completion()
            .await
    });
    operations_context.outcome = Some(track_result(result));
    Ok(operations_context)
}

#[when("I track operation \"{operation}\"")]
fn track_operation(
    mut operations_context: OperationsContext,
    operation: String,
) -> Result<OperationsContext, StepError> {
    let handle = opwatch::OperationHandle::new("repo", operation.trim());
    let api = operations_context.api.clone();
    let tracked = handle.clone();
    let result = runtime()?.block_on(async move {
        OperationTracker::new(&api, tracked)
            .with_policy(FAST)
            .await_completion()
            .await
    });
    operations_context.handle = Some(handle);
    operations_context.outcome = Some(track_result(result));
    Ok(operations_context)
}

fn completion(operations_context: &OperationsContext) -> Result<&opwatch::Completion, StepError> {
    match operations_context.outcome.as_ref() {
        Some(TrackResult::Finished(completion)) => Ok(completion),
        other => Err(StepError::Assertion(format!(
            "expected a finished operation, got {other:?}"
        ))),
    }
}

#[then("the operation completes")]
fn operation_completes(operations_context: &OperationsContext) -> Result<(), StepError> {
    let done = completion(operations_context)?;
    if done.outcome == Outcome::Complete {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected completion, got {:?}",
            done.outcome
        )))
    }
}

#[then("the progress messages include \"{message}\"")]
fn messages_include(
    operations_context: &OperationsContext,
    message: String,
) -> Result<(), StepError> {
    let done = completion(operations_context)?;
    if done.messages().any(|text| text == message) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "missing message '{message}' in {:?}",
            done.messages().collect::<Vec<_>>()
        )))
    }
}

#[then("the operation is aborted with \"{message}\"")]
fn operation_aborted(
    operations_context: &OperationsContext,
    message: String,
) -> Result<(), StepError> {
    let done = completion(operations_context)?;
    match &done.outcome {
        Outcome::Aborted { message: actual } if *actual == message => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected abort with '{message}', got {other:?}"
        ))),
    }
}

#[then("tracking fails with \"{message}\"")]
fn tracking_fails(
    operations_context: &OperationsContext,
    message: String,
) -> Result<(), StepError> {
    match operations_context.outcome.as_ref() {
        Some(TrackResult::Failure(text)) if text.ends_with(&format!("failed: {message}")) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure '{message}', got {other:?}"
        ))),
    }
}

#[then("the abort succeeds")]
fn abort_succeeds(operations_context: &OperationsContext) -> Result<(), StepError> {
    match operations_context.abort.as_ref() {
        Some(Ok(())) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a successful abort, got {other:?}"
        ))),
    }
}
