//! Shared fixtures and helpers for operation tracking scenarios.

use std::time::Duration;

use opwatch::test_support::ScriptedApi;
use opwatch::{Completion, OperationHandle, PollPolicy};
use rstest::fixture;

/// Poll policy that keeps scenarios fast.
pub const FAST: PollPolicy = PollPolicy::unbounded(Duration::from_millis(1));

#[derive(Clone, Debug)]
pub enum TrackResult {
    Finished(Completion),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct OperationsContext {
    pub api: ScriptedApi,
    pub handle: Option<OperationHandle>,
    pub outcome: Option<TrackResult>,
    pub abort: Option<Result<(), String>>,
}

#[fixture]
pub fn operations_context() -> OperationsContext {
    OperationsContext {
        api: ScriptedApi::new(),
        handle: None,
        outcome: None,
        abort: None,
    }
}
