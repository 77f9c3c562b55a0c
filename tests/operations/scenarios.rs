//! BDD scenarios for operation tracking.

use rstest_bdd_macros::scenario;

use super::test_helpers::{OperationsContext, operations_context};

#[scenario(
    path = "tests/features/operations.feature",
    name = "Follow a push to completion"
)]
fn scenario_push_completes(operations_context: OperationsContext) {
    let _ = operations_context;
}

#[scenario(path = "tests/features/operations.feature", name = "Abort a slow pull")]
fn scenario_abort_slow_pull(operations_context: OperationsContext) {
    let _ = operations_context;
}

#[scenario(
    path = "tests/features/operations.feature",
    name = "Surface the server's failure message"
)]
fn scenario_failure_message(operations_context: OperationsContext) {
    let _ = operations_context;
}

#[scenario(
    path = "tests/features/operations.feature",
    name = "Aborting a finished operation is harmless"
)]
fn scenario_abort_after_completion(operations_context: OperationsContext) {
    let _ = operations_context;
}

#[scenario(
    path = "tests/features/operations.feature",
    name = "Aborting from a new session after the operation was reaped"
)]
fn scenario_abort_after_reaping(operations_context: OperationsContext) {
    let _ = operations_context;
}

#[scenario(
    path = "tests/features/operations.feature",
    name = "Tracking a reaped operation again reports its final state"
)]
fn scenario_track_after_reaping(operations_context: OperationsContext) {
    let _ = operations_context;
}
