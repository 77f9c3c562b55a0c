//! BDD scenarios for readiness waits.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ReadinessContext, readiness_context};

#[scenario(
    path = "tests/features/readiness.feature",
    name = "Wait for a server that refuses connections at first"
)]
fn scenario_server_recovers(readiness_context: ReadinessContext) {
    let _ = readiness_context;
}

#[scenario(
    path = "tests/features/readiness.feature",
    name = "Give up on a server that never answers"
)]
fn scenario_server_times_out(readiness_context: ReadinessContext) {
    let _ = readiness_context;
}

#[scenario(
    path = "tests/features/readiness.feature",
    name = "Wait for a volume to become ready"
)]
fn scenario_volume_ready(readiness_context: ReadinessContext) {
    let _ = readiness_context;
}

#[scenario(
    path = "tests/features/readiness.feature",
    name = "Stop waiting when a commit reports an error"
)]
fn scenario_commit_error(readiness_context: ReadinessContext) {
    let _ = readiness_context;
}
