//! Shared fixtures for readiness scenarios.

use opwatch::test_support::ScriptedApi;
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct ReadinessContext {
    pub api: ScriptedApi,
    pub outcome: Option<Result<(), String>>,
}

#[fixture]
pub fn readiness_context() -> ReadinessContext {
    ReadinessContext {
        api: ScriptedApi::new().with_repository("repo"),
        outcome: None,
    }
}
