//! Tests for the bounded-retry readiness poller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rstest::rstest;
use thiserror::Error;

use super::{
    DiagnosticError, DiagnosticFuture, DiagnosticSource, PollError, PollPolicy, Probe,
    ProbeFuture, ProbeOutcome, ReadinessPoller, probe_fn,
};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("probe exploded: {0}")]
struct ProbeError(String);

/// Probe double that reports not ready a fixed number of times.
#[derive(Debug)]
struct CountingProbe {
    calls: u32,
    ready_after: Option<u32>,
    fatal: Option<ProbeError>,
}

impl CountingProbe {
    const fn never_ready() -> Self {
        Self {
            calls: 0,
            ready_after: None,
            fatal: None,
        }
    }

    const fn ready_after(calls: u32) -> Self {
        Self {
            calls: 0,
            ready_after: Some(calls),
            fatal: None,
        }
    }

    fn fatal(message: &str) -> Self {
        Self {
            calls: 0,
            ready_after: None,
            fatal: Some(ProbeError(message.to_owned())),
        }
    }
}

impl Probe for CountingProbe {
    type Ready = u32;
    type Error = ProbeError;

    fn probe(&mut self) -> ProbeFuture<'_, u32, ProbeError> {
        Box::pin(async move {
            self.calls += 1;
            if let Some(err) = self.fatal.clone() {
                return ProbeOutcome::Fatal(err);
            }
            match self.ready_after {
                Some(limit) if self.calls >= limit => ProbeOutcome::Ready(self.calls),
                _ => ProbeOutcome::NotReady,
            }
        })
    }
}

struct StaticLogs(Result<String, DiagnosticError>);

impl DiagnosticSource for StaticLogs {
    fn collect(&self) -> DiagnosticFuture<'_> {
        let result = self.0.clone();
        Box::pin(async move { result })
    }
}

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::bounded(Duration::from_millis(1), max_attempts)
}

#[tokio::test]
async fn wait_returns_value_once_probe_is_ready() {
    let poller = ReadinessPoller::new(fast_policy(10));
    let mut probe = CountingProbe::ready_after(3);

    let value = poller
        .wait("service", &mut probe)
        .await
        .unwrap_or_else(|err| panic!("probe should become ready: {err}"));

    assert_eq!(value, 3);
    assert_eq!(probe.calls, 3);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(7)]
#[tokio::test]
async fn wait_respects_attempt_ceiling(#[case] max_attempts: u32) {
    let poller = ReadinessPoller::new(fast_policy(max_attempts));
    let mut probe = CountingProbe::never_ready();

    let err = poller
        .wait("service", &mut probe)
        .await
        .expect_err("probe never becomes ready");

    assert!(
        matches!(err, PollError::Timeout { attempts, .. } if attempts == max_attempts),
        "unexpected outcome: {err:?}"
    );
    assert_eq!(probe.calls, max_attempts);
}

#[tokio::test]
async fn zero_ceiling_still_makes_one_attempt() {
    let poller = ReadinessPoller::new(fast_policy(0));
    let mut probe = CountingProbe::never_ready();

    let err = poller
        .wait("service", &mut probe)
        .await
        .expect_err("probe never becomes ready");

    assert!(
        matches!(err, PollError::Timeout { attempts: 1, .. }),
        "unexpected outcome: {err:?}"
    );
    assert_eq!(probe.calls, 1);
}

#[tokio::test]
async fn fatal_outcome_short_circuits_without_sleeping() {
    let poller = ReadinessPoller::new(PollPolicy::bounded(Duration::from_secs(30), 60));
    let mut probe = CountingProbe::fatal("no such object");
    let started = Instant::now();

    let err = poller
        .wait("volume", &mut probe)
        .await
        .expect_err("fatal probe should fail");

    assert_eq!(probe.calls, 1);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "fatal outcome should not wait for the poll interval"
    );
    assert_eq!(
        err.fatal(),
        Some(&ProbeError(String::from("no such object")))
    );
    assert_eq!(err.to_string(), "volume failed: probe exploded: no such object");
}

#[tokio::test]
async fn timeout_attaches_diagnostics() {
    let poller = ReadinessPoller::new(fast_policy(2)).with_diagnostics(Arc::new(StaticLogs(
        Ok(String::from("listening on :5001\n")),
    )));
    let mut probe = CountingProbe::never_ready();

    let err = poller
        .wait("server start", &mut probe)
        .await
        .expect_err("probe never becomes ready");

    let PollError::Timeout {
        ref diagnostics, ..
    } = err
    else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(diagnostics.as_deref(), Some("listening on :5001\n"));
    let rendered = err.to_string();
    assert!(
        rendered.contains("after 2 attempts") && rendered.contains("listening on :5001"),
        "rendered: {rendered}"
    );
}

#[tokio::test]
async fn failing_diagnostics_do_not_mask_timeout() {
    let poller = ReadinessPoller::new(fast_policy(1)).with_diagnostics(Arc::new(StaticLogs(
        Err(DiagnosticError::new("no such container")),
    )));
    let mut probe = CountingProbe::never_ready();

    let err = poller
        .wait("server start", &mut probe)
        .await
        .expect_err("probe never becomes ready");

    assert!(
        matches!(
            err,
            PollError::Timeout {
                attempts: 1,
                diagnostics: None,
                ..
            }
        ),
        "unexpected outcome: {err:?}"
    );
    assert_eq!(
        err.to_string(),
        "timed out waiting for server start after 1 attempts"
    );
}

#[tokio::test]
async fn closure_probes_are_supported() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let mut probe = probe_fn(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt == 2 {
                ProbeOutcome::<&'static str, ProbeError>::Ready("up")
            } else {
                ProbeOutcome::NotReady
            }
        }
    });

    let value = ReadinessPoller::new(fast_policy(5))
        .wait("closure", &mut probe)
        .await
        .unwrap_or_else(|err| panic!("closure probe should succeed: {err}"));

    assert_eq!(value, "up");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn default_policies_match_observed_budgets() {
    assert_eq!(
        PollPolicy::SERVICE_BOOT,
        PollPolicy::bounded(Duration::from_secs(1), 60)
    );
    assert_eq!(PollPolicy::RESOURCE.max_attempts, None);
    assert_eq!(PollPolicy::OPERATION.interval, Duration::from_millis(500));
}
