//! Bounded-retry readiness polling.
//!
//! [`ReadinessPoller`] repeatedly invokes a [`Probe`] until it reports
//! [`ProbeOutcome::Ready`], a [`ProbeOutcome::Fatal`] condition, or the
//! attempt budget in its [`PollPolicy`] runs out. Probes own all I/O and are
//! the only place where failures are classified as transient or fatal; the
//! poller itself only counts, sleeps, and gathers diagnostics on timeout.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Future returned by a single probe invocation.
pub type ProbeFuture<'a, T, E> = Pin<Box<dyn Future<Output = ProbeOutcome<T, E>> + Send + 'a>>;

/// Future returned by a [`DiagnosticSource`].
pub type DiagnosticFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, DiagnosticError>> + Send + 'a>>;

/// Result of a single readiness check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProbeOutcome<T, E> {
    /// The dependency is usable; polling stops and yields the value.
    Ready(T),
    /// The dependency is not usable yet; polling continues.
    NotReady,
    /// Retrying cannot succeed; polling stops immediately.
    Fatal(E),
}

/// A single readiness check, invoked once per attempt.
pub trait Probe: Send {
    /// Value produced once the dependency is ready.
    type Ready;
    /// Error reported for fatal conditions.
    type Error;

    /// Performs one check.
    fn probe(&mut self) -> ProbeFuture<'_, Self::Ready, Self::Error>;
}

/// Adapts a closure returning a future into a [`Probe`].
pub struct FnProbe<F> {
    probe: F,
}

impl<F> fmt::Debug for FnProbe<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProbe").finish_non_exhaustive()
    }
}

/// Wraps `probe` so it can be handed to [`ReadinessPoller::wait`].
#[must_use]
pub const fn probe_fn<F>(probe: F) -> FnProbe<F> {
    FnProbe { probe }
}

impl<F, Fut, T, E> Probe for FnProbe<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ProbeOutcome<T, E>> + Send + 'static,
{
    type Ready = T;
    type Error = E;

    fn probe(&mut self) -> ProbeFuture<'_, T, E> {
        Box::pin((self.probe)())
    }
}

/// Delay and attempt ceiling for one wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Fixed delay between consecutive probe invocations.
    pub interval: Duration,
    /// Maximum number of probe invocations; `None` polls until the caller
    /// drops the future. At least one attempt is always made, so `Some(0)`
    /// behaves like `Some(1)`.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// Service and SSH boot: one attempt per second for a minute.
    pub const SERVICE_BOOT: Self = Self::bounded(Duration::from_secs(1), 60);
    /// Volume and commit readiness: one attempt per second, no ceiling.
    pub const RESOURCE: Self = Self::unbounded(Duration::from_secs(1));
    /// Operation status: every 500 ms, no ceiling.
    pub const OPERATION: Self = Self::unbounded(Duration::from_millis(500));

    /// Creates a policy that gives up after `max_attempts` probes.
    ///
    /// A ceiling of zero still makes one attempt before timing out.
    /// Configuration validation rejects zero, so only direct callers can ask
    /// for it.
    #[must_use]
    pub const fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    /// Creates a policy without an attempt ceiling.
    #[must_use]
    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    const fn exhausted(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts >= max,
            None => false,
        }
    }
}

/// Raised when diagnostic context cannot be collected.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("diagnostics unavailable: {message}")]
pub struct DiagnosticError {
    /// Description of what went wrong.
    pub message: String,
}

impl DiagnosticError {
    /// Creates a new error from any displayable cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Supplies context (typically recent log output) attached to timeouts.
pub trait DiagnosticSource: Send + Sync {
    /// Collects diagnostic text for the thing being waited on.
    fn collect(&self) -> DiagnosticFuture<'_>;
}

/// Errors returned by [`ReadinessPoller::wait`].
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// The attempt ceiling was reached while the probe still reported not
    /// ready.
    #[error(
        "timed out waiting for {action} after {attempts} attempts{}",
        diagnostics_suffix(.diagnostics.as_deref())
    )]
    Timeout {
        /// Name of the wait that timed out.
        action: String,
        /// Number of probe invocations performed.
        attempts: u32,
        /// Best-effort diagnostic output, when available.
        diagnostics: Option<String>,
    },
    /// The probe reported a condition that retries cannot fix.
    #[error("{action} failed: {source}")]
    Fatal {
        /// Name of the wait that failed.
        action: String,
        /// Error reported by the probe.
        #[source]
        source: E,
    },
}

impl<E> PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the fatal probe error, if this is not a timeout.
    #[must_use]
    pub const fn fatal(&self) -> Option<&E> {
        match self {
            Self::Fatal { source, .. } => Some(source),
            Self::Timeout { .. } => None,
        }
    }

    /// Returns `true` when the wait ran out of attempts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn diagnostics_suffix(diagnostics: Option<&str>) -> String {
    match diagnostics {
        Some(text) if !text.trim().is_empty() => format!("; recent output:\n{}", text.trim_end()),
        _ => String::new(),
    }
}

/// Generic bounded-retry loop shared by every wait in the crate.
#[derive(Clone)]
pub struct ReadinessPoller {
    policy: PollPolicy,
    diagnostics: Option<Arc<dyn DiagnosticSource>>,
}

impl fmt::Debug for ReadinessPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessPoller")
            .field("policy", &self.policy)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

impl ReadinessPoller {
    /// Creates a poller with the given policy and no diagnostic source.
    #[must_use]
    pub const fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            diagnostics: None,
        }
    }

    /// Attaches a source consulted when the wait times out.
    #[must_use]
    pub fn with_diagnostics(mut self, source: Arc<dyn DiagnosticSource>) -> Self {
        self.diagnostics = Some(source);
        self
    }

    /// Returns the policy used by this poller.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Invokes `probe` until it is ready, fatal, or the budget is spent.
    ///
    /// The poller never sleeps after the final attempt or before returning a
    /// fatal outcome, so a probe that is fatal on its first call costs exactly
    /// one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Fatal`] as soon as the probe reports a fatal
    /// condition and [`PollError::Timeout`] once `max_attempts` probes have
    /// reported not ready.
    pub async fn wait<P>(
        &self,
        action: &str,
        probe: &mut P,
    ) -> Result<P::Ready, PollError<P::Error>>
    where
        P: Probe,
        P::Error: std::error::Error + 'static,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match probe.probe().await {
                ProbeOutcome::Ready(value) => {
                    info!(action, attempts, "ready");
                    return Ok(value);
                }
                ProbeOutcome::Fatal(source) => {
                    warn!(action, attempts, error = %source, "fatal probe outcome");
                    return Err(PollError::Fatal {
                        action: action.to_owned(),
                        source,
                    });
                }
                ProbeOutcome::NotReady => {
                    debug!(action, attempts, "not ready");
                }
            }

            if self.policy.exhausted(attempts) {
                let diagnostics = self.collect_diagnostics(action).await;
                return Err(PollError::Timeout {
                    action: action.to_owned(),
                    attempts,
                    diagnostics,
                });
            }

            sleep(self.policy.interval).await;
        }
    }

    async fn collect_diagnostics(&self, action: &str) -> Option<String> {
        let source = self.diagnostics.as_ref()?;
        match source.collect().await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(action, error = %err, "could not collect diagnostics");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
