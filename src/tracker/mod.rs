//! Client side of the operation completion protocol.
//!
//! An [`OperationTracker`] follows one server-side operation. Each
//! [`OperationTracker::poll`] fetches the operation snapshot and the progress
//! entries past the tracker's cursor. [`OperationTracker::await_completion`]
//! repeats that on the operation poll policy until the log ends with a
//! terminal entry, or the operation reaches a terminal state without one,
//! and then classifies the outcome.
//!
//! Progress is delivered at most once per tracker: entries at or below the
//! cursor are dropped, and nothing is reported after the terminal entry.

use thiserror::Error;
use tracing::{debug, info};

use crate::api::{
    ApiError, DomainApi, Operation, OperationHandle, OperationRequest, OperationState,
    ProgressEntry, ProgressKind,
};
use crate::poller::{PollError, PollPolicy, Probe, ProbeFuture, ProbeOutcome, ReadinessPoller};

const DEFAULT_ABORT_MESSAGE: &str = "operation aborted";
const DEFAULT_FAILURE_MESSAGE: &str = "operation failed";

/// How a finished operation ended, when it did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The operation completed successfully.
    Complete,
    /// The operation was cancelled on request.
    Aborted {
        /// Message of the abort entry. When only the state showed the abort,
        /// the last logged message, or a default when there is none.
        message: String,
    },
}

/// Result of waiting for an operation that did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Completion {
    /// Operation that finished.
    pub handle: OperationHandle,
    /// Classified outcome.
    pub outcome: Outcome,
    /// Every entry observed while waiting, in arrival order.
    pub entries: Vec<ProgressEntry>,
}

impl Completion {
    /// Returns `true` when the operation was aborted.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.outcome, Outcome::Aborted { .. })
    }

    /// Returns the message text of each entry that carries one.
    pub fn messages(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.message.as_deref())
    }
}

/// Errors raised while tracking an operation.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The operation ended in failure.
    #[error("operation {handle} failed: {message}")]
    Failed {
        /// Operation that failed.
        handle: OperationHandle,
        /// Message of the failure entry, verbatim.
        message: String,
        /// Every entry observed while waiting, in arrival order.
        entries: Vec<ProgressEntry>,
    },
    /// A Domain API call failed with a non-retryable error.
    #[error("operation {handle}: {source}")]
    Api {
        /// Operation being tracked.
        handle: OperationHandle,
        /// Underlying API error.
        #[source]
        source: ApiError,
        /// Entries delivered before the call failed.
        entries: Vec<ProgressEntry>,
    },
    /// The operation poll budget ran out; the operation keeps running.
    #[error("timed out tracking operation {handle} after {attempts} polls")]
    Timeout {
        /// Operation being tracked.
        handle: OperationHandle,
        /// Number of polls performed.
        attempts: u32,
        /// Entries delivered before the budget ran out.
        entries: Vec<ProgressEntry>,
    },
}

impl TrackerError {
    /// Returns the entries observed before the error, in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[ProgressEntry] {
        match self {
            Self::Failed { entries, .. }
            | Self::Api { entries, .. }
            | Self::Timeout { entries, .. } => entries,
        }
    }
}

/// Follows one operation through its progress log.
#[derive(Debug)]
pub struct OperationTracker<'a, A: ?Sized> {
    api: &'a A,
    handle: OperationHandle,
    cursor: u64,
    poller: ReadinessPoller,
    last_seen: Option<Operation>,
    terminal_entry_seen: bool,
}

impl<'a, A> OperationTracker<'a, A>
where
    A: DomainApi + ?Sized,
{
    /// Creates a tracker with its cursor at zero and the default operation
    /// poll policy.
    #[must_use]
    pub const fn new(api: &'a A, handle: OperationHandle) -> Self {
        Self {
            api,
            handle,
            cursor: 0,
            poller: ReadinessPoller::new(PollPolicy::OPERATION),
            last_seen: None,
            terminal_entry_seen: false,
        }
    }

    /// Starts the operation described by `request` and tracks it.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Api`] when the server rejects the request.
    pub async fn start(api: &'a A, request: &OperationRequest) -> Result<Self, TrackerError> {
        let operation = api
            .start_operation(request)
            .await
            .map_err(|source| TrackerError::Api {
                handle: OperationHandle::new(request.repository.clone(), String::new()),
                source,
                entries: Vec::new(),
            })?;
        info!(
            repository = %request.repository,
            operation = %operation.id,
            kind = %operation.kind,
            "operation started"
        );
        let handle = OperationHandle::new(request.repository.clone(), operation.id.clone());
        let mut tracker = Self::new(api, handle);
        tracker.last_seen = Some(operation);
        Ok(tracker)
    }

    /// Replaces the poll policy used by [`Self::await_completion`].
    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.poller = ReadinessPoller::new(policy);
        self
    }

    /// Operation being tracked.
    #[must_use]
    pub const fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    /// Highest progress entry id delivered so far.
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Returns `true` once the terminal entry has been delivered.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.terminal_entry_seen
    }

    /// Most recent operation snapshot, if any has been observed.
    #[must_use]
    pub const fn last_seen(&self) -> Option<&Operation> {
        self.last_seen.as_ref()
    }

    /// Fetches the operation snapshot and the entries past the cursor.
    ///
    /// Once the terminal entry has been delivered this makes no further
    /// calls and returns the last snapshot with no entries.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the first failing call.
    pub async fn poll(&mut self) -> Result<(Operation, Vec<ProgressEntry>), ApiError> {
        let finished = self.terminal_entry_seen;
        if let Some(operation) = self.last_seen.as_ref().filter(|_| finished) {
            return Ok((operation.clone(), Vec::new()));
        }
        let operation = self.api.get_operation(&self.handle).await?;
        self.last_seen = Some(operation.clone());
        let entries = self.drain().await?;
        Ok((operation, entries))
    }

    async fn drain(&mut self) -> Result<Vec<ProgressEntry>, ApiError> {
        if self.terminal_entry_seen {
            return Ok(Vec::new());
        }
        let fetched = self.api.get_progress(&self.handle, self.cursor).await?;
        let mut fresh = Vec::with_capacity(fetched.len());
        for entry in fetched {
            if entry.id <= self.cursor {
                debug!(operation = %self.handle, id = entry.id, "dropping redelivered entry");
                continue;
            }
            self.cursor = entry.id;
            let terminal = entry.kind.is_terminal();
            fresh.push(entry);
            if terminal {
                self.terminal_entry_seen = true;
                break;
            }
        }
        Ok(fresh)
    }

    /// Polls until the operation finishes and classifies the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Failed`] when the operation failed,
    /// [`TrackerError::Api`] on a non-transport API error, and
    /// [`TrackerError::Timeout`] when a bounded poll policy runs out.
    pub async fn await_completion(&mut self) -> Result<Completion, TrackerError> {
        self.await_completion_with(|_| {}).await
    }

    /// Like [`Self::await_completion`], calling `on_entry` for each entry as
    /// it arrives.
    ///
    /// # Errors
    ///
    /// As for [`Self::await_completion`].
    pub async fn await_completion_with<F>(
        &mut self,
        on_entry: F,
    ) -> Result<Completion, TrackerError>
    where
        F: FnMut(&ProgressEntry) + Send,
    {
        let poller = self.poller.clone();
        let handle = self.handle.clone();
        let action = format!("operation {handle}");
        let mut probe = CompletionProbe {
            tracker: self,
            entries: Vec::new(),
            on_entry,
        };
        let result = poller.wait(&action, &mut probe).await;
        let entries = probe.entries;
        match result {
            Ok(terminal) => conclude(handle, terminal, entries),
            Err(PollError::Timeout { attempts, .. }) => Err(TrackerError::Timeout {
                handle,
                attempts,
                entries,
            }),
            Err(PollError::Fatal { source, .. }) => Err(TrackerError::Api {
                handle,
                source,
                entries,
            }),
        }
    }

    /// Requests cancellation without waiting for it to take effect.
    ///
    /// The server reaps finished operations from its active set, so a
    /// `NoSuchObject` answer is treated as success when the operation is
    /// known to have finished: either this tracker saw it finish, or the
    /// stored record still readable through `get_operation` is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Api`] for any other API failure.
    pub async fn abort(&self) -> Result<(), TrackerError> {
        let source = match self.api.abort_operation(&self.handle).await {
            Ok(()) => {
                info!(operation = %self.handle, "abort requested");
                return Ok(());
            }
            Err(err) => err,
        };
        let finished = source.is_no_such_object()
            && (self.observed_terminal() || self.finished_remotely().await);
        if finished {
            debug!(operation = %self.handle, "abort of finished operation ignored");
            return Ok(());
        }
        Err(TrackerError::Api {
            handle: self.handle.clone(),
            source,
            entries: Vec::new(),
        })
    }

    async fn finished_remotely(&self) -> bool {
        self.api
            .get_operation(&self.handle)
            .await
            .is_ok_and(|operation| operation.state.is_terminal())
    }

    fn observed_terminal(&self) -> bool {
        self.terminal_entry_seen
            || self
                .last_seen
                .as_ref()
                .is_some_and(|operation| operation.state.is_terminal())
    }
}

/// Terminal condition detected by [`CompletionProbe`].
#[derive(Debug)]
struct Terminal {
    kind: ProgressKind,
    message: Option<String>,
}

struct CompletionProbe<'t, 'a, A: ?Sized, F> {
    tracker: &'t mut OperationTracker<'a, A>,
    entries: Vec<ProgressEntry>,
    on_entry: F,
}

impl<A, F> CompletionProbe<'_, '_, A, F>
where
    A: DomainApi + ?Sized,
    F: FnMut(&ProgressEntry) + Send,
{
    fn record(&mut self, fresh: Vec<ProgressEntry>) {
        for entry in fresh {
            (self.on_entry)(&entry);
            self.entries.push(entry);
        }
    }

    fn terminal_entry(&self) -> Option<Terminal> {
        self.entries
            .last()
            .filter(|entry| entry.kind.is_terminal())
            .map(|entry| Terminal {
                kind: entry.kind.clone(),
                message: entry.message.clone(),
            })
    }

    /// Recovers from a progress log reaped after the operation finished:
    /// the snapshot fetched just before the drain is terminal and still
    /// classifies the outcome.
    fn reaped_snapshot(&self, err: ApiError) -> Result<Operation, ApiError> {
        if !err.is_no_such_object() {
            return Err(err);
        }
        match self.tracker.last_seen.as_ref() {
            Some(operation) if operation.state.is_terminal() => {
                debug!(operation = %self.tracker.handle, state = %operation.state, "progress log already reaped");
                Ok(operation.clone())
            }
            _ => Err(err),
        }
    }

    async fn check(&mut self) -> Result<Option<Terminal>, ApiError> {
        let operation = match self.tracker.poll().await {
            Ok((operation, fresh)) => {
                self.record(fresh);
                operation
            }
            Err(err) => self.reaped_snapshot(err)?,
        };
        if let Some(terminal) = self.terminal_entry() {
            return Ok(Some(terminal));
        }
        let Some(kind) = sentinel_kind(operation.state) else {
            return Ok(None);
        };
        // The state can change before the terminal entry is appended.
        let late = match self.tracker.drain().await {
            Ok(late) => late,
            Err(err) => {
                self.reaped_snapshot(err)?;
                Vec::new()
            }
        };
        self.record(late);
        if let Some(terminal) = self.terminal_entry() {
            return Ok(Some(terminal));
        }
        debug!(
            operation = %self.tracker.handle,
            state = %operation.state,
            "terminal state without terminal entry"
        );
        Ok(Some(Terminal {
            kind,
            message: last_message(&self.entries),
        }))
    }
}

impl<A, F> Probe for CompletionProbe<'_, '_, A, F>
where
    A: DomainApi + ?Sized,
    F: FnMut(&ProgressEntry) + Send,
{
    type Ready = Terminal;
    type Error = ApiError;

    fn probe(&mut self) -> ProbeFuture<'_, Terminal, ApiError> {
        Box::pin(async move {
            match self.check().await {
                Ok(Some(terminal)) => ProbeOutcome::Ready(terminal),
                Ok(None) => ProbeOutcome::NotReady,
                Err(err) if err.is_transport() => {
                    debug!(operation = %self.tracker.handle, error = %err, "transient poll failure");
                    ProbeOutcome::NotReady
                }
                Err(err) => ProbeOutcome::Fatal(err),
            }
        })
    }
}

const fn sentinel_kind(state: OperationState) -> Option<ProgressKind> {
    match state {
        OperationState::Running => None,
        OperationState::Complete => Some(ProgressKind::Complete),
        OperationState::Aborted => Some(ProgressKind::Abort),
        OperationState::Failed => Some(ProgressKind::Failed),
    }
}

fn last_message(entries: &[ProgressEntry]) -> Option<String> {
    entries
        .iter()
        .rev()
        .find_map(|entry| entry.message.clone().filter(|text| !text.is_empty()))
}

fn conclude(
    handle: OperationHandle,
    terminal: Terminal,
    entries: Vec<ProgressEntry>,
) -> Result<Completion, TrackerError> {
    match terminal.kind {
        ProgressKind::Abort => {
            let message = terminal
                .message
                .unwrap_or_else(|| String::from(DEFAULT_ABORT_MESSAGE));
            info!(operation = %handle, %message, "operation aborted");
            Ok(Completion {
                handle,
                outcome: Outcome::Aborted { message },
                entries,
            })
        }
        ProgressKind::Failed => {
            let message = terminal
                .message
                .unwrap_or_else(|| String::from(DEFAULT_FAILURE_MESSAGE));
            info!(operation = %handle, %message, "operation failed");
            Err(TrackerError::Failed {
                handle,
                message,
                entries,
            })
        }
        _ => {
            info!(operation = %handle, entries = entries.len(), "operation complete");
            Ok(Completion {
                handle,
                outcome: Outcome::Complete,
                entries,
            })
        }
    }
}
