//! In-memory Domain API double.
//!
//! Operations advance one scripted [`Step`] per `get_operation` call, so a
//! test controls exactly how many polls an operation takes to finish.
//! Started operations follow the `nop` provider: an initial
//! `Pushing <commit> to '<remote>'` (or `Pulling <commit> from '<remote>'`)
//! message, one idle poll per second of the `delay` property, then
//! `COMPLETE`. Once the terminal entry has been read the operation is
//! reaped, as the server does: its progress log and abort route answer
//! `NoSuchObject` and it leaves `list_operations`, while `get_operation`
//! still returns the stored record.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::{
    ApiError, ApiFuture, DomainApi, ErrorCode, Operation, OperationHandle, OperationKind,
    OperationRequest, OperationState, ProgressEntry, ProgressKind, Repository, ResourceRef,
    ResourceStatus,
};

/// One scripted transition of a simulated operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// Nothing happens on this poll.
    Idle,
    /// Appends a non-terminal entry.
    Entry(ProgressKind, Option<String>),
    /// Appends a terminal entry and moves the operation to the matching
    /// state.
    Finish(ProgressKind, Option<String>),
    /// Changes the state without logging anything.
    State(OperationState),
}

#[derive(Debug)]
struct SimulatedOperation {
    operation: Operation,
    log: Vec<ProgressEntry>,
    script: VecDeque<Step>,
    reaped: bool,
}

impl SimulatedOperation {
    fn append(&mut self, kind: ProgressKind, message: Option<String>) {
        let id = self.log.last().map_or(1, |entry| entry.id + 1);
        self.log.push(ProgressEntry {
            id,
            kind,
            message,
            percent: None,
        });
    }

    fn advance(&mut self) {
        let Some(step) = self.script.pop_front() else {
            return;
        };
        match step {
            Step::Idle => {}
            Step::Entry(kind, message) => self.append(kind, message),
            Step::Finish(kind, message) => {
                self.operation.state = match kind {
                    ProgressKind::Abort => OperationState::Aborted,
                    ProgressKind::Failed => OperationState::Failed,
                    _ => OperationState::Complete,
                };
                self.append(kind, message);
            }
            Step::State(state) => self.operation.state = state,
        }
    }
}

#[derive(Debug, Default)]
struct ApiState {
    repositories: Vec<String>,
    list_failures: u32,
    operations: BTreeMap<(String, String), SimulatedOperation>,
    next_operation: u32,
    redeliver: bool,
    reap_finished: bool,
    progress_failures: VecDeque<ApiError>,
    progress_requests: Vec<u64>,
    abort_requests: u32,
    statuses: HashMap<ResourceRef, VecDeque<Result<ResourceStatus, ApiError>>>,
    calls: BTreeMap<&'static str, u32>,
}

impl ApiState {
    fn count(&mut self, method: &'static str) {
        *self.calls.entry(method).or_insert(0) += 1;
    }

    fn operation_mut(
        &mut self,
        handle: &OperationHandle,
    ) -> Result<&mut SimulatedOperation, ApiError> {
        self.operations
            .get_mut(&(handle.repository.clone(), handle.id.clone()))
            .ok_or_else(|| {
                ApiError::domain(
                    ErrorCode::NoSuchObject,
                    format!("no such operation '{}' in repository '{}'", handle.id, handle.repository),
                )
            })
    }
}

/// Scripted in-memory implementation of [`DomainApi`].
#[derive(Clone, Debug)]
pub struct ScriptedApi {
    state: Arc<Mutex<ApiState>>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApi {
    /// Creates an API with no repositories that reaps finished operations.
    #[must_use]
    pub fn new() -> Self {
        let state = ApiState {
            reap_finished: true,
            ..ApiState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a repository returned by `list_repositories`.
    #[must_use]
    pub fn with_repository(self, name: &str) -> Self {
        self.lock().repositories.push(name.to_owned());
        self
    }

    /// Makes the next `count` calls to `list_repositories` fail with a
    /// transport error.
    pub fn fail_list_repositories(&self, count: u32) {
        self.lock().list_failures = count;
    }

    /// When enabled, `get_progress` ignores its cursor and returns the whole
    /// log.
    pub fn redeliver_progress(&self, enabled: bool) {
        self.lock().redeliver = enabled;
    }

    /// Controls whether operations are reaped once their terminal entry is
    /// read.
    pub fn reap_finished(&self, enabled: bool) {
        self.lock().reap_finished = enabled;
    }

    /// Queues an error returned by the next `get_progress` call.
    pub fn fail_next_progress(&self, error: ApiError) {
        self.lock().progress_failures.push_back(error);
    }

    /// Inserts an operation that runs `steps`, one per `get_operation` call.
    pub fn insert_operation(
        &self,
        repository: &str,
        id: &str,
        kind: OperationKind,
        steps: impl IntoIterator<Item = Step>,
    ) -> OperationHandle {
        let operation = Operation {
            id: id.to_owned(),
            kind,
            state: OperationState::Running,
            remote: String::from("origin"),
            commit_id: String::from("id"),
        };
        self.lock().operations.insert(
            (repository.to_owned(), id.to_owned()),
            SimulatedOperation {
                operation,
                log: Vec::new(),
                script: steps.into_iter().collect(),
                reaped: false,
            },
        );
        OperationHandle::new(repository, id)
    }

    /// Queues status answers for `resource`; the last one repeats.
    pub fn script_status(
        &self,
        resource: ResourceRef,
        answers: impl IntoIterator<Item = Result<ResourceStatus, ApiError>>,
    ) {
        self.lock()
            .statuses
            .insert(resource, answers.into_iter().collect());
    }

    /// Number of calls made to `method`.
    #[must_use]
    pub fn calls(&self, method: &str) -> u32 {
        self.lock().calls.get(method).copied().unwrap_or_default()
    }

    /// Cursor values passed to `get_progress`, in call order.
    #[must_use]
    pub fn progress_requests(&self) -> Vec<u64> {
        self.lock().progress_requests.clone()
    }

    /// Number of abort requests received.
    #[must_use]
    pub fn abort_requests(&self) -> u32 {
        self.lock().abort_requests
    }

    /// Current state of an operation, if it was ever created. Reaped
    /// operations keep their final state.
    #[must_use]
    pub fn state_of(&self, handle: &OperationHandle) -> Option<OperationState> {
        self.lock()
            .operations
            .get(&(handle.repository.clone(), handle.id.clone()))
            .map(|simulated| simulated.operation.state)
    }

    fn start(&self, request: &OperationRequest) -> Result<Operation, ApiError> {
        let mut state = self.lock();
        state.count("start_operation");
        if !state.repositories.contains(&request.repository) {
            return Err(ApiError::domain(
                ErrorCode::NoSuchObject,
                format!("no such repository '{}'", request.repository),
            ));
        }
        let delay = request
            .params
            .properties
            .get("delay")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or_default();
        state.next_operation += 1;
        let id = format!("op-{}", state.next_operation);
        let operation = Operation {
            id: id.clone(),
            kind: request.kind,
            state: OperationState::Running,
            remote: request.remote.clone(),
            commit_id: request.commit_id.clone(),
        };
        let message = match request.kind {
            OperationKind::Push => {
                format!("Pushing {} to '{}'", request.commit_id, request.remote)
            }
            OperationKind::Pull => {
                format!("Pulling {} from '{}'", request.commit_id, request.remote)
            }
        };
        let mut simulated = SimulatedOperation {
            operation: operation.clone(),
            log: Vec::new(),
            script: (0..delay).map(|_| Step::Idle).collect(),
            reaped: false,
        };
        simulated.append(ProgressKind::Message, Some(message));
        simulated
            .script
            .push_back(Step::Finish(ProgressKind::Complete, None));
        state
            .operations
            .insert((request.repository.clone(), id), simulated);
        Ok(operation)
    }

    fn progress(&self, handle: &OperationHandle, after_id: u64) -> Result<Vec<ProgressEntry>, ApiError> {
        let mut state = self.lock();
        state.count("get_progress");
        state.progress_requests.push(after_id);
        if let Some(err) = state.progress_failures.pop_front() {
            return Err(err);
        }
        let redeliver = state.redeliver;
        let reap = state.reap_finished;
        let simulated = state.active_operation_mut(handle)?;
        let entries: Vec<ProgressEntry> = simulated
            .log
            .iter()
            .filter(|entry| redeliver || entry.id > after_id)
            .cloned()
            .collect();
        if reap && entries.iter().any(|entry| entry.kind.is_terminal()) {
            simulated.reaped = true;
        }
        Ok(entries)
    }

    fn abort(&self, handle: &OperationHandle) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.count("abort_operation");
        state.abort_requests += 1;
        let simulated = state.active_operation_mut(handle)?;
        if simulated.operation.state == OperationState::Running {
            simulated.script = VecDeque::from([Step::Finish(ProgressKind::Abort, None)]);
        }
        Ok(())
    }

    fn status(&self, resource: &ResourceRef) -> Result<ResourceStatus, ApiError> {
        let mut state = self.lock();
        state.count("resource_status");
        let Some(answers) = state.statuses.get_mut(resource) else {
            return Err(ApiError::domain(
                ErrorCode::NoSuchObject,
                format!("no such {resource}"),
            ));
        };
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        answer.unwrap_or_else(|| {
            Err(ApiError::domain(
                ErrorCode::NoSuchObject,
                format!("no such {resource}"),
            ))
        })
    }
}

impl DomainApi for ScriptedApi {
    fn list_repositories(&self) -> ApiFuture<'_, Vec<Repository>> {
        let result = {
            let mut state = self.lock();
            state.count("list_repositories");
            if state.list_failures > 0 {
                state.list_failures -= 1;
                Err(ApiError::transport("connection refused"))
            } else {
                Ok(state
                    .repositories
                    .iter()
                    .map(|name| Repository { name: name.clone() })
                    .collect())
            }
        };
        Box::pin(async move { result })
    }

    fn start_operation<'a>(&'a self, request: &'a OperationRequest) -> ApiFuture<'a, Operation> {
        let result = self.start(request);
        Box::pin(async move { result })
    }

    fn get_operation<'a>(&'a self, handle: &'a OperationHandle) -> ApiFuture<'a, Operation> {
        let result = {
            let mut state = self.lock();
            state.count("get_operation");
            state.operation_mut(handle).map(|simulated| {
                simulated.advance();
                simulated.operation.clone()
            })
        };
        Box::pin(async move { result })
    }

    fn list_operations<'a>(&'a self, repository: &'a str) -> ApiFuture<'a, Vec<Operation>> {
        let result = {
            let mut state = self.lock();
            state.count("list_operations");
            Ok(state
                .operations
                .iter()
                .filter(|((repo, _), simulated)| repo == repository && !simulated.reaped)
                .map(|(_, simulated)| simulated.operation.clone())
                .collect())
        };
        Box::pin(async move { result })
    }

    fn get_progress<'a>(
        &'a self,
        handle: &'a OperationHandle,
        after_id: u64,
    ) -> ApiFuture<'a, Vec<ProgressEntry>> {
        let result = self.progress(handle, after_id);
        Box::pin(async move { result })
    }

    fn abort_operation<'a>(&'a self, handle: &'a OperationHandle) -> ApiFuture<'a, ()> {
        let result = self.abort(handle);
        Box::pin(async move { result })
    }

    fn resource_status<'a>(&'a self, resource: &'a ResourceRef) -> ApiFuture<'a, ResourceStatus> {
        let result = self.status(resource);
        Box::pin(async move { result })
    }
}
