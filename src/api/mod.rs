//! Domain API surface consumed by the pollers and the operation tracker.
//!
//! [`DomainApi`] is the seam between the waiting logic and the server.
//! [`HttpDomainApi`] talks to a real server over HTTP; tests substitute
//! [`crate::test_support::ScriptedApi`].

mod error;
mod http;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use error::{ApiError, ErrorCode};
pub use http::HttpDomainApi;
pub use types::{
    ErrorBody, Operation, OperationHandle, OperationKind, OperationRequest, OperationState,
    ProgressEntry, ProgressKind, RemoteParameters, Repository, ResourceRef, ResourceStatus,
};

/// Future returned by Domain API calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Request/response operations offered by the server.
pub trait DomainApi: Send + Sync {
    /// Lists repositories; used as a lightweight liveness call.
    fn list_repositories(&self) -> ApiFuture<'_, Vec<Repository>>;

    /// Starts a push or pull and returns the accepted operation.
    fn start_operation<'a>(&'a self, request: &'a OperationRequest) -> ApiFuture<'a, Operation>;

    /// Fetches the current snapshot of an operation.
    fn get_operation<'a>(&'a self, handle: &'a OperationHandle) -> ApiFuture<'a, Operation>;

    /// Lists the operations known for a repository.
    fn list_operations<'a>(&'a self, repository: &'a str) -> ApiFuture<'a, Vec<Operation>>;

    /// Returns progress entries with an id greater than `after_id`, in
    /// ascending order. An `after_id` of zero returns the whole log.
    fn get_progress<'a>(
        &'a self,
        handle: &'a OperationHandle,
        after_id: u64,
    ) -> ApiFuture<'a, Vec<ProgressEntry>>;

    /// Requests cancellation of a running operation.
    fn abort_operation<'a>(&'a self, handle: &'a OperationHandle) -> ApiFuture<'a, ()>;

    /// Fetches the readiness view of a volume or commit.
    fn resource_status<'a>(&'a self, resource: &'a ResourceRef) -> ApiFuture<'a, ResourceStatus>;
}
