//! HTTP implementation of the Domain API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    ApiError, ApiFuture, DomainApi, Operation, OperationHandle, OperationRequest, ProgressEntry,
    Repository, ResourceRef, ResourceStatus,
};

/// Domain API client backed by `reqwest`.
///
/// Route parameters are appended as percent-encoded path segments, so
/// repository names and identifiers may contain `/`, spaces or `?`.
#[derive(Clone, Debug)]
pub struct HttpDomainApi {
    client: Client,
    base_url: String,
    root: Url,
}

impl HttpDomainApi {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when `base_url` is not an absolute
    /// URL with a path or the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let root = Url::parse(&base_url)
            .map_err(|err| ApiError::transport(format!("invalid server URL '{base_url}': {err}")))?;
        if root.cannot_be_a_base() {
            return Err(ApiError::transport(format!(
                "invalid server URL '{base_url}': not a base URL"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url,
            root,
        })
    }

    /// Returns the server root this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Appends `segments` to the server root, percent-encoding each one.
    #[must_use]
    pub fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn operation_url(&self, handle: &OperationHandle, tail: &[&str]) -> Url {
        self.endpoint(
            [
                "v1",
                "repositories",
                handle.repository.as_str(),
                "operations",
                handle.id.as_str(),
            ]
            .into_iter()
            .chain(tail.iter().copied()),
        )
    }

    async fn fetch_json<T>(request: RequestBuilder, what: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let body = Self::fetch_bytes(request).await?;
        serde_json::from_slice(&body).map_err(|err| ApiError::Decode {
            what: what.to_owned(),
            message: err.to_string(),
        })
    }

    async fn fetch_bytes(request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        debug!(%status, "domain API rejected request");
        Err(ApiError::from_response(status, &body))
    }
}

impl DomainApi for HttpDomainApi {
    fn list_repositories(&self) -> ApiFuture<'_, Vec<Repository>> {
        Box::pin(async move {
            let request = self.client.get(self.endpoint(["v1", "repositories"]));
            Self::fetch_json(request, "repository list").await
        })
    }

    fn start_operation<'a>(&'a self, request: &'a OperationRequest) -> ApiFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.endpoint([
                "v1",
                "repositories",
                request.repository.as_str(),
                "remotes",
                request.remote.as_str(),
                "commits",
                request.commit_id.as_str(),
                request.kind.verb(),
            ]);
            let builder = self
                .client
                .post(url)
                .query(&[("metadataOnly", request.metadata_only)])
                .json(&request.params);
            Self::fetch_json(builder, "operation").await
        })
    }

    fn get_operation<'a>(&'a self, handle: &'a OperationHandle) -> ApiFuture<'a, Operation> {
        Box::pin(async move {
            let request = self.client.get(self.operation_url(handle, &[]));
            Self::fetch_json(request, "operation").await
        })
    }

    fn list_operations<'a>(&'a self, repository: &'a str) -> ApiFuture<'a, Vec<Operation>> {
        Box::pin(async move {
            let url = self.endpoint(["v1", "repositories", repository, "operations"]);
            Self::fetch_json(self.client.get(url), "operation list").await
        })
    }

    fn get_progress<'a>(
        &'a self,
        handle: &'a OperationHandle,
        after_id: u64,
    ) -> ApiFuture<'a, Vec<ProgressEntry>> {
        Box::pin(async move {
            let request = self
                .client
                .get(self.operation_url(handle, &["progress"]))
                .query(&[("lastId", after_id)]);
            Self::fetch_json(request, "progress entries").await
        })
    }

    fn abort_operation<'a>(&'a self, handle: &'a OperationHandle) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let request = self.client.delete(self.operation_url(handle, &[]));
            Self::fetch_bytes(request).await.map(|_| ())
        })
    }

    fn resource_status<'a>(&'a self, resource: &'a ResourceRef) -> ApiFuture<'a, ResourceStatus> {
        Box::pin(async move {
            let request = self.client.get(self.endpoint(resource.status_segments()));
            Self::fetch_json(request, "resource status").await
        })
    }
}
