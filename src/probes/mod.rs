//! Readiness probes for the environment a test run depends on.
//!
//! Each probe performs one check per invocation and classifies the result
//! for [`ReadinessPoller`]. The `wait_for_*` helpers pair a probe with a
//! poller and a descriptive action name.

use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::api::{ApiError, DomainApi, ResourceRef, ResourceStatus};
use crate::poller::{PollError, Probe, ProbeFuture, ProbeOutcome, ReadinessPoller};

/// Prefix of the identification line an SSH server sends on connect.
pub const SSH_BANNER_PREFIX: &str = "SSH-";

/// Ready once the Domain API answers a repository listing.
#[derive(Debug)]
pub struct ServiceProbe<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A> ServiceProbe<'a, A>
where
    A: DomainApi + ?Sized,
{
    /// Creates a probe against `api`.
    #[must_use]
    pub const fn new(api: &'a A) -> Self {
        Self { api }
    }
}

impl<A> Probe for ServiceProbe<'_, A>
where
    A: DomainApi + ?Sized,
{
    type Ready = ();
    type Error = Infallible;

    fn probe(&mut self) -> ProbeFuture<'_, (), Infallible> {
        Box::pin(async move {
            match self.api.list_repositories().await {
                Ok(_) => ProbeOutcome::Ready(()),
                Err(err) => {
                    debug!(error = %err, "service not answering yet");
                    ProbeOutcome::NotReady
                }
            }
        })
    }
}

/// Ready once an SSH endpoint accepts a connection and identifies itself.
#[derive(Clone, Debug)]
pub struct EndpointProbe {
    address: String,
    connect_timeout: Duration,
}

impl EndpointProbe {
    /// Creates a probe for `host:port`, allowing `connect_timeout` for the
    /// connection and again for the banner.
    #[must_use]
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Self {
        Self {
            address: format!("{host}:{port}"),
            connect_timeout,
        }
    }

    /// Address the probe connects to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open_session(&self) -> Option<String> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                debug!(address = %self.address, error = %err, "endpoint refused connection");
                return None;
            }
            Err(_) => {
                debug!(address = %self.address, "endpoint connect timed out");
                return None;
            }
        };
        let mut reader = BufReader::new(stream);
        let mut banner = String::new();
        let read = timeout(self.connect_timeout, reader.read_line(&mut banner)).await;
        let mut stream = reader.into_inner();
        if let Err(err) = stream.shutdown().await {
            debug!(address = %self.address, error = %err, "endpoint shutdown failed");
        }
        match read {
            Ok(Ok(_)) if banner.starts_with(SSH_BANNER_PREFIX) => {
                Some(banner.trim_end().to_owned())
            }
            _ => {
                debug!(address = %self.address, "endpoint sent no SSH identification");
                None
            }
        }
    }
}

impl Probe for EndpointProbe {
    type Ready = String;
    type Error = Infallible;

    fn probe(&mut self) -> ProbeFuture<'_, String, Infallible> {
        Box::pin(async move {
            self.open_session()
                .await
                .map_or(ProbeOutcome::NotReady, ProbeOutcome::Ready)
        })
    }
}

/// Fatal conditions reported while waiting for a volume or commit.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResourceError {
    /// The resource reported a non-empty error.
    #[error("{resource} reported error: {message}")]
    Reported {
        /// Resource being waited on.
        resource: ResourceRef,
        /// Error text, verbatim.
        message: String,
    },
    /// The status call was rejected by the server.
    #[error("status of {resource} unavailable: {source}")]
    Api {
        /// Resource being waited on.
        resource: ResourceRef,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },
}

/// Ready once a volume or commit reports `ready`; fatal on a reported
/// error.
#[derive(Debug)]
pub struct ResourceProbe<'a, A: ?Sized> {
    api: &'a A,
    resource: ResourceRef,
}

impl<'a, A> ResourceProbe<'a, A>
where
    A: DomainApi + ?Sized,
{
    /// Creates a probe for `resource`.
    #[must_use]
    pub const fn new(api: &'a A, resource: ResourceRef) -> Self {
        Self { api, resource }
    }
}

impl<A> Probe for ResourceProbe<'_, A>
where
    A: DomainApi + ?Sized,
{
    type Ready = ResourceStatus;
    type Error = ResourceError;

    fn probe(&mut self) -> ProbeFuture<'_, ResourceStatus, ResourceError> {
        Box::pin(async move {
            match self.api.resource_status(&self.resource).await {
                Ok(status) => {
                    if let Some(message) = status.failure() {
                        return ProbeOutcome::Fatal(ResourceError::Reported {
                            resource: self.resource.clone(),
                            message: message.to_owned(),
                        });
                    }
                    if status.ready {
                        ProbeOutcome::Ready(status)
                    } else {
                        ProbeOutcome::NotReady
                    }
                }
                Err(err) if err.is_transport() => {
                    debug!(resource = %self.resource, error = %err, "status unavailable");
                    ProbeOutcome::NotReady
                }
                Err(source) => ProbeOutcome::Fatal(ResourceError::Api {
                    resource: self.resource.clone(),
                    source,
                }),
            }
        })
    }
}

/// Waits until the Domain API answers.
///
/// # Errors
///
/// Returns [`PollError::Timeout`] when the poller's budget runs out.
pub async fn wait_for_service<A>(
    api: &A,
    poller: &ReadinessPoller,
) -> Result<(), PollError<Infallible>>
where
    A: DomainApi + ?Sized,
{
    poller.wait("server start", &mut ServiceProbe::new(api)).await
}

/// Waits until the SSH endpoint at `host:port` identifies itself, returning
/// its banner.
///
/// # Errors
///
/// Returns [`PollError::Timeout`] when the poller's budget runs out.
pub async fn wait_for_ssh(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    poller: &ReadinessPoller,
) -> Result<String, PollError<Infallible>> {
    let mut probe = EndpointProbe::new(host, port, connect_timeout);
    let action = format!("ssh endpoint {}", probe.address());
    poller.wait(&action, &mut probe).await
}

/// Waits until `resource` is ready.
///
/// # Errors
///
/// Returns [`PollError::Fatal`] when the resource reports an error or the
/// status call is rejected, and [`PollError::Timeout`] when a bounded
/// poller runs out of attempts.
pub async fn wait_for_resource<A>(
    api: &A,
    resource: ResourceRef,
    poller: &ReadinessPoller,
) -> Result<ResourceStatus, PollError<ResourceError>>
where
    A: DomainApi + ?Sized,
{
    let action = resource.to_string();
    poller
        .wait(&action, &mut ResourceProbe::new(api, resource))
        .await
}
