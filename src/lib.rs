//! Core library for the opwatch readiness and operation tracking tool.
//!
//! The crate polls a data server's Domain API until services and resources
//! are ready, follows asynchronous push and pull operations through their
//! progress logs until a terminal entry arrives, and provisions the
//! containers a test run talks to.

pub mod api;
pub mod command;
pub mod config;
pub mod environment;
pub mod fixtures;
pub mod poller;
pub mod probes;
pub mod test_support;
pub mod tracker;

pub use api::{
    ApiError, ApiFuture, DomainApi, ErrorBody, ErrorCode, HttpDomainApi, Operation,
    OperationHandle, OperationKind, OperationRequest, OperationState, ProgressEntry, ProgressKind,
    RemoteParameters, Repository, ResourceRef, ResourceStatus,
};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, EnvironmentConfig, WatchConfig};
pub use environment::{ContainerLogs, DockerProvisioner, ProvisionError, Provisioner};
pub use fixtures::{BucketFixture, FixtureError, SshFixture};
pub use poller::{
    DiagnosticError, DiagnosticSource, PollError, PollPolicy, Probe, ProbeOutcome,
    ReadinessPoller, probe_fn,
};
pub use probes::{
    EndpointProbe, ResourceError, ResourceProbe, SSH_BANNER_PREFIX, ServiceProbe,
    wait_for_resource, wait_for_service, wait_for_ssh,
};
pub use tracker::{Completion, OperationTracker, Outcome, TrackerError};
