//! Wire types exchanged with the Domain API.
//!
//! Field names follow the server's camelCase JSON; enums serialise as their
//! upper-case names.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of asynchronous data transfer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Send a local commit to a remote.
    Push,
    /// Fetch a remote commit into the local store.
    Pull,
}

impl OperationKind {
    /// Route segment used when starting this kind of operation.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("PUSH"),
            Self::Pull => f.write_str("PULL"),
        }
    }
}

/// Server-side lifecycle state of an operation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationState {
    /// Initial state; the only non-terminal one.
    #[default]
    Running,
    /// The transfer finished successfully.
    Complete,
    /// The transfer was cancelled on request.
    Aborted,
    /// The transfer failed.
    Failed,
}

impl OperationState {
    /// Returns `true` for states no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Aborted => "ABORTED",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Snapshot of a server-tracked operation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Identifier assigned when the request was accepted.
    pub id: String,
    /// Transfer direction.
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// Current lifecycle state.
    #[serde(default)]
    pub state: OperationState,
    /// Remote the transfer targets.
    pub remote: String,
    /// Commit the transfer concerns.
    pub commit_id: String,
}

/// Type tag of a progress entry.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProgressKind {
    /// Free-form status message.
    Message,
    /// Start of a tracked phase.
    Start,
    /// Percentage update within a phase.
    Progress,
    /// End of a tracked phase.
    End,
    /// Non-terminal error report.
    Error,
    /// Terminal: the operation was aborted.
    Abort,
    /// Terminal: the operation failed.
    Failed,
    /// Terminal: the operation completed.
    Complete,
    /// Any type this client does not know; treated as non-terminal.
    Unknown,
}

impl ProgressKind {
    /// Parses a wire tag. Both `ABORT` and `ABORTED` denote an abort.
    #[must_use]
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "MESSAGE" => Self::Message,
            "START" => Self::Start,
            "PROGRESS" => Self::Progress,
            "END" => Self::End,
            "ERROR" => Self::Error,
            "ABORT" | "ABORTED" => Self::Abort,
            "FAILED" => Self::Failed,
            "COMPLETE" => Self::Complete,
            _ => Self::Unknown,
        }
    }

    /// Returns `true` for the three types that end an operation's log.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Abort | Self::Failed | Self::Complete)
    }
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Message => "MESSAGE",
            Self::Start => "START",
            Self::Progress => "PROGRESS",
            Self::End => "END",
            Self::Error => "ERROR",
            Self::Abort => "ABORT",
            Self::Failed => "FAILED",
            Self::Complete => "COMPLETE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

impl<'de> Deserialize<'de> for ProgressKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&tag))
    }
}

/// One record of an operation's append-only progress log.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProgressEntry {
    /// Position in the log, strictly increasing.
    pub id: u64,
    /// Entry type.
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    /// Human-readable text; typically absent on `COMPLETE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Completion percentage reported by `PROGRESS` entries, clamped to
    /// `0..=100` on decode.
    #[serde(
        default,
        deserialize_with = "clamped_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub percent: Option<u8>,
}

impl ProgressEntry {
    /// Creates an entry without a percentage.
    #[must_use]
    pub fn new(id: u64, kind: ProgressKind, message: Option<&str>) -> Self {
        Self {
            id,
            kind,
            message: message.map(str::to_owned),
            percent: None,
        }
    }

    /// Returns the message text, or an empty string when absent.
    #[must_use]
    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Provider parameters sent with push and pull requests.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RemoteParameters {
    /// Remote provider name (for example `nop`, `ssh`, `s3`).
    pub provider: String,
    /// Provider-specific properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl RemoteParameters {
    /// Creates parameters for `provider` with no properties.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the simulated transfer delay honoured by the `nop` provider.
    #[must_use]
    pub fn delay_secs(self, seconds: u64) -> Self {
        self.property("delay", seconds)
    }
}

/// Request to start a push or pull.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationRequest {
    /// Transfer direction.
    pub kind: OperationKind,
    /// Repository owning the commit.
    pub repository: String,
    /// Remote to transfer to or from.
    pub remote: String,
    /// Commit to transfer.
    pub commit_id: String,
    /// Provider parameters.
    pub params: RemoteParameters,
    /// Transfer only descriptive tags, not data.
    pub metadata_only: bool,
}

impl OperationRequest {
    /// Creates a data (not metadata-only) transfer request, trimming names.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        repository: impl Into<String>,
        remote: impl Into<String>,
        commit_id: impl Into<String>,
        params: RemoteParameters,
    ) -> Self {
        Self {
            kind,
            repository: repository.into().trim().to_owned(),
            remote: remote.into().trim().to_owned(),
            commit_id: commit_id.into().trim().to_owned(),
            params,
            metadata_only: false,
        }
    }

    /// Restricts the transfer to descriptive tags.
    #[must_use]
    pub const fn metadata_only(mut self, value: bool) -> Self {
        self.metadata_only = value;
        self
    }
}

/// Coordinates of an operation: the repository plus the operation id.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OperationHandle {
    /// Repository that owns the operation.
    pub repository: String,
    /// Operation identifier.
    pub id: String,
}

impl OperationHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(repository: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repository, self.id)
    }
}

/// A resource whose readiness can be polled.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ResourceRef {
    /// A versioned volume.
    Volume {
        /// Owning repository.
        repository: String,
        /// Volume name.
        name: String,
    },
    /// A versioned snapshot.
    Commit {
        /// Owning repository.
        repository: String,
        /// Commit identifier.
        id: String,
    },
}

impl ResourceRef {
    /// Refers to a volume.
    #[must_use]
    pub fn volume(repository: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Volume {
            repository: repository.into(),
            name: name.into(),
        }
    }

    /// Refers to a commit.
    #[must_use]
    pub fn commit(repository: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Commit {
            repository: repository.into(),
            id: id.into(),
        }
    }

    /// Path segments of the status endpoint, relative to the API root.
    #[must_use]
    pub fn status_segments(&self) -> [&str; 6] {
        match self {
            Self::Volume { repository, name } => {
                ["v1", "repositories", repository, "volumes", name, "status"]
            }
            Self::Commit { repository, id } => {
                ["v1", "repositories", repository, "commits", id, "status"]
            }
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume { repository, name } => write!(f, "volume {repository}/{name}"),
            Self::Commit { repository, id } => write!(f, "commit {repository}/{id}"),
        }
    }
}

/// Readiness view shared by volumes and commits.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Whether the resource is usable.
    #[serde(default)]
    pub ready: bool,
    /// Server-reported error; empty when none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub error: String,
    /// Volume name, when the resource is a volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Logical size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_size: Option<u64>,
    /// Physical size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_size: Option<u64>,
    /// Bytes unique to this commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_size: Option<u64>,
}

impl ResourceStatus {
    /// Creates a status with only the readiness fields set.
    #[must_use]
    pub fn new(ready: bool, error: impl Into<String>) -> Self {
        Self {
            ready,
            error: error.into(),
            ..Self::default()
        }
    }

    /// Returns the error text when the resource reported one.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        (!self.error.is_empty()).then_some(self.error.as_str())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn clamped_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer)
        .map(|raw| raw.map(|value| u8::try_from(value.clamp(0, 100)).unwrap_or(100)))
}

/// Error body returned by the server on non-2xx responses.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorBody {
    /// Server exception name, such as `NoSuchObjectException`.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Server-side details such as a stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Minimal repository view used by the service boot probe.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Repository {
    /// Repository name.
    pub name: String,
}
