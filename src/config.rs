//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `opwatch.toml`, and `OPWATCH_*` environment
//! variables in that order of precedence.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poller::PollPolicy;

const APP_NAME: &str = "opwatch";
const CONFIG_FILE: &str = "opwatch.toml";

/// Server endpoint and retry budgets for every wait the tool performs.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OPWATCH",
    discovery(
        app_name = "opwatch",
        env_var = "OPWATCH_CONFIG_PATH",
        config_file_name = "opwatch.toml",
        dotfile_name = ".opwatch.toml",
        project_file_name = "opwatch.toml"
    )
)]
pub struct WatchConfig {
    /// Root URL of the Domain API.
    #[ortho_config(default = "http://localhost:5001".to_owned())]
    pub server_url: String,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
    /// Delay between service and SSH boot probes, in milliseconds.
    #[ortho_config(default = 1000)]
    pub service_poll_interval_ms: u64,
    /// Attempt ceiling for service and SSH boot waits.
    #[ortho_config(default = 60)]
    pub service_max_attempts: u32,
    /// Delay between volume and commit status probes, in milliseconds.
    #[ortho_config(default = 1000)]
    pub resource_poll_interval_ms: u64,
    /// Attempt ceiling for volume and commit waits; unset polls forever.
    pub resource_max_attempts: Option<u32>,
    /// Delay between operation polls, in milliseconds.
    #[ortho_config(default = 500)]
    pub operation_poll_interval_ms: u64,
    /// Attempt ceiling for operation tracking; unset polls forever.
    pub operation_max_attempts: Option<u32>,
    /// Connect and banner timeout for SSH probes, in milliseconds.
    #[ortho_config(default = 2000)]
    pub ssh_connect_timeout_ms: u64,
}

/// Docker container and image settings for a provisioned test server.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OPWATCH_ENV",
    discovery(
        app_name = "opwatch",
        env_var = "OPWATCH_CONFIG_PATH",
        config_file_name = "opwatch.toml",
        dotfile_name = ".opwatch.toml",
        project_file_name = "opwatch.toml"
    )
)]
pub struct EnvironmentConfig {
    /// Docker executable.
    #[ortho_config(default = "docker".to_owned())]
    pub docker_bin: String,
    /// Prefix for container and volume names.
    #[ortho_config(default = "test".to_owned())]
    pub identity: String,
    /// Server image to run.
    #[ortho_config(default = "titan:latest".to_owned())]
    pub image: String,
    /// Host port the server API is published on.
    #[ortho_config(default = 5001)]
    pub port: u16,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "set {} or add {} to {CONFIG_FILE}",
            self.env_var, self.toml_key
        )
    }

    fn require_text(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                self.description,
                self.guidance()
            )));
        }
        Ok(())
    }

    fn require_positive(&self, value: u64) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: {}",
                self.description,
                self.guidance()
            )));
        }
        Ok(())
    }
}

impl WatchConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for an empty server URL and
    /// [`ConfigError::Invalid`] for a malformed URL or a zero interval,
    /// timeout, or attempt ceiling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = FieldMetadata::new("server URL", "OPWATCH_SERVER_URL", "server_url");
        url.require_text(&self.server_url)?;
        let trimmed = self.server_url.trim();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "server URL must start with http:// or https://, got '{trimmed}': {}",
                url.guidance()
            )));
        }

        FieldMetadata::new("HTTP timeout", "OPWATCH_HTTP_TIMEOUT_SECS", "http_timeout_secs")
            .require_positive(self.http_timeout_secs)?;
        FieldMetadata::new(
            "service poll interval",
            "OPWATCH_SERVICE_POLL_INTERVAL_MS",
            "service_poll_interval_ms",
        )
        .require_positive(self.service_poll_interval_ms)?;
        FieldMetadata::new(
            "service attempt ceiling",
            "OPWATCH_SERVICE_MAX_ATTEMPTS",
            "service_max_attempts",
        )
        .require_positive(u64::from(self.service_max_attempts))?;
        FieldMetadata::new(
            "resource poll interval",
            "OPWATCH_RESOURCE_POLL_INTERVAL_MS",
            "resource_poll_interval_ms",
        )
        .require_positive(self.resource_poll_interval_ms)?;
        if let Some(max) = self.resource_max_attempts {
            FieldMetadata::new(
                "resource attempt ceiling",
                "OPWATCH_RESOURCE_MAX_ATTEMPTS",
                "resource_max_attempts",
            )
            .require_positive(u64::from(max))?;
        }
        FieldMetadata::new(
            "operation poll interval",
            "OPWATCH_OPERATION_POLL_INTERVAL_MS",
            "operation_poll_interval_ms",
        )
        .require_positive(self.operation_poll_interval_ms)?;
        if let Some(max) = self.operation_max_attempts {
            FieldMetadata::new(
                "operation attempt ceiling",
                "OPWATCH_OPERATION_MAX_ATTEMPTS",
                "operation_max_attempts",
            )
            .require_positive(u64::from(max))?;
        }
        FieldMetadata::new(
            "SSH connect timeout",
            "OPWATCH_SSH_CONNECT_TIMEOUT_MS",
            "ssh_connect_timeout_ms",
        )
        .require_positive(self.ssh_connect_timeout_ms)?;
        Ok(())
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Connect and banner timeout for SSH probes.
    #[must_use]
    pub const fn ssh_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.ssh_connect_timeout_ms)
    }

    /// Policy for service and SSH boot waits.
    #[must_use]
    pub const fn service_policy(&self) -> PollPolicy {
        PollPolicy::bounded(
            Duration::from_millis(self.service_poll_interval_ms),
            self.service_max_attempts,
        )
    }

    /// Policy for volume and commit readiness waits.
    #[must_use]
    pub const fn resource_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.resource_poll_interval_ms),
            max_attempts: self.resource_max_attempts,
        }
    }

    /// Policy for operation tracking.
    #[must_use]
    pub const fn operation_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.operation_poll_interval_ms),
            max_attempts: self.operation_max_attempts,
        }
    }
}

impl EnvironmentConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a name is empty and
    /// [`ConfigError::Invalid`] when the port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new("Docker executable", "OPWATCH_ENV_DOCKER_BIN", "docker_bin")
            .require_text(&self.docker_bin)?;
        FieldMetadata::new("environment identity", "OPWATCH_ENV_IDENTITY", "identity")
            .require_text(&self.identity)?;
        FieldMetadata::new("server image", "OPWATCH_ENV_IMAGE", "image")
            .require_text(&self.image)?;
        FieldMetadata::new("server port", "OPWATCH_ENV_PORT", "port")
            .require_positive(u64::from(self.port))?;
        Ok(())
    }

    /// Name of the server container.
    #[must_use]
    pub fn server_container(&self) -> String {
        format!("{}-server", self.identity)
    }

    /// Name of the SSH fixture container.
    #[must_use]
    pub fn ssh_container(&self) -> String {
        format!("{}-ssh", self.identity)
    }

    /// Name of the server's data volume.
    #[must_use]
    pub fn data_volume(&self) -> String {
        format!("{}-data", self.identity)
    }

    /// URL of the provisioned server's API.
    #[must_use]
    pub fn server_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
