//! Shared configuration for Skein RPC servers.
//!
//! [`ServerConfig`] captures the plain-data options every server carries: the
//! listening address, the identity advertised to discovery, free-form
//! metadata, and the logging knobs consumed by the telemetry layer.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! named by `--config-path` or `SKEIN_CONFIG_PATH`, then `SKEIN_*`
//! environment variables, then command-line flags.

mod defaults;
mod metadata;
mod socket;

use std::collections::BTreeMap;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use defaults::{
    DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_SERVER_NAME, DEFAULT_SERVER_VERSION,
    default_log_filter, default_log_format, default_server_id, default_socket_endpoint,
};
pub use metadata::{Metadata, MetadataParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Output format of the telemetry subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human-readable events.
    Compact,
}

/// Error returned when text does not name a [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;

/// Plain-data server configuration.
///
/// Each field maps to a `SKEIN_<FIELD>` environment variable and a
/// `--<field>` flag, e.g. `SKEIN_SERVER_ADDRESS=tcp://127.0.0.1:7000` or
/// `--log-format compact`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "SKEIN")]
pub struct ServerConfig {
    /// Endpoint the server listens on and advertises.
    pub server_address: SocketEndpoint,
    /// Service name advertised to discovery.
    pub server_name: String,
    /// Version advertised to discovery.
    pub server_version: String,
    /// Unique identifier of this server instance.
    pub server_id: String,
    /// Free-form metadata advertised alongside the descriptor.
    pub server_metadata: Metadata,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Upper bound on how long `stop` waits for running handlers.
    pub drain_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_address: default_socket_endpoint(),
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            server_version: DEFAULT_SERVER_VERSION.to_owned(),
            server_id: default_server_id().to_owned(),
            server_metadata: Metadata::default(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Returns the configured listening endpoint.
    #[must_use]
    pub const fn address(&self) -> &SocketEndpoint {
        &self.server_address
    }

    /// Returns the advertised service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.server_name
    }

    /// Returns the advertised version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.server_version
    }

    /// Returns the instance identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.server_id
    }

    /// Returns the advertised metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        self.server_metadata.as_map()
    }

    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the drain timeout applied when stopping.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
