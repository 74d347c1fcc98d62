//! Process bootstrap: layered configuration, telemetry, then a server.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::info;

use skein_config::ServerConfig;

use crate::options::{Options, ServerOption};
use crate::server::RpcServer;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when any layer fails to parse or merge.
    fn load(&self) -> Result<ServerConfig, Arc<OrthoError>>;
}

/// Loader that delegates to [`ServerConfig::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<ServerConfig, Arc<OrthoError>> {
        ServerConfig::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Server built from the loaded configuration.
#[derive(Debug)]
pub struct Bootstrapped {
    server: RpcServer,
    telemetry: TelemetryHandle,
}

impl Bootstrapped {
    /// The configured, stopped server.
    #[must_use]
    pub const fn server(&self) -> &RpcServer {
        &self.server
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Gives up the telemetry handle and keeps the server.
    #[must_use]
    pub fn into_server(self) -> RpcServer {
        self.server
    }
}

/// Loads configuration from file, environment and command line, installs
/// telemetry, and builds a server with `options` applied on top.
///
/// # Errors
///
/// See [`bootstrap_with`].
pub fn bootstrap(options: Vec<ServerOption>) -> Result<Bootstrapped, BootstrapError> {
    bootstrap_with(&SystemConfigLoader, options)
}

/// Bootstraps a server using the supplied loader.
///
/// # Errors
///
/// Returns [`BootstrapError::Configuration`] when loading fails and
/// [`BootstrapError::Telemetry`] when the subscriber cannot be installed.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    options: Vec<ServerOption>,
) -> Result<Bootstrapped, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let mut resolved = Options::from_config(config);
    resolved.apply(options);
    info!(
        target: BOOTSTRAP_TARGET,
        name = resolved.config().name(),
        id = resolved.config().id(),
        address = %resolved.config().address(),
        "configuration loaded"
    );
    Ok(Bootstrapped {
        server: RpcServer::with_options(resolved),
        telemetry,
    })
}
