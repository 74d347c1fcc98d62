//! Blocking run loop: start, register, wait for shutdown, deregister, stop.

use std::io;

use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use crate::server::{Server, ServerError};

const RUN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the mechanism cannot be set up.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for `SIGTERM`, `SIGINT` or `SIGQUIT`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])
            .map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(target: RUN_TARGET, signal, "shutdown signal received");
        }
        Ok(())
    }
}

/// Failures of [`run`].
#[derive(Debug, Error)]
pub enum RunError {
    /// The server did not start.
    #[error("failed to start server: {0}")]
    Start(#[source] ServerError),
    /// The server started but could not be registered; it was stopped again.
    #[error("failed to register server: {0}")]
    Register(#[source] ServerError),
    /// Waiting for shutdown failed; the server was still shut down.
    #[error("failed to wait for shutdown: {0}")]
    Signal(#[source] ShutdownError),
    /// Stopping the server failed.
    #[error("failed to stop server: {0}")]
    Stop(#[source] ServerError),
}

/// Starts `server`, registers it, blocks on `signal`, then deregisters and
/// stops it.
///
/// A deregistration failure is logged and shutdown continues.
///
/// # Errors
///
/// Returns the first step that failed; see [`RunError`].
pub fn run(server: &dyn Server, signal: &dyn ShutdownSignal) -> Result<(), RunError> {
    let config = server.config();
    info!(
        target: RUN_TARGET,
        server = %server,
        name = config.config().name(),
        id = config.config().id(),
        "starting server"
    );
    server.start().map_err(RunError::Start)?;

    if let Err(error) = server.register() {
        if let Err(stop_error) = server.stop() {
            warn!(target: RUN_TARGET, error = %stop_error, "stopping after failed registration");
        }
        return Err(RunError::Register(error));
    }

    let waited = signal.wait();

    if let Err(error) = server.deregister() {
        warn!(target: RUN_TARGET, %error, "deregistration failed; continuing shutdown");
    }
    info!(target: RUN_TARGET, server = %server, "stopping server");
    server.stop().map_err(RunError::Stop)?;
    waited.map_err(RunError::Signal)
}
