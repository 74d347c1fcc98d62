//! The server contract and its lifecycle types.
//!
//! A server moves through `Stopped → Starting → Running → Stopping →
//! Stopped`. Discovery registration is tracked separately so a server can be
//! registered without accepting traffic and vice versa. Handlers and
//! subscribers may be added in any state; additions made while running only
//! affect later lookups.

mod connections;
mod dispatch;
mod routes;
mod rpc;

use std::fmt;

use thiserror::Error;

use crate::broker::BrokerError;
use crate::context::Context;
use crate::handler::{Handler, HandlerBuilder, HandlerError, ValidationError};
use crate::options::{Options, ServerOption};
use crate::registry::RegistryError;
use crate::request::Publication;
use crate::subscriber::Subscriber;
use crate::transport::ListenerError;

pub use self::rpc::RpcServer;

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Whether the server is accepting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Not listening.
    #[default]
    Stopped,
    /// Binding the listener.
    Starting,
    /// Accepting and dispatching connections.
    Running,
    /// Waiting for running handlers before returning to `Stopped`.
    Stopping,
}

impl fmt::Display for RunState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        })
    }
}

/// Whether the server's descriptor is published to discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    /// Not published.
    #[default]
    Unregistered,
    /// Published.
    Registered,
}

/// Lifecycle transition failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `start` was called while the server was running.
    #[error("server is already {state}")]
    AlreadyRunning {
        /// State observed when `start` was called.
        state: RunState,
    },
    /// `start` or `stop` was called while another transition was under way.
    #[error("server is {state}")]
    InTransition {
        /// State observed when the call was made.
        state: RunState,
    },
    /// The listener could not be bound or started.
    #[error("failed to start listener: {0}")]
    Listener(#[source] ListenerError),
    /// The accept thread panicked; the server stopped regardless.
    #[error("listener thread panicked during shutdown")]
    ListenerPanicked,
}

/// Errors returned by [`Server`] operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A handler or subscriber failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The discovery backend failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The broker failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// A lifecycle transition failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Pluggable RPC server.
///
/// `Display` yields a short identifier of the implementation.
pub trait Server: fmt::Display + Send + Sync {
    /// Snapshot of the current options.
    fn config(&self) -> Options;

    /// Applies `options` on top of the current ones. Valid in any state;
    /// address changes take effect on the next `start`.
    fn init(&self, options: Vec<ServerOption>);

    /// Adds or replaces the handler for its service name.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Validation`] when the handler is not routable.
    fn handle(&self, handler: Handler) -> Result<(), ServerError>;

    /// Starts a handler for service `name`.
    fn new_handler(&self, name: &str) -> HandlerBuilder {
        Handler::builder(name)
    }

    /// Binds `deliver` to `topic`.
    fn new_subscriber<F>(&self, topic: &str, deliver: F) -> Subscriber
    where
        Self: Sized,
        F: Fn(&Context, &Publication) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Subscriber::new(topic, deliver)
    }

    /// Validates `subscriber` and attaches it to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Validation`] for a blank topic or
    /// [`ServerError::Broker`] when the broker refuses it.
    fn subscribe(&self, subscriber: Subscriber) -> Result<(), ServerError>;

    /// Publishes the service descriptor. Repeating the call re-publishes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Registry`] when the registry fails.
    fn register(&self) -> Result<(), ServerError>;

    /// Withdraws the service descriptor; does nothing when unregistered.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Registry`] when the registry fails.
    fn deregister(&self) -> Result<(), ServerError>;

    /// Binds the listener and starts dispatching connections.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyRunning`] when running,
    /// [`LifecycleError::InTransition`] while starting or stopping, or
    /// [`LifecycleError::Listener`] when binding fails.
    fn start(&self) -> Result<(), ServerError>;

    /// Stops accepting, stops serving open connections, and waits for
    /// running handlers up to the drain timeout. Frames read after the stop
    /// begins are not answered. Does nothing when already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InTransition`] while starting or stopping,
    /// or [`LifecycleError::ListenerPanicked`] after finishing shutdown if
    /// the accept thread panicked.
    fn stop(&self) -> Result<(), ServerError>;
}
