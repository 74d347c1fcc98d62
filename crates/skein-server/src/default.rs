//! Shared server instance and the free functions that delegate to it.
//!
//! [`DefaultServer`] is an ordinary value that applications can own and pass
//! around. The free functions in this module use one process-wide
//! [`DefaultServer`], creating its [`RpcServer`] on first use.

use std::sync::{Arc, PoisonError, RwLock};

use crate::context::Context;
use crate::handler::{Handler, HandlerBuilder, HandlerError};
use crate::options::{Options, ServerOption};
use crate::request::Publication;
use crate::run::{RunError, ShutdownSignal, SystemShutdownSignal};
use crate::server::{RpcServer, Server, ServerError};
use crate::subscriber::Subscriber;

/// Lazily created server shared by its users.
#[derive(Debug, Default)]
pub struct DefaultServer {
    slot: RwLock<Option<Arc<RpcServer>>>,
}

impl DefaultServer {
    /// Creates an empty holder; the server is built on first use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// The current server, created with default options if absent.
    pub fn server(&self) -> Arc<RpcServer> {
        if let Some(server) = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Arc::clone(server);
        }
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slot.get_or_insert_with(|| Arc::new(RpcServer::default())))
    }

    /// Creates the server from `options` when absent, otherwise applies
    /// `options` to the existing one.
    pub fn init(&self, options: Vec<ServerOption>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(server) => server.init(options),
            None => *slot = Some(Arc::new(RpcServer::new(options))),
        }
    }

    /// Drops the current server; the next use creates a fresh one.
    ///
    /// A running server keeps running for as long as other owners hold it.
    pub fn reset(&self) {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether a server has been created.
    pub fn is_initialised(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

static DEFAULT: DefaultServer = DefaultServer::new();

/// The process-wide holder.
pub fn default_server() -> &'static DefaultServer {
    &DEFAULT
}

/// Options of the default server.
pub fn config() -> Options {
    DEFAULT.server().config()
}

/// Creates or reconfigures the default server.
pub fn init(options: Vec<ServerOption>) {
    DEFAULT.init(options);
}

/// Starts a handler for service `name`.
pub fn new_handler(name: &str) -> HandlerBuilder {
    Handler::builder(name)
}

/// Binds `deliver` to `topic`.
pub fn new_subscriber<F>(topic: &str, deliver: F) -> Subscriber
where
    F: Fn(&Context, &Publication) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Subscriber::new(topic, deliver)
}

/// Adds a handler to the default server.
///
/// # Errors
///
/// See [`Server::handle`].
pub fn handle(handler: Handler) -> Result<(), ServerError> {
    DEFAULT.server().handle(handler)
}

/// Adds a subscriber to the default server.
///
/// # Errors
///
/// See [`Server::subscribe`].
pub fn subscribe(subscriber: Subscriber) -> Result<(), ServerError> {
    DEFAULT.server().subscribe(subscriber)
}

/// Registers the default server with discovery.
///
/// # Errors
///
/// See [`Server::register`].
pub fn register() -> Result<(), ServerError> {
    DEFAULT.server().register()
}

/// Deregisters the default server from discovery.
///
/// # Errors
///
/// See [`Server::deregister`].
pub fn deregister() -> Result<(), ServerError> {
    DEFAULT.server().deregister()
}

/// Starts the default server.
///
/// # Errors
///
/// See [`Server::start`].
pub fn start() -> Result<(), ServerError> {
    DEFAULT.server().start()
}

/// Stops the default server.
///
/// # Errors
///
/// See [`Server::stop`].
pub fn stop() -> Result<(), ServerError> {
    DEFAULT.server().stop()
}

/// Runs the default server until a termination signal arrives.
///
/// # Errors
///
/// See [`crate::run::run`].
pub fn run() -> Result<(), RunError> {
    run_until(&SystemShutdownSignal)
}

/// Runs the default server until `signal` fires.
///
/// # Errors
///
/// See [`crate::run::run`].
pub fn run_until(signal: &dyn ShutdownSignal) -> Result<(), RunError> {
    let server = DEFAULT.server();
    crate::run::run(server.as_ref(), signal)
}

/// Identifier of the default server implementation.
pub fn string() -> String {
    DEFAULT.server().to_string()
}

#[cfg(test)]
mod tests {
    use skein_config::SocketEndpoint;

    use super::*;

    #[test]
    fn server_is_created_once() {
        let holder = DefaultServer::new();
        assert!(!holder.is_initialised());
        let first = holder.server();
        let second = holder.server();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(holder.is_initialised());
    }

    #[test]
    fn init_reconfigures_existing_server() {
        let holder = DefaultServer::new();
        holder.init(vec![ServerOption::Name(String::from("first"))]);
        let server = holder.server();
        holder.init(vec![ServerOption::Version(String::from("9.9.9"))]);

        assert!(Arc::ptr_eq(&server, &holder.server()));
        let options = server.config();
        assert_eq!(options.config().name(), "first");
        assert_eq!(options.config().version(), "9.9.9");
    }

    #[test]
    fn reset_discards_server() {
        let holder = DefaultServer::new();
        holder.init(vec![ServerOption::Address(SocketEndpoint::tcp("127.0.0.1", 0))]);
        let before = holder.server();
        holder.reset();
        assert!(!holder.is_initialised());
        let after = holder.server();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.config().config(), &skein_config::ServerConfig::default());
    }
}
