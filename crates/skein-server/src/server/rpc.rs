//! Default [`Server`] implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use tracing::{debug, warn};

use skein_config::SocketEndpoint;

use crate::handler::Handler;
use crate::options::{Options, ServerOption};
use crate::registry::ServiceDescriptor;
use crate::subscriber::Subscriber;
use crate::transport::{ListenerHandle, SocketListener};

use super::connections::Connections;
use super::dispatch::Dispatcher;
use super::routes::Routes;
use super::{LifecycleError, RegistrationState, RunState, SERVER_TARGET, Server, ServerError};

/// Time connection threads get to unwind after their sockets are shut down.
const UNWIND_GRACE: Duration = Duration::from_millis(250);

#[derive(Default)]
struct Lifecycle {
    state: RunState,
    listener: Option<ListenerHandle>,
    connections: Option<Arc<Connections>>,
    /// Endpoint actually bound while running.
    bound: Option<SocketEndpoint>,
}

/// RPC server dispatching connections through a pluggable codec.
///
/// Lifecycle state sits behind a lock that is released while the listener
/// binds and while connections drain, so state queries never wait on I/O.
/// Handler and subscriber tables sit behind read/write locks so dispatch
/// reads never wait on each other.
pub struct RpcServer {
    options: RwLock<Options>,
    routes: Arc<Routes>,
    subscribers: RwLock<BTreeMap<String, Vec<Subscriber>>>,
    registration: Mutex<Option<ServiceDescriptor>>,
    lifecycle: Mutex<Lifecycle>,
}

impl RpcServer {
    /// Builds a stopped, unregistered server from default options with
    /// `options` applied.
    #[must_use]
    pub fn new(options: Vec<ServerOption>) -> Self {
        let mut base = Options::default();
        base.apply(options);
        Self::with_options(base)
    }

    /// Builds a stopped, unregistered server from complete options.
    #[must_use]
    pub fn with_options(options: Options) -> Self {
        Self {
            options: RwLock::new(options),
            routes: Arc::new(Routes::default()),
            subscribers: RwLock::new(BTreeMap::new()),
            registration: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.lock_lifecycle().state
    }

    /// Current discovery registration state.
    pub fn registration_state(&self) -> RegistrationState {
        if self.lock_registration().is_some() {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    /// Address currently advertised: the bound endpoint while running,
    /// otherwise the configured one.
    pub fn address(&self) -> SocketEndpoint {
        let bound = self.lock_lifecycle().bound.clone();
        bound.unwrap_or_else(|| self.read_options().config().address().clone())
    }

    /// Names of the services with a handler.
    pub fn services(&self) -> Vec<String> {
        self.routes.services()
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Descriptor `register` would publish right now.
    pub fn descriptor(&self) -> ServiceDescriptor {
        let address = self.address();
        let options = self.read_options();
        let config = options.config();
        ServiceDescriptor {
            name: config.name().to_owned(),
            id: config.id().to_owned(),
            version: config.version().to_owned(),
            address: address.to_string(),
            metadata: config.metadata().clone(),
            endpoints: self.routes.endpoints(),
        }
    }

    fn read_options(&self) -> RwLockReadGuard<'_, Options> {
        self.options.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_registration(&self) -> MutexGuard<'_, Option<ServiceDescriptor>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fail_start(&self, options: &Options, error: LifecycleError) -> ServerError {
        self.lock_lifecycle().state = RunState::Stopped;
        options.reporter().start_failed(&error);
        ServerError::Lifecycle(error)
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::with_options(Options::default())
    }
}

impl fmt::Display for RpcServer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("rpc")
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RpcServer")
            .field("run_state", &self.run_state())
            .field("registration", &self.registration_state())
            .field("services", &self.services())
            .finish_non_exhaustive()
    }
}

impl Server for RpcServer {
    fn config(&self) -> Options {
        self.read_options().clone()
    }

    fn init(&self, options: Vec<ServerOption>) {
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(options);
    }

    fn handle(&self, handler: Handler) -> Result<(), ServerError> {
        handler.validate()?;
        debug!(
            target: SERVER_TARGET,
            service = handler.name(),
            endpoints = ?handler.endpoints(),
            "handler added"
        );
        if let Some(previous) = self.routes.insert(handler) {
            debug!(target: SERVER_TARGET, service = previous.name(), "handler replaced");
        }
        Ok(())
    }

    fn subscribe(&self, subscriber: Subscriber) -> Result<(), ServerError> {
        subscriber.validate()?;
        let broker = Arc::clone(self.read_options().broker());
        broker.subscribe(&subscriber)?;
        debug!(target: SERVER_TARGET, topic = subscriber.topic(), "subscriber added");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subscriber.topic().to_owned())
            .or_default()
            .push(subscriber);
        Ok(())
    }

    fn register(&self) -> Result<(), ServerError> {
        let options = self.config();
        let descriptor = self.descriptor();
        let mut registration = self.lock_registration();
        // A rename between registrations would otherwise leave the old
        // instance discoverable.
        if let Some(previous) = registration.as_ref()
            && (previous.name != descriptor.name || previous.id != descriptor.id)
            && let Err(error) = options.registry().deregister(previous)
        {
            options.reporter().registry_failed(previous, &error);
        }
        if let Err(error) = options.registry().register(&descriptor) {
            options.reporter().registry_failed(&descriptor, &error);
            return Err(error.into());
        }
        options.reporter().registered(&descriptor);
        *registration = Some(descriptor);
        Ok(())
    }

    fn deregister(&self) -> Result<(), ServerError> {
        let mut registration = self.lock_registration();
        let Some(descriptor) = registration.as_ref() else {
            return Ok(());
        };
        let options = self.config();
        if let Err(error) = options.registry().deregister(descriptor) {
            options.reporter().registry_failed(descriptor, &error);
            return Err(error.into());
        }
        options.reporter().deregistered(descriptor);
        *registration = None;
        Ok(())
    }

    fn start(&self) -> Result<(), ServerError> {
        {
            let mut lifecycle = self.lock_lifecycle();
            match lifecycle.state {
                RunState::Stopped => lifecycle.state = RunState::Starting,
                RunState::Running => {
                    return Err(LifecycleError::AlreadyRunning {
                        state: lifecycle.state,
                    }
                    .into());
                }
                state @ (RunState::Starting | RunState::Stopping) => {
                    return Err(LifecycleError::InTransition { state }.into());
                }
            }
        }

        let options = self.config();
        options.reporter().starting(options.config());
        let listener = match SocketListener::bind(options.config().address()) {
            Ok(listener) => listener,
            Err(error) => return Err(self.fail_start(&options, LifecycleError::Listener(error))),
        };
        let endpoint = listener.local_endpoint();
        let connections = Arc::new(Connections::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.routes),
            Arc::clone(options.codec()),
            Arc::clone(&connections),
        );
        let handle = match listener.start(Arc::new(dispatcher)) {
            Ok(handle) => handle,
            Err(error) => return Err(self.fail_start(&options, LifecycleError::Listener(error))),
        };

        {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.listener = Some(handle);
            lifecycle.connections = Some(connections);
            lifecycle.bound = Some(endpoint.clone());
            lifecycle.state = RunState::Running;
        }
        options.reporter().started(&endpoint);
        Ok(())
    }

    fn stop(&self) -> Result<(), ServerError> {
        let (listener, connections) = {
            let mut lifecycle = self.lock_lifecycle();
            match lifecycle.state {
                RunState::Stopped => return Ok(()),
                RunState::Running => {}
                state @ (RunState::Starting | RunState::Stopping) => {
                    return Err(LifecycleError::InTransition { state }.into());
                }
            }
            lifecycle.state = RunState::Stopping;
            (lifecycle.listener.take(), lifecycle.connections.take())
        };
        let options = self.config();
        options.reporter().stopping();

        let mut outcome = Ok(());
        let mut listener = listener;
        if let Some(listener) = listener.as_mut() {
            listener.shutdown();
            if let Err(error) = listener.join() {
                warn!(target: SERVER_TARGET, %error, "listener thread ended abnormally");
                outcome = Err(LifecycleError::ListenerPanicked.into());
            }
        }

        let mut undrained = 0;
        if let Some(connections) = connections {
            let busy = connections.close();
            debug!(target: SERVER_TARGET, busy, "refusing further frames");
            undrained = connections.wait_idle(options.config().drain_timeout());
            if undrained > 0 {
                warn!(
                    target: SERVER_TARGET,
                    undrained,
                    timeout_ms = options.config().drain_timeout_ms,
                    "drain timeout expired with handlers still running"
                );
            }
            connections.shutdown_all();
        }
        if let Some(listener) = listener.as_ref() {
            let lingering = listener.drain(UNWIND_GRACE);
            if lingering > 0 {
                debug!(target: SERVER_TARGET, lingering, "connection threads still unwinding");
            }
        }

        {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.bound = None;
            lifecycle.state = RunState::Stopped;
        }
        options.reporter().stopped(undrained);
        outcome
    }
}
