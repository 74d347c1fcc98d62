//! Structured reporting of server lifecycle events.

use std::sync::Arc;

use skein_config::{ServerConfig, SocketEndpoint};

use crate::registry::{RegistryError, ServiceDescriptor};
use crate::server::LifecycleError;

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Observer notified as a server moves through its lifecycle.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked before the listener is bound.
    fn starting(&self, config: &ServerConfig);

    /// Invoked once the listener accepts connections on `endpoint`.
    fn started(&self, endpoint: &SocketEndpoint);

    /// Invoked when `start` fails; the server is stopped again.
    fn start_failed(&self, error: &LifecycleError);

    /// Invoked when `stop` begins.
    fn stopping(&self);

    /// Invoked when `stop` completes. `undrained` counts handler calls still
    /// running when the drain timeout expired.
    fn stopped(&self, undrained: usize);

    /// Invoked after the descriptor is published.
    fn registered(&self, service: &ServiceDescriptor);

    /// Invoked after the descriptor is withdrawn.
    fn deregistered(&self, service: &ServiceDescriptor);

    /// Invoked when a registry call fails.
    fn registry_failed(&self, service: &ServiceDescriptor, error: &RegistryError);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn starting(&self, config: &ServerConfig) {
        (**self).starting(config);
    }

    fn started(&self, endpoint: &SocketEndpoint) {
        (**self).started(endpoint);
    }

    fn start_failed(&self, error: &LifecycleError) {
        (**self).start_failed(error);
    }

    fn stopping(&self) {
        (**self).stopping();
    }

    fn stopped(&self, undrained: usize) {
        (**self).stopped(undrained);
    }

    fn registered(&self, service: &ServiceDescriptor) {
        (**self).registered(service);
    }

    fn deregistered(&self, service: &ServiceDescriptor) {
        (**self).deregistered(service);
    }

    fn registry_failed(&self, service: &ServiceDescriptor, error: &RegistryError) {
        (**self).registry_failed(service, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn starting(&self, config: &ServerConfig) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "starting",
            name = config.name(),
            id = config.id(),
            address = %config.address(),
            "starting server"
        );
    }

    fn started(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "started",
            address = %endpoint,
            "server accepting connections"
        );
    }

    fn start_failed(&self, error: &LifecycleError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "start_failed",
            error = %error,
            "server failed to start"
        );
    }

    fn stopping(&self) {
        tracing::info!(target: LIFECYCLE_TARGET, event = "stopping", "stopping server");
    }

    fn stopped(&self, undrained: usize) {
        if undrained == 0 {
            tracing::info!(target: LIFECYCLE_TARGET, event = "stopped", "server stopped");
        } else {
            tracing::warn!(
                target: LIFECYCLE_TARGET,
                event = "stopped",
                undrained,
                "server stopped before every running call drained"
            );
        }
    }

    fn registered(&self, service: &ServiceDescriptor) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "registered",
            name = %service.name,
            id = %service.id,
            address = %service.address,
            endpoints = service.endpoints.len(),
            "service registered"
        );
    }

    fn deregistered(&self, service: &ServiceDescriptor) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "deregistered",
            name = %service.name,
            id = %service.id,
            "service deregistered"
        );
    }

    fn registry_failed(&self, service: &ServiceDescriptor, error: &RegistryError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "registry_failed",
            name = %service.name,
            id = %service.id,
            error = %error,
            "registry call failed"
        );
    }
}
