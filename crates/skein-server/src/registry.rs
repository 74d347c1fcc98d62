//! Service discovery seam and an in-memory registry.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptor published so clients can discover a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Logical service name.
    pub name: String,
    /// Unique instance identifier.
    pub id: String,
    /// Deployed version.
    pub version: String,
    /// Address clients should dial.
    pub address: String,
    /// Advertised metadata.
    pub metadata: BTreeMap<String, String>,
    /// Methods served, as `Service.Method`.
    pub endpoints: Vec<String>,
}

/// Failures reported by a discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The backend could not be reached.
    #[error("registry unavailable: {message}")]
    Unavailable {
        /// Backend diagnostic.
        message: String,
    },
    /// The backend refused the descriptor.
    #[error("registry rejected {name}/{id}: {reason}")]
    Rejected {
        /// Service name.
        name: String,
        /// Instance identifier.
        id: String,
        /// Backend diagnostic.
        reason: String,
    },
}

/// Discovery backend a server publishes itself to.
pub trait Registry: Send + Sync {
    /// Publishes or refreshes `service`.
    ///
    /// # Errors
    ///
    /// Returns the backend failure.
    fn register(&self, service: &ServiceDescriptor) -> Result<(), RegistryError>;

    /// Withdraws `service`.
    ///
    /// # Errors
    ///
    /// Returns the backend failure.
    fn deregister(&self, service: &ServiceDescriptor) -> Result<(), RegistryError>;
}

/// Registry keeping descriptors in process memory, keyed by name and id.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    services: Mutex<BTreeMap<(String, String), ServiceDescriptor>>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances currently published under `name`.
    pub fn lookup(&self, name: &str) -> Vec<ServiceDescriptor> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|service| service.name == name)
            .cloned()
            .collect()
    }

    /// Every published instance.
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Registry for MemoryRegistry {
    fn register(&self, service: &ServiceDescriptor) -> Result<(), RegistryError> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.name.clone(), service.id.clone()), service.clone());
        Ok(())
    }

    fn deregister(&self, service: &ServiceDescriptor) -> Result<(), RegistryError> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(service.name.clone(), service.id.clone()));
        Ok(())
    }
}
