//! Server options: plain configuration plus pluggable collaborators.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use skein_config::{ServerConfig, SocketEndpoint};

use crate::broker::{Broker, MemoryBroker};
use crate::codec::{CodecFactory, JsonLinesCodecFactory};
use crate::lifecycle::{LifecycleReporter, StructuredLifecycleReporter};
use crate::registry::{MemoryRegistry, Registry};

/// Effective settings of a server.
#[derive(Clone)]
pub struct Options {
    config: ServerConfig,
    registry: Arc<dyn Registry>,
    broker: Arc<dyn Broker>,
    codec: Arc<dyn CodecFactory>,
    reporter: Arc<dyn LifecycleReporter>,
}

impl Options {
    /// Wraps `config` with the in-process default collaborators.
    #[must_use]
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(MemoryRegistry::new()),
            broker: Arc::new(MemoryBroker::new()),
            codec: Arc::new(JsonLinesCodecFactory),
            reporter: Arc::new(StructuredLifecycleReporter::new()),
        }
    }

    /// Plain configuration values.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Discovery backend.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Message broker.
    #[must_use]
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Codec factory applied to accepted connections.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn CodecFactory> {
        &self.codec
    }

    /// Lifecycle observer.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn LifecycleReporter> {
        &self.reporter
    }

    /// Applies `options` in order; later options win.
    pub fn apply(&mut self, options: impl IntoIterator<Item = ServerOption>) {
        for option in options {
            option.apply(self);
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::from_config(ServerConfig::default())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Options")
            .field("config", &self.config)
            .field("codec", &self.codec.content_type())
            .finish_non_exhaustive()
    }
}

/// Single adjustment passed to [`Server::init`](crate::Server::init).
pub enum ServerOption {
    /// Replaces the whole configuration, e.g. one loaded from the
    /// environment. Collaborators are kept.
    Config(ServerConfig),
    /// Service name.
    Name(String),
    /// Service version.
    Version(String),
    /// Instance identifier.
    Id(String),
    /// Listening address; port zero asks the OS for one at start.
    Address(SocketEndpoint),
    /// Advertised metadata; replaces any previous map.
    Metadata(BTreeMap<String, String>),
    /// Upper bound on how long `stop` waits for connections to finish.
    DrainTimeout(Duration),
    /// Discovery backend.
    Registry(Arc<dyn Registry>),
    /// Message broker.
    Broker(Arc<dyn Broker>),
    /// Codec factory for accepted connections.
    Codec(Arc<dyn CodecFactory>),
    /// Lifecycle observer.
    Reporter(Arc<dyn LifecycleReporter>),
}

impl ServerOption {
    fn apply(self, options: &mut Options) {
        let config = &mut options.config;
        match self {
            Self::Config(replacement) => *config = replacement,
            Self::Name(name) => config.server_name = name,
            Self::Version(version) => config.server_version = version,
            Self::Id(id) => config.server_id = id,
            Self::Address(address) => config.server_address = address,
            Self::Metadata(metadata) => config.server_metadata = metadata.into(),
            Self::DrainTimeout(timeout) => {
                config.drain_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            }
            Self::Registry(registry) => options.registry = registry,
            Self::Broker(broker) => options.broker = broker,
            Self::Codec(codec) => options.codec = codec,
            Self::Reporter(reporter) => options.reporter = reporter,
        }
    }
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(config) => formatter.debug_tuple("Config").field(config).finish(),
            Self::Name(name) => formatter.debug_tuple("Name").field(name).finish(),
            Self::Version(version) => formatter.debug_tuple("Version").field(version).finish(),
            Self::Id(id) => formatter.debug_tuple("Id").field(id).finish(),
            Self::Address(address) => formatter.debug_tuple("Address").field(address).finish(),
            Self::Metadata(metadata) => formatter.debug_tuple("Metadata").field(metadata).finish(),
            Self::DrainTimeout(timeout) => {
                formatter.debug_tuple("DrainTimeout").field(timeout).finish()
            }
            Self::Registry(_) => formatter.write_str("Registry(..)"),
            Self::Broker(_) => formatter.write_str("Broker(..)"),
            Self::Codec(codec) => formatter
                .debug_tuple("Codec")
                .field(&codec.content_type())
                .finish(),
            Self::Reporter(_) => formatter.write_str("Reporter(..)"),
        }
    }
}
