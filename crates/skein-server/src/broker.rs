//! Publish/subscribe seam and an in-process broker.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Context;
use crate::request::Publication;
use crate::subscriber::Subscriber;

const BROKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::broker");

/// Failures reported by a message broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// Backend diagnostic.
        message: String,
    },
    /// The broker refused the subscription.
    #[error("broker rejected subscription to {topic}: {reason}")]
    Rejected {
        /// Requested topic.
        topic: String,
        /// Backend diagnostic.
        reason: String,
    },
}

/// Message broker that routes publications to subscribers.
pub trait Broker: Send + Sync {
    /// Attaches `subscriber` to its topic.
    ///
    /// # Errors
    ///
    /// Returns the broker failure.
    fn subscribe(&self, subscriber: &Subscriber) -> Result<(), BrokerError>;
}

/// Broker delivering publications synchronously within the process.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: RwLock<BTreeMap<String, Vec<Subscriber>>>,
}

impl MemoryBroker {
    /// Creates a broker without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `publication` to every subscriber of its topic in
    /// subscription order. Failures are logged and do not stop delivery.
    ///
    /// Returns the number of subscribers that accepted the publication.
    pub fn publish(&self, publication: &Publication) -> usize {
        let subscribers = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(publication.topic())
            .cloned()
            .unwrap_or_default();
        if subscribers.is_empty() {
            debug!(
                target: BROKER_TARGET,
                topic = publication.topic(),
                "publication has no subscribers"
            );
            return 0;
        }

        let context = Context::new();
        subscribers
            .iter()
            .filter(|subscriber| match subscriber.deliver(&context, publication) {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        target: BROKER_TARGET,
                        topic = publication.topic(),
                        %error,
                        "subscriber failed"
                    );
                    false
                }
            })
            .count()
    }

    /// Number of subscribers attached to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl Broker for MemoryBroker {
    fn subscribe(&self, subscriber: &Subscriber) -> Result<(), BrokerError> {
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subscriber.topic().to_owned())
            .or_default()
            .push(subscriber.clone());
        Ok(())
    }
}
