//! Topic subscribers.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::handler::{HandlerError, ValidationError};
use crate::request::Publication;

type DeliverFn = dyn Fn(&Context, &Publication) -> Result<(), HandlerError> + Send + Sync;

/// Function bound to a topic, invoked for every publication on it.
#[derive(Clone)]
pub struct Subscriber {
    topic: String,
    deliver: Arc<DeliverFn>,
}

impl Subscriber {
    /// Binds `deliver` to `topic`.
    pub fn new<F>(topic: impl Into<String>, deliver: F) -> Self
    where
        F: Fn(&Context, &Publication) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            topic: topic.into(),
            deliver: Arc::new(deliver),
        }
    }

    /// Topic the subscriber listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Checks the subscriber can be registered.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTopic`] for a blank topic.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        Ok(())
    }

    /// Hands `publication` to the subscriber function.
    ///
    /// # Errors
    ///
    /// Returns whatever the subscriber function reports.
    pub fn deliver(&self, context: &Context, publication: &Publication) -> Result<(), HandlerError> {
        (self.deliver)(context, publication)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscriber")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
