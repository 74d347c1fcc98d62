//! Service handlers built from explicit method tables.
//!
//! A [`Handler`] maps method names to closures. Unary methods receive the
//! decoded request body and return a reply; streaming methods receive a
//! [`Streamer`] that owns the connection for the rest of the call.
//!
//! Problems found while building (blank or duplicate method names) are kept
//! on the handler and surfaced when it is passed to
//! [`Server::handle`](crate::Server::handle).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::context::Context;
use crate::request::Request;
use crate::stream::{StreamError, Streamer};

/// Errors describing an invalid handler or subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The handler has no service name.
    #[error("service name must not be empty")]
    EmptyServiceName,
    /// The subscriber has no topic.
    #[error("subscription topic must not be empty")]
    EmptyTopic,
    /// The handler exposes no methods.
    #[error("service {service} defines no methods")]
    NoMethods {
        /// Service being validated.
        service: String,
    },
    /// A method was added with a blank name.
    #[error("service {service} has a method with a blank name")]
    BlankMethod {
        /// Service being validated.
        service: String,
    },
    /// The same method name was added twice.
    #[error("service {service} defines method {method} more than once")]
    DuplicateMethod {
        /// Service being validated.
        service: String,
        /// Repeated method name.
        method: String,
    },
}

/// Failure reported by a handler or subscriber function.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request body did not match the method's input type.
    #[error("invalid request body: {0}")]
    InvalidRequest(#[source] serde_json::Error),
    /// The reply could not be serialised.
    #[error("failed to encode reply: {0}")]
    InvalidReply(#[source] serde_json::Error),
    /// The stream failed while the handler was using it.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// Application-level failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Builds an application-level failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

type UnaryFn = dyn Fn(&Context, &Request) -> Result<Value, HandlerError> + Send + Sync;
type StreamingFn = dyn Fn(&dyn Streamer) -> Result<(), HandlerError> + Send + Sync;

/// Calling convention of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One request, one reply on the same connection.
    Unary,
    /// The method takes over the connection through a stream.
    Streaming,
}

#[derive(Clone)]
pub(crate) enum Method {
    Unary(Arc<UnaryFn>),
    Streaming(Arc<StreamingFn>),
}

impl Method {
    const fn kind(&self) -> MethodKind {
        match self {
            Self::Unary(_) => MethodKind::Unary,
            Self::Streaming(_) => MethodKind::Streaming,
        }
    }
}

/// Named service with its method table.
#[derive(Clone)]
pub struct Handler {
    name: String,
    methods: BTreeMap<String, Method>,
    problems: Vec<ValidationError>,
}

impl Handler {
    /// Starts building a handler for `name`.
    pub fn builder(name: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder {
            handler: Self {
                name: name.into(),
                methods: BTreeMap::new(),
                problems: Vec::new(),
            },
        }
    }

    /// Service name used for routing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calling convention of `method`, if the handler defines it.
    #[must_use]
    pub fn method_kind(&self, method: &str) -> Option<MethodKind> {
        self.methods.get(method).map(Method::kind)
    }

    /// Advertised endpoints in `Service.Method` form, sorted by method.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.methods
            .keys()
            .map(|method| format!("{}.{method}", self.name))
            .collect()
    }

    /// Checks the handler is routable.
    ///
    /// # Errors
    ///
    /// Returns the first problem recorded while building, or a
    /// [`ValidationError`] for an empty name or method table.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyServiceName);
        }
        if let Some(problem) = self.problems.first() {
            return Err(problem.clone());
        }
        if self.methods.is_empty() {
            return Err(ValidationError::NoMethods {
                service: self.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn method(&self, method: &str) -> Option<&Method> {
        self.methods.get(method)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Handler")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("problems", &self.problems)
            .finish()
    }
}

/// Incrementally assembles a [`Handler`].
#[must_use]
pub struct HandlerBuilder {
    handler: Handler,
}

impl HandlerBuilder {
    /// Adds a unary method decoding its body as `Req` and replying with
    /// `Rsp`.
    pub fn unary<Req, Rsp, F>(self, method: &str, func: F) -> Self
    where
        Req: DeserializeOwned,
        Rsp: Serialize,
        F: Fn(&Context, Req) -> Result<Rsp, HandlerError> + Send + Sync + 'static,
    {
        let call = move |context: &Context, request: &Request| {
            let input = request.decode::<Req>().map_err(HandlerError::InvalidRequest)?;
            let reply = func(context, input)?;
            serde_json::to_value(reply).map_err(HandlerError::InvalidReply)
        };
        self.insert(method, Method::Unary(Arc::new(call)))
    }

    /// Adds a streaming method.
    pub fn streaming<F>(self, method: &str, func: F) -> Self
    where
        F: Fn(&dyn Streamer) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(method, Method::Streaming(Arc::new(func)))
    }

    /// Finishes the handler. Validation happens when it is handed to a
    /// server.
    pub fn build(self) -> Handler {
        self.handler
    }

    fn insert(mut self, method: &str, entry: Method) -> Self {
        let service = self.handler.name.clone();
        if method.trim().is_empty() {
            self.handler
                .problems
                .push(ValidationError::BlankMethod { service });
        } else if self.handler.methods.contains_key(method) {
            self.handler.problems.push(ValidationError::DuplicateMethod {
                service,
                method: method.to_owned(),
            });
        } else {
            self.handler.methods.insert(method.to_owned(), entry);
        }
        self
    }
}
