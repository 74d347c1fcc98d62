//! Read-only descriptors for inbound calls and publications.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::RequestHeader;

/// Content type assumed when a frame does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Immutable view of the call that initiated a dispatch or stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    service: String,
    method: String,
    content_type: String,
    stream: bool,
    seq: u64,
    metadata: BTreeMap<String, String>,
    body: Value,
}

impl Request {
    /// Builds a request descriptor.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        content_type: impl Into<String>,
        stream: bool,
        body: Value,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            content_type: content_type.into(),
            stream,
            seq: 0,
            metadata: BTreeMap::new(),
            body,
        }
    }

    pub(crate) fn from_header(header: RequestHeader, body: Value) -> Self {
        let content_type = if header.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE.to_owned()
        } else {
            header.content_type
        };
        Self {
            service: header.service,
            method: header.method,
            content_type,
            stream: header.stream,
            seq: header.seq,
            metadata: header.metadata,
            body,
        }
    }

    /// Target service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Target method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Content type of the payload.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Whether the caller opened a stream rather than a single call.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        self.stream
    }

    /// Sequence number the caller attached to the initiating frame.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Metadata the caller attached to the initiating frame.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Raw payload of the initiating frame.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Decodes the initiating payload into a typed message.
    ///
    /// # Errors
    ///
    /// Returns the conversion error when the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

/// A message delivered asynchronously by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    topic: String,
    message: Value,
    content_type: String,
}

impl Publication {
    /// Builds a publication with the default content type.
    #[must_use]
    pub fn new(topic: impl Into<String>, message: Value) -> Self {
        Self::with_content_type(topic, message, DEFAULT_CONTENT_TYPE)
    }

    /// Builds a publication with an explicit content type.
    #[must_use]
    pub fn with_content_type(
        topic: impl Into<String>,
        message: Value,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            message,
            content_type: content_type.into(),
        }
    }

    /// Topic the message was published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Decoded message payload.
    #[must_use]
    pub const fn message(&self) -> &Value {
        &self.message
    }

    /// Content type of the payload.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Decodes the payload into a typed message.
    ///
    /// # Errors
    ///
    /// Returns the conversion error when the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.message)
    }
}
