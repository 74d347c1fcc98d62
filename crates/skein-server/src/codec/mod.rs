//! Codec boundary between the server core and the wire.
//!
//! A [`ServerCodec`] reads request frames and writes response frames for one
//! connection. The core never inspects bytes: headers arrive as
//! [`RequestHeader`] values and bodies as neutral [`serde_json::Value`] trees,
//! which a codec is free to encode however it likes. [`CodecFactory`] builds a
//! codec for each accepted connection.
//!
//! The reference implementation, [`JsonLinesCodec`], frames every message as a
//! single JSON object on its own line.

mod jsonl;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::transport::ConnectionStream;

pub use self::jsonl::{JsonLinesCodec, JsonLinesCodecFactory, MAX_FRAME_BYTES};

/// Header of an inbound request frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    /// Target service name.
    pub service: String,
    /// Target method name.
    pub method: String,
    /// Sequence number chosen by the caller.
    pub seq: u64,
    /// Content type of the body; empty when the frame did not declare one.
    pub content_type: String,
    /// Whether the caller is opening a stream.
    pub stream: bool,
    /// Caller-supplied metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Envelope written ahead of every response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Service the response belongs to.
    pub service: String,
    /// Method the response belongs to.
    pub method: String,
    /// Sequence number of this response.
    pub seq: u64,
    /// Error text reported to the caller instead of a body.
    pub error: Option<String>,
}

/// Errors surfaced by codecs.
///
/// Sources are held behind [`Arc`] so the error can be cloned into a stream's
/// sticky error slot and still be returned to the caller.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The peer closed the connection cleanly between frames.
    #[error("end of stream")]
    EndOfStream,
    /// The codec was already closed.
    #[error("codec closed")]
    Closed,
    /// Reading or writing the underlying transport failed.
    #[error("codec I/O error: {0}")]
    Io(#[source] Arc<io::Error>),
    /// A frame could not be encoded or decoded.
    #[error("malformed frame: {message}")]
    Malformed {
        /// Description of the framing problem.
        message: String,
        /// Decoder error, when one was reported.
        #[source]
        source: Option<Arc<serde_json::Error>>,
    },
    /// A frame exceeded the size limit.
    #[error("frame too large: {size} bytes exceeds {max_size} byte limit")]
    FrameTooLarge {
        /// Observed size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max_size: usize,
    },
}

impl CodecError {
    /// Creates a malformed frame error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Reports whether the peer ended the stream.
    #[must_use]
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

impl From<io::Error> for CodecError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            return Self::EndOfStream;
        }
        Self::Io(Arc::new(error))
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed {
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }
}

/// Bidirectional, sequence-aware frame channel for one connection.
pub trait ServerCodec: Send {
    /// Reads the next request header into `header`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EndOfStream`] when the peer has finished, or any
    /// transport or framing failure.
    fn read_request_header(&mut self, header: &mut RequestHeader) -> Result<(), CodecError>;

    /// Reads the body belonging to the last header into `body`; `None`
    /// discards it.
    ///
    /// # Errors
    ///
    /// Returns any transport or framing failure.
    fn read_request_body(&mut self, body: Option<&mut Value>) -> Result<(), CodecError>;

    /// Writes a response frame. `more` tells the peer further frames for the
    /// same call may follow.
    ///
    /// # Errors
    ///
    /// Returns any transport or encoding failure.
    fn write_response(
        &mut self,
        header: &ResponseHeader,
        body: &Value,
        more: bool,
    ) -> Result<(), CodecError>;

    /// Closes the codec.
    ///
    /// # Errors
    ///
    /// Returns any failure flushing or shutting down the transport.
    fn close(&mut self) -> Result<(), CodecError>;
}

impl<C> ServerCodec for Box<C>
where
    C: ServerCodec + ?Sized,
{
    fn read_request_header(&mut self, header: &mut RequestHeader) -> Result<(), CodecError> {
        (**self).read_request_header(header)
    }

    fn read_request_body(&mut self, body: Option<&mut Value>) -> Result<(), CodecError> {
        (**self).read_request_body(body)
    }

    fn write_response(
        &mut self,
        header: &ResponseHeader,
        body: &Value,
        more: bool,
    ) -> Result<(), CodecError> {
        (**self).write_response(header, body, more)
    }

    fn close(&mut self) -> Result<(), CodecError> {
        (**self).close()
    }
}

/// Builds a codec for each accepted connection.
pub trait CodecFactory: Send + Sync {
    /// Content type the produced codecs speak.
    fn content_type(&self) -> &str;

    /// Wraps an accepted connection in a codec.
    fn new_codec(&self, stream: ConnectionStream) -> Box<dyn ServerCodec>;
}
