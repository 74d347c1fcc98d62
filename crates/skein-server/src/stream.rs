//! Sequenced bidirectional streams over a connection's codec.
//!
//! An [`RpcStream`] takes exclusive ownership of one connection's codec for
//! the lifetime of a streaming call. Every `send` stamps the outgoing
//! envelope with the next sequence number; every `recv` reads the next
//! request frame.
//!
//! ## Locking
//!
//! `send`, `recv` and `close` share one exclusive lock that is held across
//! the codec call. A `recv` blocked on the network therefore blocks a
//! concurrent `send` on the same stream until data arrives; the stream is a
//! single critical section, not a multiplexed channel. The last recorded
//! error lives behind a separate read/write lock so [`Streamer::error`] never
//! waits on I/O.
//!
//! Errors observed from the codec are recorded and never cleared: once a
//! stream has failed, [`Streamer::error`] keeps reporting the most recent
//! failure even if later calls succeed. End of stream is recorded the same
//! way and is reported as [`CodecError::EndOfStream`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{CodecError, RequestHeader, ResponseHeader, ServerCodec};
use crate::context::Context;
use crate::request::Request;

const STREAM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stream");

/// Errors returned by stream operations.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The codec failed; includes end of stream.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The stream was closed before the call.
    #[error("stream closed")]
    Closed,
    /// An outbound message could not be converted to a frame body.
    #[error("failed to encode message: {0}")]
    Encode(#[source] Arc<serde_json::Error>),
    /// An inbound frame body did not match the requested message type.
    #[error("failed to decode message: {0}")]
    Decode(#[source] Arc<serde_json::Error>),
}

impl StreamError {
    /// Reports whether the peer ended the stream.
    #[must_use]
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::Codec(CodecError::EndOfStream))
    }
}

/// A stream established with a client.
///
/// Bidirectional when the initiating request says so. The last error is
/// left in [`Streamer::error`]; end of stream surfaces as an error for which
/// [`StreamError::is_end_of_stream`] holds.
pub trait Streamer: Send + Sync {
    /// Context of the call; fixed for the stream's lifetime.
    fn context(&self) -> &Context;

    /// Request that opened the stream.
    fn request(&self) -> &Request;

    /// Sends one message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] after [`Streamer::close`], or the
    /// codec's write failure.
    fn send(&self, message: &Value) -> Result<(), StreamError>;

    /// Receives the next message from the peer.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] after [`Streamer::close`], or the
    /// codec's read failure, including end of stream.
    fn recv(&self) -> Result<Value, StreamError>;

    /// Last error observed on the stream, if any.
    fn error(&self) -> Option<StreamError>;

    /// Closes the stream and its codec.
    ///
    /// # Errors
    ///
    /// Returns the codec's close failure.
    fn close(&self) -> Result<(), StreamError>;
}

/// Typed helpers over [`Streamer`].
pub trait StreamerExt: Streamer {
    /// Serialises `message` and sends it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Encode`] when `message` cannot be represented,
    /// or any error from [`Streamer::send`].
    fn send_message<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), StreamError> {
        let value =
            serde_json::to_value(message).map_err(|error| StreamError::Encode(Arc::new(error)))?;
        self.send(&value)
    }

    /// Receives the next message and decodes it as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Decode`] when the body does not match `T`, or
    /// any error from [`Streamer::recv`].
    fn recv_message<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        let value = self.recv()?;
        serde_json::from_value(value).map_err(|error| StreamError::Decode(Arc::new(error)))
    }
}

impl<S: Streamer + ?Sized> StreamerExt for S {}

struct StreamState<C> {
    seq: u64,
    closed: bool,
    codec: C,
}

/// [`Streamer`] backed by an exclusively owned codec.
pub struct RpcStream<C> {
    state: Mutex<StreamState<C>>,
    last_error: RwLock<Option<StreamError>>,
    request: Request,
    context: Context,
}

impl<C> RpcStream<C>
where
    C: ServerCodec,
{
    /// Wraps `codec` for the call described by `request`.
    pub fn new(codec: C, request: Request, context: Context) -> Self {
        Self {
            state: Mutex::new(StreamState {
                seq: 0,
                closed: false,
                codec,
            }),
            last_error: RwLock::new(None),
            request,
            context,
        }
    }

    /// Sequence number the next successful send will carry.
    pub fn sequence(&self) -> u64 {
        self.lock().seq
    }

    /// Whether [`Streamer::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Writes an error envelope in place of a message. Used when a streaming
    /// handler fails after taking over the connection.
    pub(crate) fn send_error(&self, message: &str) -> Result<(), StreamError> {
        self.write(&Value::Null, Some(message.to_owned()))
    }

    fn write(&self, body: &Value, failure: Option<String>) -> Result<(), StreamError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StreamError::Closed);
        }
        let header = ResponseHeader {
            service: self.request.service().to_owned(),
            method: self.request.method().to_owned(),
            seq: state.seq,
            error: failure,
        };
        match state.codec.write_response(&header, body, false) {
            Ok(()) => {
                state.seq += 1;
                Ok(())
            }
            Err(error) => {
                warn!(
                    target: STREAM_TARGET,
                    service = self.request.service(),
                    method = self.request.method(),
                    seq = header.seq,
                    %error,
                    "writing response failed"
                );
                Err(self.record(error))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, error: CodecError) -> StreamError {
        let error = StreamError::Codec(error);
        let mut slot = self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(error.clone());
        error
    }
}

impl<C> Streamer for RpcStream<C>
where
    C: ServerCodec,
{
    fn context(&self) -> &Context {
        &self.context
    }

    fn request(&self) -> &Request {
        &self.request
    }

    fn send(&self, message: &Value) -> Result<(), StreamError> {
        self.write(message, None)
    }

    fn recv(&self) -> Result<Value, StreamError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StreamError::Closed);
        }
        let mut header = RequestHeader::default();
        if let Err(error) = state.codec.read_request_header(&mut header) {
            // Drop whatever body belongs to the failed frame so the next
            // header read starts on a frame boundary.
            if let Err(discard) = state.codec.read_request_body(None) {
                debug!(target: STREAM_TARGET, error = %discard, "discarding body failed");
            }
            return Err(self.record(error));
        }
        let mut body = Value::Null;
        state
            .codec
            .read_request_body(Some(&mut body))
            .map_err(|error| self.record(error))?;
        Ok(body)
    }

    fn error(&self) -> Option<StreamError> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close(&self) -> Result<(), StreamError> {
        let mut state = self.lock();
        state.closed = true;
        state.codec.close().map_err(|error| self.record(error))
    }
}

#[cfg(test)]
mod tests;
