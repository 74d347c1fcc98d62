//! Per-connection request loop.
//!
//! Unary calls are answered inline and the loop reads the next frame from
//! the same connection. A streaming call hands the connection's codec to an
//! [`RpcStream`]; the connection ends when the streaming handler returns.
//! Routing failures and malformed frames are answered with an error envelope
//! and the connection stays open. Once the server begins stopping, frames
//! read afterwards are dropped unanswered and the connection closes.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::{CodecError, CodecFactory, RequestHeader, ResponseHeader, ServerCodec};
use crate::context::Context;
use crate::handler::Method;
use crate::request::Request;
use crate::stream::{RpcStream, Streamer};
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::SERVER_TARGET;
use super::connections::{Connection, Connections};
use super::routes::Routes;

type Codec = Box<dyn ServerCodec>;

/// What the connection does after one frame.
enum Next {
    /// Read another frame.
    Continue(Codec),
    /// Close the codec and end the connection.
    Close(Codec),
    /// A stream owned the codec and has already closed it.
    HandedOver,
}

/// Routes frames read from accepted connections to handlers.
pub(crate) struct Dispatcher {
    routes: Arc<Routes>,
    codecs: Arc<dyn CodecFactory>,
    connections: Arc<Connections>,
}

impl Dispatcher {
    pub(crate) fn new(
        routes: Arc<Routes>,
        codecs: Arc<dyn CodecFactory>,
        connections: Arc<Connections>,
    ) -> Self {
        Self {
            routes,
            codecs,
            connections,
        }
    }

    fn serve(&self, mut codec: Codec, connection: &Connection, peer: &str) {
        loop {
            let mut header = RequestHeader::default();
            let read = codec.read_request_header(&mut header);
            let next = if connection.begin_call() {
                let next = match read {
                    Ok(()) => self.dispatch(codec, header, connection.context(), peer),
                    Err(error) => reject_frame(codec, &error, peer),
                };
                connection.end_call();
                next
            } else {
                debug!(target: SERVER_TARGET, peer, "server stopping; dropping frame");
                Next::Close(codec)
            };
            match next {
                Next::Continue(open) => codec = open,
                Next::Close(mut finished) => {
                    if let Err(error) = finished.close() {
                        debug!(target: SERVER_TARGET, peer, %error, "closing codec failed");
                    }
                    return;
                }
                Next::HandedOver => return,
            }
        }
    }

    fn dispatch(
        &self,
        mut codec: Codec,
        header: RequestHeader,
        connection: &Context,
        peer: &str,
    ) -> Next {
        let mut response = ResponseHeader {
            service: header.service.clone(),
            method: header.method.clone(),
            seq: header.seq,
            error: None,
        };
        let method = match self.routes.lookup(&header.service, &header.method) {
            Ok(method) => method,
            Err(error) => {
                warn!(target: SERVER_TARGET, peer, %error, "unroutable request");
                discard_body(codec.as_mut(), peer);
                response.error = Some(error.to_string());
                return reply(codec, &response, &Value::Null, peer);
            }
        };

        let mut body = Value::Null;
        if let Err(error) = codec.read_request_body(Some(&mut body)) {
            warn!(target: SERVER_TARGET, peer, %error, "reading request body failed");
            return Next::Close(codec);
        }
        let request = Request::from_header(header, body);
        let context = connection.scoped(request.metadata().clone());
        debug!(
            target: SERVER_TARGET,
            peer,
            service = request.service(),
            method = request.method(),
            seq = request.seq(),
            "dispatching request"
        );

        match method {
            Method::Unary(call) => match call(&context, &request) {
                Ok(reply_body) => reply(codec, &response, &reply_body, peer),
                Err(error) => {
                    debug!(target: SERVER_TARGET, peer, %error, "handler failed");
                    response.error = Some(error.to_string());
                    reply(codec, &response, &Value::Null, peer)
                }
            },
            Method::Streaming(call) => {
                let stream = RpcStream::new(codec, request, context);
                if let Err(error) = call(&stream) {
                    debug!(target: SERVER_TARGET, peer, %error, "streaming handler failed");
                    if let Err(write_error) = stream.send_error(&error.to_string()) {
                        debug!(
                            target: SERVER_TARGET,
                            peer,
                            error = %write_error,
                            "reporting handler failure failed"
                        );
                    }
                }
                if let Err(error) = stream.close() {
                    debug!(target: SERVER_TARGET, peer, %error, "closing stream failed");
                }
                Next::HandedOver
            }
        }
    }
}

impl ConnectionHandler for Dispatcher {
    fn handle(&self, stream: ConnectionStream) {
        let peer = stream.peer();
        let Some(connection) = self.connections.open(&stream) else {
            debug!(target: SERVER_TARGET, peer, "server stopping; refusing connection");
            if let Err(error) = stream.shutdown() {
                debug!(target: SERVER_TARGET, peer, %error, "socket shutdown failed");
            }
            return;
        };
        debug!(target: SERVER_TARGET, peer, "serving connection");
        let codec = self.codecs.new_codec(stream);
        self.serve(codec, &connection, &peer);
    }
}

/// Answers a frame whose header could not be read.
fn reject_frame(mut codec: Codec, error: &CodecError, peer: &str) -> Next {
    match error {
        CodecError::EndOfStream => {
            debug!(target: SERVER_TARGET, peer, "peer closed connection");
            Next::Close(codec)
        }
        CodecError::Malformed { .. } | CodecError::FrameTooLarge { .. } => {
            warn!(target: SERVER_TARGET, peer, %error, "rejecting request frame");
            discard_body(codec.as_mut(), peer);
            let header = ResponseHeader {
                error: Some(error.to_string()),
                ..ResponseHeader::default()
            };
            reply(codec, &header, &Value::Null, peer)
        }
        CodecError::Closed | CodecError::Io(_) => {
            warn!(target: SERVER_TARGET, peer, %error, "reading request failed");
            Next::Close(codec)
        }
    }
}

fn discard_body(codec: &mut dyn ServerCodec, peer: &str) {
    if let Err(error) = codec.read_request_body(None) {
        debug!(target: SERVER_TARGET, peer, %error, "discarding request body failed");
    }
}

fn reply(mut codec: Codec, header: &ResponseHeader, body: &Value, peer: &str) -> Next {
    match codec.write_response(header, body, false) {
        Ok(()) => Next::Continue(codec),
        Err(error) => {
            warn!(target: SERVER_TARGET, peer, %error, "writing response failed");
            Next::Close(codec)
        }
    }
}
