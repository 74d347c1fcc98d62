//! JSON-lines reference codec.
//!
//! Requests arrive one per line:
//!
//! ```json
//! {"service":"Greeter","method":"Hello","seq":0,"stream":false,"body":{"name":"Ada"}}
//! ```
//!
//! Responses are written the same way:
//!
//! ```json
//! {"service":"Greeter","method":"Hello","seq":0,"more":false,"body":{"message":"Hello Ada"}}
//! ```
//!
//! Error responses carry an `error` string and a `null` body. Blank lines are
//! ignored.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::DEFAULT_CONTENT_TYPE;
use crate::transport::ConnectionStream;

use super::{CodecError, CodecFactory, RequestHeader, ResponseHeader, ServerCodec};

/// Maximum size of a single frame in bytes.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RequestFrame {
    service: String,
    method: String,
    #[serde(default)]
    seq: u64,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Serialize)]
struct ResponseFrame<'a> {
    service: &'a str,
    method: &'a str,
    seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    more: bool,
    body: &'a Value,
}

/// Codec framing each message as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesCodec<S> {
    reader: BufReader<S>,
    pending_body: Option<Value>,
    closed: bool,
}

impl<S> JsonLinesCodec<S>
where
    S: Read + Write,
{
    /// Wraps a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
            pending_body: None,
            closed: false,
        }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    fn ensure_open(&self) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::Closed);
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, CodecError> {
        let limit = u64::try_from(MAX_FRAME_BYTES + 1).unwrap_or(u64::MAX);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = self
                .reader
                .by_ref()
                .take(limit)
                .read_until(b'\n', &mut buffer)?;
            if read == 0 {
                return Err(CodecError::EndOfStream);
            }
            if buffer.len() > MAX_FRAME_BYTES {
                let mut size = buffer.len();
                if buffer.last() != Some(&b'\n') {
                    size += self.skip_line()?;
                }
                return Err(CodecError::FrameTooLarge {
                    size,
                    max_size: MAX_FRAME_BYTES,
                });
            }
            if buffer.iter().any(|byte| !byte.is_ascii_whitespace()) {
                return Ok(buffer);
            }
        }
    }

    /// Consumes input up to and including the next newline so the remainder
    /// of a rejected frame is never read as a frame of its own.
    fn skip_line(&mut self) -> Result<usize, CodecError> {
        let mut skipped = 0;
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|byte| *byte == b'\n') {
                Some(index) => {
                    self.reader.consume(index + 1);
                    return Ok(skipped + index + 1);
                }
                None => {
                    let length = available.len();
                    self.reader.consume(length);
                    skipped += length;
                }
            }
        }
    }
}

impl<S> ServerCodec for JsonLinesCodec<S>
where
    S: Read + Write + Send,
{
    fn read_request_header(&mut self, header: &mut RequestHeader) -> Result<(), CodecError> {
        self.ensure_open()?;
        self.pending_body = None;
        let line = self.read_frame()?;
        let frame: RequestFrame = serde_json::from_slice(&line)?;
        *header = RequestHeader {
            service: frame.service,
            method: frame.method,
            seq: frame.seq,
            content_type: frame.content_type,
            stream: frame.stream,
            metadata: frame.metadata,
        };
        self.pending_body = Some(frame.body);
        Ok(())
    }

    fn read_request_body(&mut self, body: Option<&mut Value>) -> Result<(), CodecError> {
        self.ensure_open()?;
        let pending = self.pending_body.take();
        if let Some(target) = body {
            *target = pending.unwrap_or(Value::Null);
        }
        Ok(())
    }

    fn write_response(
        &mut self,
        header: &ResponseHeader,
        body: &Value,
        more: bool,
    ) -> Result<(), CodecError> {
        self.ensure_open()?;
        let frame = ResponseFrame {
            service: &header.service,
            method: &header.method,
            seq: header.seq,
            error: header.error.as_deref(),
            more,
            body,
        };
        let mut encoded = serde_json::to_vec(&frame)?;
        encoded.push(b'\n');
        let writer = self.reader.get_mut();
        writer.write_all(&encoded)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.closed = true;
        self.pending_body = None;
        self.reader.get_mut().flush()?;
        Ok(())
    }
}

/// Factory producing [`JsonLinesCodec`]s for accepted connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesCodecFactory;

impl CodecFactory for JsonLinesCodecFactory {
    fn content_type(&self) -> &str {
        DEFAULT_CONTENT_TYPE
    }

    fn new_codec(&self, stream: ConnectionStream) -> Box<dyn ServerCodec> {
        Box::new(JsonLinesCodec::new(stream))
    }
}
