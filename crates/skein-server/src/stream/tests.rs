//! Unit tests for sequenced streams.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use rstest::{fixture, rstest};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::*;
use crate::request::DEFAULT_CONTENT_TYPE;

type Frame = Result<(RequestHeader, Value), CodecError>;

#[derive(Debug, Default)]
struct CodecLog {
    written: Vec<(ResponseHeader, Value, bool)>,
    discards: usize,
    closes: usize,
}

/// Scripted codec: replays request frames and records everything written.
///
/// A failed header leaves a body fragment pending. Reading the next header
/// without draining it reports a framing error, as a real byte stream would.
struct ScriptedCodec {
    frames: VecDeque<Frame>,
    pending: Option<Value>,
    fail_writes: bool,
    log: Arc<Mutex<CodecLog>>,
}

impl ScriptedCodec {
    fn new(frames: Vec<Frame>) -> (Self, Arc<Mutex<CodecLog>>) {
        let log = Arc::new(Mutex::new(CodecLog::default()));
        let codec = Self {
            frames: frames.into(),
            pending: None,
            fail_writes: false,
            log: Arc::clone(&log),
        };
        (codec, log)
    }

    fn failing_writes() -> (Self, Arc<Mutex<CodecLog>>) {
        let (mut codec, log) = Self::new(Vec::new());
        codec.fail_writes = true;
        (codec, log)
    }
}

impl ServerCodec for ScriptedCodec {
    fn read_request_header(&mut self, header: &mut RequestHeader) -> Result<(), CodecError> {
        if self.pending.take().is_some() {
            return Err(CodecError::malformed("undrained body fragment"));
        }
        match self.frames.pop_front() {
            Some(Ok((next, body))) => {
                *header = next;
                self.pending = Some(body);
                Ok(())
            }
            Some(Err(error)) => {
                self.pending = Some(json!("fragment"));
                Err(error)
            }
            None => Err(CodecError::EndOfStream),
        }
    }

    fn read_request_body(&mut self, body: Option<&mut Value>) -> Result<(), CodecError> {
        let pending = self.pending.take();
        match body {
            Some(target) => *target = pending.unwrap_or(Value::Null),
            None => self.log.lock().expect("log lock").discards += 1,
        }
        Ok(())
    }

    fn write_response(
        &mut self,
        header: &ResponseHeader,
        body: &Value,
        more: bool,
    ) -> Result<(), CodecError> {
        if self.fail_writes {
            return Err(CodecError::from(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            )));
        }
        self.log
            .lock()
            .expect("log lock")
            .written
            .push((header.clone(), body.clone(), more));
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.log.lock().expect("log lock").closes += 1;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct HelloRequest {
    name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct HelloReply {
    message: String,
}

#[fixture]
fn greeter_request() -> Request {
    Request::new("Greeter", "Hello", DEFAULT_CONTENT_TYPE, true, Value::Null)
}

fn frame(body: Value) -> Frame {
    Ok((
        RequestHeader {
            service: String::from("Greeter"),
            method: String::from("Hello"),
            stream: true,
            ..RequestHeader::default()
        },
        body,
    ))
}

#[rstest]
fn first_send_carries_sequence_zero(greeter_request: Request) {
    let (codec, log) = ScriptedCodec::new(Vec::new());
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    stream
        .send_message(&HelloReply {
            message: String::from("hi"),
        })
        .expect("send");

    let log = log.lock().expect("log lock");
    let (header, body, more) = &log.written[0];
    assert_eq!(header.service, "Greeter");
    assert_eq!(header.method, "Hello");
    assert_eq!(header.seq, 0);
    assert!(header.error.is_none());
    assert!(!more);
    assert_eq!(body, &json!({"message": "hi"}));
    drop(log);
    assert_eq!(stream.sequence(), 1);
}

#[rstest]
fn concurrent_sends_use_each_sequence_once(greeter_request: Request) {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 25;

    let (codec, log) = ScriptedCodec::new(Vec::new());
    let stream = Arc::new(RpcStream::new(codec, greeter_request, Context::new()));

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let stream = Arc::clone(&stream);
            thread::spawn(move || {
                for index in 0..PER_THREAD {
                    stream
                        .send(&json!({"worker": worker, "index": index}))
                        .expect("send");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let seqs: Vec<u64> = log
        .lock()
        .expect("log lock")
        .written
        .iter()
        .map(|(header, _, _)| header.seq)
        .collect();
    let expected: Vec<u64> = (0..THREADS * PER_THREAD).collect();
    assert_eq!(seqs, expected, "sequences are gapless and written in order");
}

#[rstest]
fn recv_decodes_successive_bodies(greeter_request: Request) {
    let (codec, _log) = ScriptedCodec::new(vec![
        frame(json!({"name": "Ada"})),
        frame(json!({"name": "Grace"})),
    ]);
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    let first: HelloRequest = stream.recv_message().expect("first");
    let second: HelloRequest = stream.recv_message().expect("second");
    assert_eq!(first.name, "Ada");
    assert_eq!(second.name, "Grace");
    assert!(stream.error().is_none());
}

#[rstest]
fn header_failure_discards_body_once(greeter_request: Request) {
    let (codec, log) = ScriptedCodec::new(vec![
        Err(CodecError::malformed("bad header")),
        frame(json!({"name": "Ada"})),
    ]);
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    let error = stream.recv().expect_err("header failure");
    assert!(matches!(
        error,
        StreamError::Codec(CodecError::Malformed { .. })
    ));
    assert_eq!(log.lock().expect("log lock").discards, 1);

    let body = stream.recv().expect("next frame is intact");
    assert_eq!(body, json!({"name": "Ada"}));
    assert_eq!(log.lock().expect("log lock").discards, 1);
}

#[rstest]
fn end_of_stream_is_recorded(greeter_request: Request) {
    let (codec, log) = ScriptedCodec::new(Vec::new());
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    let error = stream.recv().expect_err("no frames");
    assert!(error.is_end_of_stream());
    assert!(stream.error().is_some_and(|recorded| recorded.is_end_of_stream()));
    assert_eq!(log.lock().expect("log lock").discards, 1);
}

#[rstest]
fn last_error_survives_later_success(greeter_request: Request) {
    let (codec, _log) = ScriptedCodec::new(vec![
        Err(CodecError::malformed("garbled")),
        frame(json!(1)),
    ]);
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    stream.recv().expect_err("garbled frame");
    stream.recv().expect("intact frame");
    assert!(matches!(
        stream.error(),
        Some(StreamError::Codec(CodecError::Malformed { .. }))
    ));
}

#[rstest]
fn failed_send_is_recorded_without_advancing(greeter_request: Request) {
    let (codec, log) = ScriptedCodec::failing_writes();
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    let error = stream.send(&json!("lost")).expect_err("broken pipe");
    assert!(matches!(error, StreamError::Codec(CodecError::Io(_))));
    assert!(matches!(
        stream.error(),
        Some(StreamError::Codec(CodecError::Io(_)))
    ));
    assert_eq!(stream.sequence(), 0);
    assert!(log.lock().expect("log lock").written.is_empty());
}

#[rstest]
fn close_is_idempotent_and_stops_io(greeter_request: Request) {
    let (codec, log) = ScriptedCodec::new(vec![frame(json!(1))]);
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    stream.close().expect("close");
    stream.close().expect("close again");
    assert!(stream.is_closed());
    assert_eq!(log.lock().expect("log lock").closes, 2);

    assert!(matches!(stream.send(&json!(1)), Err(StreamError::Closed)));
    assert!(matches!(stream.recv(), Err(StreamError::Closed)));
    assert!(log.lock().expect("log lock").written.is_empty());
    assert_eq!(stream.sequence(), 0);
    assert!(stream.error().is_none());
}

#[rstest]
fn decode_mismatch_reports_decode_error(greeter_request: Request) {
    let (codec, _log) = ScriptedCodec::new(vec![frame(json!({"unexpected": true}))]);
    let stream = RpcStream::new(codec, greeter_request, Context::new());

    let error = stream
        .recv_message::<HelloRequest>()
        .expect_err("shape mismatch");
    assert!(matches!(error, StreamError::Decode(_)));
}

#[rstest]
fn exposes_request_and_context(greeter_request: Request) {
    let context = Context::new();
    let (codec, _log) = ScriptedCodec::new(Vec::new());
    let stream = RpcStream::new(codec, greeter_request, context.clone());

    assert_eq!(stream.request().service(), "Greeter");
    assert!(stream.request().is_stream());
    context.cancel();
    assert!(stream.context().is_cancelled());
}
