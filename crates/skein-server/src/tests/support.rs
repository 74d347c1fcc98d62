//! Shared harness for the behavioural suites.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use skein_config::{ServerConfig, SocketEndpoint};

use crate::lifecycle::LifecycleReporter;
use crate::options::ServerOption;
use crate::registry::{MemoryRegistry, RegistryError, ServiceDescriptor};
use crate::server::{LifecycleError, RpcServer, Server};

/// Lifecycle events captured for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Starting,
    Started(SocketEndpoint),
    StartFailed,
    Stopping,
    Stopped(usize),
    Registered(String),
    Deregistered(String),
    RegistryFailed(String),
}

/// Records lifecycle events in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().expect("reporter mutex poisoned").clone()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingReporter {
    fn starting(&self, _config: &ServerConfig) {
        self.record(LifecycleEvent::Starting);
    }

    fn started(&self, endpoint: &SocketEndpoint) {
        self.record(LifecycleEvent::Started(endpoint.clone()));
    }

    fn start_failed(&self, _error: &LifecycleError) {
        self.record(LifecycleEvent::StartFailed);
    }

    fn stopping(&self) {
        self.record(LifecycleEvent::Stopping);
    }

    fn stopped(&self, undrained: usize) {
        self.record(LifecycleEvent::Stopped(undrained));
    }

    fn registered(&self, service: &ServiceDescriptor) {
        self.record(LifecycleEvent::Registered(service.id.clone()));
    }

    fn deregistered(&self, service: &ServiceDescriptor) {
        self.record(LifecycleEvent::Deregistered(service.id.clone()));
    }

    fn registry_failed(&self, service: &ServiceDescriptor, _error: &RegistryError) {
        self.record(LifecycleEvent::RegistryFailed(service.id.clone()));
    }
}

/// Server on a loopback port with observable collaborators.
pub struct Harness {
    pub server: Arc<RpcServer>,
    pub registry: Arc<MemoryRegistry>,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(Vec::new())
    }

    /// Applies `extra` after the loopback defaults.
    pub fn with_options(extra: Vec<ServerOption>) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let reporter = Arc::new(RecordingReporter::default());
        let mut options = vec![
            ServerOption::Name(String::from("greeter")),
            ServerOption::Id(String::from("greeter-1")),
            ServerOption::Address(SocketEndpoint::tcp("127.0.0.1", 0)),
            ServerOption::DrainTimeout(Duration::from_millis(200)),
            ServerOption::Registry(registry.clone()),
            ServerOption::Reporter(reporter.clone()),
        ];
        options.extend(extra);
        Self {
            server: Arc::new(RpcServer::new(options)),
            registry,
            reporter,
        }
    }

    /// Starts the server and connects a client to the bound port.
    pub fn start_and_connect(&self) -> Client {
        self.server.start().expect("server starts");
        self.connect()
    }

    pub fn connect(&self) -> Client {
        let port = self
            .server
            .address()
            .port()
            .expect("server bound to a TCP port");
        Client::connect(port)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.server.stop();
    }
}

/// Minimal JSON-lines client.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    pub fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to server");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        let writer = stream.try_clone().expect("clone client stream");
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    pub fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .expect("write request");
        self.writer.flush().expect("flush request");
    }

    pub fn send(&mut self, service: &str, method: &str, seq: u64, stream: bool, body: Value) {
        let frame = json!({
            "service": service,
            "method": method,
            "seq": seq,
            "stream": stream,
            "body": body,
        });
        self.send_line(&frame.to_string());
    }

    /// Reads one response frame; `None` once the server closed the
    /// connection.
    pub fn read(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read response");
        if read == 0 {
            return None;
        }
        Some(serde_json::from_str(line.trim_end()).expect("response is JSON"))
    }

    pub fn call(&mut self, service: &str, method: &str, body: Value) -> Value {
        self.send(service, method, 0, false, body);
        self.read().expect("response frame")
    }

    /// Sends a unary call on a connection the server may have closed.
    /// Returns `None` when no reply arrives.
    pub fn call_if_open(&mut self, service: &str, method: &str, body: Value) -> Option<Value> {
        let frame = json!({"service": service, "method": method, "body": body});
        let sent = self
            .writer
            .write_all(format!("{frame}\n").as_bytes())
            .and_then(|()| self.writer.flush());
        if sent.is_err() {
            return None;
        }
        self.read_if_open()
    }

    /// Reads one response frame, treating a reset connection as closed.
    pub fn read_if_open(&mut self) -> Option<Value> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(serde_json::from_str(line.trim_end()).expect("response is JSON")),
        }
    }

    /// Half-closes the write side so the server observes end of stream.
    pub fn finish(&self) {
        self.writer
            .shutdown(std::net::Shutdown::Write)
            .expect("shutdown write half");
    }
}
