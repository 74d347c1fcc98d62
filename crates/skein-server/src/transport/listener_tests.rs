//! Tests for the socket listener.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rstest::{fixture, rstest};

use skein_config::SocketEndpoint;

use super::listener::SocketListener;
use super::{BlockingHandler, ConnectionHandler, CountingHandler, ListenerError, wait_until};

#[fixture]
fn tcp_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

#[rstest]
fn tcp_listener_accepts_connections(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener
        .local_addr()
        .expect("listener should report local address");
    let (count, handler) = CountingHandler::new();
    let handler: Arc<dyn ConnectionHandler> = handler;
    let mut handle = listener.start(handler).expect("start listener");

    TcpStream::connect(addr).expect("connect first client");
    TcpStream::connect(addr).expect("connect second client");

    assert!(
        wait_until(|| count.load(Ordering::SeqCst) >= 2),
        "expected two connections"
    );
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn local_endpoint_reports_assigned_port(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener.local_addr().expect("local address");
    let endpoint = listener.local_endpoint();
    assert_ne!(endpoint.port(), Some(0));
    assert_eq!(endpoint, SocketEndpoint::tcp("127.0.0.1", addr.port()));
}

#[test]
fn reserved_port_fails_to_bind() {
    let reserved = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
    let port = reserved.local_addr().expect("reserved addr").port();
    let error = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", port))
        .expect_err("port is taken");
    assert!(matches!(error, ListenerError::BindTcp { .. }));
}

#[rstest]
fn drain_waits_for_open_connections(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener.local_addr().expect("local address");
    let mut handle = listener
        .start(Arc::new(BlockingHandler))
        .expect("start listener");

    let client = TcpStream::connect(addr).expect("connect client");
    assert!(wait_until(|| handle.in_flight() == 1), "connection tracked");

    handle.shutdown();
    handle.join().expect("join listener");
    assert_eq!(handle.drain(Duration::from_millis(50)), 1);

    drop(client);
    assert_eq!(handle.drain(Duration::from_secs(2)), 0);
}

#[cfg(unix)]
#[fixture]
fn unix_tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[cfg(unix)]
#[rstest]
fn unix_listener_cleans_stale_socket_files(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("skein.sock");
    {
        let _stale = std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener");
    }
    assert!(path.exists(), "stale socket should remain");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let listener = SocketListener::bind(&endpoint).expect("bind new listener");
    let (count, handler) = CountingHandler::new();
    let mut handle = listener.start(handler).expect("start listener");

    std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");
    assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(
        !path.exists(),
        "listener should remove unix socket on shutdown"
    );
}

#[cfg(unix)]
#[rstest]
fn unix_listener_rejects_in_use_socket(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("skein.sock");
    let _existing = std::os::unix::net::UnixListener::bind(&path).expect("bind existing listener");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::UnixInUse { .. }));
}
