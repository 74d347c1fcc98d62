//! Open connections of one running server.
//!
//! `stop` reaches every connection through this table: it refuses further
//! frames, cancels each connection's context, and shuts down sockets that
//! are not running a handler. Busy connections are shut down once their
//! call returns or the drain timeout expires.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::context::Context;
use crate::transport::ConnectionStream;

use super::SERVER_TARGET;

const DRAIN_POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Table {
    closing: bool,
    next_id: u64,
    open: BTreeMap<u64, OpenConnection>,
}

struct OpenConnection {
    socket: Option<ConnectionStream>,
    context: Context,
    busy: bool,
}

impl OpenConnection {
    fn shutdown(&self, id: u64) {
        if let Some(socket) = &self.socket
            && let Err(error) = socket.shutdown()
        {
            debug!(target: SERVER_TARGET, id, %error, "socket shutdown failed");
        }
    }
}

/// Connections accepted since the last `start`.
#[derive(Default)]
pub(crate) struct Connections {
    table: Mutex<Table>,
}

impl Connections {
    /// Records `stream` as open. Returns `None` once shutdown has begun.
    pub(crate) fn open(self: &Arc<Self>, stream: &ConnectionStream) -> Option<Connection> {
        let socket = match stream.try_clone() {
            Ok(socket) => Some(socket),
            Err(error) => {
                debug!(target: SERVER_TARGET, %error, "connection cannot be shut down remotely");
                None
            }
        };
        let mut table = self.lock();
        if table.closing {
            return None;
        }
        let id = table.next_id;
        table.next_id += 1;
        let context = Context::new();
        table.open.insert(
            id,
            OpenConnection {
                socket,
                context: context.clone(),
                busy: false,
            },
        );
        Some(Connection {
            connections: Arc::clone(self),
            id,
            context,
        })
    }

    /// Refuses further frames, cancels every context and shuts down idle
    /// sockets. Returns the number of connections running a handler.
    pub(crate) fn close(&self) -> usize {
        let mut table = self.lock();
        table.closing = true;
        let mut busy = 0;
        for (id, connection) in &table.open {
            connection.context.cancel();
            if connection.busy {
                busy += 1;
            } else {
                connection.shutdown(*id);
            }
        }
        busy
    }

    /// Number of connections running a handler.
    pub(crate) fn busy(&self) -> usize {
        self.lock()
            .open
            .values()
            .filter(|connection| connection.busy)
            .count()
    }

    /// Waits until no handler is running or `timeout` elapses. Returns the
    /// number still running.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let busy = self.busy();
            if busy == 0 || Instant::now() >= deadline {
                return busy;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    /// Shuts down every socket still open.
    pub(crate) fn shutdown_all(&self) {
        let table = self.lock();
        for (id, connection) in &table.open {
            connection.shutdown(*id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership of one connection in [`Connections`]; leaves the table on drop.
pub(crate) struct Connection {
    connections: Arc<Connections>,
    id: u64,
    context: Context,
}

impl Connection {
    /// Context whose cancellation follows the server's shutdown.
    pub(crate) const fn context(&self) -> &Context {
        &self.context
    }

    /// Marks a call as running. Returns `false` once shutdown has begun, in
    /// which case the frame must not be served.
    pub(crate) fn begin_call(&self) -> bool {
        let mut table = self.connections.lock();
        if table.closing {
            return false;
        }
        if let Some(connection) = table.open.get_mut(&self.id) {
            connection.busy = true;
        }
        true
    }

    /// Marks the running call as finished. During shutdown the socket is
    /// closed straight away so the connection ends.
    pub(crate) fn end_call(&self) {
        let mut table = self.connections.lock();
        let closing = table.closing;
        if let Some(connection) = table.open.get_mut(&self.id) {
            connection.busy = false;
            if closing {
                connection.shutdown(self.id);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.context.cancel();
        self.connections.lock().open.remove(&self.id);
    }
}
