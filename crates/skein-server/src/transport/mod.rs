//! Socket transport for the server.
//!
//! The listener binds a [`SocketEndpoint`](skein_config::SocketEndpoint),
//! accepts connections on a background thread, and hands each accepted
//! [`ConnectionStream`] to a [`ConnectionHandler`] on a thread of its own.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{BlockingHandler, CountingHandler, wait_until};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
