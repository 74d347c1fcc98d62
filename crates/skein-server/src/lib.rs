//! Pluggable RPC server core.
//!
//! A [`Server`] accepts connections, reads request frames through a
//! [`ServerCodec`], and routes each call by service and method to a
//! [`Handler`]. Unary methods reply on the same connection; streaming methods
//! take the connection over through an [`RpcStream`], whose sends carry a
//! gapless sequence number even when several threads share the stream.
//!
//! Discovery and pub/sub are reached through the [`Registry`] and [`Broker`]
//! traits. The crate ships in-process implementations of both, a JSON-lines
//! codec, and a TCP/Unix socket listener, so a server runs without any
//! external infrastructure:
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use skein_server::{Context, RpcServer, Server, ServerOption, SocketEndpoint};
//!
//! #[derive(Deserialize)]
//! struct Hello {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Greeting {
//!     message: String,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = RpcServer::new(vec![
//!     ServerOption::Name(String::from("greeter")),
//!     ServerOption::Address(SocketEndpoint::tcp("127.0.0.1", 7000)),
//! ]);
//! server.handle(
//!     server
//!         .new_handler("Greeter")
//!         .unary("Hello", |_: &Context, hello: Hello| {
//!             Ok(Greeting {
//!                 message: format!("Hello {}", hello.name),
//!             })
//!         })
//!         .build(),
//! )?;
//! skein_server::run::run(&server, &skein_server::run::SystemShutdownSignal)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Process-wide server
//!
//! The [`default`] module keeps one lazily created server per process and
//! exposes free functions (`default::start`, `default::handle`, ...) that
//! delegate to it. [`DefaultServer`] is the same holder as a plain value for
//! applications and tests that prefer to own it.
//!
//! ## Configuration
//!
//! [`bootstrap()`] loads a [`ServerConfig`] from a TOML file named by
//! `--config-path` or `SKEIN_CONFIG_PATH`, then `SKEIN_*` environment
//! variables, then command-line flags, installs telemetry, and returns a
//! stopped server built from the result.

pub mod bootstrap;
mod broker;
mod codec;
mod context;
pub mod default;
mod handler;
mod lifecycle;
mod options;
mod registry;
mod request;
pub mod run;
mod server;
mod stream;
mod subscriber;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, SystemConfigLoader, bootstrap, bootstrap_with,
};
pub use broker::{Broker, BrokerError, MemoryBroker};
pub use codec::{
    CodecError, CodecFactory, JsonLinesCodec, JsonLinesCodecFactory, MAX_FRAME_BYTES,
    RequestHeader, ResponseHeader, ServerCodec,
};
pub use context::Context;
pub use default::DefaultServer;
pub use handler::{Handler, HandlerBuilder, HandlerError, MethodKind, ValidationError};
pub use lifecycle::{LifecycleReporter, StructuredLifecycleReporter};
pub use options::{Options, ServerOption};
pub use registry::{MemoryRegistry, Registry, RegistryError, ServiceDescriptor};
pub use request::{DEFAULT_CONTENT_TYPE, Publication, Request};
pub use server::{
    LifecycleError, RegistrationState, RpcServer, RunState, Server, ServerError,
};
pub use skein_config::{LogFormat, ServerConfig, SocketEndpoint};
pub use stream::{RpcStream, StreamError, Streamer, StreamerExt};
pub use subscriber::Subscriber;
pub use transport::{ConnectionHandler, ConnectionStream, ListenerError};

#[cfg(test)]
mod tests;
