//! The wire-level engine of an asynchronous HTTP/1.1 client and server.
//!
//! This crate parses and serializes HTTP/1.1 messages, runs the keep-alive loop of server
//! connections and keeps pools of reusable client connections per host. Routing, middleware
//! and application concerns live above it: the engine hands a parsed [`protocol::Request`]
//! to a [`handler::Handler`] and writes back the [`protocol::Response`] it filled.
//!
//! # Example
//!
//! ```no_run
//! use futures::FutureExt;
//! use micro_wire::config::ServerOptions;
//! use micro_wire::handler::make_handler;
//! use micro_wire::server::Server;
//! use tokio::net::TcpListener;
//! use tracing::{Level, error, info};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let handler = make_handler(|req, resp| {
//!         async move {
//!             info!(path = %String::from_utf8_lossy(req.header().request_uri()), "receiving request");
//!             resp.set_body("Hello World!\r\n");
//!             Ok::<_, std::io::Error>(())
//!         }
//!         .boxed()
//!     });
//!
//!     let listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(listener) => listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!     let server = Server::builder(handler).options(ServerOptions::default()).build();
//!     if let Err(e) = server.serve(listener).await {
//!         error!(cause = %e, "server stopped");
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: `tokio_util` decoders and encoders for both directions of an exchange
//! - [`protocol`]: headers, bodies, requests, responses, forms, object pools and errors
//! - [`connection`]: the per-connection server loop and the buffered message writer
//! - [`handler`]: the seam between the connection loop and the application
//! - [`server`]: the accept loop and the cached `Date` header
//! - [`client`]: the per-host connection pool, dialing, proxies and TLS settings
//! - [`config`]: server and client options, loadable with serde
//!
//! # Error Handling
//!
//! - [`protocol::ParseError`]: malformed or oversized messages, timeouts, truncation
//! - [`protocol::SendError`]: failures while writing a message
//! - [`protocol::HttpError`]: the outcome of a server connection
//! - [`client::ClientError`]: pool exhaustion, dialing and exchange failures
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - TLS is a hook: the client calls a user supplied [`client::TlsUpgrader`]

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
