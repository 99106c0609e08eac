//! Per-connection machinery.
//!
//! - [`HttpConnection`]: the server loop of one connection, keep-alive and `100-continue`
//!   included
//! - [`MessageWriter`]: the buffered writer both the server and the client serialize
//!   messages through, with explicit flushes and direct transfer of large bodies

mod http_connection;
mod message_writer;

pub use http_connection::HttpConnection;
pub use message_writer::{DIRECT_WRITE_THRESHOLD, MessageWriter};
