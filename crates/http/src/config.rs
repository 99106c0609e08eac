//! Server and client options.
//!
//! Both option sets deserialize with `#[serde(default)]`, so a config file only needs the
//! fields it changes. Durations are written as `{ secs = 1, nanos = 0 }` (serde's default
//! representation); `None` means no limit.

use crate::protocol::header::{HeaderLimits, MAX_HEADER_BYTES, MAX_HEADER_NUM};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_NAME: &str = "micro-wire";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Name sent in the `Server` header.
    pub name: String,
    /// Limit for reading a whole request, header and body.
    pub read_timeout: Option<Duration>,
    /// Limit for writing a whole response.
    pub write_timeout: Option<Duration>,
    /// How long a kept-alive connection waits for the next request. Zero closes the
    /// connection after each response.
    pub idle_timeout: Option<Duration>,
    /// Largest request body read into memory, zero is unlimited.
    pub max_request_body_size: usize,
    pub max_header_bytes: usize,
    pub max_header_count: usize,
    /// Request body buffers above this capacity are released between requests.
    pub max_keep_body_size: usize,
    pub disable_keep_alive: bool,
    /// Hand request bodies larger than `max_request_body_size`, or chunked ones, to the handler
    /// as a stream instead of reading them first.
    pub stream_request_body: bool,
    pub no_default_server_header: bool,
    pub no_default_date: bool,
    pub no_default_content_type: bool,
    pub disable_header_names_normalizing: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            read_timeout: None,
            write_timeout: None,
            idle_timeout: Some(Duration::from_secs(60)),
            max_request_body_size: 4 * 1024 * 1024,
            max_header_bytes: MAX_HEADER_BYTES,
            max_header_count: MAX_HEADER_NUM,
            max_keep_body_size: 0,
            disable_keep_alive: false,
            stream_request_body: false,
            no_default_server_header: false,
            no_default_date: false,
            no_default_content_type: false,
            disable_header_names_normalizing: false,
        }
    }
}

impl ServerOptions {
    pub fn header_limits(&self) -> HeaderLimits {
        HeaderLimits { max_header_bytes: self.max_header_bytes, max_header_count: self.max_header_count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Default `User-Agent`.
    pub name: String,
    pub no_default_user_agent_header: bool,
    /// Comma separated `host:port` list dialed in round-robin order.
    pub addr: String,
    pub is_tls: bool,
    /// `http://[user:pass@]proxy:port` to tunnel through.
    pub proxy: Option<String>,
    pub dial_timeout: Duration,
    /// Upper bound of connections, zero is unbounded.
    pub max_conns: usize,
    pub max_conn_duration: Option<Duration>,
    pub max_idle_conn_duration: Duration,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Largest response body read into memory, zero is unlimited.
    pub max_response_body_size: usize,
    /// How long an acquire waits for a free connection. `None` fails at once.
    pub max_conn_wait_timeout: Option<Duration>,
    /// Hand response bodies larger than `max_response_body_size`, or of unknown length, to the
    /// caller as a stream.
    pub response_body_stream: bool,
    pub disable_header_names_normalizing: bool,
    pub max_header_bytes: usize,
    pub max_header_count: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            no_default_user_agent_header: false,
            addr: String::new(),
            is_tls: false,
            proxy: None,
            dial_timeout: Duration::from_secs(1),
            max_conns: 512,
            max_conn_duration: None,
            max_idle_conn_duration: Duration::from_secs(10),
            read_timeout: None,
            write_timeout: None,
            max_response_body_size: 0,
            max_conn_wait_timeout: None,
            response_body_stream: false,
            disable_header_names_normalizing: false,
            max_header_bytes: MAX_HEADER_BYTES,
            max_header_count: MAX_HEADER_NUM,
        }
    }
}

impl ClientOptions {
    pub fn header_limits(&self) -> HeaderLimits {
        HeaderLimits { max_header_bytes: self.max_header_bytes, max_header_count: self.max_header_count }
    }
}
