//! The client side: a connection pool per host.
//!
//! - [`HostClient`]: pooled keep-alive connections with bounded size and waiting tickets
//! - [`Dialer`]: how connections are opened, [`TcpDialer`] by default
//! - [`ProxyConfig`]: tunnelling through an HTTP proxy
//! - [`TlsConfig`]: per-address settings for the TLS upgrade hook

pub mod dialer;
mod error;
mod host_client;
mod proxy;
mod tls;

pub use dialer::{BoxedConn, Connection, Dialer, TcpDialer, TlsUpgrader};
pub use error::ClientError;
pub use host_client::{HostClient, HostClientBuilder, PooledConn};
pub use proxy::{ProxyConfig, connect_tunnel};
pub use tls::TlsConfig;
