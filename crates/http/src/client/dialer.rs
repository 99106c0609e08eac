//! Opening transports for the host client.

use crate::client::proxy::{ProxyConfig, connect_tunnel};
use crate::client::tls::TlsConfig;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Anything a request can be written to and a response read from.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedConn = Box<dyn Connection>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connects to `addr` within `timeout`. `tls` is set when the connection must be
    /// upgraded before use.
    async fn dial(&self, addr: &str, timeout: Duration, tls: Option<Arc<TlsConfig>>) -> io::Result<BoxedConn>;
}

/// The TLS step of the [`TcpDialer`]: wraps a connected transport into an encrypted one.
#[async_trait]
pub trait TlsUpgrader: Send + Sync {
    async fn upgrade(&self, conn: BoxedConn, config: &TlsConfig) -> io::Result<BoxedConn>;
}

/// Dials TCP, optionally through a proxy, and hands TLS targets to the configured
/// [`TlsUpgrader`].
#[derive(Clone, Default)]
pub struct TcpDialer {
    proxy: Option<ProxyConfig>,
    tls_upgrader: Option<Arc<dyn TlsUpgrader>>,
}

impl fmt::Debug for TcpDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpDialer")
            .field("proxy", &self.proxy)
            .field("tls_upgrader", &self.tls_upgrader.is_some())
            .finish()
    }
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    #[must_use]
    pub fn with_tls_upgrader(mut self, upgrader: Arc<dyn TlsUpgrader>) -> Self {
        self.tls_upgrader = Some(upgrader);
        self
    }

    async fn upgrade(&self, conn: BoxedConn, config: &TlsConfig) -> io::Result<BoxedConn> {
        let upgrader = self.tls_upgrader.as_ref().ok_or_else(|| io::Error::other("no tls upgrader configured"))?;
        trace!(server_name = config.server_name(), "upgrade connection to tls");
        upgrader.upgrade(conn, config).await
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str, timeout: Duration, tls: Option<Arc<TlsConfig>>) -> io::Result<BoxedConn> {
        let deadline = Instant::now() + timeout;
        let connect_addr = self.proxy.as_ref().map_or(addr, ProxyConfig::addr);

        let stream = tokio::time::timeout_at(deadline, TcpStream::connect(connect_addr))
            .await
            .map_err(|elapsed| io::Error::new(io::ErrorKind::TimedOut, elapsed))??;
        stream.set_nodelay(true)?;
        debug!(addr = connect_addr, "tcp connection established");
        let mut conn: BoxedConn = Box::new(stream);

        if let Some(proxy) = &self.proxy {
            if proxy.is_tls() {
                conn = self.upgrade(conn, &TlsConfig::for_addr(proxy.addr())).await?;
            }
            if tls.is_some() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                connect_tunnel(&mut conn, addr, proxy, remaining).await.map_err(io::Error::other)?;
            }
        }

        match tls {
            Some(config) => self.upgrade(conn, &config).await,
            None => Ok(conn),
        }
    }
}
