//! The accept loop.
//!
//! ```no_run
//! use futures::FutureExt;
//! use micro_wire::config::ServerOptions;
//! use micro_wire::handler::make_handler;
//! use micro_wire::server::Server;
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> std::io::Result<()> {
//! let handler = make_handler(|_req, resp| {
//!     async move {
//!         resp.set_body("Hello World!\r\n");
//!         Ok::<_, std::io::Error>(())
//!     }
//!     .boxed()
//! });
//! let server = Server::builder(handler).options(ServerOptions::default()).build();
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! server.serve(listener).await
//! # }
//! ```

mod date;

pub use date::DateService;

use crate::config::ServerOptions;
use crate::connection::HttpConnection;
use crate::handler::{ContinueHandler, Handler};
use crate::protocol::HttpError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Serves one [`Handler`] on any number of connections, one task per connection.
pub struct Server<H: ?Sized> {
    options: Arc<ServerOptions>,
    continue_handler: Option<ContinueHandler>,
    shutdown: CancellationToken,
    date: OnceLock<DateService>,
    handler: Arc<H>,
}

impl<H: ?Sized> fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.options)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

pub struct ServerBuilder<H: ?Sized> {
    options: ServerOptions,
    continue_handler: Option<ContinueHandler>,
    handler: Arc<H>,
}

impl<H: ?Sized> fmt::Debug for ServerBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder").field("options", &self.options).finish_non_exhaustive()
    }
}

impl<H: Handler> Server<H> {
    pub fn builder(handler: H) -> ServerBuilder<H> {
        ServerBuilder::shared(Arc::new(handler))
    }
}

impl<H: ?Sized> ServerBuilder<H> {
    pub fn shared(handler: Arc<H>) -> Self {
        Self { options: ServerOptions::default(), continue_handler: None, handler }
    }

    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn continue_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&crate::protocol::header::RequestHeader) -> bool + Send + Sync + 'static,
    {
        self.continue_handler = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Server<H> {
        Server {
            options: Arc::new(self.options),
            continue_handler: self.continue_handler,
            shutdown: CancellationToken::new(),
            date: OnceLock::new(),
            handler: self.handler,
        }
    }
}

impl<H> Server<H>
where
    H: Handler + ?Sized + 'static,
{
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Stops accepting connections. Open connections finish their current exchange and
    /// close.
    pub fn shutdown(&self) {
        info!("server shutdown requested");
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn connection<R, W>(&self, reader: R, writer: W) -> HttpConnection<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut connection = HttpConnection::with_options(reader, writer, Arc::clone(&self.options));
        if let Some(continue_handler) = &self.continue_handler {
            connection.set_continue_handler(Arc::clone(continue_handler));
        }
        if !self.options.no_default_date {
            connection.set_date_service(self.date.get_or_init(DateService::start).clone());
        }
        connection.set_shutdown(self.shutdown.child_token());
        connection
    }

    /// Serves a single established connection on the current task.
    pub async fn serve_connection<IO>(&self, io: IO) -> Result<(), HttpError>
    where
        IO: AsyncRead + AsyncWrite,
    {
        let (reader, writer) = tokio::io::split(io);
        self.connection(reader, writer).process(Arc::clone(&self.handler)).await
    }

    /// Accepts connections until [`Server::shutdown`] is called.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = ?listener.local_addr()?, "start listening");
        loop {
            let (tcp_stream, remote_addr) = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("stop accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            if let Err(e) = tcp_stream.set_nodelay(true) {
                warn!(cause = %e, "failed to set nodelay");
            }
            let (reader, writer) = tcp_stream.into_split();
            let connection = self.connection(reader, writer);
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                match connection.process(handler).await {
                    Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use crate::protocol::{Request, Response};
    use futures::FutureExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn hello() -> impl Handler {
        make_handler(|_req: &mut Request, resp: &mut Response| {
            async move {
                resp.set_body("hello");
                Ok::<_, std::io::Error>(())
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn default_headers_are_added() {
        let server = Server::builder(hello()).build();
        let (mut client, server_io) = tokio::io::duplex(4096);

        let serve = server.serve_connection(server_io);
        let exchange = async {
            client.write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
            let mut out = String::new();
            client.read_to_string(&mut out).await.unwrap();
            out
        };
        let (served, out) = tokio::join!(serve, exchange);
        served.unwrap();

        assert!(out.contains("Server: micro-wire\r\n"), "{out}");
        assert!(out.contains("Date: "), "{out}");
        assert!(out.ends_with("hello"));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let server = Arc::new(Server::builder(hello()).build());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.serve(listener).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK"));

        server.shutdown();
        task.await.unwrap().unwrap();
        assert!(!server.is_running());
    }
}
