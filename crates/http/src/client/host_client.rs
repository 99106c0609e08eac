//! A pool of keep-alive connections to one logical host.
//!
//! Every clone of a [`HostClient`] shares the same pool. The number of live connections,
//! counting idle, checked out and currently dialing ones, never exceeds
//! [`ClientOptions::max_conns`]. A caller finding the pool exhausted either fails at once with
//! [`ClientError::NoFreeConns`] or, when [`ClientOptions::max_conn_wait_timeout`] is set, queues
//! a ticket and receives the next released connection directly.

use crate::client::ClientError;
use crate::client::dialer::{BoxedConn, Dialer, TcpDialer, TlsUpgrader};
use crate::client::proxy::ProxyConfig;
use crate::client::tls::TlsConfigCache;
use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::config::ClientOptions;
use crate::connection::MessageWriter;
use crate::protocol::body::BodyStream;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, Request, Response};
use futures::{Stream, StreamExt};
use http::Uri;
use http::uri::PathAndQuery;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

const MIN_CLEAN_INTERVAL: Duration = Duration::from_millis(1);

type Delivery = Result<Conn, ClientError>;

/// Pooled connections to one host, shared by all clones.
///
/// ```no_run
/// use micro_wire::client::HostClient;
/// use micro_wire::config::ClientOptions;
/// use micro_wire::protocol::{Request, Response};
///
/// # async fn run() -> Result<(), micro_wire::client::ClientError> {
/// let client = HostClient::new(ClientOptions { addr: "127.0.0.1:8080".into(), ..ClientOptions::default() })?;
/// let mut req = Request::with_uri("http://127.0.0.1:8080/hello");
/// let mut resp = Response::new();
/// client.do_request(&mut req, &mut resp).await?;
/// println!("{} {}", resp.status_code(), String::from_utf8_lossy(resp.body()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HostClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for HostClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("HostClient")
            .field("addrs", &self.inner.addrs)
            .field("conns_count", &state.conns_count)
            .field("idle", &state.idle.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

pub struct HostClientBuilder {
    options: ClientOptions,
    dialer: Option<Arc<dyn Dialer>>,
    tls_upgrader: Option<Arc<dyn TlsUpgrader>>,
}

impl fmt::Debug for HostClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClientBuilder")
            .field("options", &self.options)
            .field("dialer", &self.dialer.is_some())
            .field("tls_upgrader", &self.tls_upgrader.is_some())
            .finish()
    }
}

impl HostClientBuilder {
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the default [`TcpDialer`]. A custom dialer is responsible for proxies and TLS.
    #[must_use]
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// The TLS step of the default dialer, required when `is_tls` is set.
    #[must_use]
    pub fn tls_upgrader(mut self, upgrader: Arc<dyn TlsUpgrader>) -> Self {
        self.tls_upgrader = Some(upgrader);
        self
    }

    pub fn build(self) -> Result<HostClient, ClientError> {
        let options = self.options;
        let addrs: Vec<String> =
            options.addr.split(',').map(str::trim).filter(|addr| !addr.is_empty()).map(str::to_owned).collect();
        if addrs.is_empty() {
            return Err(ClientError::invalid_request("host client needs at least one address"));
        }

        let dialer = match self.dialer {
            Some(dialer) => dialer,
            None => {
                let mut dialer = TcpDialer::new();
                if let Some(proxy) = &options.proxy {
                    dialer = dialer.with_proxy(ProxyConfig::parse(proxy)?);
                }
                if let Some(upgrader) = self.tls_upgrader {
                    dialer = dialer.with_tls_upgrader(upgrader);
                }
                Arc::new(dialer)
            }
        };

        let absolute_form = options.proxy.is_some() && !options.is_tls;
        Ok(HostClient {
            inner: Arc::new(Inner {
                options,
                addrs,
                absolute_form,
                dialer,
                tls_configs: TlsConfigCache::default(),
                state: Mutex::new(PoolState::default()),
            }),
        })
    }
}

struct Inner {
    options: ClientOptions,
    addrs: Vec<String>,
    /// Plain requests through a proxy keep the absolute URI in the request line.
    absolute_form: bool,
    dialer: Arc<dyn Dialer>,
    tls_configs: TlsConfigCache,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Conn>,
    waiters: VecDeque<oneshot::Sender<Delivery>>,
    conns_count: usize,
    next_addr: usize,
    cleaner_running: bool,
    closed: bool,
}

struct Conn {
    framed_read: FramedRead<ReadHalf<BoxedConn>, ResponseDecoder>,
    writer: MessageWriter<WriteHalf<BoxedConn>, RequestEncoder>,
    created_at: Instant,
    last_used: Instant,
}

impl Conn {
    fn new(io: BoxedConn, options: &ClientOptions) -> Self {
        let (reader, writer) = tokio::io::split(io);
        let mut decoder = ResponseDecoder::with_limits(options.header_limits());
        if options.disable_header_names_normalizing {
            decoder.disable_normalizing();
        }
        let now = Instant::now();
        Self {
            framed_read: FramedRead::new(reader, decoder),
            writer: MessageWriter::for_requests(writer),
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, options: &ClientOptions, now: Instant) -> bool {
        now.duration_since(self.last_used) >= options.max_idle_conn_duration || self.is_too_old(options, now)
    }

    fn is_too_old(&self, options: &ClientOptions, now: Instant) -> bool {
        options.max_conn_duration.is_some_and(|max| now.duration_since(self.created_at) >= max)
    }
}

/// Hands `conn` to the ticket, or gives it back when the ticket no longer waits.
fn try_deliver(ticket: oneshot::Sender<Delivery>, conn: Conn) -> Option<Conn> {
    ticket.send(Ok(conn)).err().and_then(Result::ok)
}

impl Inner {
    fn next_addr(&self) -> String {
        let mut state = self.state.lock();
        let addr = &self.addrs[state.next_addr % self.addrs.len()];
        state.next_addr = state.next_addr.wrapping_add(1);
        addr.clone()
    }

    /// Tries every address once, round-robin, until one answers or the dial timeout is spent.
    async fn dial(&self) -> Result<Conn, ClientError> {
        let deadline = Instant::now() + self.options.dial_timeout;
        let mut attempts = self.addrs.len();
        loop {
            let addr = self.next_addr();
            let tls = self.options.is_tls.then(|| self.tls_configs.get(&addr));
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.dialer.dial(&addr, timeout, tls).await {
                Ok(io) => {
                    debug!(addr, "dial new connection");
                    return Ok(Conn::new(io, &self.options));
                }
                Err(e) => {
                    attempts -= 1;
                    if attempts == 0 || Instant::now() >= deadline {
                        return Err(ClientError::dial(addr, e));
                    }
                    warn!(addr, cause = %e, "dial failed, try next address");
                }
            }
        }
    }

    /// Dials on behalf of `ticket` in a task of its own; the slot is already reserved.
    fn spawn_dial(self: &Arc<Self>, ticket: oneshot::Sender<Delivery>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.dial().await {
                Ok(conn) => {
                    if let Some(conn) = try_deliver(ticket, conn) {
                        debug!("dialing caller went away, keep the connection idle");
                        inner.put_back(conn);
                    }
                }
                Err(e) => {
                    if let Err(Err(e)) = ticket.send(Err(e)) {
                        debug!(cause = %e, "dialing caller went away before the dial failed");
                    }
                    inner.release_slot();
                }
            }
        });
    }

    /// Returns a healthy connection: to the oldest waiting ticket first, else to the idle set.
    fn put_back(self: &Arc<Self>, mut conn: Conn) {
        let now = Instant::now();
        if conn.is_too_old(&self.options, now) {
            debug!("connection reached its max duration, discard it");
            drop(conn);
            self.release_slot();
            return;
        }
        conn.last_used = now;

        let mut state = self.state.lock();
        if state.closed {
            state.conns_count -= 1;
            return;
        }
        while let Some(ticket) = state.waiters.pop_front() {
            match try_deliver(ticket, conn) {
                None => {
                    debug!("deliver released connection to a waiting ticket");
                    return;
                }
                Some(back) => conn = back,
            }
        }
        state.idle.push_back(conn);
        self.start_cleaner(&mut state);
    }

    /// Frees the slot of a destroyed connection, or passes it on to the oldest waiting ticket
    /// by dialing for it.
    fn release_slot(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while let Some(ticket) = state.waiters.pop_front() {
            if !ticket.is_closed() {
                drop(state);
                debug!("dial for a waiting ticket in place of a destroyed connection");
                self.spawn_dial(ticket);
                return;
            }
        }
        state.conns_count = state.conns_count.saturating_sub(1);
    }

    fn start_cleaner(self: &Arc<Self>, state: &mut PoolState) {
        if state.cleaner_running {
            return;
        }
        state.cleaner_running = true;

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.options.max_idle_conn_duration.max(MIN_CLEAN_INTERVAL);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.sweep_idle() {
                    return;
                }
            }
        });
    }

    /// Drops expired idle connections and reports whether the cleaner should keep running.
    fn sweep_idle(self: &Arc<Self>) -> bool {
        let now = Instant::now();
        let (expired, keep_running) = {
            let mut state = self.state.lock();
            let idle = std::mem::take(&mut state.idle);
            let (expired, fresh): (VecDeque<Conn>, VecDeque<Conn>) =
                idle.into_iter().partition(|conn| conn.is_expired(&self.options, now));
            state.idle = fresh;
            let keep_running = !state.idle.is_empty() && !state.closed;
            if !keep_running {
                state.cleaner_running = false;
            }
            (expired, keep_running)
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "sweep expired idle connections");
        }
        for conn in expired {
            drop(conn);
            self.release_slot();
        }
        keep_running
    }
}

/// The receiving end of a pending acquire. Dropping it, on timeout or cancellation, recovers
/// a connection that was delivered too late.
struct Ticket {
    rx: oneshot::Receiver<Delivery>,
    inner: Arc<Inner>,
}

impl Ticket {
    async fn wait(&mut self) -> Delivery {
        (&mut self.rx).await.unwrap_or(Err(ClientError::Closed))
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(Ok(conn)) = self.rx.try_recv() {
            debug!("recover connection delivered to an abandoned ticket");
            self.inner.put_back(conn);
        }
    }
}

/// Keeps a pool slot reserved; dropping it while held frees the slot.
struct Slot {
    inner: Arc<Inner>,
    held: bool,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.held {
            self.inner.release_slot();
        }
    }
}

/// A connection checked out of a [`HostClient`].
///
/// Hand it back with [`HostClient::release`]; dropping it instead closes the connection and
/// frees its slot.
pub struct PooledConn {
    conn: Conn,
    slot: Slot,
}

impl fmt::Debug for PooledConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConn")
            .field("created_at", &self.conn.created_at)
            .field("last_used", &self.conn.last_used)
            .finish_non_exhaustive()
    }
}

impl PooledConn {
    fn new(conn: Conn, inner: &Arc<Inner>) -> Self {
        Self { conn, slot: Slot { inner: Arc::clone(inner), held: true } }
    }

    pub fn created_at(&self) -> Instant {
        self.conn.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.conn.last_used
    }

    fn recycle(self) {
        let Self { conn, mut slot } = self;
        slot.held = false;
        slot.inner.put_back(conn);
    }
}

impl HostClient {
    pub fn builder() -> HostClientBuilder {
        HostClientBuilder { options: ClientOptions::default(), dialer: None, tls_upgrader: None }
    }

    /// A client dialing with the default [`TcpDialer`].
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        Self::builder().options(options).build()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Checks out a connection: an idle one if any, else a new one while below `max_conns`,
    /// else the next released one if waiting is configured.
    pub async fn acquire(&self) -> Result<PooledConn, ClientError> {
        let inner = &self.inner;
        let (mut ticket, wait) = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }

            let now = Instant::now();
            while let Some(conn) = state.idle.pop_back() {
                if conn.is_expired(&inner.options, now) {
                    debug!("discard expired idle connection");
                    state.conns_count -= 1;
                    continue;
                }
                return Ok(PooledConn::new(conn, inner));
            }

            let (tx, rx) = oneshot::channel();
            let max_conns = inner.options.max_conns;
            if max_conns == 0 || state.conns_count < max_conns {
                state.conns_count += 1;
                drop(state);
                inner.spawn_dial(tx);
                (Ticket { rx, inner: Arc::clone(inner) }, None)
            } else if let Some(timeout) = inner.options.max_conn_wait_timeout {
                state.waiters.retain(|waiter| !waiter.is_closed());
                state.waiters.push_back(tx);
                (Ticket { rx, inner: Arc::clone(inner) }, Some(timeout))
            } else {
                return Err(ClientError::NoFreeConns);
            }
        };

        let delivery = match wait {
            Some(timeout) => {
                if let Ok(delivery) = tokio::time::timeout(timeout, ticket.wait()).await {
                    delivery
                } else {
                    debug!(?timeout, "no connection was freed in time");
                    return Err(ClientError::NoFreeConns);
                }
            }
            None => ticket.wait().await,
        };
        delivery.map(|conn| PooledConn::new(conn, inner))
    }

    /// Returns a connection for reuse.
    pub fn release(&self, conn: PooledConn) {
        conn.recycle();
    }

    /// Closes idle connections and fails waiting tickets. Connections in use are closed when
    /// they come back.
    pub fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle_count = state.idle.len();
            state.conns_count -= idle_count;
            (std::mem::take(&mut state.idle), std::mem::take(&mut state.waiters))
        };
        info!(idle = idle.len(), waiting = waiters.len(), "close host client");
        drop(idle);
        for ticket in waiters {
            if ticket.send(Err(ClientError::Closed)).is_err() {
                debug!("waiting ticket already gone");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Closes every idle keep-alive connection. Connections in use are left alone.
    pub fn close_idle_connections(&self) {
        let idle = std::mem::take(&mut self.inner.state.lock().idle);
        debug!(count = idle.len(), "close idle connections");
        for conn in idle {
            drop(conn);
            self.inner.release_slot();
        }
    }

    /// Live connections: idle, checked out and dialing.
    pub fn conns_count(&self) -> usize {
        self.inner.state.lock().conns_count
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Callers waiting for a connection to be released.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().waiters.iter().filter(|waiter| !waiter.is_closed()).count()
    }

    /// Sends `req` and reads the answer into `resp`.
    ///
    /// With [`ClientOptions::response_body_stream`] a body larger than
    /// [`ClientOptions::max_response_body_size`] (or of unknown length) is left as a stream that
    /// owns the connection; the connection returns to the pool once the stream was read to its
    /// end. Smaller bodies are buffered as usual.
    pub async fn do_request(&self, req: &mut Request, resp: &mut Response) -> Result<(), ClientError> {
        self.prepare_request(req)?;
        let conn = self.acquire().await?;
        self.round_trip(conn, req, resp).await
    }

    pub async fn do_with_timeout(&self, req: &mut Request, resp: &mut Response, timeout: Duration) -> Result<(), ClientError> {
        self.do_with_deadline(req, resp, Instant::now() + timeout).await
    }

    pub async fn do_with_deadline(&self, req: &mut Request, resp: &mut Response, deadline: Instant) -> Result<(), ClientError> {
        tokio::time::timeout_at(deadline, self.do_request(req, resp)).await.unwrap_or(Err(ClientError::Timeout))
    }

    fn prepare_request(&self, req: &mut Request) -> Result<(), ClientError> {
        let options = &self.inner.options;
        if req.header().request_uri().is_empty() {
            req.set_request_uri("/");
        }

        let uri = Uri::try_from(req.header().request_uri()).map_err(ClientError::invalid_request)?;
        if uri.scheme().is_some()
            && let Some(authority) = uri.authority()
        {
            if req.header().host().is_empty() {
                let host = authority.as_str().rsplit('@').next().unwrap_or_default();
                req.header_mut().set_host(host);
            }
            if !self.inner.absolute_form {
                let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);
                req.set_request_uri(path);
            }
        }

        if req.header().host().is_empty() {
            req.header_mut().set_host(&self.inner.addrs[0]);
        }
        if !options.no_default_user_agent_header && req.header().user_agent().is_empty() {
            req.header_mut().set_user_agent(&options.name);
        }
        if options.disable_header_names_normalizing {
            req.header_mut().disable_normalizing();
        }
        Ok(())
    }

    async fn round_trip(&self, mut conn: PooledConn, req: &mut Request, resp: &mut Response) -> Result<(), ClientError> {
        let options = &self.inner.options;
        let is_head = req.header().is_head();

        timed(options.write_timeout, conn.conn.writer.write_request(req), crate::protocol::SendError::Timeout).await?;

        let framed_read = &mut conn.conn.framed_read;
        framed_read.decoder_mut().set_skip_body(is_head);
        let read_header = async { framed_read.next().await.transpose() };
        let (header, payload_size) = match timed(options.read_timeout, read_header, ParseError::Timeout).await? {
            Some(Message::Header(header)) => header,
            Some(Message::Payload(_)) => {
                return Err(ParseError::invalid_body("receive payload while waiting for a response header").into());
            }
            None => return Err(ClientError::ConnectionClosed),
        };

        let keep_alive =
            !req.connection_close() && !header.connection_close() && !matches!(payload_size, PayloadSize::UntilClose);
        resp.reset();
        *resp.header_mut() = header;

        if options.response_body_stream && payload_size.needs_stream(options.max_response_body_size) {
            let body = ResponseBody { conn: Some(conn), keep_alive };
            resp.set_body_stream(BodyStream::new(body, payload_size.length()));
            return Ok(());
        }

        let read_body = read_payload(&mut conn.conn.framed_read, resp, options.max_response_body_size);
        timed(options.read_timeout, read_body, ParseError::Timeout).await?;

        if keep_alive {
            conn.recycle();
        } else {
            debug!("response does not keep the connection alive, discard it");
        }
        Ok(())
    }
}

async fn timed<F, T, E>(timeout: Option<Duration>, fut: F, on_timeout: E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut).await.unwrap_or(Err(on_timeout)),
        None => fut.await,
    }
}

async fn read_payload<R>(
    framed_read: &mut FramedRead<R, ResponseDecoder>,
    resp: &mut Response,
    max_size: usize,
) -> Result<(), ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut size = 0usize;
    loop {
        match framed_read.next().await {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                size += bytes.len();
                if max_size > 0 && size > max_size {
                    return Err(ParseError::too_large_body(size, max_size));
                }
                resp.message_body_mut().buffer_mut().extend_from_slice(&bytes);
            }
            Some(Ok(Message::Payload(PayloadItem::Trailers(trailer)))) => {
                resp.header_mut().trailer_mut().merge(&trailer);
            }
            Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(()),
            Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive header while reading body")),
            Some(Err(e)) => return Err(e),
            None => return Err(ParseError::UnexpectedEof),
        }
    }
}

/// A response body read straight from its pooled connection.
struct ResponseBody {
    conn: Option<PooledConn>,
    keep_alive: bool,
}

impl Stream for ResponseBody {
    type Item = Result<PayloadItem, ParseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(conn) = this.conn.as_mut() else {
            return Poll::Ready(None);
        };

        let item = match ready!(conn.conn.framed_read.poll_next_unpin(cx)) {
            Some(Ok(Message::Payload(item))) => item,
            Some(Ok(Message::Header(_))) => {
                this.conn = None;
                return Poll::Ready(Some(Err(ParseError::invalid_body("receive header while reading body"))));
            }
            Some(Err(e)) => {
                this.conn = None;
                return Poll::Ready(Some(Err(e)));
            }
            None => {
                this.conn = None;
                return Poll::Ready(Some(Err(ParseError::UnexpectedEof)));
            }
        };

        if item.is_eof()
            && let Some(conn) = this.conn.take()
            && this.keep_alive
        {
            conn.recycle();
        }
        Poll::Ready(Some(Ok(item)))
    }
}
