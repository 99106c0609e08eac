//! The host client against in-process servers reached through a counting dialer.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use http::StatusCode;
use micro_wire::client::{BoxedConn, ClientError, Dialer, HostClient, TlsConfig};
use micro_wire::config::{ClientOptions, ServerOptions};
use micro_wire::handler::{Handler, make_handler};
use micro_wire::protocol::{Request, Response};
use micro_wire::server::Server;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Connects every dial to a fresh in-memory connection served by `server`.
struct LoopbackDialer<H: Handler + 'static> {
    server: Arc<Server<H>>,
    dials: AtomicUsize,
}

impl<H: Handler + 'static> LoopbackDialer<H> {
    fn new(handler: H) -> Arc<Self> {
        let options = ServerOptions { no_default_date: true, ..ServerOptions::default() };
        Arc::new(Self { server: Arc::new(Server::builder(handler).options(options).build()), dials: AtomicUsize::new(0) })
    }

    fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<H: Handler + 'static> Dialer for LoopbackDialer<H> {
    async fn dial(&self, _addr: &str, _timeout: Duration, _tls: Option<Arc<TlsConfig>>) -> io::Result<BoxedConn> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let server = Arc::clone(&self.server);
        tokio::spawn(async move {
            let _ = server.serve_connection(server_io).await;
        });
        Ok(Box::new(client))
    }
}

fn client_with<D: Dialer + 'static>(dialer: Arc<D>, options: ClientOptions) -> HostClient {
    HostClient::builder().options(ClientOptions { addr: "backend:80".into(), ..options }).dialer(dialer).build().unwrap()
}

fn echo() -> impl Handler {
    make_handler(|req: &mut Request, resp: &mut Response| {
        async move {
            resp.set_body_copy(req.body());
            if let Some(value) = req.header().trailer().peek(b"X-Checksum") {
                resp.header_mut().set("X-Checksum", value.to_vec());
            }
            Ok::<_, io::Error>(())
        }
        .boxed()
    })
}

fn sleepy(delay: Duration) -> impl Handler {
    make_handler(move |_req: &mut Request, resp: &mut Response| {
        async move {
            tokio::time::sleep(delay).await;
            resp.set_body("done");
            Ok::<_, io::Error>(())
        }
        .boxed()
    })
}

#[tokio::test]
async fn keep_alive_connection_is_reused() {
    let dialer = LoopbackDialer::new(echo());
    let client = client_with(Arc::clone(&dialer), ClientOptions::default());

    for i in 0..5 {
        let mut req = Request::with_uri("/echo");
        req.header_mut().set_method(http::Method::POST);
        req.set_body(format!("message {i}"));
        let mut resp = Response::new();
        client.do_request(&mut req, &mut resp).await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), format!("message {i}").as_bytes());
    }

    assert_eq!(dialer.dials(), 1);
    assert_eq!(client.idle_count(), 1);
    assert_eq!(client.conns_count(), 1);
}

#[tokio::test]
async fn chunked_request_with_trailer_round_trip() {
    let dialer = LoopbackDialer::new(echo());
    let client = client_with(dialer, ClientOptions::default());

    let mut req = Request::with_uri("/upload");
    req.header_mut().set_method(http::Method::POST);
    req.header_mut().trailer_mut().set(b"X-Checksum", b"abc123").unwrap();
    let chunks = futures::stream::iter(["Wiki", "pedia ", "in \r\n\r\nchunks."].map(|s| Ok::<_, io::Error>(bytes::Bytes::from(s))));
    req.set_body_stream(micro_wire::protocol::body::BodyStream::from_bytes_stream(chunks, None));

    let mut resp = Response::new();
    client.do_request(&mut req, &mut resp).await.unwrap();
    assert_eq!(resp.body(), b"Wikipedia in \r\n\r\nchunks.");
    assert_eq!(resp.header().peek("X-Checksum"), Some(&b"abc123"[..]));
}

#[tokio::test]
async fn pool_never_exceeds_max_conns_and_nobody_starves() {
    const MAX_CONNS: usize = 4;
    const CALLERS: usize = 32;

    let dialer = LoopbackDialer::new(sleepy(Duration::from_millis(10)));
    let options =
        ClientOptions { max_conns: MAX_CONNS, max_conn_wait_timeout: Some(Duration::from_secs(5)), ..ClientOptions::default() };
    let client = client_with(Arc::clone(&dialer), options);

    let callers = (0..CALLERS).map(|_| {
        let client = client.clone();
        tokio::spawn(async move {
            let mut resp = Response::new();
            client.do_request(&mut Request::with_uri("/"), &mut resp).await?;
            assert!(client.conns_count() <= MAX_CONNS);
            Ok::<_, ClientError>(resp.body().to_vec())
        })
    });

    for result in join_all(callers).await {
        assert_eq!(result.unwrap().unwrap(), b"done");
    }
    assert!(dialer.dials() <= MAX_CONNS, "dialed {} connections", dialer.dials());
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.idle_count(), client.conns_count());
}

#[tokio::test]
async fn released_connection_goes_to_the_waiter_without_dialing() {
    let dialer = LoopbackDialer::new(echo());
    let options = ClientOptions { max_conns: 1, max_conn_wait_timeout: Some(Duration::from_secs(1)), ..ClientOptions::default() };
    let client = client_with(Arc::clone(&dialer), options);

    let held = client.acquire().await.unwrap();
    assert_eq!(dialer.dials(), 1);

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.acquire().await.map(|conn| client.release(conn)) })
    };
    while client.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    client.release(held);
    waiter.await.unwrap().unwrap();
    assert_eq!(dialer.dials(), 1);
    assert_eq!(client.conns_count(), 1);
    assert_eq!(client.idle_count(), 1);
}

#[tokio::test]
async fn wait_timeout_yields_no_free_conns() {
    let dialer = LoopbackDialer::new(sleepy(Duration::from_millis(50)));
    let options =
        ClientOptions { max_conns: 1, max_conn_wait_timeout: Some(Duration::from_millis(10)), ..ClientOptions::default() };
    let client = client_with(dialer, options);

    let holder = {
        let client = client.clone();
        tokio::spawn(async move {
            let mut resp = Response::new();
            client.do_request(&mut Request::with_uri("/slow"), &mut resp).await
        })
    };
    while client.conns_count() == 0 {
        tokio::task::yield_now().await;
    }

    let e = client.do_request(&mut Request::with_uri("/"), &mut Response::new()).await.unwrap_err();
    assert!(matches!(e, ClientError::NoFreeConns), "{e}");

    holder.await.unwrap().unwrap();
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.idle_count(), 1);
}

#[tokio::test]
async fn fail_fast_without_wait_timeout() {
    let dialer = LoopbackDialer::new(echo());
    let client = client_with(dialer, ClientOptions { max_conns: 1, ..ClientOptions::default() });

    let _held = client.acquire().await.unwrap();
    assert!(matches!(client.acquire().await, Err(ClientError::NoFreeConns)));
}

#[tokio::test]
async fn unconsumed_stream_never_returns_to_idle() {
    let big_body = vec![b'x'; 256 * 1024];
    let body = bytes::Bytes::from(big_body);
    let handler = make_handler(move |_req: &mut Request, resp: &mut Response| {
        let body = body.clone();
        async move {
            resp.set_body(body);
            Ok::<_, io::Error>(())
        }
        .boxed()
    });
    let dialer = LoopbackDialer::new(handler);
    let client = client_with(Arc::clone(&dialer), ClientOptions { response_body_stream: true, ..ClientOptions::default() });

    let mut resp = Response::new();
    client.do_request(&mut Request::with_uri("/big"), &mut resp).await.unwrap();
    let mut stream = resp.take_body_stream().unwrap();
    assert_eq!(stream.content_length(), Some(256 * 1024));
    assert!(!stream.next_chunk().await.unwrap().unwrap().is_empty());
    drop(stream);

    assert_eq!(client.idle_count(), 0);
    assert_eq!(client.conns_count(), 0);

    let mut resp = Response::new();
    client.do_request(&mut Request::with_uri("/big"), &mut resp).await.unwrap();
    assert!(resp.is_body_stream());
    assert_eq!(resp.read_body(0).await.unwrap().len(), 256 * 1024);
    assert_eq!(client.idle_count(), 1);
    assert_eq!(dialer.dials(), 2);
}

#[tokio::test]
async fn small_response_is_buffered_in_streaming_mode() {
    let handler = make_handler(|req: &mut Request, resp: &mut Response| {
        async move {
            match req.header().request_uri() {
                b"/small" => resp.set_body("ok"),
                _ => resp.set_body(vec![b'y'; 2048]),
            }
            Ok::<_, io::Error>(())
        }
        .boxed()
    });
    let dialer = LoopbackDialer::new(handler);
    let options = ClientOptions { response_body_stream: true, max_response_body_size: 1024, ..ClientOptions::default() };
    let client = client_with(Arc::clone(&dialer), options);

    let mut resp = Response::new();
    client.do_request(&mut Request::with_uri("/small"), &mut resp).await.unwrap();
    assert!(!resp.is_body_stream());
    assert_eq!(resp.body(), b"ok");
    assert_eq!(client.idle_count(), 1);

    let mut resp = Response::new();
    client.do_request(&mut Request::with_uri("/large"), &mut resp).await.unwrap();
    assert!(resp.is_body_stream());
    assert_eq!(client.idle_count(), 0);
    assert_eq!(resp.read_body(0).await.unwrap().len(), 2048);
    assert_eq!(client.idle_count(), 1);
    assert_eq!(dialer.dials(), 1);
}

#[tokio::test]
async fn timeout_bounds_the_whole_exchange() {
    let dialer = LoopbackDialer::new(sleepy(Duration::from_secs(5)));
    let client = client_with(dialer, ClientOptions::default());

    let e = client
        .do_with_timeout(&mut Request::with_uri("/"), &mut Response::new(), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(e, ClientError::Timeout), "{e}");
    assert_eq!(client.idle_count(), 0);
}

#[tokio::test]
async fn close_idle_connections_keeps_the_client_usable() {
    let dialer = LoopbackDialer::new(echo());
    let client = client_with(Arc::clone(&dialer), ClientOptions::default());

    client.do_request(&mut Request::with_uri("/"), &mut Response::new()).await.unwrap();
    assert_eq!(client.idle_count(), 1);

    client.close_idle_connections();
    assert_eq!(client.idle_count(), 0);
    assert_eq!(client.conns_count(), 0);

    client.do_request(&mut Request::with_uri("/"), &mut Response::new()).await.unwrap();
    assert_eq!(dialer.dials(), 2);
}
