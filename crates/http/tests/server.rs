//! The server over real TCP sockets.

use futures::FutureExt;
use indoc::indoc;
use micro_wire::config::ServerOptions;
use micro_wire::handler::{Handler, make_handler};
use micro_wire::protocol::{Request, Response};
use micro_wire::server::Server;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn echo() -> impl Handler {
    make_handler(|req: &mut Request, resp: &mut Response| {
        async move {
            resp.header_mut().set("X-Uri", req.header().request_uri().to_vec());
            resp.set_body_copy(req.body());
            Ok::<_, io::Error>(())
        }
        .boxed()
    })
}

async fn start<H: Handler + 'static>(handler: H) -> (Arc<Server<H>>, SocketAddr, JoinHandle<io::Result<()>>) {
    let options = ServerOptions { no_default_date: true, ..ServerOptions::default() };
    let server = Arc::new(Server::builder(handler).options(options).build());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::clone(&server);
    let task = tokio::spawn(async move { running.serve(listener).await });
    (server, addr, task)
}

async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out)).await.unwrap().unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn content_length_leaves_the_rest_for_the_next_request() {
    let (server, addr, task) = start(echo()).await;

    let out = exchange(addr, b"POST /first HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /second HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    let first = out.find("X-Uri: /first").unwrap();
    let second = out.find("X-Uri: /second").unwrap();
    assert!(first < second, "{out}");
    assert!(out.contains("Content-Length: 5\r\n"));
    assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 2);

    server.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn chunked_body_is_reassembled() {
    let (server, addr, task) = start(echo()).await;

    let out = exchange(
        addr,
        b"POST /wiki HTTP/1.1\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
          4\r\nWiki\r\n6\r\npedia \r\nE\r\nin \r\n\r\nchunks.\r\n0\r\n\r\n",
    )
    .await;

    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
    assert!(out.contains("Content-Length: 24\r\n"), "{out}");
    assert!(out.ends_with("\r\n\r\nWikipedia in \r\n\r\nchunks."), "{out}");

    server.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn head_response_has_no_body() {
    let (server, addr, task) = start(echo()).await;

    let out = exchange(
        addr,
        indoc! {b"
            HEAD /resource HTTP/1.1
            Connection: close

        "},
    )
    .await;

    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
    assert!(out.ends_with("\r\n\r\n"), "{out}");

    server.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let (server, addr, task) = start(echo()).await;
    let out = exchange(addr, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 200 OK"));

    server.shutdown();
    task.await.unwrap().unwrap();
    assert!(!server.is_running());

    // the listener was dropped with the accept loop
    TcpStream::connect(addr).await.unwrap_err();
}

#[tokio::test]
async fn shutdown_closes_idle_keep_alive_connections() {
    let (server, addr, task) = start(echo()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /keep HTTP/1.1\r\n\r\n").await.unwrap();
    let mut buf = vec![0; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200 OK"));

    server.shutdown();
    task.await.unwrap().unwrap();

    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await.unwrap();
    assert_eq!(read.unwrap(), 0);
}
