use futures::FutureExt;
use http::StatusCode;
use micro_wire::config::ServerOptions;
use micro_wire::handler::make_handler;
use micro_wire::protocol::{Request, Response};
use micro_wire::server::Server;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let handler = make_handler(|req: &mut Request, resp: &mut Response| {
        async move {
            match req.header().request_uri() {
                b"/" => resp.set_body("Hello World!\r\n"),
                b"/echo" => {
                    let body = req.body().to_vec();
                    resp.set_body(body);
                }
                _ => {
                    resp.set_status_code(StatusCode::NOT_FOUND);
                    resp.set_body("404 not found\r\n");
                }
            }
            Ok::<_, std::io::Error>(())
        }
        .boxed()
    });

    let options = ServerOptions { idle_timeout: Some(Duration::from_secs(30)), ..ServerOptions::default() };
    let server = Arc::new(
        Server::builder(handler)
            .options(options)
            .continue_handler(|header| header.content_length() <= 1024 * 1024)
            .build(),
    );

    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });

    if let Err(e) = server.serve(tcp_listener).await {
        error!(cause = %e, "server stopped");
    }
    info!("bye");
}
