//! Fires a batch of concurrent requests at `hello_server` through one host client.

use futures::future::join_all;
use micro_wire::client::HostClient;
use micro_wire::config::ClientOptions;
use micro_wire::protocol::{Request, Response};
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let options = ClientOptions {
        addr: "127.0.0.1:8080".into(),
        max_conns: 4,
        max_conn_wait_timeout: Some(Duration::from_secs(1)),
        ..ClientOptions::default()
    };
    let client = match HostClient::new(options) {
        Ok(client) => client,
        Err(e) => {
            error!(cause = %e, "invalid client options");
            return;
        }
    };

    let requests = (0..16).map(|i| {
        let client = client.clone();
        async move {
            let mut req = Request::with_uri("/echo");
            req.header_mut().set_method(http::Method::POST);
            req.set_body(format!("request #{i}"));
            let mut resp = Response::new();
            match client.do_with_timeout(&mut req, &mut resp, Duration::from_secs(5)).await {
                Ok(()) => info!(status = %resp.status_code(), body = %String::from_utf8_lossy(resp.body()), "got response"),
                Err(e) => error!(cause = %e, "request failed"),
            }
        }
    });
    join_all(requests).await;

    info!(conns = client.conns_count(), idle = client.idle_count(), "done");
    client.close();
}
