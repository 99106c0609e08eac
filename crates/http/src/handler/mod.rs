//! The seam between the connection loop and the application.
//!
//! A [`Handler`] receives the parsed [`Request`] and fills the [`Response`] the connection then
//! writes. Both objects belong to the connection and are reused for the next request.

use crate::protocol::header::RequestHeader;
use crate::protocol::{Request, Response};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::error::Error;
use std::sync::Arc;

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, req: &mut Request, resp: &mut Response) -> Result<(), Self::Error>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    type Error = H::Error;

    async fn call(&self, req: &mut Request, resp: &mut Response) -> Result<(), Self::Error> {
        (**self).call(req, resp).await
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Err> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>> + 'static,
{
    type Error = Err;

    async fn call(&self, req: &mut Request, resp: &mut Response) -> Result<(), Self::Error> {
        (self.f)(req, resp).await
    }
}

/// Turns a closure returning a boxed future into a [`Handler`].
///
/// ```
/// use futures::FutureExt;
/// use micro_wire::handler::make_handler;
///
/// let handler = make_handler(|req, resp| {
///     async move {
///         resp.set_body(format!("you asked for {}", String::from_utf8_lossy(req.header().request_uri())));
///         Ok::<_, std::io::Error>(())
///     }
///     .boxed()
/// });
/// # let _ = handler;
/// ```
pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}

/// Decides whether a request announcing `Expect: 100-continue` may send its body.
/// Rejected requests are answered with `417 Expectation Failed`.
pub type ContinueHandler = Arc<dyn Fn(&RequestHeader) -> bool + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use http::StatusCode;

    #[tokio::test]
    async fn closure_handler_fills_response() {
        let handler = make_handler(|req: &mut Request, resp: &mut Response| {
            async move {
                if req.header().is_post() {
                    resp.set_status_code(StatusCode::CREATED);
                }
                resp.set_body_copy(req.body());
                Ok::<_, std::io::Error>(())
            }
            .boxed()
        });

        let mut req = Request::new();
        req.header_mut().set_method(http::Method::POST);
        req.set_body("echo");
        let mut resp = Response::new();
        handler.call(&mut req, &mut resp).await.unwrap();

        assert_eq!(resp.status_code(), StatusCode::CREATED);
        assert_eq!(resp.body(), b"echo");
    }

    #[tokio::test]
    async fn shared_handler() {
        let handler = Arc::new(make_handler(|_req, resp| {
            async move {
                resp.set_body("shared");
                Ok::<_, std::io::Error>(())
            }
            .boxed()
        }));
        let mut resp = Response::new();
        handler.call(&mut Request::new(), &mut resp).await.unwrap();
        assert_eq!(resp.body(), b"shared");
    }
}
