use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ServerOptions;
use crate::connection::MessageWriter;
use crate::handler::{ContinueHandler, Handler};
use crate::protocol::body::{BodyStream, create_body_sender_receiver};
use crate::protocol::header::RequestHeader;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, Request, Response, SendError};
use crate::server::DateService;

const READ_BUFFER_SIZE: usize = 8 * 1024;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// The server side of one HTTP/1.1 connection.
///
/// Serves requests strictly one after another: read the header, optionally answer
/// `100 Continue`, hand the request to the [`Handler`], write the response, then either wait
/// for the next request or close. The request and response objects are reused across
/// kept-alive requests.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: MessageWriter<W, ResponseEncoder>,

    options: Arc<ServerOptions>,
    continue_handler: Option<ContinueHandler>,
    date: Option<DateService>,
    shutdown: CancellationToken,

    request: Request,
    response: Response,
}

impl<R, W> fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("options", &self.options)
            .field("continue_handler", &self.continue_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_options(reader, writer, Arc::new(ServerOptions::default()))
    }

    pub fn with_options(reader: R, writer: W, options: Arc<ServerOptions>) -> Self {
        let mut decoder = RequestDecoder::with_limits(options.header_limits());
        if options.disable_header_names_normalizing {
            decoder.disable_normalizing();
        }

        let mut request = Request::new();
        request.set_max_keep_body_size(options.max_keep_body_size);

        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, READ_BUFFER_SIZE),
            writer: MessageWriter::new(writer),
            options,
            continue_handler: None,
            date: None,
            shutdown: CancellationToken::new(),
            request,
            response: Response::new(),
        }
    }

    pub fn set_continue_handler(&mut self, continue_handler: ContinueHandler) {
        self.continue_handler = Some(continue_handler);
    }

    pub fn set_date_service(&mut self, date: DateService) {
        self.date = Some(date);
    }

    /// Once `shutdown` is cancelled the connection finishes the current exchange and closes
    /// instead of waiting for another request.
    pub fn set_shutdown(&mut self, shutdown: CancellationToken) {
        self.shutdown = shutdown;
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
    {
        let mut served = 0usize;
        loop {
            let wait = if served == 0 { self.options.read_timeout } else { self.options.idle_timeout };

            let next = select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!(served, "server is shutting down, close connection");
                    return Ok(());
                }
                next = next_message(&mut self.framed_read, wait) => next,
            };

            match next {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    let keep_alive = self.serve(header, payload_size, &*handler).await?;
                    served += 1;
                    if !keep_alive {
                        debug!(served, "connection is not kept alive");
                        if let Err(e) = self.writer.shutdown().await {
                            debug!(cause = %e, "failed to shutdown writer");
                        }
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while waiting for a request header");
                    let e = ParseError::invalid_body("need header while receive body");
                    self.send_error_response(&e).await;
                    return Err(e.into());
                }

                Some(Err(e)) if e.is_timeout() && served > 0 && self.framed_read.read_buffer().is_empty() => {
                    info!(served, "keep-alive connection is idle, close it");
                    return Ok(());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    self.send_error_response(&e).await;
                    return Err(e.into());
                }

                None => {
                    info!(served, "cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    /// Serves one request and reports whether the connection stays open.
    async fn serve<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &H) -> Result<bool, HttpError>
    where
        H: Handler + ?Sized,
    {
        self.request.reset();
        self.response.reset();
        *self.request.header_mut() = header;
        let is_head = self.request.header().is_head();

        if self.request.may_continue() && !payload_size.is_empty() {
            let accepted = self.continue_handler.as_ref().is_none_or(|accept| accept(self.request.header()));
            if !accepted {
                info!("reject request expecting 100-continue");
                self.response.set_status_code(StatusCode::EXPECTATION_FAILED);
                self.response.set_connection_close(true);
                self.write_response(false).await?;
                return Ok(false);
            }
            self.writer.write_direct(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
            self.writer.flush().await?;
            info!("receive expect request header, sent continue response");
        }

        let handler_result = if self.options.stream_request_body && payload_size.needs_stream(self.options.max_request_body_size) {
            match self.call_streaming(payload_size, handler).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(cause = %e, "failed to read streamed request body");
                    self.send_error_response(&e).await;
                    return Ok(false);
                }
            }
        } else {
            if let Err(e) = self.read_body().await {
                error!(cause = %e, "failed to read request body");
                self.send_error_response(&e).await;
                return Ok(false);
            }
            handler.call(&mut self.request, &mut self.response).await.map_err(Into::into)
        };

        if let Err(e) = handler_result {
            error!(cause = %e, "handle request error");
            self.response.reset();
            self.response.set_status_code(StatusCode::INTERNAL_SERVER_ERROR);
            self.response.set_body(canonical_reason(StatusCode::INTERNAL_SERVER_ERROR));
        }

        let keep_alive = !self.options.disable_keep_alive
            && !self.request.connection_close()
            && !self.response.connection_close()
            && !self.shutdown.is_cancelled()
            && self.options.idle_timeout != Some(Duration::ZERO);
        if !keep_alive {
            self.response.set_connection_close(true);
        }

        self.write_response(is_head).await?;
        Ok(keep_alive)
    }

    /// Reads the whole request body into the request, bounded by the body size limit and the
    /// read timeout.
    async fn read_body(&mut self) -> Result<(), ParseError> {
        let max_size = self.options.max_request_body_size;
        let framed_read = &mut self.framed_read;
        let request = &mut self.request;

        let read = async move {
            let mut size = 0usize;
            loop {
                match framed_read.next().await {
                    Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                        size += bytes.len();
                        if max_size > 0 && size > max_size {
                            return Err(ParseError::too_large_body(size, max_size));
                        }
                        request.message_body_mut().buffer_mut().extend_from_slice(&bytes);
                    }
                    Some(Ok(Message::Payload(PayloadItem::Trailers(trailer)))) => {
                        request.header_mut().trailer_mut().merge(&trailer);
                    }
                    Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(()),
                    Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive header while reading body")),
                    Some(Err(e)) => return Err(e),
                    None => return Err(ParseError::UnexpectedEof),
                }
            }
        };

        match self.options.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read).await.unwrap_or(Err(ParseError::Timeout)),
            None => read.await,
        }
    }

    /// Runs the handler while the body sender feeds the streamed request body, then skips
    /// whatever the handler left unread.
    async fn call_streaming<H>(&mut self, payload_size: PayloadSize, handler: &H) -> Result<HandlerResult, ParseError>
    where
        H: Handler + ?Sized,
    {
        let (mut body_sender, body_receiver) = create_body_sender_receiver(&mut self.framed_read);
        self.request.set_body_stream(BodyStream::new(body_receiver, payload_size.length()));

        let mut body_error = None;
        let handler_result = {
            tokio::pin! {
                let request_handle_future = handler.call(&mut self.request, &mut self.response);
                let body_sender_future = body_sender.start();
            }

            let mut body_done = false;
            loop {
                select! {
                    biased;
                    result = &mut request_handle_future => break result.map_err(Into::into),
                    result = &mut body_sender_future, if !body_done => {
                        body_done = true;
                        if let Err(e) = result {
                            body_error = Some(e);
                        }
                    }
                }
            }
        };

        // dropping the stream tells the sender nobody reads anymore
        drop(self.request.take_body_stream());

        if let Some(e) = body_error {
            return Err(e);
        }
        if !body_sender.is_eof() {
            let skip = body_sender.skip_data();
            match self.options.read_timeout {
                Some(timeout) => tokio::time::timeout(timeout, skip).await.unwrap_or(Err(ParseError::Timeout))?,
                None => skip.await?,
            };
        }
        Ok(handler_result)
    }

    async fn write_response(&mut self, skip_body: bool) -> Result<(), SendError> {
        let header = self.response.header_mut();
        if !self.options.no_default_server_header && header.server().is_empty() {
            header.set_server(&self.options.name);
        }
        if !self.options.no_default_date
            && header.date().is_empty()
            && let Some(date) = &self.date
        {
            header.set_date(date.current());
        }
        if self.options.no_default_content_type {
            header.set_no_default_content_type(true);
        }

        let write = self.writer.write_response(&mut self.response, skip_body);
        match self.options.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, write).await.unwrap_or(Err(SendError::Timeout)),
            None => write.await,
        }
    }

    /// Answers a malformed request, best effort: the connection is closed afterwards anyway.
    async fn send_error_response(&mut self, e: &ParseError) {
        if matches!(e, ParseError::Io { .. } | ParseError::UnexpectedEof) {
            return;
        }
        let status = if e.is_too_large() {
            StatusCode::PAYLOAD_TOO_LARGE
        } else if e.is_timeout() {
            StatusCode::REQUEST_TIMEOUT
        } else {
            StatusCode::BAD_REQUEST
        };

        self.response.reset();
        self.response.set_status_code(status);
        self.response.set_connection_close(true);
        self.response.set_body(canonical_reason(status));
        if let Err(send_error) = self.write_response(false).await {
            warn!(cause = %send_error, status = status.as_u16(), "failed to send error response");
        }
    }
}

fn canonical_reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

async fn next_message<S, T>(stream: &mut S, timeout: Option<Duration>) -> Option<Result<T, ParseError>>
where
    S: Stream<Item = Result<T, ParseError>> + Unpin,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, stream.next()).await.unwrap_or(Some(Err(ParseError::Timeout))),
        None => stream.next().await,
    }
}
