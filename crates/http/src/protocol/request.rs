//! An HTTP request: header plus body, with cached derived views.

use crate::protocol::body::{BodyStream, MessageBody};
use crate::protocol::header::{CONTENT_LENGTH_CHUNKED, RequestHeader, names};
use crate::protocol::multipart::generate_boundary;
use crate::protocol::pool::Reusable;
use crate::protocol::{Args, MultipartForm, ParseError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use http::Uri;
use tracing::warn;

/// An HTTP request as read by the server or sent by the client.
///
/// The URI, the urlencoded POST arguments and the multipart form are parsed lazily on first
/// access and cached until the header or the body changes.
#[derive(Debug, Default)]
pub struct Request {
    header: RequestHeader,
    body: MessageBody,

    uri: Option<Uri>,
    post_args: Args,
    post_args_parsed: bool,
    multipart_form: Option<MultipartForm>,

    max_keep_body_size: usize,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for `uri`, e.g. `http://example.com/path?q=1`.
    pub fn with_uri(uri: impl AsRef<[u8]>) -> Self {
        let mut request = Self::new();
        request.set_request_uri(uri);
        request
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        self.uri = None;
        &mut self.header
    }

    pub fn set_request_uri(&mut self, uri: impl AsRef<[u8]>) {
        self.uri = None;
        self.header.set_request_uri(uri);
    }

    /// The request URI, completed with the `Host` header when the request line carries
    /// only a path.
    pub fn uri(&mut self) -> Result<&Uri, ParseError> {
        if self.uri.is_none() {
            self.uri = Some(self.parse_uri()?);
        }
        self.uri.as_ref().ok_or(ParseError::InvalidUri)
    }

    fn parse_uri(&self) -> Result<Uri, ParseError> {
        let uri = Uri::try_from(self.header.request_uri()).map_err(|_| ParseError::InvalidUri)?;
        if uri.authority().is_some() || self.header.host().is_empty() {
            return Ok(uri);
        }
        let path = uri.path_and_query().map_or("/", http::uri::PathAndQuery::as_str);
        Uri::builder()
            .scheme("http")
            .authority(self.header.host())
            .path_and_query(path)
            .build()
            .map_err(|_| ParseError::InvalidUri)
    }

    /// The in-memory body; empty while the body is a stream.
    pub fn body(&self) -> &[u8] {
        self.body.bytes()
    }

    pub fn body_bytes(&self) -> Bytes {
        self.body.to_bytes()
    }

    pub(crate) fn message_body_mut(&mut self) -> &mut MessageBody {
        self.invalidate_body_views();
        &mut self.body
    }

    pub(crate) fn split_mut(&mut self) -> (&RequestHeader, &mut MessageBody) {
        (&self.header, &mut self.body)
    }

    /// Sets an immutable body, written to the wire without copying.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.invalidate_body_views();
        self.body.set_raw(body);
    }

    /// Sets the body to a copy of `body`, reusing the owned buffer.
    pub fn set_body_copy(&mut self, body: &[u8]) {
        self.invalidate_body_views();
        self.body.set_copy(body);
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.invalidate_body_views();
        self.body.append(data);
    }

    pub fn set_body_stream(&mut self, stream: BodyStream) {
        self.invalidate_body_views();
        self.body.set_stream(stream);
    }

    /// Takes a streamed body out of the request. The caller owns the stream and must read it
    /// to the end for the connection to stay usable.
    pub fn take_body_stream(&mut self) -> Option<BodyStream> {
        self.body.take_stream()
    }

    pub fn is_body_stream(&self) -> bool {
        self.body.is_stream()
    }

    /// Reads a streamed body into memory, at most `max_size` bytes (zero is unlimited), and
    /// merges its trailers into the header.
    pub async fn read_body(&mut self, max_size: usize) -> Result<&[u8], ParseError> {
        self.invalidate_body_views();
        if let Some(trailer) = self.body.collect(max_size).await? {
            self.header.trailer_mut().merge(&trailer);
        }
        Ok(self.body.bytes())
    }

    pub fn swap_body(&mut self, other: &mut Request) {
        self.invalidate_body_views();
        other.invalidate_body_views();
        self.body.swap(&mut other.body);
    }

    fn invalidate_body_views(&mut self) {
        self.post_args.reset();
        self.post_args_parsed = false;
        self.multipart_form = None;
    }

    /// The urlencoded POST arguments, empty unless the body is a form.
    pub fn post_args(&mut self) -> &Args {
        if !self.post_args_parsed {
            self.post_args_parsed = true;
            if self.header.is_form_urlencoded()
                && let Err(e) = self.post_args.parse_urlencoded(self.body.bytes())
            {
                warn!(cause = %e, "failed to parse urlencoded body");
            }
        }
        &self.post_args
    }

    /// The parsed `multipart/form-data` body.
    pub fn multipart_form(&mut self) -> Result<&MultipartForm, ParseError> {
        if self.multipart_form.is_none() {
            let boundary = self
                .header
                .multipart_form_boundary()
                .ok_or_else(|| ParseError::invalid_multipart("content type is not multipart/form-data"))?;
            self.multipart_form = Some(MultipartForm::parse(&self.body.to_bytes(), &boundary)?);
        }
        self.multipart_form.as_ref().ok_or_else(|| ParseError::invalid_multipart("form not parsed"))
    }

    /// Replaces the body with `args` urlencoded and sets the matching content type.
    pub fn set_form_data(&mut self, args: &Args) -> Result<(), ParseError> {
        let encoded = args.to_urlencoded().map_err(ParseError::invalid_body)?;
        self.header.set_content_type("application/x-www-form-urlencoded");
        self.set_body(encoded);
        Ok(())
    }

    /// Replaces the body with `form` encoded under a fresh boundary.
    pub fn set_multipart_form_data(&mut self, form: &MultipartForm) {
        let boundary = generate_boundary();
        let mut dst = BytesMut::new();
        form.write(&boundary, &mut dst);
        self.header.set_content_type(format!("multipart/form-data; boundary={boundary}"));
        self.set_body(dst.freeze());
    }

    pub fn may_continue(&self) -> bool {
        self.header.may_continue()
    }

    pub fn set_basic_auth(&mut self, username: &str, password: &str) {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        self.header.set(names::AUTHORIZATION, format!("Basic {encoded}"));
    }

    /// The credentials of a `Basic` authorization header.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        parse_basic_auth(self.header.peek(names::AUTHORIZATION)?)
    }

    pub fn connection_close(&self) -> bool {
        self.header.connection_close()
    }

    pub fn set_connection_close(&mut self, close: bool) {
        self.header.set_connection_close(close);
    }

    /// Body buffers larger than `size` are released on [`Request::reset`] instead of kept.
    pub fn set_max_keep_body_size(&mut self, size: usize) {
        self.max_keep_body_size = size;
    }

    pub fn reset(&mut self) {
        self.header.reset();
        self.body.reset(self.max_keep_body_size);
        self.uri = None;
        self.invalidate_body_views();
    }

    /// Makes the framing headers describe the current body before it is written.
    pub(crate) fn prepare_content_length(&mut self) {
        if self.header.ignore_body() && self.body.is_empty() {
            self.header.set_content_length(0);
            return;
        }
        let length = self
            .body
            .len()
            .and_then(|n| i64::try_from(n).ok())
            .unwrap_or(CONTENT_LENGTH_CHUNKED);
        self.header.set_content_length(length);
    }
}

impl Reusable for Request {
    fn reset(&mut self) {
        Request::reset(self);
    }
}

fn parse_basic_auth(value: &[u8]) -> Option<(String, String)> {
    let encoded = value.strip_prefix(b"Basic ")?;
    let decoded = STANDARD.decode(encoded.trim_ascii()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
