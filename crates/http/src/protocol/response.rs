//! An HTTP response: header plus body.

use crate::protocol::ParseError;
use crate::protocol::body::{BodyStream, MessageBody};
use crate::protocol::header::{CONTENT_LENGTH_CHUNKED, Cookie, ResponseHeader};
use crate::protocol::pool::Reusable;
use bytes::Bytes;
use http::StatusCode;

/// An HTTP response as filled by a handler or read by the client.
#[derive(Debug, Default)]
pub struct Response {
    header: ResponseHeader,
    body: MessageBody,

    /// The body is not read from the wire (client, answer to HEAD) or not written
    /// (server, HEAD request).
    skip_body: bool,
    max_keep_body_size: usize,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut ResponseHeader {
        &mut self.header
    }

    pub fn status_code(&self) -> StatusCode {
        self.header.status_code()
    }

    pub fn set_status_code(&mut self, status: StatusCode) {
        self.header.set_status_code(status);
    }

    pub fn body(&self) -> &[u8] {
        self.body.bytes()
    }

    pub fn body_bytes(&self) -> Bytes {
        self.body.to_bytes()
    }

    pub(crate) fn message_body_mut(&mut self) -> &mut MessageBody {
        &mut self.body
    }

    pub(crate) fn split_mut(&mut self) -> (&ResponseHeader, &mut MessageBody) {
        (&self.header, &mut self.body)
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body.set_raw(body);
    }

    pub fn set_body_copy(&mut self, body: &[u8]) {
        self.body.set_copy(body);
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.body.append(data);
    }

    /// Sets a body that is pulled and written while the response is sent. Its length is
    /// announced when known, chunked encoding is used otherwise.
    pub fn set_body_stream(&mut self, stream: BodyStream) {
        self.body.set_stream(stream);
    }

    /// Takes a streamed body out of the response. A client caller owns the pooled connection
    /// through it: reading it to the end returns the connection, dropping it early discards it.
    pub fn take_body_stream(&mut self) -> Option<BodyStream> {
        self.body.take_stream()
    }

    pub fn is_body_stream(&self) -> bool {
        self.body.is_stream()
    }

    /// Reads a streamed body into memory, at most `max_size` bytes (zero is unlimited).
    pub async fn read_body(&mut self, max_size: usize) -> Result<&[u8], ParseError> {
        if let Some(trailer) = self.body.collect(max_size).await? {
            self.header.trailer_mut().merge(&trailer);
        }
        Ok(self.body.bytes())
    }

    pub fn swap_body(&mut self, other: &mut Response) {
        self.body.swap(&mut other.body);
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) {
        self.header.set_cookie(cookie);
    }

    pub fn skip_body(&self) -> bool {
        self.skip_body
    }

    pub fn set_skip_body(&mut self, skip: bool) {
        self.skip_body = skip;
    }

    pub fn connection_close(&self) -> bool {
        self.header.connection_close()
    }

    pub fn set_connection_close(&mut self, close: bool) {
        self.header.set_connection_close(close);
    }

    pub fn set_max_keep_body_size(&mut self, size: usize) {
        self.max_keep_body_size = size;
    }

    pub fn reset(&mut self) {
        self.header.reset();
        self.body.reset(self.max_keep_body_size);
        self.skip_body = false;
    }

    /// Makes the framing headers describe the current body before it is written.
    pub(crate) fn prepare_content_length(&mut self) {
        if self.header.must_skip_body() {
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

impl Reusable for Response {
    fn reset(&mut self) {
        Response::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_tracks_body() {
        let mut resp = Response::new();
        resp.set_body("hello world");
        resp.prepare_content_length();
        assert_eq!(resp.header().content_length(), 11);

        resp.append_body(b"!");
        resp.prepare_content_length();
        assert_eq!(resp.header().content_length(), 12);
        assert_eq!(resp.body(), b"hello world!");

        resp.set_body_stream(BodyStream::new(futures::stream::empty(), Some(3)));
        resp.prepare_content_length();
        assert_eq!(resp.header().content_length(), 3);

        resp.set_body_stream(BodyStream::new(futures::stream::empty(), None));
        resp.prepare_content_length();
        assert_eq!(resp.header().content_length(), CONTENT_LENGTH_CHUNKED);
    }

    #[test]
    fn no_content_keeps_no_length() {
        let mut resp = Response::new();
        resp.set_status_code(StatusCode::NO_CONTENT);
        resp.prepare_content_length();
        let wire = resp.header().to_bytes();
        assert!(!wire.windows(14).any(|w| w.eq_ignore_ascii_case(b"content-length")));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut resp = Response::new();
        resp.set_status_code(StatusCode::NOT_FOUND);
        resp.set_skip_body(true);
        resp.set_cookie(&Cookie::new("sid", "1"));
        resp.set_body("x");
        resp.reset();

        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(!resp.skip_body());
        assert!(resp.header().cookie("sid").is_none());
        assert!(resp.body().is_empty());
    }
}
