//! Byte-oriented request and response headers.
//!
//! Frequently used fields (host, content type, content length, user agent, server,
//! connection close, cookies, trailer) live in dedicated slots; everything else is kept in
//! an ordered [`Args`](crate::protocol::Args) list in insertion order. Setting a field checks the special
//! slots first through one dispatch function per header kind, then falls back to the
//! generic list.
//!
//! Keys are canonicalized on insertion (`content-type` becomes `Content-Type`) unless
//! normalization is disabled on the header.

mod cookie;
mod normalize;
mod parse;
mod request_header;
mod response_header;
mod trailer;

pub use cookie::{Cookie, SameSite};
pub use normalize::{normalize_header_key, normalized_key};
pub use parse::{HeaderLimits, MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use request_header::RequestHeader;
pub use response_header::ResponseHeader;
pub use trailer::Trailer;

pub(crate) use parse::find_headers_end;

/// Content-length descriptor of a chunked body.
pub const CONTENT_LENGTH_CHUNKED: i64 = -1;

/// Content-length descriptor of an identity body: read until close for responses,
/// no body for requests.
pub const CONTENT_LENGTH_IDENTITY: i64 = -2;

pub(crate) const DEFAULT_REQUEST_CONTENT_TYPE: &[u8] = b"application/x-www-form-urlencoded";
pub(crate) const DEFAULT_RESPONSE_CONTENT_TYPE: &[u8] = b"text/plain; charset=utf-8";

pub(crate) mod names {
    pub const HOST: &[u8] = b"Host";
    pub const CONTENT_TYPE: &[u8] = b"Content-Type";
    pub const CONTENT_LENGTH: &[u8] = b"Content-Length";
    pub const TRANSFER_ENCODING: &[u8] = b"Transfer-Encoding";
    pub const USER_AGENT: &[u8] = b"User-Agent";
    pub const SERVER: &[u8] = b"Server";
    pub const DATE: &[u8] = b"Date";
    pub const CONNECTION: &[u8] = b"Connection";
    pub const COOKIE: &[u8] = b"Cookie";
    pub const SET_COOKIE: &[u8] = b"Set-Cookie";
    pub const TRAILER: &[u8] = b"Trailer";
    pub const EXPECT: &[u8] = b"Expect";
    pub const AUTHORIZATION: &[u8] = b"Authorization";
    pub const PROXY_AUTHORIZATION: &[u8] = b"Proxy-Authorization";
}

#[inline]
pub(crate) fn key_is(key: &[u8], name: &[u8]) -> bool {
    key.eq_ignore_ascii_case(name)
}

#[inline]
pub(crate) fn non_empty(v: &[u8]) -> Option<&[u8]> {
    if v.is_empty() { None } else { Some(v) }
}

#[inline]
pub(crate) fn write_field(dst: &mut bytes::BytesMut, key: &[u8], value: &[u8]) {
    use bytes::BufMut;
    dst.put_slice(key);
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

/// Number of leading empty lines, which are skipped before a message starts.
pub(crate) fn leading_newlines(buf: &[u8]) -> usize {
    buf.iter().take_while(|b| **b == b'\r' || **b == b'\n').count()
}
