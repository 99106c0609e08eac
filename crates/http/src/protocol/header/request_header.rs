use super::cookie::{append_request_cookies, parse_request_cookies};
use super::parse::{
    check_header_size, find_headers_end, has_token, is_chunked, map_httparse_error, parse_content_length, unfold,
};
use super::{
    CONTENT_LENGTH_CHUNKED, CONTENT_LENGTH_IDENTITY, DEFAULT_REQUEST_CONTENT_TYPE, HeaderLimits, Trailer, key_is,
    leading_newlines, names, non_empty, normalized_key, write_field,
};
use crate::ensure;
use crate::protocol::{Args, ParseError};
use bytes::{BufMut, BytesMut};
use http::{Method, Version};
use tracing::trace;

/// The header of an HTTP request.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    disable_normalizing: bool,
    no_http11: bool,
    connection_close: bool,
    no_default_content_type: bool,
    cookies_collected: bool,

    content_length: i64,
    content_length_bytes: Vec<u8>,

    method: Method,
    request_uri: Vec<u8>,
    host: Vec<u8>,
    content_type: Vec<u8>,
    user_agent: Vec<u8>,

    trailer: Trailer,
    h: Args,
    cookies: Args,
    cookie_bytes: Vec<u8>,
}

impl Default for RequestHeader {
    fn default() -> Self {
        Self {
            disable_normalizing: false,
            no_http11: false,
            connection_close: false,
            no_default_content_type: false,
            cookies_collected: false,
            content_length: 0,
            content_length_bytes: b"0".to_vec(),
            method: Method::GET,
            request_uri: Vec::new(),
            host: Vec::new(),
            content_type: Vec::new(),
            user_agent: Vec::new(),
            trailer: Trailer::new(),
            h: Args::ignore_case(),
            cookies: Args::new(),
            cookie_bytes: Vec::new(),
        }
    }
}

impl RequestHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every field while keeping the allocated buffers.
    pub fn reset(&mut self) {
        self.no_http11 = false;
        self.connection_close = false;
        self.no_default_content_type = false;
        self.cookies_collected = false;
        self.set_content_length(0);
        self.method = Method::GET;
        self.request_uri.clear();
        self.host.clear();
        self.content_type.clear();
        self.user_agent.clear();
        self.trailer.reset();
        self.h.reset();
        self.cookies.reset();
        self.cookie_bytes.clear();
    }

    /// Stops canonicalizing header names set from now on.
    pub fn disable_normalizing(&mut self) {
        self.disable_normalizing = true;
        self.trailer.disable_normalizing();
    }

    pub fn is_disable_normalizing(&self) -> bool {
        self.disable_normalizing
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    #[inline]
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    #[inline]
    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    #[inline]
    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    /// The request target, `/` when unset.
    pub fn request_uri(&self) -> &[u8] {
        if self.request_uri.is_empty() { b"/" } else { &self.request_uri }
    }

    pub fn set_request_uri(&mut self, uri: impl AsRef<[u8]>) {
        self.request_uri.clear();
        self.request_uri.extend_from_slice(uri.as_ref());
    }

    pub fn version(&self) -> Version {
        if self.no_http11 { Version::HTTP_10 } else { Version::HTTP_11 }
    }

    pub fn set_version(&mut self, version: Version) {
        self.no_http11 = version == Version::HTTP_10;
    }

    #[inline]
    pub fn is_http11(&self) -> bool {
        !self.no_http11
    }

    pub fn host(&self) -> &[u8] {
        &self.host
    }

    pub fn set_host(&mut self, host: impl AsRef<[u8]>) {
        self.host.clear();
        self.host.extend_from_slice(host.as_ref());
    }

    pub fn content_type(&self) -> &[u8] {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: impl AsRef<[u8]>) {
        self.content_type.clear();
        self.content_type.extend_from_slice(content_type.as_ref());
    }

    /// Suppresses the default `Content-Type` written for requests with a body.
    pub fn set_no_default_content_type(&mut self, no_default: bool) {
        self.no_default_content_type = no_default;
    }

    pub fn user_agent(&self) -> &[u8] {
        &self.user_agent
    }

    pub fn set_user_agent(&mut self, user_agent: impl AsRef<[u8]>) {
        self.user_agent.clear();
        self.user_agent.extend_from_slice(user_agent.as_ref());
    }

    /// The content-length descriptor: `>= 0` fixed, [`CONTENT_LENGTH_CHUNKED`] or
    /// [`CONTENT_LENGTH_IDENTITY`].
    #[inline]
    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    pub fn set_content_length(&mut self, content_length: i64) {
        self.content_length = content_length;
        self.content_length_bytes.clear();
        if content_length >= 0 {
            self.content_length_bytes.extend_from_slice(content_length.to_string().as_bytes());
        }
    }

    #[inline]
    pub fn connection_close(&self) -> bool {
        self.connection_close
    }

    pub fn set_connection_close(&mut self, close: bool) {
        self.connection_close = close;
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Trailer {
        &mut self.trailer
    }

    /// Requests with these methods never carry a body.
    pub fn ignore_body(&self) -> bool {
        self.is_get() || self.is_head()
    }

    /// Whether the client asked for `Expect: 100-continue`.
    pub fn may_continue(&self) -> bool {
        self.h.peek(names::EXPECT).is_some_and(|v| v.eq_ignore_ascii_case(b"100-continue"))
    }

    /// The boundary parameter of a `multipart/form-data` content type.
    pub fn multipart_form_boundary(&self) -> Option<String> {
        let content_type = std::str::from_utf8(&self.content_type).ok()?;
        let mime: mime::Mime = content_type.parse().ok()?;
        if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
            return None;
        }
        mime.get_param(mime::BOUNDARY).map(|b| b.as_str().to_owned())
    }

    pub fn is_form_urlencoded(&self) -> bool {
        std::str::from_utf8(&self.content_type)
            .ok()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .is_some_and(|m| m.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
    }

    fn collect_cookies(&mut self) {
        if self.cookies_collected {
            return;
        }
        for value in self.h.peek_all(names::COOKIE) {
            parse_request_cookies(value, &mut self.cookies);
        }
        self.h.del(names::COOKIE);
        self.cookies_collected = true;
        self.render_cookies();
    }

    fn render_cookies(&mut self) {
        self.cookie_bytes.clear();
        append_request_cookies(&self.cookies, &mut self.cookie_bytes);
    }

    /// The value of the request cookie `key`.
    pub fn cookie(&mut self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        self.collect_cookies();
        self.cookies.peek(key.as_ref())
    }

    pub fn set_cookie(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.collect_cookies();
        self.cookies.set(key.as_ref(), value.as_ref());
        self.render_cookies();
    }

    pub fn del_cookie(&mut self, key: impl AsRef<[u8]>) {
        self.collect_cookies();
        self.cookies.del(key.as_ref());
        self.render_cookies();
    }

    pub fn del_all_cookies(&mut self) {
        self.collect_cookies();
        self.cookies.reset();
        self.cookie_bytes.clear();
    }

    pub fn visit_all_cookie<F>(&mut self, f: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        self.collect_cookies();
        self.cookies.visit_all(f);
    }

    /// Routes special fields to their slots. Returns `Ok(false)` for generic fields.
    fn set_special_header(&mut self, key: &[u8], value: &[u8], append: bool) -> Result<bool, ParseError> {
        if key_is(key, names::CONTENT_TYPE) {
            self.set_content_type(value);
        } else if key_is(key, names::CONTENT_LENGTH) {
            let length = parse_content_length(value)?;
            self.set_content_length(length);
        } else if key_is(key, names::TRANSFER_ENCODING) {
            if is_chunked(value) {
                self.set_content_length(CONTENT_LENGTH_CHUNKED);
            }
        } else if key_is(key, names::HOST) {
            self.set_host(value);
        } else if key_is(key, names::USER_AGENT) {
            self.set_user_agent(value);
        } else if key_is(key, names::CONNECTION) {
            if has_token(value, b"close") {
                self.connection_close = true;
            } else {
                self.connection_close = false;
                self.h.set(names::CONNECTION, value);
            }
        } else if key_is(key, names::COOKIE) {
            self.collect_cookies();
            if !append {
                self.cookies.reset();
            }
            parse_request_cookies(value, &mut self.cookies);
            self.render_cookies();
        } else if key_is(key, names::TRAILER) {
            if append {
                self.trailer.add_trailers(value)?;
            } else {
                self.trailer.set_trailers(value)?;
            }
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    /// Sets `key` to `value`, replacing previous values.
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let key = normalized_key(key.as_ref(), self.disable_normalizing);
        let value = value.as_ref();
        match self.set_special_header(&key, value, false) {
            Ok(true) => {}
            Ok(false) => self.h.set(&key, value),
            Err(e) => trace!(cause = %e, "ignore invalid special header value"),
        }
    }

    /// Appends `value` to `key`, keeping previous values of generic fields.
    pub fn add(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let key = normalized_key(key.as_ref(), self.disable_normalizing);
        let value = value.as_ref();
        match self.set_special_header(&key, value, true) {
            Ok(true) => {}
            Ok(false) => self.h.add(&key, value),
            Err(e) => trace!(cause = %e, "ignore invalid special header value"),
        }
    }

    /// Returns the first value of `key`. The `Trailer` field is read through [`Self::trailer`].
    pub fn peek(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let key = key.as_ref();
        if key_is(key, names::HOST) {
            non_empty(&self.host)
        } else if key_is(key, names::CONTENT_TYPE) {
            non_empty(&self.content_type)
        } else if key_is(key, names::USER_AGENT) {
            non_empty(&self.user_agent)
        } else if key_is(key, names::CONTENT_LENGTH) {
            non_empty(&self.content_length_bytes)
        } else if key_is(key, names::TRANSFER_ENCODING) {
            (self.content_length == CONTENT_LENGTH_CHUNKED).then_some(&b"chunked"[..])
        } else if key_is(key, names::CONNECTION) {
            if self.connection_close { Some(&b"close"[..]) } else { self.h.peek(key) }
        } else if key_is(key, names::COOKIE) && self.cookies_collected {
            non_empty(&self.cookie_bytes)
        } else {
            self.h.peek(key)
        }
    }

    pub fn peek_all(&self, key: impl AsRef<[u8]>) -> Vec<&[u8]> {
        let key = key.as_ref();
        if key_is(key, names::COOKIE) && !self.cookies_collected {
            return self.h.peek_all(key);
        }
        match self.peek(key) {
            Some(v) if !self.h.has(key) || key_is(key, names::CONNECTION) => vec![v],
            _ => self.h.peek_all(key),
        }
    }

    pub fn has(&self, key: impl AsRef<[u8]>) -> bool {
        self.peek(key).is_some()
    }

    pub fn del(&mut self, key: impl AsRef<[u8]>) {
        let key = key.as_ref();
        if key_is(key, names::HOST) {
            self.host.clear();
        } else if key_is(key, names::CONTENT_TYPE) {
            self.content_type.clear();
        } else if key_is(key, names::USER_AGENT) {
            self.user_agent.clear();
        } else if key_is(key, names::CONTENT_LENGTH) || key_is(key, names::TRANSFER_ENCODING) {
            self.set_content_length(0);
        } else if key_is(key, names::CONNECTION) {
            self.connection_close = false;
            self.h.del(key);
        } else if key_is(key, names::COOKIE) {
            self.cookies.reset();
            self.cookie_bytes.clear();
            self.h.del(key);
        } else if key_is(key, names::TRAILER) {
            self.trailer.reset();
        } else {
            self.h.del(key);
        }
    }

    /// Number of header fields that would be serialized.
    pub fn len(&self) -> usize {
        let mut n = 0;
        self.visit_all(|_, _| n += 1);
        n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn effective_content_type(&self) -> &[u8] {
        if self.content_type.is_empty() && !self.no_default_content_type && !self.ignore_body() {
            DEFAULT_REQUEST_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }

    fn writes_content_length(&self) -> bool {
        self.content_length > 0 || self.content_length == 0 && !self.ignore_body()
    }

    /// Visits every field in serialization order.
    pub fn visit_all<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        if !self.user_agent.is_empty() {
            f(names::USER_AGENT, &self.user_agent);
        }
        if !self.host.is_empty() {
            f(names::HOST, &self.host);
        }
        let content_type = self.effective_content_type();
        if !content_type.is_empty() {
            f(names::CONTENT_TYPE, content_type);
        }
        if self.writes_content_length() {
            f(names::CONTENT_LENGTH, &self.content_length_bytes);
        } else if self.content_length == CONTENT_LENGTH_CHUNKED {
            f(names::TRANSFER_ENCODING, &b"chunked"[..]);
        }
        self.h.visit_all(&mut f);
        if let Some(trailer) = self.trailer.header_value() {
            f(names::TRAILER, &trailer);
        }
        if self.cookies_collected && !self.cookie_bytes.is_empty() {
            f(names::COOKIE, &self.cookie_bytes);
        }
        if self.connection_close {
            f(names::CONNECTION, &b"close"[..]);
        }
    }

    /// Serializes the request line and header block, blank line included.
    pub fn append_bytes(&self, dst: &mut BytesMut) {
        dst.put_slice(self.method.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.request_uri());
        dst.put_slice(if self.no_http11 { b" HTTP/1.0\r\n" } else { b" HTTP/1.1\r\n" });

        self.visit_all(|k, v| write_field(dst, k, v));
        dst.put_slice(b"\r\n");
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(256);
        self.append_bytes(&mut dst);
        dst
    }

    /// Parses a request header with the default limits. See [`Self::parse_with_limits`].
    pub fn parse(&mut self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        self.parse_with_limits(buf, &HeaderLimits::default())
    }

    /// Parses the request line and header block from `buf`.
    ///
    /// Returns `Ok(None)` when the block is still incomplete, otherwise the number of bytes
    /// consumed including the terminating blank line.
    pub fn parse_with_limits(&mut self, buf: &[u8], limits: &HeaderLimits) -> Result<Option<usize>, ParseError> {
        let skip = leading_newlines(buf);
        let buf = &buf[skip..];

        let end = find_headers_end(buf);
        check_header_size(end, buf.len(), limits)?;
        let Some(end) = end else {
            return Ok(None);
        };

        let unfolded = unfold(&buf[..end]);
        let block = unfolded.as_deref().unwrap_or(&buf[..end]);

        let mut headers = vec![httparse::EMPTY_HEADER; limits.max_header_count];
        let mut req = httparse::Request::new(&mut headers);
        if req.parse(block).map_err(|e| map_httparse_error(e, limits))?.is_partial() {
            return Err(ParseError::invalid_header("incomplete request header"));
        }

        self.reset();
        self.method = Method::from_bytes(req.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
            .map_err(|_| ParseError::InvalidMethod)?;
        let path = req.path.ok_or(ParseError::InvalidUri)?;
        ensure!(!path.is_empty(), ParseError::InvalidUri);
        self.request_uri.extend_from_slice(path.as_bytes());
        self.no_http11 = match req.version {
            Some(0) => true,
            Some(1) => false,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let mut chunked = false;
        let mut content_length: Option<i64> = None;
        let mut keep_alive = false;

        for field in req.headers.iter() {
            let name = field.name.as_bytes();
            let value = field.value;
            if key_is(name, names::CONTENT_LENGTH) {
                let length = parse_content_length(value)?;
                if let Some(prev) = content_length {
                    ensure!(prev == length, ParseError::invalid_content_length("multiple different content-length values"));
                }
                content_length = Some(length);
            } else if key_is(name, names::TRANSFER_ENCODING) {
                chunked = chunked || is_chunked(value);
            } else if key_is(name, names::CONNECTION) {
                if has_token(value, b"close") {
                    self.connection_close = true;
                } else {
                    keep_alive = keep_alive || has_token(value, b"keep-alive");
                    self.h.add(names::CONNECTION, value);
                }
            } else if key_is(name, names::HOST) {
                self.set_host(value);
            } else if key_is(name, names::CONTENT_TYPE) {
                self.set_content_type(value);
            } else if key_is(name, names::USER_AGENT) {
                self.set_user_agent(value);
            } else if key_is(name, names::TRAILER) {
                self.trailer.add_trailers(value)?;
            } else {
                // cookies stay raw here and are collected on first access
                let key = normalized_key(name, self.disable_normalizing);
                self.h.add(&key, value);
            }
        }

        let length = match (chunked, content_length) {
            (true, Some(_)) => {
                return Err(ParseError::invalid_content_length(
                    "transfer_encoding and content_length both present in headers",
                ));
            }
            (true, None) => CONTENT_LENGTH_CHUNKED,
            (false, Some(n)) => n,
            (false, None) => CONTENT_LENGTH_IDENTITY,
        };
        self.set_content_length(length);

        if self.no_http11 && !keep_alive {
            self.connection_close = true;
        }

        trace!(header_size = end, content_length = length, "parsed request header");
        Ok(Some(skip + end))
    }
}
