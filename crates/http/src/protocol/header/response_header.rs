use super::cookie::set_cookie_name;
use super::parse::{
    check_header_size, find_headers_end, has_token, is_chunked, map_httparse_error, parse_content_length, unfold,
};
use super::{
    CONTENT_LENGTH_CHUNKED, CONTENT_LENGTH_IDENTITY, Cookie, DEFAULT_RESPONSE_CONTENT_TYPE, HeaderLimits, Trailer,
    key_is, leading_newlines, names, non_empty, normalized_key, write_field,
};
use crate::ensure;
use crate::protocol::{Args, ParseError};
use bytes::{BufMut, BytesMut};
use http::{StatusCode, Version};
use tracing::trace;

/// The header of an HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    disable_normalizing: bool,
    no_http11: bool,
    connection_close: bool,
    no_default_content_type: bool,
    no_default_date: bool,

    status_code: StatusCode,
    status_message: Vec<u8>,

    content_length: i64,
    content_length_bytes: Vec<u8>,

    content_type: Vec<u8>,
    server: Vec<u8>,
    date: Vec<u8>,

    trailer: Trailer,
    h: Args,
    // cookie name -> raw Set-Cookie value
    cookies: Args,
}

impl Default for ResponseHeader {
    fn default() -> Self {
        Self {
            disable_normalizing: false,
            no_http11: false,
            connection_close: false,
            no_default_content_type: false,
            no_default_date: false,
            status_code: StatusCode::OK,
            status_message: Vec::new(),
            content_length: 0,
            content_length_bytes: b"0".to_vec(),
            content_type: Vec::new(),
            server: Vec::new(),
            date: Vec::new(),
            trailer: Trailer::new(),
            h: Args::ignore_case(),
            cookies: Args::new(),
        }
    }
}

impl ResponseHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every field while keeping the allocated buffers.
    ///
    /// `no_default_date` and `disable_normalizing` are configuration and survive a reset.
    pub fn reset(&mut self) {
        self.no_http11 = false;
        self.connection_close = false;
        self.no_default_content_type = false;
        self.status_code = StatusCode::OK;
        self.status_message.clear();
        self.set_content_length(0);
        self.content_type.clear();
        self.server.clear();
        self.date.clear();
        self.trailer.reset();
        self.h.reset();
        self.cookies.reset();
    }

    pub fn disable_normalizing(&mut self) {
        self.disable_normalizing = true;
        self.trailer.disable_normalizing();
    }

    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn set_status_code(&mut self, status: StatusCode) {
        self.status_code = status;
    }

    /// The reason phrase: the custom one when set, else the canonical one.
    pub fn status_message(&self) -> &[u8] {
        if self.status_message.is_empty() {
            self.status_code.canonical_reason().unwrap_or("Unknown Status Code").as_bytes()
        } else {
            &self.status_message
        }
    }

    pub fn set_status_message(&mut self, message: impl AsRef<[u8]>) {
        self.status_message.clear();
        self.status_message.extend_from_slice(message.as_ref());
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

    /// Informational, `204 No Content` and `304 Not Modified` responses never carry a body.
    pub fn must_skip_body(&self) -> bool {
        self.status_code.is_informational()
            || self.status_code == StatusCode::NO_CONTENT
            || self.status_code == StatusCode::NOT_MODIFIED
    }

    pub fn content_type(&self) -> &[u8] {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: impl AsRef<[u8]>) {
        self.content_type.clear();
        self.content_type.extend_from_slice(content_type.as_ref());
    }

    pub fn set_no_default_content_type(&mut self, no_default: bool) {
        self.no_default_content_type = no_default;
    }

    pub fn server(&self) -> &[u8] {
        &self.server
    }

    pub fn set_server(&mut self, server: impl AsRef<[u8]>) {
        self.server.clear();
        self.server.extend_from_slice(server.as_ref());
    }

    pub fn date(&self) -> &[u8] {
        &self.date
    }

    pub fn set_date(&mut self, date: impl AsRef<[u8]>) {
        self.date.clear();
        self.date.extend_from_slice(date.as_ref());
    }

    /// Stops writing the `Date` field, even when a date was set.
    pub fn set_no_default_date(&mut self, no_default: bool) {
        self.no_default_date = no_default;
    }

    pub fn no_default_date(&self) -> bool {
        self.no_default_date
    }

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

    /// Adds or replaces the `Set-Cookie` field for `cookie.key`.
    pub fn set_cookie(&mut self, cookie: &Cookie) {
        self.cookies.set(&cookie.key, &cookie.to_bytes());
    }

    /// Parses the `Set-Cookie` field stored for `name`.
    pub fn cookie(&self, name: impl AsRef<[u8]>) -> Option<Cookie> {
        self.cookies.peek(name.as_ref()).and_then(|raw| Cookie::parse(raw).ok())
    }

    pub fn del_cookie(&mut self, name: impl AsRef<[u8]>) {
        self.cookies.del(name.as_ref());
    }

    pub fn del_all_cookies(&mut self) {
        self.cookies.reset();
    }

    /// Visits `(cookie name, raw Set-Cookie value)` pairs.
    pub fn visit_all_cookie<F>(&self, f: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        self.cookies.visit_all(f);
    }

    fn store_set_cookie(&mut self, value: &[u8]) {
        let name = set_cookie_name(value);
        if name.is_empty() {
            trace!("ignore set-cookie without cookie name");
            return;
        }
        let name = name.to_vec();
        self.cookies.set(&name, value);
    }

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
        } else if key_is(key, names::SERVER) {
            self.set_server(value);
        } else if key_is(key, names::DATE) {
            self.set_date(value);
        } else if key_is(key, names::CONNECTION) {
            if has_token(value, b"close") {
                self.connection_close = true;
            } else {
                self.connection_close = false;
                self.h.set(names::CONNECTION, value);
            }
        } else if key_is(key, names::SET_COOKIE) {
            self.store_set_cookie(value);
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

    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let key = normalized_key(key.as_ref(), self.disable_normalizing);
        let value = value.as_ref();
        match self.set_special_header(&key, value, false) {
            Ok(true) => {}
            Ok(false) => self.h.set(&key, value),
            Err(e) => trace!(cause = %e, "ignore invalid special header value"),
        }
    }

    pub fn add(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let key = normalized_key(key.as_ref(), self.disable_normalizing);
        let value = value.as_ref();
        match self.set_special_header(&key, value, true) {
            Ok(true) => {}
            Ok(false) => self.h.add(&key, value),
            Err(e) => trace!(cause = %e, "ignore invalid special header value"),
        }
    }

    /// Returns the first value of `key`. `Set-Cookie` values are read through
    /// [`Self::cookie`] and the `Trailer` field through [`Self::trailer`].
    pub fn peek(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        let key = key.as_ref();
        if key_is(key, names::CONTENT_TYPE) {
            non_empty(&self.content_type)
        } else if key_is(key, names::SERVER) {
            non_empty(&self.server)
        } else if key_is(key, names::DATE) {
            non_empty(&self.date)
        } else if key_is(key, names::CONTENT_LENGTH) {
            non_empty(&self.content_length_bytes)
        } else if key_is(key, names::TRANSFER_ENCODING) {
            (self.content_length == CONTENT_LENGTH_CHUNKED).then_some(&b"chunked"[..])
        } else if key_is(key, names::CONNECTION) {
            if self.connection_close { Some(&b"close"[..]) } else { self.h.peek(key) }
        } else {
            self.h.peek(key)
        }
    }

    pub fn peek_all(&self, key: impl AsRef<[u8]>) -> Vec<&[u8]> {
        let key = key.as_ref();
        if key_is(key, names::SET_COOKIE) {
            return self.cookies.iter().map(|(_, v)| v).collect();
        }
        match self.peek(key) {
            Some(v) if !self.h.has(key) || key_is(key, names::CONNECTION) => vec![v],
            _ => self.h.peek_all(key),
        }
    }

    pub fn has(&self, key: impl AsRef<[u8]>) -> bool {
        let key = key.as_ref();
        if key_is(key, names::SET_COOKIE) {
            return !self.cookies.is_empty();
        }
        self.peek(key).is_some()
    }

    pub fn del(&mut self, key: impl AsRef<[u8]>) {
        let key = key.as_ref();
        if key_is(key, names::CONTENT_TYPE) {
            self.content_type.clear();
        } else if key_is(key, names::SERVER) {
            self.server.clear();
        } else if key_is(key, names::DATE) {
            self.date.clear();
        } else if key_is(key, names::CONTENT_LENGTH) || key_is(key, names::TRANSFER_ENCODING) {
            self.set_content_length(0);
        } else if key_is(key, names::CONNECTION) {
            self.connection_close = false;
            self.h.del(key);
        } else if key_is(key, names::SET_COOKIE) {
            self.cookies.reset();
        } else if key_is(key, names::TRAILER) {
            self.trailer.reset();
        } else {
            self.h.del(key);
        }
    }

    pub fn len(&self) -> usize {
        let mut n = 0;
        self.visit_all(|_, _| n += 1);
        n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn effective_content_type(&self) -> &[u8] {
        if self.content_type.is_empty() && !self.no_default_content_type && !self.must_skip_body() {
            DEFAULT_RESPONSE_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }

    /// Visits every field in serialization order.
    pub fn visit_all<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        if !self.server.is_empty() {
            f(names::SERVER, &self.server);
        }
        if !self.no_default_date && !self.date.is_empty() {
            f(names::DATE, &self.date);
        }
        let content_type = self.effective_content_type();
        if !content_type.is_empty() {
            f(names::CONTENT_TYPE, content_type);
        }
        if !self.must_skip_body() {
            if self.content_length >= 0 {
                f(names::CONTENT_LENGTH, &self.content_length_bytes);
            } else if self.content_length == CONTENT_LENGTH_CHUNKED {
                f(names::TRANSFER_ENCODING, &b"chunked"[..]);
            }
        }
        self.h.visit_all(&mut f);
        if let Some(trailer) = self.trailer.header_value() {
            f(names::TRAILER, &trailer);
        }
        for (_, value) in self.cookies.iter() {
            f(names::SET_COOKIE, value);
        }
        if self.connection_close {
            f(names::CONNECTION, &b"close"[..]);
        }
    }

    /// Serializes the status line and header block, blank line included.
    pub fn append_bytes(&self, dst: &mut BytesMut) {
        dst.put_slice(if self.no_http11 { b"HTTP/1.0 " } else { b"HTTP/1.1 " });
        dst.put_slice(self.status_code.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.status_message());
        dst.put_slice(b"\r\n");

        self.visit_all(|k, v| write_field(dst, k, v));
        dst.put_slice(b"\r\n");
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(256);
        self.append_bytes(&mut dst);
        dst
    }

    pub fn parse(&mut self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        self.parse_with_limits(buf, &HeaderLimits::default())
    }

    /// Parses the status line and header block from `buf`.
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
        let mut resp = httparse::Response::new(&mut headers);
        if resp.parse(block).map_err(|e| map_httparse_error(e, limits))?.is_partial() {
            return Err(ParseError::invalid_header("incomplete response header"));
        }

        self.reset();
        self.no_http11 = match resp.version {
            Some(0) => true,
            Some(1) => false,
            v => return Err(ParseError::InvalidVersion(v)),
        };
        let code = resp.code.ok_or_else(|| ParseError::invalid_header("missing status code"))?;
        self.status_code =
            StatusCode::from_u16(code).map_err(|_| ParseError::invalid_header(format!("invalid status code {code}")))?;
        if let Some(reason) = resp.reason
            && Some(reason) != self.status_code.canonical_reason()
        {
            self.status_message.extend_from_slice(reason.as_bytes());
        }

        let mut chunked = false;
        let mut content_length: Option<i64> = None;
        let mut keep_alive = false;

        for field in resp.headers.iter() {
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
            } else if key_is(name, names::CONTENT_TYPE) {
                self.set_content_type(value);
            } else if key_is(name, names::SERVER) {
                self.set_server(value);
            } else if key_is(name, names::DATE) {
                self.set_date(value);
            } else if key_is(name, names::SET_COOKIE) {
                self.store_set_cookie(value);
            } else if key_is(name, names::TRAILER) {
                self.trailer.add_trailers(value)?;
            } else {
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
            (false, None) if self.must_skip_body() => 0,
            (false, None) => CONTENT_LENGTH_IDENTITY,
        };
        self.set_content_length(length);

        if self.no_http11 && !keep_alive {
            self.connection_close = true;
        }

        trace!(header_size = end, status = self.status_code.as_u16(), content_length = length, "parsed response header");
        Ok(Some(skip + end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn serialization_order() {
        let mut header = ResponseHeader::new();
        header.set("X-Request-Id", "7");
        header.set_server("micro-wire");
        header.set_date("Sun, 06 Nov 1994 08:49:37 GMT");
        header.set_content_length(2);
        header.set_cookie(&Cookie::new("a", "1"));
        header.set_cookie(&Cookie::new("b", "2"));
        header.set_connection_close(true);

        let expected = "HTTP/1.1 200 OK\r\n\
            Server: micro-wire\r\n\
            Date: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            Content-Length: 2\r\n\
            X-Request-Id: 7\r\n\
            Set-Cookie: a=1\r\n\
            Set-Cookie: b=2\r\n\
            Connection: close\r\n\r\n";
        assert_eq!(std::str::from_utf8(&header.to_bytes()).unwrap(), expected);

        header.set_no_default_date(true);
        assert!(!std::str::from_utf8(&header.to_bytes()).unwrap().contains("Date:"));
    }

    #[test]
    fn skip_body_statuses() {
        let mut header = ResponseHeader::new();
        header.set_status_code(StatusCode::NO_CONTENT);
        header.set_content_length(10);
        assert!(header.must_skip_body());
        assert_eq!(&header.to_bytes()[..], b"HTTP/1.1 204 No Content\r\n\r\n");

        header.set_status_code(StatusCode::NOT_MODIFIED);
        assert!(header.must_skip_body());
        header.set_status_code(StatusCode::CONTINUE);
        assert!(header.must_skip_body());
        header.set_status_code(StatusCode::NOT_FOUND);
        assert!(!header.must_skip_body());
    }

    #[test]
    fn set_cookie_keyed_by_name() {
        let mut header = ResponseHeader::new();
        header.add("set-cookie", "id=1; Path=/");
        header.add("Set-Cookie", "id=2; Path=/");
        header.add("Set-Cookie", "theme=dark");

        assert_eq!(header.peek_all("set-cookie"), vec![&b"id=2; Path=/"[..], &b"theme=dark"[..]]);
        let cookie = header.cookie("id").unwrap();
        assert_eq!(cookie.value, b"2");
        assert_eq!(cookie.path.as_deref(), Some(&b"/"[..]));

        header.del_cookie("id");
        assert!(header.cookie("id").is_none());
    }

    #[test]
    fn parse_upstream_response() {
        let str = indoc! {r##"
        HTTP/1.1 404 Not Here
        Server: nginx
        Content-Type: text/html
        Content-Length: 9
        Set-Cookie: s=1; HttpOnly
        X-Cache: MISS

        not found"##};

        let mut header = ResponseHeader::new();
        let consumed = header.parse(str.as_bytes()).unwrap().unwrap();
        assert_eq!(&str.as_bytes()[consumed..], b"not found");

        assert_eq!(header.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(header.status_message(), b"Not Here");
        assert_eq!(header.server(), b"nginx");
        assert_eq!(header.content_type(), b"text/html");
        assert_eq!(header.content_length(), 9);
        assert!(header.cookie("s").unwrap().http_only);
        assert_eq!(header.peek("x-cache"), Some(&b"MISS"[..]));
    }

    #[test]
    fn missing_length_reads_until_close() {
        let mut header = ResponseHeader::new();
        header.parse(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n").unwrap().unwrap();
        assert_eq!(header.content_length(), CONTENT_LENGTH_IDENTITY);

        header.parse(b"HTTP/1.1 304 Not Modified\r\nETag: x\r\n\r\n").unwrap().unwrap();
        assert_eq!(header.content_length(), 0);

        header.parse(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap().unwrap();
        assert_eq!(header.content_length(), CONTENT_LENGTH_CHUNKED);
        assert_eq!(header.peek("transfer-encoding"), Some(&b"chunked"[..]));
    }

    #[test]
    fn roundtrip() {
        let mut header = ResponseHeader::new();
        header.set_status_code(StatusCode::CREATED);
        header.set_server("s");
        header.set_content_type("application/json");
        header.set_content_length(CONTENT_LENGTH_CHUNKED);
        header.add("Vary", "Accept");
        header.add("Vary", "Cookie");
        header.trailer_mut().set_trailers(b"X-Checksum").unwrap();
        header.set_cookie(&Cookie::new("k", "v"));

        let bytes = header.to_bytes();
        let mut parsed = ResponseHeader::new();
        assert_eq!(parsed.parse(&bytes).unwrap(), Some(bytes.len()));
        assert_eq!(parsed.status_code(), StatusCode::CREATED);
        assert_eq!(parsed.content_length(), CONTENT_LENGTH_CHUNKED);
        assert_eq!(parsed.peek_all("vary"), vec![&b"Accept"[..], &b"Cookie"[..]]);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn invalid_status_line() {
        let mut header = ResponseHeader::new();
        assert!(header.parse(b"HTTP/2.0 200 OK\r\n\r\n").is_err());
        assert!(header.parse(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
    }
}
