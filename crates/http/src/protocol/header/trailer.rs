//! Trailer fields carried after the terminating chunk of a chunked body.

use super::normalize::normalized_key;
use super::parse::split_comma;
use crate::ensure;
use crate::protocol::{Args, ParseError};
use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};

const MAX_TRAILER_NUM: usize = 32;

/// Keys a sender must never move into a trailer.
const FORBIDDEN_KEYS: [&[u8]; 20] = [
    b"Authorization",
    b"Cache-Control",
    b"Connection",
    b"Content-Encoding",
    b"Content-Length",
    b"Content-Range",
    b"Content-Type",
    b"Expect",
    b"Host",
    b"Keep-Alive",
    b"Max-Forwards",
    b"Pragma",
    b"Proxy-Authenticate",
    b"Proxy-Authorization",
    b"Proxy-Connection",
    b"Range",
    b"Te",
    b"Trailer",
    b"Transfer-Encoding",
    b"Www-Authenticate",
];

fn is_forbidden(key: &[u8]) -> bool {
    FORBIDDEN_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// The announced trailer keys of a message together with their values.
///
/// Keys announced through the `Trailer` header start with empty values; the body framer
/// or the user fills them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    h: Args,
    disable_normalizing: bool,
}

impl Default for Trailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trailer {
    pub fn new() -> Self {
        Self { h: Args::ignore_case(), disable_normalizing: false }
    }

    pub fn disable_normalizing(&mut self) {
        self.disable_normalizing = true;
    }

    pub fn reset(&mut self) {
        self.h.reset();
    }

    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    pub fn len(&self) -> usize {
        self.h.len()
    }

    /// Replaces the announced keys with the comma separated list in `value`.
    pub fn set_trailers(&mut self, value: &[u8]) -> Result<(), ParseError> {
        self.h.reset();
        self.add_trailers(value)
    }

    /// Announces additional keys from a comma separated list.
    pub fn add_trailers(&mut self, value: &[u8]) -> Result<(), ParseError> {
        for key in split_comma(value) {
            self.announce(key)?;
        }
        Ok(())
    }

    fn announce(&mut self, key: &[u8]) -> Result<(), ParseError> {
        ensure!(!is_forbidden(key), ParseError::invalid_trailer(format!("forbidden trailer key {}", String::from_utf8_lossy(key))));
        if !self.h.has(key) {
            let key = normalized_key(key, self.disable_normalizing);
            self.h.add(&key, b"");
        }
        Ok(())
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), ParseError> {
        ensure!(!is_forbidden(key), ParseError::invalid_trailer(format!("forbidden trailer key {}", String::from_utf8_lossy(key))));
        let key = normalized_key(key, self.disable_normalizing);
        self.h.set(&key, value);
        Ok(())
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), ParseError> {
        ensure!(!is_forbidden(key), ParseError::invalid_trailer(format!("forbidden trailer key {}", String::from_utf8_lossy(key))));
        let key = normalized_key(key, self.disable_normalizing);
        // fill an announced slot before adding a second value
        if self.h.peek(&key).is_some_and(<[u8]>::is_empty) {
            self.h.set(&key, value);
        } else {
            self.h.add(&key, value);
        }
        Ok(())
    }

    pub fn peek(&self, key: &[u8]) -> Option<&[u8]> {
        self.h.peek(key)
    }

    pub fn del(&mut self, key: &[u8]) {
        self.h.del(key);
    }

    pub fn keys(&self) -> Vec<&[u8]> {
        let mut keys: Vec<&[u8]> = Vec::with_capacity(self.h.len());
        for (k, _) in self.h.iter() {
            if !keys.iter().any(|seen| seen.eq_ignore_ascii_case(k)) {
                keys.push(k);
            }
        }
        keys
    }

    pub fn visit_all<F>(&self, f: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        self.h.visit_all(f);
    }

    /// The value announced in the `Trailer` header, e.g. `Expires, Checksum`.
    pub fn header_value(&self) -> Option<Vec<u8>> {
        if self.h.is_empty() {
            return None;
        }
        Some(self.keys().join(&b", "[..]))
    }

    /// Writes `key: value\r\n` for every key that carries a value.
    pub fn append_bytes(&self, dst: &mut BytesMut) {
        for (k, v) in self.h.iter() {
            if v.is_empty() {
                continue;
            }
            dst.put_slice(k);
            dst.put_slice(b": ");
            dst.put_slice(v);
            dst.put_slice(b"\r\n");
        }
    }

    /// Parses a trailer block terminated by an empty line and returns the bytes consumed.
    pub fn parse(&mut self, block: &[u8]) -> Result<usize, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];
        match httparse::parse_headers(block, &mut headers) {
            Ok(httparse::Status::Complete((consumed, fields))) => {
                for field in fields {
                    self.add(field.name.as_bytes(), field.value)?;
                }
                Ok(consumed)
            }
            Ok(httparse::Status::Partial) => Err(ParseError::invalid_trailer("incomplete trailer block")),
            Err(e) => Err(ParseError::invalid_trailer(e)),
        }
    }

    /// Copies every value of `other` into this trailer, announcing keys as needed.
    pub fn merge(&mut self, other: &Trailer) {
        for (k, v) in other.h.iter() {
            let key = normalized_key(k, self.disable_normalizing);
            if v.is_empty() {
                if !self.h.has(&key) {
                    self.h.add(&key, b"");
                }
            } else {
                self.h.set(&key, v);
            }
        }
    }

    /// Adds the fields of a foreign trailer map, skipping forbidden keys.
    pub fn extend_from_header_map(&mut self, map: &HeaderMap) {
        for (name, value) in map {
            if self.add(name.as_str().as_bytes(), value.as_bytes()).is_err() {
                tracing::warn!(name = %name, "drop forbidden trailer field");
            }
        }
    }

    /// Converts the valued entries into an [`http::HeaderMap`], dropping invalid names.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.h.len());
        for (k, v) in self.h.iter() {
            if v.is_empty() {
                continue;
            }
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k), HeaderValue::from_bytes(v)) {
                map.append(name, value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_and_fill() {
        let mut trailer = Trailer::new();
        trailer.set_trailers(b"expires, x-checksum").unwrap();
        assert_eq!(trailer.keys(), vec![&b"Expires"[..], &b"X-Checksum"[..]]);
        assert_eq!(trailer.header_value().unwrap(), b"Expires, X-Checksum");

        trailer.add(b"x-checksum", b"abc").unwrap();
        assert_eq!(trailer.len(), 2);
        assert_eq!(trailer.peek(b"X-Checksum"), Some(&b"abc"[..]));

        let mut out = BytesMut::new();
        trailer.append_bytes(&mut out);
        assert_eq!(&out[..], b"X-Checksum: abc\r\n");
    }

    #[test]
    fn forbidden_keys_rejected() {
        let mut trailer = Trailer::new();
        assert!(trailer.set_trailers(b"Content-Length").is_err());
        assert!(trailer.set(b"transfer-encoding", b"chunked").is_err());
        assert!(trailer.add(b"Host", b"a").is_err());
    }

    #[test]
    fn parse_block() {
        let mut trailer = Trailer::new();
        let consumed = trailer.parse(b"Expires: never\r\nX-Sum: 1\r\n\r\nrest").unwrap();
        assert_eq!(consumed, 28);
        assert_eq!(trailer.peek(b"expires"), Some(&b"never"[..]));
        assert_eq!(trailer.to_header_map().get("x-sum").unwrap(), "1");

        let mut empty = Trailer::new();
        assert_eq!(empty.parse(b"\r\n").unwrap(), 2);
        assert!(empty.is_empty());
    }
}
