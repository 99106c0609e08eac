//! Cookie parsing and serialization for the `Cookie` and `Set-Cookie` fields.

use crate::protocol::{Args, ParseError};
use bytes::BufMut;

/// The `SameSite` attribute of a response cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            SameSite::Lax => b"Lax",
            SameSite::Strict => b"Strict",
            SameSite::None => b"None",
        }
    }
}

/// A response cookie as carried by one `Set-Cookie` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub path: Option<Vec<u8>>,
    pub domain: Option<Vec<u8>>,
    pub expires: Option<Vec<u8>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self { key: key.as_ref().to_vec(), value: value.as_ref().to_vec(), ..Self::default() }
    }

    pub fn append_bytes(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.key);
        dst.push(b'=');
        dst.extend_from_slice(&self.value);
        if let Some(path) = &self.path {
            dst.extend_from_slice(b"; path=");
            dst.extend_from_slice(path);
        }
        if let Some(domain) = &self.domain {
            dst.extend_from_slice(b"; domain=");
            dst.extend_from_slice(domain);
        }
        if let Some(expires) = &self.expires {
            dst.extend_from_slice(b"; expires=");
            dst.extend_from_slice(expires);
        }
        if let Some(max_age) = self.max_age {
            dst.extend_from_slice(b"; max-age=");
            dst.extend_from_slice(max_age.to_string().as_bytes());
        }
        if self.secure {
            dst.extend_from_slice(b"; secure");
        }
        if self.http_only {
            dst.extend_from_slice(b"; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            dst.extend_from_slice(b"; SameSite=");
            dst.extend_from_slice(same_site.as_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key.len() + self.value.len() + 16);
        self.append_bytes(&mut out);
        out
    }

    /// Parses a `Set-Cookie` value. Unknown attributes are ignored.
    pub fn parse(src: &[u8]) -> Result<Self, ParseError> {
        let mut parts = src.split(|b| *b == b';');
        let first = parts.next().unwrap_or_default();
        let (key, value) = split_pair(first);
        if key.is_empty() {
            return Err(ParseError::invalid_header("set-cookie without cookie name"));
        }

        let mut cookie = Cookie::new(key, value);
        for attr in parts {
            let (name, value) = split_pair(attr);
            if name.eq_ignore_ascii_case(b"path") {
                cookie.path = Some(value.to_vec());
            } else if name.eq_ignore_ascii_case(b"domain") {
                cookie.domain = Some(value.to_vec());
            } else if name.eq_ignore_ascii_case(b"expires") {
                cookie.expires = Some(value.to_vec());
            } else if name.eq_ignore_ascii_case(b"max-age") {
                cookie.max_age = std::str::from_utf8(value).ok().and_then(|v| v.parse().ok());
            } else if name.eq_ignore_ascii_case(b"secure") {
                cookie.secure = true;
            } else if name.eq_ignore_ascii_case(b"httponly") {
                cookie.http_only = true;
            } else if name.eq_ignore_ascii_case(b"samesite") {
                cookie.same_site = if value.eq_ignore_ascii_case(b"strict") {
                    Some(SameSite::Strict)
                } else if value.eq_ignore_ascii_case(b"none") {
                    Some(SameSite::None)
                } else {
                    Some(SameSite::Lax)
                };
            }
        }
        Ok(cookie)
    }
}

fn split_pair(src: &[u8]) -> (&[u8], &[u8]) {
    let src = src.trim_ascii();
    match src.iter().position(|b| *b == b'=') {
        Some(idx) => (src[..idx].trim_ascii(), src[idx + 1..].trim_ascii()),
        None => (src, &[]),
    }
}

/// Returns the cookie name of a raw `Set-Cookie` value.
pub(crate) fn set_cookie_name(value: &[u8]) -> &[u8] {
    let first = value.split(|b| *b == b';').next().unwrap_or_default();
    split_pair(first).0
}

/// Splits a request `Cookie` value (`a=1; b=2`) into `dst`.
pub(crate) fn parse_request_cookies(value: &[u8], dst: &mut Args) {
    for pair in value.split(|b| *b == b';') {
        let (key, value) = split_pair(pair);
        if key.is_empty() && value.is_empty() {
            continue;
        }
        dst.add(key, value);
    }
}

/// Writes the request cookies as a single `Cookie` value.
pub(crate) fn append_request_cookies<B: BufMut>(cookies: &Args, dst: &mut B) {
    for (idx, (key, value)) in cookies.iter().enumerate() {
        if idx > 0 {
            dst.put_slice(b"; ");
        }
        if !key.is_empty() {
            dst.put_slice(key);
            dst.put_u8(b'=');
        }
        dst.put_slice(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn request_cookies_roundtrip() {
        let mut args = Args::new();
        parse_request_cookies(b"session=abc; theme=dark;  lang = en ", &mut args);
        assert_eq!(args.len(), 3);
        assert_eq!(args.peek(b"lang"), Some(&b"en"[..]));

        let mut out = BytesMut::new();
        append_request_cookies(&args, &mut out);
        assert_eq!(&out[..], b"session=abc; theme=dark; lang=en");
    }

    #[test]
    fn set_cookie_parse() {
        let cookie = Cookie::parse(b"id=a3fWa; Max-Age=2592000; Path=/docs; Secure; HttpOnly; SameSite=Strict").unwrap();
        assert_eq!(cookie.key, b"id");
        assert_eq!(cookie.value, b"a3fWa");
        assert_eq!(cookie.max_age, Some(2_592_000));
        assert_eq!(cookie.path.as_deref(), Some(&b"/docs"[..]));
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site, Some(SameSite::Strict));

        assert_eq!(set_cookie_name(b"id=a3fWa; Path=/"), b"id");
        assert!(Cookie::parse(b"=nothing").is_err());
    }

    #[test]
    fn set_cookie_serialize() {
        let mut cookie = Cookie::new("token", "xyz");
        cookie.path = Some(b"/".to_vec());
        cookie.http_only = true;
        assert_eq!(cookie.to_bytes(), b"token=xyz; path=/; HttpOnly");
    }
}
