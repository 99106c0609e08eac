//! HTTP request decoder module
//!
//! This module decodes HTTP requests in a streaming fashion: a [`RequestHeaderDecoder`]
//! parses the header block, then a [`PayloadDecoder`] chosen from the header frames the body.
//!
//! # Example
//!
//! ```
//! use micro_wire::codec::RequestDecoder;
//! use micro_wire::protocol::Message;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
//! let message = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert!(message.is_header());
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::RequestHeaderDecoder;
use crate::protocol::header::{HeaderLimits, RequestHeader};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for HTTP requests that handles both headers and payload
///
/// # State Machine
///
/// The decoder maintains its state through the `payload_decoder` field:
/// - `None`: Currently parsing headers
/// - `Some(PayloadDecoder)`: Currently parsing payload
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: RequestHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: HeaderLimits) -> Self {
        Self { header_decoder: RequestHeaderDecoder::new(limits), payload_decoder: None }
    }

    pub fn disable_normalizing(&mut self) {
        self.header_decoder.disable_normalizing();
    }

    /// Whether a payload is being decoded, i.e. the last header's body isn't finished.
    pub fn in_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }

    fn decode_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(RequestHeader, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Eof) => {
                // no need payload decoder in this request now
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            Some(item) => Some(Message::Payload(item)),
            None => None,
        }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    /// Attempts to decode an HTTP request from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: Successfully decoded request headers
    /// - `Ok(Some(Message::Payload(_)))`: Successfully decoded a payload item
    /// - `Ok(None)`: Need more data to proceed
    /// - `Err(_)`: Encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.decode_payload(item));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.decode_payload(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            // blank lines between requests don't make a message
            None if src.iter().all(|b| *b == b'\r' || *b == b'\n') => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    #[test]
    fn pipelined_requests() {
        let str = indoc! {r"
        POST /submit HTTP/1.1
        Host: a
        Content-Length: 5

        helloGET /next HTTP/1.1
        Host: a

        "};
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(str);

        let Message::Header((header, size)) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected header");
        };
        assert_eq!(header.method(), &Method::POST);
        assert_eq!(size, PayloadSize::Length(5));
        assert!(decoder.in_payload());

        let chunk = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &b"hello"[..]);
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(!decoder.in_payload());

        let Message::Header((header, size)) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected header");
        };
        assert_eq!(header.request_uri(), b"/next");
        assert_eq!(size, PayloadSize::Empty);
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_with_trailers() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nTrailer: X-Sum\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n",
        );

        let Message::Header((header, size)) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected header");
        };
        assert!(size.is_chunked());
        assert_eq!(header.trailer().keys(), vec![&b"X-Sum"[..]]);

        let mut items = vec![];
        while let Some(message) = decoder.decode(&mut buf).unwrap() {
            let item = message.into_payload_item().unwrap();
            let eof = item.is_eof();
            items.push(item);
            if eof {
                break;
            }
        }
        assert_eq!(items.len(), 3);
        assert!(items[1].is_trailers());
    }

    #[test]
    fn eof_mid_message() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nHo");
        assert!(matches!(decoder.decode_eof(&mut buf), Err(ParseError::UnexpectedEof)));

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from("\r\n");
        assert!(decoder.decode_eof(&mut buf).unwrap().is_none());

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab");
        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert!(decoder.decode_eof(&mut buf).unwrap().unwrap().is_payload());
        assert!(matches!(decoder.decode_eof(&mut buf), Err(ParseError::UnexpectedEof)));
    }
}
