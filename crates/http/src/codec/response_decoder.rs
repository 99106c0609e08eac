//! HTTP response decoder, the client side counterpart of [`RequestDecoder`](super::RequestDecoder).

use crate::codec::body::PayloadDecoder;
use crate::codec::header::ResponseHeaderDecoder;
use crate::protocol::header::{HeaderLimits, ResponseHeader};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for HTTP responses that handles both headers and payload.
///
/// Call [`ResponseDecoder::set_skip_body`] before reading the answer to a `HEAD` request:
/// such responses announce a length but carry no body.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    header_decoder: ResponseHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: HeaderLimits) -> Self {
        Self { header_decoder: ResponseHeaderDecoder::new(limits), payload_decoder: None }
    }

    pub fn disable_normalizing(&mut self) {
        self.header_decoder.disable_normalizing();
    }

    pub fn set_skip_body(&mut self, skip_body: bool) {
        self.header_decoder.set_skip_body(skip_body);
    }

    pub fn in_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }

    fn decode_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHeader, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            Some(item) => Some(Message::Payload(item)),
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHeader, PayloadSize)>;
    type Error = ParseError;

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
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}
