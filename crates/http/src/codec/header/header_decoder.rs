//! Header decoders for both message directions.
//!
//! The decoders parse the request or status line and the header block out of the read
//! buffer with the byte-oriented header types, enforce the configured [`HeaderLimits`] and
//! pick the [`PayloadSize`] of the body that follows.
//!
//! Parsed bytes are split off the buffer; everything after the blank line stays in place for
//! the payload decoder.

use bytes::{Buf, BytesMut};
use http::StatusCode;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::header::{HeaderLimits, RequestHeader, ResponseHeader};
use crate::protocol::{ParseError, PayloadSize};

/// Decoder for HTTP request headers.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaderDecoder {
    limits: HeaderLimits,
    disable_normalizing: bool,
}

impl RequestHeaderDecoder {
    pub fn new(limits: HeaderLimits) -> Self {
        Self { limits, disable_normalizing: false }
    }

    pub fn disable_normalizing(&mut self) {
        self.disable_normalizing = true;
    }
}

impl Decoder for RequestHeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut header = RequestHeader::new();
        if self.disable_normalizing {
            header.disable_normalizing();
        }

        let Some(consumed) = header.parse_with_limits(src, &self.limits)? else {
            return Ok(None);
        };
        src.advance(consumed);

        let payload_size = PayloadSize::from_content_length(header.content_length(), true);
        trace!(method = %header.method(), ?payload_size, "decoded request header");
        Ok(Some((header, payload_size)))
    }
}

/// Decoder for HTTP response headers.
///
/// Interim `1xx` responses (other than `101 Switching Protocols`) are consumed and skipped.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaderDecoder {
    limits: HeaderLimits,
    disable_normalizing: bool,
    skip_body: bool,
}

impl ResponseHeaderDecoder {
    pub fn new(limits: HeaderLimits) -> Self {
        Self { limits, disable_normalizing: false, skip_body: false }
    }

    pub fn disable_normalizing(&mut self) {
        self.disable_normalizing = true;
    }

    /// The next response answers a request whose response body must be ignored, such as
    /// `HEAD`.
    pub fn set_skip_body(&mut self, skip_body: bool) {
        self.skip_body = skip_body;
    }
}

impl Decoder for ResponseHeaderDecoder {
    type Item = (ResponseHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let mut header = ResponseHeader::new();
            if self.disable_normalizing {
                header.disable_normalizing();
            }

            let Some(consumed) = header.parse_with_limits(src, &self.limits)? else {
                return Ok(None);
            };
            src.advance(consumed);

            let status = header.status_code();
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = status.as_u16(), "skip interim response");
                continue;
            }

            let payload_size = if self.skip_body || header.must_skip_body() {
                PayloadSize::Empty
            } else {
                PayloadSize::from_content_length(header.content_length(), false)
            };
            trace!(status = status.as_u16(), ?payload_size, "decoded response header");
            return Ok(Some((header, payload_size)));
        }
    }
}
