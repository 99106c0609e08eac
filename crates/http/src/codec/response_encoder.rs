use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::header::ResponseHeader;
use crate::protocol::{Message, PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes a response header followed by its payload items.
///
/// The header is borrowed: it stays owned by the [`Response`](crate::protocol::Response)
/// that is reset and reused for the next exchange.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, D: Buf> Encoder<Message<(&'a ResponseHeader, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(&'a ResponseHeader, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((header, payload_size)) => {
                if self.payload_encoder.as_ref().is_some_and(|encoder| !encoder.is_finish()) {
                    error!("expect payload item but receive response header");
                    return Err(SendError::invalid_body("previous response body is not finished"));
                }

                self.payload_encoder = Some(payload_size.into());
                self.header_encoder.encode(header, dst)
            }
            Message::Payload(payload_item) => Encoder::<PayloadItem<D>>::encode(self, payload_item, dst),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let Some(payload_encoder) = &mut self.payload_encoder else {
            error!("expect response header but receive payload item");
            return Err(SendError::invalid_body("payload without response header"));
        };

        let is_end = matches!(item, PayloadItem::Eof | PayloadItem::Trailers(_));
        let result = payload_encoder.encode(item, dst);
        if is_end || result.is_err() {
            self.payload_encoder.take();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;

    #[test]
    fn fixed_length_response() {
        let mut header = ResponseHeader::new();
        header.set_content_length(5);

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Message::<_, Bytes>::Header((&header, PayloadSize::Length(5))), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 5\r\n\r\nhello"[..]
        );
    }

    #[test]
    fn payload_before_header_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"x")), &mut dst).is_err());
    }

    #[test]
    fn unfinished_body_blocks_next_header() {
        let mut header = ResponseHeader::new();
        header.set_status_code(StatusCode::ACCEPTED);

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Message::<_, Bytes>::Header((&header, PayloadSize::Chunked)), &mut dst).unwrap();
        assert!(encoder.encode(Message::<_, Bytes>::Header((&header, PayloadSize::Empty)), &mut dst).is_err());
    }
}
