use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::header::RequestHeader;
use crate::protocol::{Message, PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes a request header followed by its payload items, the client side counterpart of
/// [`ResponseEncoder`](super::ResponseEncoder).
#[derive(Debug, Default)]
pub struct RequestEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, D: Buf> Encoder<Message<(&'a RequestHeader, PayloadSize), D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(&'a RequestHeader, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((header, payload_size)) => {
                if self.payload_encoder.as_ref().is_some_and(|encoder| !encoder.is_finish()) {
                    error!("expect payload item but receive request header");
                    return Err(SendError::invalid_body("previous request body is not finished"));
                }

                self.payload_encoder = Some(payload_size.into());
                self.header_encoder.encode(header, dst)
            }
            Message::Payload(payload_item) => Encoder::<PayloadItem<D>>::encode(self, payload_item, dst),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let Some(payload_encoder) = &mut self.payload_encoder else {
            error!("expect request header but receive payload item");
            return Err(SendError::invalid_body("payload without request header"));
        };

        let is_end = matches!(item, PayloadItem::Eof | PayloadItem::Trailers(_));
        let result = payload_encoder.encode(item, dst);
        if is_end || result.is_err() {
            self.payload_encoder.take();
        }
        result
    }
}
