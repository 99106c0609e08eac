use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

/// Writes the payload unframed, for responses ended by closing the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityEncoder {
    eof: bool,
}

impl IdentityEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for IdentityEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) if !self.eof => {
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.put_slice(chunk);
                    bytes.advance(n);
                }
            }
            PayloadItem::Chunk(_) => {}
            PayloadItem::Trailers(_) | PayloadItem::Eof => self.eof = true,
        }
        Ok(())
    }
}
