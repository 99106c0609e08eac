use crate::protocol::SendError;
use crate::protocol::header::{RequestHeader, ResponseHeader};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Serializes request and response headers, blank line included.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<&RequestHeader> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, header: &RequestHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        header.append_bytes(dst);
        Ok(())
    }
}

impl Encoder<&ResponseHeader> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, header: &ResponseHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        header.append_bytes(dst);
        Ok(())
    }
}
