use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Write;
use tokio_util::codec::Encoder;

/// Writes payload items as `<HEX>\r\n<data>\r\n` chunks, closed by `0\r\n<trailers>\r\n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(mut bytes) => {
                // a zero-size chunk would terminate the body
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(helper::Writer(dst), "{:X}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let len = chunk.len();
                    dst.put_slice(chunk);
                    bytes.advance(len);
                }
                dst.put_slice(b"\r\n");
            }
            PayloadItem::Trailers(trailer) => {
                self.eof = true;
                dst.put_slice(b"0\r\n");
                trailer.append_bytes(dst);
                dst.put_slice(b"\r\n");
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.put_slice(b"0\r\n\r\n");
            }
        }
        Ok(())
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::chunked_decoder::ChunkedDecoder;
    use crate::protocol::header::Trailer;
    use bytes::Bytes;
    use tokio_util::codec::Decoder;

    fn roundtrip(chunks: &[&'static [u8]]) -> Vec<u8> {
        let mut encoder = ChunkedEncoder::new();
        let mut wire = BytesMut::new();
        for chunk in chunks {
            encoder.encode(PayloadItem::Chunk(Bytes::from_static(chunk)), &mut wire).unwrap();
        }
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut wire).unwrap();
        assert!(encoder.is_finish());

        let mut decoder = ChunkedDecoder::new();
        let mut body = Vec::new();
        loop {
            match decoder.decode(&mut wire).unwrap().unwrap() {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Trailers(_) => {}
                PayloadItem::Eof => break,
            }
        }
        assert!(wire.is_empty());
        body
    }

    #[test]
    fn encode_chunks() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"Wikipedia in \r\n\r\nchunks.")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert_eq!(&dst[..], b"18\r\nWikipedia in \r\n\r\nchunks.\r\n0\r\n\r\n");

        // nothing is written after the terminating chunk
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();
        assert_eq!(dst.len(), 35);
    }

    #[test]
    fn roundtrip_bodies() {
        assert_eq!(roundtrip(&[]), b"");
        assert_eq!(roundtrip(&[b"x"]), b"x");
        assert_eq!(roundtrip(&[b"hello", b"", b", ", b"world"]), b"hello, world");
    }

    #[test]
    fn encode_trailers() {
        let mut trailer = Trailer::new();
        trailer.set(b"x-checksum", b"abc").unwrap();

        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"data")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Trailers(trailer), &mut dst).unwrap();
        assert_eq!(&dst[..], b"4\r\ndata\r\n0\r\nX-Checksum: abc\r\n\r\n");
    }
}
