use crate::codec::{RequestEncoder, ResponseEncoder};
use crate::protocol::body::MessageBody;
use crate::protocol::header::Trailer;
use crate::protocol::{Message, PayloadItem, PayloadSize, Request, Response, SendError};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

/// Immutable bodies of at least this size bypass the intermediate buffer.
pub const DIRECT_WRITE_THRESHOLD: usize = 16 * 1024;

/// Buffered bytes are pushed to the sink once they pass this size while streaming a body.
const STREAM_FLUSH_THRESHOLD: usize = 64 * 1024;

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// A buffered writer for one direction of an HTTP/1.1 connection.
///
/// Messages are encoded into a reusable buffer and only hit the sink on [`MessageWriter::flush`]
/// or when a large body is transferred directly with [`MessageWriter::write_direct`].
#[derive(Debug)]
pub struct MessageWriter<W, E> {
    writer: W,
    buffer: BytesMut,
    encoder: E,
}

impl<W, E> MessageWriter<W, E>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, encoder: E, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Bytes encoded but not yet written to the sink.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear_buf(&mut self) {
        self.buffer.clear();
    }

    /// Encodes `item` into the buffer.
    #[inline]
    pub fn write<I>(&mut self, item: I) -> Result<(), SendError>
    where
        E: Encoder<I, Error = SendError>,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    /// Writes the buffered bytes followed by `data` straight to the sink. `data` must already
    /// be framed for the wire. The sink is not flushed.
    pub async fn write_direct(&mut self, data: &[u8]) -> Result<(), SendError> {
        self.write_buffer().await?;
        self.writer.write_all(data).await?;
        Ok(())
    }

    async fn write_buffer(&mut self) -> Result<(), SendError> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Writes everything buffered and flushes the sink.
    #[inline]
    pub async fn flush(&mut self) -> Result<(), SendError> {
        self.write_buffer().await?;
        Ok(self.writer.flush().await?)
    }

    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        Ok(self.writer.shutdown().await?)
    }

    /// Encodes a header and its body, then flushes.
    async fn send_message<'h, H>(
        &mut self,
        header: &'h H,
        payload_size: PayloadSize,
        body: &mut MessageBody,
        trailer: &Trailer,
    ) -> Result<(), SendError>
    where
        E: Encoder<Message<(&'h H, PayloadSize)>, Error = SendError> + Encoder<PayloadItem, Error = SendError>,
    {
        if let PayloadSize::Length(length) = payload_size
            && let Some(raw) = body.raw()
            && raw.len() >= DIRECT_WRITE_THRESHOLD
            && raw.len() as u64 == length
        {
            let raw = raw.clone();
            // the header already announces the length, the payload skips the encoder
            self.write(Message::<_, Bytes>::Header((header, PayloadSize::Empty)))?;
            trace!(size = raw.len(), "write body directly");
            self.write_direct(&raw).await?;
            return self.flush().await;
        }

        self.write(Message::<_, Bytes>::Header((header, payload_size)))?;
        if !payload_size.is_empty() {
            self.write_payload(body, trailer).await?;
        }
        self.flush().await
    }

    async fn write_payload(&mut self, body: &mut MessageBody, trailer: &Trailer) -> Result<(), SendError>
    where
        E: Encoder<PayloadItem, Error = SendError>,
    {
        let mut trailer = (!trailer.is_empty()).then(|| trailer.clone());

        if let Some(mut stream) = body.take_stream() {
            while let Some(chunk) = stream.next_chunk().await {
                let chunk = chunk.map_err(|e| SendError::invalid_body(format!("read body stream error: {e}")))?;
                self.write(PayloadItem::Chunk(chunk))?;
                if self.buffer.len() >= STREAM_FLUSH_THRESHOLD {
                    self.write_buffer().await?;
                }
            }
            if let Some(stream_trailer) = stream.take_trailer() {
                trailer.get_or_insert_with(Trailer::new).merge(&stream_trailer);
            }
        } else {
            let data = body.to_bytes();
            if !data.is_empty() {
                self.write(PayloadItem::Chunk(data))?;
            }
        }

        match trailer {
            Some(trailer) => self.write(PayloadItem::Trailers(trailer)),
            None => self.write(PayloadItem::<Bytes>::Eof),
        }
    }
}

impl<W> MessageWriter<W, ResponseEncoder>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, ResponseEncoder::new(), DEFAULT_BUFFER_SIZE)
    }

    /// Writes `response` and flushes. With `skip_body` only the header goes out, announcing
    /// the length the body would have had.
    pub async fn write_response(&mut self, response: &mut Response, skip_body: bool) -> Result<(), SendError> {
        response.prepare_content_length();
        let (header, body) = response.split_mut();
        let payload_size = if skip_body || header.must_skip_body() {
            PayloadSize::Empty
        } else {
            PayloadSize::from_content_length(header.content_length(), true)
        };
        self.send_message(header, payload_size, body, header.trailer()).await
    }
}

impl<W> MessageWriter<W, RequestEncoder>
where
    W: AsyncWrite + Unpin,
{
    pub fn for_requests(writer: W) -> Self {
        Self::with_capacity(writer, RequestEncoder::new(), DEFAULT_BUFFER_SIZE)
    }

    /// Writes `request` and flushes.
    pub async fn write_request(&mut self, request: &mut Request) -> Result<(), SendError> {
        request.prepare_content_length();
        let (header, body) = request.split_mut();
        let payload_size = PayloadSize::from_content_length(header.content_length(), true);
        self.send_message(header, payload_size, body, header.trailer()).await
    }
}
