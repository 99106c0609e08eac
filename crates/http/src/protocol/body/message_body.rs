use super::BodyStream;
use crate::protocol::ParseError;
use crate::protocol::header::Trailer;
use bytes::{Bytes, BytesMut};
use tracing::trace;

#[derive(Debug, Default)]
enum BodyKind {
    #[default]
    Empty,
    Buffered,
    Raw(Bytes),
    Stream(BodyStream),
}

/// The body of a [`Request`](crate::protocol::Request) or [`Response`](crate::protocol::Response).
///
/// Holds exactly one representation at a time: nothing, an owned growable buffer, immutable
/// raw bytes, or a live stream. The owned buffer survives [`MessageBody::reset`] so a pooled
/// message reuses its allocation.
#[derive(Debug, Default)]
pub struct MessageBody {
    buffer: BytesMut,
    kind: BodyKind,
}

impl MessageBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// The in-memory body. Empty for a stream that was not read yet.
    pub fn bytes(&self) -> &[u8] {
        match &self.kind {
            BodyKind::Buffered => &self.buffer,
            BodyKind::Raw(raw) => raw,
            BodyKind::Empty | BodyKind::Stream(_) => &[],
        }
    }

    /// The in-memory body as shareable bytes; freezes a copy of the owned buffer.
    pub fn to_bytes(&self) -> Bytes {
        match &self.kind {
            BodyKind::Buffered => Bytes::copy_from_slice(&self.buffer),
            BodyKind::Raw(raw) => raw.clone(),
            BodyKind::Empty | BodyKind::Stream(_) => Bytes::new(),
        }
    }

    /// The immutable body, when it was set with [`MessageBody::set_raw`].
    pub(crate) fn raw(&self) -> Option<&Bytes> {
        match &self.kind {
            BodyKind::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    /// Replaces the body with immutable bytes, written without copying.
    pub fn set_raw(&mut self, body: impl Into<Bytes>) {
        self.release();
        let body = body.into();
        self.kind = if body.is_empty() { BodyKind::Empty } else { BodyKind::Raw(body) };
    }

    /// Replaces the body with a copy of `body` in the owned buffer.
    pub fn set_copy(&mut self, body: &[u8]) {
        self.release();
        self.buffer.extend_from_slice(body);
        self.kind = BodyKind::Buffered;
    }

    /// Appends to the owned buffer, first moving raw bytes into it.
    pub fn append(&mut self, data: &[u8]) {
        match std::mem::take(&mut self.kind) {
            BodyKind::Buffered => {}
            BodyKind::Raw(raw) => {
                self.buffer.clear();
                self.buffer.extend_from_slice(&raw);
            }
            BodyKind::Empty | BodyKind::Stream(_) => self.buffer.clear(),
        }
        self.buffer.extend_from_slice(data);
        self.kind = BodyKind::Buffered;
    }

    /// Gives mutable access to the owned buffer, switching to the buffered form.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        if !matches!(self.kind, BodyKind::Buffered) {
            let previous = std::mem::take(&mut self.kind);
            self.buffer.clear();
            if let BodyKind::Raw(raw) = previous {
                self.buffer.extend_from_slice(&raw);
            }
            self.kind = BodyKind::Buffered;
        }
        &mut self.buffer
    }

    pub fn set_stream(&mut self, stream: BodyStream) {
        self.release();
        self.kind = BodyKind::Stream(stream);
    }

    pub fn take_stream(&mut self) -> Option<BodyStream> {
        match std::mem::take(&mut self.kind) {
            BodyKind::Stream(stream) => Some(stream),
            other => {
                self.kind = other;
                None
            }
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, BodyKind::Stream(_))
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            BodyKind::Empty => true,
            BodyKind::Buffered => self.buffer.is_empty(),
            BodyKind::Raw(raw) => raw.is_empty(),
            BodyKind::Stream(stream) => stream.content_length() == Some(0),
        }
    }

    /// The body length if known without reading a stream.
    pub fn len(&self) -> Option<usize> {
        match &self.kind {
            BodyKind::Empty => Some(0),
            BodyKind::Buffered => Some(self.buffer.len()),
            BodyKind::Raw(raw) => Some(raw.len()),
            BodyKind::Stream(stream) => stream.content_length().and_then(|n| usize::try_from(n).ok()),
        }
    }

    /// Reads a stream body into the owned buffer, enforcing `max_size` (zero is unlimited).
    /// Returns the trailers the stream carried.
    pub async fn collect(&mut self, max_size: usize) -> Result<Option<Trailer>, ParseError> {
        let Some(mut stream) = self.take_stream() else {
            return Ok(None);
        };
        self.buffer.clear();
        self.kind = BodyKind::Buffered;
        let size = stream.read_to_end(max_size, &mut self.buffer).await?;
        trace!(size, "collected body stream");
        Ok(stream.take_trailer())
    }

    /// Empties the body. The owned buffer is kept unless its capacity exceeds `max_keep`
    /// (zero keeps any size).
    pub fn reset(&mut self, max_keep: usize) {
        self.kind = BodyKind::Empty;
        if max_keep > 0 && self.buffer.capacity() > max_keep {
            self.buffer = BytesMut::new();
        } else {
            self.buffer.clear();
        }
    }

    pub fn swap(&mut self, other: &mut MessageBody) {
        std::mem::swap(self, other);
    }

    fn release(&mut self) {
        self.kind = BodyKind::Empty;
        self.buffer.clear();
    }
}
