use crate::protocol::header::{CONTENT_LENGTH_CHUNKED, CONTENT_LENGTH_IDENTITY, Trailer};
use bytes::{Buf, Bytes};

/// Represents a HTTP message that can either be a header or payload.
///
/// The generic parameter `T` is the header part (a request or response header, possibly
/// together with its [`PayloadSize`]), while `Data` is the type of the payload chunks.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data, the trailers or the EOF marker
    Payload(PayloadItem<Data>),
}

/// An item of a message payload stream, as produced by the payload decoders and accepted
/// by the payload encoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Trailer fields after the last chunk of a chunked payload, always followed by `Eof`
    /// when decoding. Encoders treat it as the end of the payload.
    Trailers(Trailer),
    /// Marks the end of the payload stream
    Eof,
}

/// The largest body read into memory in streaming mode when no body size limit is set.
pub const STREAM_THRESHOLD: usize = 8 * 1024;

/// How the payload of a message is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
    /// Payload delimited by the peer closing the connection
    UntilClose,
}

impl PayloadSize {
    /// Maps a content-length descriptor to a framing.
    ///
    /// `is_request` decides the meaning of an identity descriptor: requests without
    /// framing headers have no body, responses are read until close.
    pub fn from_content_length(content_length: i64, is_request: bool) -> Self {
        match content_length {
            0 => PayloadSize::Empty,
            CONTENT_LENGTH_CHUNKED => PayloadSize::Chunked,
            CONTENT_LENGTH_IDENTITY if is_request => PayloadSize::Empty,
            CONTENT_LENGTH_IDENTITY => PayloadSize::UntilClose,
            n => u64::try_from(n).map_or(PayloadSize::Empty, PayloadSize::Length),
        }
    }

    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// The exact payload length, when known up front.
    #[inline]
    pub fn length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(n) => Some(*n),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => None,
        }
    }

    /// Whether a body of this size must be streamed when at most `max_buffered` bytes may be
    /// held in memory. Zero picks [`STREAM_THRESHOLD`]. Bodies of unknown length always stream.
    pub fn needs_stream(&self, max_buffered: usize) -> bool {
        let max_buffered = if max_buffered == 0 { STREAM_THRESHOLD } else { max_buffered };
        match self {
            PayloadSize::Empty => false,
            PayloadSize::Length(n) => *n > max_buffered as u64,
            PayloadSize::Chunked | PayloadSize::UntilClose => true,
        }
    }
}

impl<T, D: Buf> Message<T, D> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains header information
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a PayloadItem if it contains payload data
    pub fn into_payload_item(self) -> Option<PayloadItem<D>> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns true if this item carries trailer fields
    #[inline]
    pub fn is_trailers(&self) -> bool {
        matches!(self, PayloadItem::Trailers(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_from_descriptor() {
        assert_eq!(PayloadSize::from_content_length(0, true), PayloadSize::Empty);
        assert_eq!(PayloadSize::from_content_length(12, false), PayloadSize::Length(12));
        assert_eq!(PayloadSize::from_content_length(CONTENT_LENGTH_CHUNKED, true), PayloadSize::Chunked);
        assert_eq!(PayloadSize::from_content_length(CONTENT_LENGTH_IDENTITY, true), PayloadSize::Empty);
        assert_eq!(PayloadSize::from_content_length(CONTENT_LENGTH_IDENTITY, false), PayloadSize::UntilClose);
    }

    #[test]
    fn stream_only_above_the_buffer_cap() {
        assert!(!PayloadSize::Empty.needs_stream(0));
        assert!(!PayloadSize::Length(2).needs_stream(1024));
        assert!(!PayloadSize::Length(1024).needs_stream(1024));
        assert!(PayloadSize::Length(1025).needs_stream(1024));
        assert!(!PayloadSize::Length(STREAM_THRESHOLD as u64).needs_stream(0));
        assert!(PayloadSize::Length(STREAM_THRESHOLD as u64 + 1).needs_stream(0));
        assert!(PayloadSize::Chunked.needs_stream(1024));
        assert!(PayloadSize::UntilClose.needs_stream(1024));
    }
}
