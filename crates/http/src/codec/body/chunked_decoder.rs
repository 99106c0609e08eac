//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module decodes message bodies that use chunked transfer encoding as specified in
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1), including
//! the optional trailer section after the last chunk.

use crate::protocol::header::{MAX_HEADER_BYTES, Trailer, find_headers_end};
use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::{Body, BodyCr, BodyLf, End, Extension, Size, SizeLf, SizeLws, SizeStart, TrailerBlock};
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk is followed by an optional trailer block and a blank line
///
/// A non-empty trailer block is emitted as [`PayloadItem::Trailers`] right before
/// [`PayloadItem::Eof`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    max_trailer_bytes: usize,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// Creates a new ChunkedDecoder instance, ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self { state: SizeStart, remaining_size: 0, max_trailer_bytes: MAX_HEADER_BYTES }
    }

    /// Whether the terminating chunk and trailer block have been consumed.
    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    fn decode_trailer_block(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        let Some(end) = find_headers_end(src) else {
            if src.len() > self.max_trailer_bytes {
                return Err(ParseError::too_large_header(src.len(), self.max_trailer_bytes));
            }
            return Ok(None);
        };

        let block = src.split_to(end);
        self.state = End;

        if block[..] == b"\r\n"[..] || block[..] == b"\n"[..] {
            trace!("finished reading chunked data");
            return Ok(Some(PayloadItem::Eof));
        }

        let mut trailer = Trailer::new();
        trailer.parse(&block).map_err(ParseError::invalid_chunk)?;
        trace!(trailers = trailer.len(), "read chunked trailers");
        Ok(Some(PayloadItem::Trailers(trailer)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the first hex digit of the chunk size
    SizeStart,
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read the trailer section, terminated by a blank line
    TrailerBlock,
    /// The whole chunked payload has been read
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when chunk data is available
    /// - `Ok(Some(PayloadItem::Trailers(trailer)))` when a trailer block was read
    /// - `Ok(Some(PayloadItem::Eof))` when the final chunk is processed
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                End => return Ok(Some(PayloadItem::Eof)),
                TrailerBlock => return self.decode_trailer_block(src),
                _ => {}
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

type StepResult = Poll<Result<ChunkedState, ParseError>>;

impl ChunkedState {
    /// Processes the next step in the chunked decoding state machine.
    fn step(self, src: &mut BytesMut, remaining_size: &mut u64, buf: &mut Option<Bytes>) -> StepResult {
        match self {
            SizeStart => ChunkedState::read_size_start(src, remaining_size),
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, *remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            TrailerBlock | End => Poll::Ready(Ok(self)),
        }
    }

    /// A size line must start with at least one hex digit.
    fn read_size_start(src: &mut BytesMut, size_per_chunk: &mut u64) -> StepResult {
        match src.first() {
            None => Poll::Pending,
            Some(b) if b.is_ascii_hexdigit() => ChunkedState::read_size(src, size_per_chunk),
            Some(_) => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size line: missing size"))),
        }
    }

    /// Reads the chunk size in hexadecimal, digit by digit, until a delimiter.
    ///
    /// # State Transitions
    /// - On hex digit: stay in Size to read more digits
    /// - On whitespace (tab/space): SizeLws
    /// - On semicolon: Extension
    /// - On CR: SizeLf
    /// - On anything else: error
    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> StepResult {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size line: Invalid Size"))),
        };

        match size_per_chunk.checked_mul(16).and_then(|n| n.checked_add(u64::from(digit))) {
            Some(size) => *size_per_chunk = size,
            None => return Poll::Ready(Err(ParseError::invalid_chunk("invalid overflow chunked length"))),
        }

        Poll::Ready(Ok(Size))
    }

    /// Linear whitespace may follow the size, but no more digits can come.
    fn read_size_lws(src: &mut BytesMut) -> StepResult {
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size linear white space"))),
        }
    }

    /// Chunk extensions are ignored up to the next CRLF. A bare LF inside an extension is
    /// rejected.
    fn read_extension(src: &mut BytesMut) -> StepResult {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    /// After the size line: a zero size starts the trailer section, anything else the data.
    fn read_size_lf(src: &mut BytesMut, size_per_chunk: u64) -> StepResult {
        match try_next_byte!(src) {
            b'\n' if size_per_chunk == 0 => Poll::Ready(Ok(TrailerBlock)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk size LF"))),
        }
    }

    /// Reads up to the remaining chunk bytes available in `src`.
    fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, buf: &mut Option<Bytes>) -> StepResult {
        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let remaining = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let read_size = remaining.min(src.len());

        *size_per_chunk -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> StepResult {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body CR"))),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> StepResult {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(SizeStart)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("invalid chunk body LF"))),
        }
    }
}
