//! HTTP codec module for encoding and decoding HTTP messages
//!
//! This module provides [`tokio_util::codec`] implementations for both directions of an
//! HTTP/1.1 exchange. Each codec is a small state machine that alternates between a header
//! phase and a payload phase.
//!
//! # Architecture
//!
//! - Server side:
//!   - [`RequestDecoder`]: decodes incoming requests
//!   - [`ResponseEncoder`]: encodes outgoing responses
//! - Client side:
//!   - [`RequestEncoder`]: encodes outgoing requests
//!   - [`ResponseDecoder`]: decodes incoming responses, skipping interim `1xx` answers
//!
//! Header blocks are handled by the [`header`] codecs, bodies by the framers in [`body`]:
//! fixed length, chunked with trailers, and read-until-close for responses.
//!
//! # Example
//!
//! ```
//! use micro_wire::codec::{RequestDecoder, ResponseEncoder};
//! use micro_wire::protocol::header::ResponseHeader;
//! use micro_wire::protocol::{Message, PayloadItem, PayloadSize};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut decoder = RequestDecoder::new();
//! let mut request_buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: a\r\n\r\n");
//! assert!(decoder.decode(&mut request_buffer).unwrap().unwrap().is_header());
//!
//! let header = ResponseHeader::new();
//! let mut encoder = ResponseEncoder::new();
//! let mut response_buffer = BytesMut::new();
//! encoder.encode(Message::<_, Bytes>::Header((&header, PayloadSize::Empty)), &mut response_buffer).unwrap();
//! encoder.encode(PayloadItem::<Bytes>::Eof, &mut response_buffer).unwrap();
//! ```

pub mod body;
pub mod header;
mod request_decoder;
mod request_encoder;
mod response_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
