//! Payload framing for both directions.
//!
//! A [`PayloadDecoder`] or [`PayloadEncoder`] is picked per message from its
//! [`PayloadSize`](crate::protocol::PayloadSize):
//!
//! - `Length(n)`: [`LengthDecoder`] / [`LengthEncoder`], exactly `n` bytes
//! - `Chunked`: [`ChunkedDecoder`] / [`ChunkedEncoder`], hex sized chunks and an optional
//!   trailer block
//! - `UntilClose`: responses without framing, read until the peer closes
//! - `Empty`: no payload at all

mod chunked_decoder;
mod chunked_encoder;
mod identity_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
