//! HTTP header processing module for encoding and decoding headers
//!
//! # Components
//!
//! - [`RequestHeaderDecoder`] / [`ResponseHeaderDecoder`]: decode a header block from raw
//!   bytes, enforce the size limits and choose the payload framing
//! - [`HeaderEncoder`]: writes a header in its canonical serialization order

mod header_decoder;
mod header_encoder;

pub use header_decoder::{RequestHeaderDecoder, ResponseHeaderDecoder};
pub use header_encoder::HeaderEncoder;
