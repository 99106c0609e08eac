//! The HTTP message model.
//!
//! - [`header`]: byte-oriented [`RequestHeader`](header::RequestHeader) and
//!   [`ResponseHeader`](header::ResponseHeader) with special-field slots, trailers and cookies
//! - [`body`]: in-memory and streamed bodies
//! - [`Request`] and [`Response`]: header plus body with cached derived views
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`]: the items produced and consumed by the
//!   [`codec`](crate::codec) layer
//! - [`HttpError`], [`ParseError`] and [`SendError`]: the error taxonomy
//!
//! Headers, argument lists and body buffers reset by truncation, so a request or response
//! kept in an [`ObjectPool`] serves many exchanges without reallocating.

mod args;
pub use args::Args;

pub mod header;

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;
pub use message::STREAM_THRESHOLD;

mod request;
pub use request::Request;

mod response;
pub use response::Response;

mod multipart;
pub use multipart::{FormFile, MultipartForm};

mod pool;
pub use pool::{ObjectPool, PoolGuard, Reusable};

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
