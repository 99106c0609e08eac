//! Message body representations.
//!
//! - [`MessageBody`]: what a [`Request`](crate::protocol::Request) or
//!   [`Response`](crate::protocol::Response) holds, in memory or streamed
//! - [`BodyStream`]: a lazily pulled body, also usable as an `http_body::Body`
//!
//! On the server, a streamed request body is fed by a channel pair: the connection side
//! reads payload items only when the handler side asks for them, and skips whatever the
//! handler left unread once it returned.

mod body_channel;
mod body_stream;
mod message_body;

pub(crate) use body_channel::create_body_sender_receiver;
pub use body_stream::BodyStream;
pub use message_body::MessageBody;
