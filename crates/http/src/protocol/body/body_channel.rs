//! Channel pair that streams a request body from the connection to the handler.
//!
//! The [`BodySender`] borrows the connection's message stream and only reads a payload item
//! when the [`BodyReceiver`] asks for one, so the body is pulled at the pace of the handler.
//! Once the receiver is gone or the handler returns, [`BodySender::skip_data`] drains what is
//! left so the next request starts byte-aligned.

use crate::protocol::{Message, ParseError, PayloadItem};
use futures::{Sink, SinkExt, Stream, StreamExt, channel::mpsc};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{error, trace};

pub(crate) fn create_body_sender_receiver<S, H>(body_stream: &mut S) -> (BodySender<'_, S>, BodyReceiver)
where
    S: Stream<Item = Result<Message<H>, ParseError>> + Unpin,
{
    let (signal_sender, signal_receiver) = mpsc::channel(8);
    let (data_sender, data_receiver) = mpsc::channel(8);

    (BodySender::new(body_stream, signal_receiver, data_sender), BodyReceiver::new(signal_sender, data_receiver))
}

#[derive(Debug)]
pub(crate) enum BodyRequestSignal {
    RequestData,
}

pub(crate) struct BodySender<'conn, S> {
    payload_stream: &'conn mut S,
    signal_receiver: mpsc::Receiver<BodyRequestSignal>,
    data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
}

impl<S> std::fmt::Debug for BodySender<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodySender").field("eof", &self.eof).finish_non_exhaustive()
    }
}

impl<'conn, S, H> BodySender<'conn, S>
where
    S: Stream<Item = Result<Message<H>, ParseError>> + Unpin,
{
    fn new(
        payload_stream: &'conn mut S,
        signal_receiver: mpsc::Receiver<BodyRequestSignal>,
        data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    ) -> Self {
        Self { payload_stream, signal_receiver, data_sender, eof: false }
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    /// Serves data requests until the body ends or the receiver goes away. Never returns
    /// before the body is fully consumed, so it is meant to race against the handler.
    pub(crate) async fn start(&mut self) -> Result<(), ParseError> {
        if self.eof {
            return Ok(());
        }

        while let Some(BodyRequestSignal::RequestData) = self.signal_receiver.next().await {
            match self.read_data().await {
                Ok(payload_item) => {
                    self.eof = payload_item.is_eof();
                    if let Err(e) = self.data_sender.send(Ok(payload_item)).await {
                        error!(cause = %e, "failed to send payload body through channel");
                        return Err(ParseError::invalid_body("send body data error"));
                    }

                    if self.eof {
                        return Ok(());
                    }
                }

                Err(e) => {
                    error!(cause = %e, "failed to read data from body stream");
                    let reason = e.to_string();
                    if let Err(send_error) = self.data_sender.send(Err(e)).await {
                        error!(cause = %send_error, "failed to send error through channel");
                    }
                    return Err(ParseError::invalid_body(reason));
                }
            }
        }

        self.skip_data().await.map(|_| ())
    }

    async fn read_data(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("should not receive header in BodySender");
                Err(ParseError::invalid_body("should not receive header in BodySender"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// Drains the unread rest of the body, returning the number of skipped bytes.
    pub(crate) async fn skip_data(&mut self) -> Result<usize, ParseError> {
        let mut skipped = 0;
        while !self.eof {
            match self.read_data().await? {
                PayloadItem::Eof => self.eof = true,
                PayloadItem::Chunk(bytes) => skipped += bytes.len(),
                PayloadItem::Trailers(_) => {}
            }
        }
        if skipped > 0 {
            trace!(size = skipped, "skip request body");
        }
        Ok(skipped)
    }
}

/// The handler side of the channel: a stream of payload items, ending after `Eof`.
#[derive(Debug)]
pub(crate) struct BodyReceiver {
    signal_sender: mpsc::Sender<BodyRequestSignal>,
    data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    in_flight: bool,
    done: bool,
}

impl BodyReceiver {
    fn new(
        signal_sender: mpsc::Sender<BodyRequestSignal>,
        data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    ) -> Self {
        Self { signal_sender, data_receiver, in_flight: false, done: false }
    }
}

impl Stream for BodyReceiver {
    type Item = Result<PayloadItem, ParseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if !this.in_flight {
            match Pin::new(&mut this.signal_sender).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if let Err(e) = Pin::new(&mut this.signal_sender).start_send(BodyRequestSignal::RequestData) {
                        error!(cause = %e, "failed to send request_more through channel");
                        this.done = true;
                        return Poll::Ready(Some(Err(ParseError::invalid_body("failed to request body data"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(e)) => {
                    error!(cause = %e, "failed to prepare request_more through channel");
                    this.done = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body("body sender is gone"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match this.data_receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(item))) => {
                this.in_flight = false;
                this.done = item.is_eof();
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.in_flight = false;
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.in_flight = false;
                this.done = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("body stream closed before eof"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadSize;
    use crate::protocol::header::{RequestHeader, Trailer};
    use bytes::Bytes;
    use futures::FutureExt;
    use futures::task::noop_waker_ref;

    #[tokio::test]
    async fn body_receiver_only_requests_once_until_response() {
        let (signal_sender, mut signal_receiver) = mpsc::channel(8);
        let (mut data_sender, data_receiver) = mpsc::channel(8);
        let mut body_receiver = BodyReceiver::new(signal_sender, data_receiver);

        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(matches!(Pin::new(&mut body_receiver).poll_next(&mut cx), Poll::Pending));
        assert!(matches!(signal_receiver.next().await, Some(BodyRequestSignal::RequestData)));

        assert!(matches!(Pin::new(&mut body_receiver).poll_next(&mut cx), Poll::Pending));
        assert!(signal_receiver.next().now_or_never().is_none());

        data_sender.try_send(Ok(PayloadItem::Chunk(Bytes::from_static(b"hello")))).expect("send chunk");

        match Pin::new(&mut body_receiver).poll_next(&mut cx) {
            Poll::Ready(Some(Ok(PayloadItem::Chunk(data)))) => assert_eq!(data, Bytes::from_static(b"hello")),
            other => panic!("unexpected poll result: {other:?}"),
        }

        assert!(matches!(Pin::new(&mut body_receiver).poll_next(&mut cx), Poll::Pending));
        assert!(matches!(signal_receiver.next().await, Some(BodyRequestSignal::RequestData)));

        data_sender.try_send(Ok(PayloadItem::Eof)).expect("send eof");

        assert!(matches!(Pin::new(&mut body_receiver).poll_next(&mut cx), Poll::Ready(Some(Ok(PayloadItem::Eof)))));
        assert!(matches!(Pin::new(&mut body_receiver).poll_next(&mut cx), Poll::Ready(None)));
    }

    type Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>;

    fn payload(items: Vec<PayloadItem>) -> futures::stream::Iter<std::vec::IntoIter<Item>> {
        futures::stream::iter(items.into_iter().map(|item| Ok(Message::Payload(item))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn sender_serves_receiver_then_skips() {
        let mut stream = payload(vec![
            PayloadItem::Chunk(Bytes::from_static(b"first")),
            PayloadItem::Chunk(Bytes::from_static(b"second")),
            PayloadItem::Eof,
        ]);
        let (mut sender, mut receiver) = create_body_sender_receiver(&mut stream);

        let read_one = async {
            let first = receiver.next().await.unwrap().unwrap();
            drop(receiver);
            first
        };
        let (sent, first) = tokio::join!(sender.start(), read_one);
        sent.unwrap();

        assert_eq!(first.as_bytes().unwrap(), &b"first"[..]);
        assert!(sender.is_eof());
    }

    #[tokio::test]
    async fn trailers_then_eof() {
        let mut trailer = Trailer::new();
        trailer.set(b"X-Sum", b"1").unwrap();
        let mut stream = payload(vec![
            PayloadItem::Chunk(Bytes::from_static(b"x")),
            PayloadItem::Trailers(trailer),
            PayloadItem::Eof,
        ]);
        let (mut sender, receiver) = create_body_sender_receiver(&mut stream);

        let (sent, items) = tokio::join!(sender.start(), receiver.collect::<Vec<_>>());
        sent.unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[1].as_ref().unwrap().is_trailers());
        assert!(items[2].as_ref().unwrap().is_eof());
    }

    #[tokio::test]
    async fn skip_without_reading() {
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"unread")), PayloadItem::Eof]);
        let (mut sender, _receiver) = create_body_sender_receiver(&mut stream);
        assert_eq!(sender.skip_data().await.unwrap(), 6);
        assert!(sender.is_eof());
    }
}
