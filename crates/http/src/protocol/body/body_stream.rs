use crate::protocol::header::Trailer;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http_body::{Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::trace;

type ItemStream = Pin<Box<dyn Stream<Item = Result<PayloadItem, ParseError>> + Send>>;

/// A lazily pulled message body.
///
/// Wraps any stream of [`PayloadItem`]s: the server side request body channel, a pooled client
/// connection reading a response, or a user supplied stream. Trailers seen on the way are kept
/// and can be read once the stream reached its end.
pub struct BodyStream {
    inner: ItemStream,
    content_length: Option<u64>,
    trailer: Option<Trailer>,
    eof: bool,
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("content_length", &self.content_length)
            .field("trailer", &self.trailer)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl BodyStream {
    pub fn new<S>(stream: S, content_length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<PayloadItem, ParseError>> + Send + 'static,
    {
        Self { inner: Box::pin(stream), content_length, trailer: None, eof: false }
    }

    /// A body made of plain byte chunks, ending when `stream` ends.
    pub fn from_bytes_stream<S, E>(stream: S, content_length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<ParseError>,
    {
        let items = stream
            .map(|chunk| chunk.map(PayloadItem::Chunk).map_err(Into::into))
            .chain(futures::stream::once(async { Ok(PayloadItem::Eof) }));
        Self::new(items, content_length)
    }

    /// Adapts an [`http_body::Body`], turning its trailers frame into a [`Trailer`].
    pub fn from_http_body<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: fmt::Display,
    {
        let content_length = body.size_hint().exact();
        let frames = http_body_util::BodyStream::new(body).map(|frame| match frame {
            Ok(frame) => match frame.into_data() {
                Ok(data) => Ok(PayloadItem::Chunk(data)),
                Err(frame) => {
                    let mut trailer = Trailer::new();
                    if let Ok(map) = frame.into_trailers() {
                        trailer.extend_from_header_map(&map);
                    }
                    Ok(PayloadItem::Trailers(trailer))
                }
            },
            Err(e) => Err(ParseError::invalid_body(e.to_string())),
        });
        Self::new(frames.chain(futures::stream::once(async { Ok(PayloadItem::Eof) })), content_length)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The trailers received so far, complete once [`BodyStream::is_eof`] is true.
    pub fn trailer(&self) -> Option<&Trailer> {
        self.trailer.as_ref()
    }

    pub fn take_trailer(&mut self) -> Option<Trailer> {
        self.trailer.take()
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, ParseError>>> {
        loop {
            if self.eof {
                return Poll::Ready(None);
            }
            match ready!(self.inner.as_mut().poll_next(cx)) {
                Some(Ok(PayloadItem::Chunk(bytes))) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(bytes)));
                }
                Some(Ok(PayloadItem::Trailers(trailer))) => match &mut self.trailer {
                    Some(existing) => existing.merge(&trailer),
                    None => self.trailer = Some(trailer),
                },
                Some(Ok(PayloadItem::Eof)) => self.eof = true,
                Some(Err(e)) => {
                    self.eof = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    self.eof = true;
                    return Poll::Ready(Some(Err(ParseError::UnexpectedEof)));
                }
            }
        }
    }

    /// Reads the next data chunk, `None` once the body ended.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, ParseError>> {
        futures::future::poll_fn(|cx| self.poll_item(cx)).await
    }

    /// Appends the whole body to `dst`, failing once more than `max_size` bytes arrived.
    /// A `max_size` of zero means unlimited.
    pub async fn read_to_end(&mut self, max_size: usize, dst: &mut BytesMut) -> Result<usize, ParseError> {
        let mut total = 0;
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            total += chunk.len();
            if max_size > 0 && total > max_size {
                return Err(ParseError::too_large_body(total, max_size));
            }
            dst.extend_from_slice(&chunk);
        }
        Ok(total)
    }

    /// Discards the unread rest of the body, returning the number of skipped bytes.
    pub async fn skip_rest(&mut self) -> Result<usize, ParseError> {
        let mut skipped = 0;
        while let Some(chunk) = self.next_chunk().await {
            skipped += chunk?.len();
        }
        trace!(size = skipped, "skipped rest of body stream");
        Ok(skipped)
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, ParseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

impl http_body::Body for BodyStream {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(this.poll_item(cx)) {
            Some(Ok(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => match this.trailer.take() {
                Some(trailer) if !trailer.is_empty() => Poll::Ready(Some(Ok(Frame::trailers(trailer.to_header_map())))),
                _ => Poll::Ready(None),
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        self.eof && self.trailer.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        self.content_length.map_or_else(SizeHint::default, SizeHint::with_exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};

    fn items(items: Vec<PayloadItem>) -> BodyStream {
        BodyStream::new(futures::stream::iter(items.into_iter().map(Ok)), None)
    }

    #[tokio::test]
    async fn read_to_end_collects_chunks_and_trailers() {
        let mut trailer = Trailer::new();
        trailer.set(b"X-Sum", b"7").unwrap();
        let mut body = items(vec![
            PayloadItem::Chunk(Bytes::from_static(b"hello ")),
            PayloadItem::Chunk(Bytes::new()),
            PayloadItem::Chunk(Bytes::from_static(b"world")),
            PayloadItem::Trailers(trailer),
            PayloadItem::Eof,
        ]);

        let mut dst = BytesMut::new();
        assert_eq!(body.read_to_end(0, &mut dst).await.unwrap(), 11);
        assert_eq!(&dst[..], b"hello world");
        assert!(body.is_eof());
        assert_eq!(body.trailer().unwrap().peek(b"x-sum"), Some(&b"7"[..]));
    }

    #[tokio::test]
    async fn read_to_end_enforces_limit() {
        let mut body = items(vec![PayloadItem::Chunk(Bytes::from_static(b"0123456789")), PayloadItem::Eof]);
        let mut dst = BytesMut::new();
        let err = body.read_to_end(4, &mut dst).await.unwrap_err();
        assert!(err.is_too_large());
    }

    #[tokio::test]
    async fn missing_eof_is_truncation() {
        let mut body = items(vec![PayloadItem::Chunk(Bytes::from_static(b"abc"))]);
        assert_eq!(body.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(matches!(body.next_chunk().await, Some(Err(ParseError::UnexpectedEof))));
        assert!(body.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn http_body_round_trip() {
        let body = BodyStream::from_http_body(Full::new(Bytes::from_static(b"payload")));
        assert_eq!(body.content_length(), Some(7));
        let collected = BodyExt::collect(body).await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn trailers_become_frame() {
        let mut trailer = Trailer::new();
        trailer.set(b"Expires", b"never").unwrap();
        let body = items(vec![PayloadItem::Chunk(Bytes::from_static(b"a")), PayloadItem::Trailers(trailer), PayloadItem::Eof]);

        let collected = BodyExt::collect(body).await.unwrap();
        assert_eq!(collected.trailers().unwrap().get("expires").unwrap(), "never");
    }

    #[tokio::test]
    async fn skip_rest_counts() {
        let mut body = items(vec![
            PayloadItem::Chunk(Bytes::from_static(b"abc")),
            PayloadItem::Chunk(Bytes::from_static(b"de")),
            PayloadItem::Eof,
        ]);
        assert_eq!(body.skip_rest().await.unwrap(), 5);
        assert!(body.is_eof());
    }
}
