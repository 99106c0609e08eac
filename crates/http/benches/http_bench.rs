use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use futures::FutureExt;
use micro_wire::codec::{RequestDecoder, RequestEncoder, ResponseDecoder, ResponseEncoder};
use micro_wire::connection::HttpConnection;
use micro_wire::handler::make_handler;
use micro_wire::protocol::header::{RequestHeader, ResponseHeader};
use micro_wire::protocol::{Message, PayloadItem, PayloadSize, Request, Response};
use std::hint::black_box;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::codec::{Decoder, Encoder};

const SIMPLE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: bench\r\nAccept: */*\r\n\r\n";

// Mock IO for testing
#[derive(Clone)]
struct MockIO {
    read_data: Vec<u8>,
    read_pos: usize,
}

impl MockIO {
    fn new(read_data: Vec<u8>) -> Self {
        Self { read_data, read_pos: 0 }
    }
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let remaining = &self.read_data[self.read_pos..];
        let amt = std::cmp::min(remaining.len(), buf.remaining());
        buf.put_slice(&remaining[..amt]);
        self.read_pos += amt;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockIO {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

fn bench_request_decoder(c: &mut Criterion) {
    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(SIMPLE_REQUEST);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });

    let chunked = b"POST /upload HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n7\r\npedia i\r\nB\r\nn \r\nchunks.\r\n0\r\n\r\n";
    c.bench_function("decode_chunked_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(&chunked[..]);
            while let Some(message) = decoder.decode(&mut bytes).unwrap() {
                if matches!(message, Message::Payload(PayloadItem::Eof)) {
                    break;
                }
                black_box(message);
            }
        });
    });
}

fn bench_response_codec(c: &mut Criterion) {
    let mut header = ResponseHeader::new();
    header.set_content_type("text/plain");
    header.set_content_length(12);

    c.bench_function("encode_simple_response", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = BytesMut::new();
            encoder.encode(Message::<_, Bytes>::Header((&header, PayloadSize::Length(12))), &mut bytes).unwrap();
            encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"Hello World!")), &mut bytes).unwrap();
            black_box(bytes);
        });
    });

    let response = b"HTTP/1.1 200 OK\r\nServer: bench\r\nContent-Length: 12\r\n\r\nHello World!";
    c.bench_function("decode_simple_response", |b| {
        b.iter(|| {
            let mut decoder = ResponseDecoder::new();
            let mut bytes = BytesMut::from(&response[..]);
            black_box(decoder.decode(&mut bytes).unwrap());
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });
}

fn bench_request_encoder(c: &mut Criterion) {
    let mut header = RequestHeader::new();
    header.set_request_uri("/api/items?page=2");
    header.set_host("localhost");
    header.set_user_agent("bench");

    c.bench_function("encode_chunked_request", |b| {
        b.iter(|| {
            let mut encoder = RequestEncoder::new();
            let mut bytes = BytesMut::new();
            encoder.encode(Message::<_, Bytes>::Header((&header, PayloadSize::Chunked)), &mut bytes).unwrap();
            for _ in 0..4 {
                encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"0123456789abcdef")), &mut bytes).unwrap();
            }
            encoder.encode(PayloadItem::<Bytes>::Eof, &mut bytes).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_http_connection(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let handler = Arc::new(make_handler(|_req: &mut Request, resp: &mut Response| {
        async move {
            resp.set_body("Hello World!");
            Ok::<_, io::Error>(())
        }
        .boxed()
    }));

    c.bench_function("process_simple_request", |b| {
        b.to_async(&runtime).iter(|| {
            let handler = Arc::clone(&handler);
            async move {
                let mock_io = MockIO::new(SIMPLE_REQUEST.to_vec());
                let connection = HttpConnection::new(mock_io.clone(), mock_io);
                connection.process(handler).await.unwrap();
            }
        });
    });

    let pipelined = SIMPLE_REQUEST.repeat(16);
    c.bench_function("process_pipelined_requests", |b| {
        b.to_async(&runtime).iter(|| {
            let handler = Arc::clone(&handler);
            let pipelined = pipelined.clone();
            async move {
                let mock_io = MockIO::new(pipelined);
                let connection = HttpConnection::new(mock_io.clone(), mock_io);
                connection.process(handler).await.unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_codec, bench_request_encoder, bench_http_connection);
criterion_main!(benches);
