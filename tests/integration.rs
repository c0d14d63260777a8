//! End-to-end scenarios exercising the public surface of `h1engine`
//! against an in-memory duplex channel.

extern crate futures;
extern crate h1engine;
extern crate tokio_io;

use std::io;

use futures::{Async, Future, Poll};
use h1engine::{Error, EgressState, IngressState, Message, Proto};
use tokio_io::{AsyncRead, AsyncWrite};

/// An in-memory duplex channel: reads come from a fixed input buffer,
/// writes accumulate into a `Vec<u8>`.
struct MemoryChannel {
    input: io::Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl MemoryChannel {
    fn new(input: &[u8]) -> MemoryChannel {
        MemoryChannel { input: io::Cursor::new(input.to_vec()), output: Vec::new() }
    }
}

impl io::Read for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.input, buf)
    }
}

impl AsyncRead for MemoryChannel {}

impl io::Write for MemoryChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncWrite for MemoryChannel {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        Ok(Async::Ready(()))
    }
}

#[test]
fn simple_get_round_trip() {
    let mut backing = vec![0u8; 512];
    let input = b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n";
    let mut proto = Proto::new(MemoryChannel::new(input), &mut backing).unwrap();

    let mut method = String::new();
    let mut path = String::new();
    let mut msg = Message::new();
    proto.read_request(&mut method, &mut path, &mut msg).wait().unwrap();
    assert_eq!(method, "GET");
    assert_eq!(path, "/x");
    assert_eq!(msg.headers.get("host"), Some(b"h".as_ref()));
    proto.read_some_body(&mut msg).wait().unwrap();
    assert!(msg.body.is_empty());
    proto.read_trailers(&mut msg).wait().unwrap();
    assert_eq!(proto.ingress_state(), IngressState::Empty);

    let response = Message::new();
    proto.write_response(200, "OK", &response).wait().unwrap();
    assert_eq!(
        proto.channel_mut().output,
        b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n".to_vec()
    );
}

#[test]
fn post_with_body_then_empty_trailers() {
    let mut backing = vec![0u8; 512];
    let input = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    let mut proto = Proto::new(MemoryChannel::new(input), &mut backing).unwrap();

    let mut method = String::new();
    let mut path = String::new();
    let mut msg = Message::new();
    proto.read_request(&mut method, &mut path, &mut msg).wait().unwrap();
    assert_eq!(proto.ingress_state(), IngressState::MessageReady);

    proto.read_some_body(&mut msg).wait().unwrap();
    assert_eq!(msg.body, b"hello");
    assert_eq!(proto.ingress_state(), IngressState::BodyReady);

    proto.read_trailers(&mut msg).wait().unwrap();
    assert!(msg.trailers.is_empty());
    assert_eq!(proto.ingress_state(), IngressState::Empty);
}

#[test]
fn chunked_streamed_response_matches_wire_format() {
    // The engine only learns the connection's HTTP version from a parsed
    // request, so read one (with no body) before streaming a response.
    let input = b"GET / HTTP/1.1\r\n\r\n";
    let mut backing = vec![0u8; 512];
    let mut proto = Proto::new(MemoryChannel::new(input), &mut backing).unwrap();
    let mut msg = Message::new();
    proto.read_request(&mut String::new(), &mut String::new(), &mut msg).wait().unwrap();
    proto.read_some_body(&mut msg).wait().unwrap();
    proto.read_trailers(&mut msg).wait().unwrap();

    let mut head = Message::new();
    head.headers.append("x", "1");
    proto.write_metadata(200, "OK", &head).wait().unwrap();
    assert_eq!(proto.egress_state(), EgressState::ChunkReady);

    let mut chunk1 = Message::new();
    chunk1.body.extend_from_slice(b"abc");
    proto.write(&chunk1).wait().unwrap();

    let mut chunk2 = Message::new();
    chunk2.body.extend_from_slice(b"de");
    proto.write(&chunk2).wait().unwrap();

    proto.write_end().wait().unwrap();
    assert_eq!(proto.egress_state(), EgressState::End);

    assert_eq!(
        proto.channel_mut().output,
        b"HTTP/1.1 200 OK\r\nx: 1\r\ntransfer-encoding: chunked\r\n\r\n\
          3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n".to_vec()
    );
}

#[test]
fn continue_then_final_response_then_out_of_order_end() {
    let mut backing = vec![0u8; 512];
    let mut proto = Proto::new(MemoryChannel::new(b""), &mut backing).unwrap();

    proto.write_continue().wait().unwrap();
    assert_eq!(proto.egress_state(), EgressState::WroteContinue);

    let mut msg = Message::new();
    proto.write_response(204, "No Content", &msg).wait().unwrap();
    assert_eq!(proto.egress_state(), EgressState::Empty);

    assert_eq!(
        proto.channel_mut().output,
        b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n".to_vec()
    );

    msg.body.clear();
    let err = proto.write_end().wait().unwrap_err();
    assert!(matches!(err, Error::OutOfOrder));
}

#[test]
fn unsupported_http_version_yields_505_and_closes() {
    let mut backing = vec![0u8; 512];
    let input = b"GET / HTTP/2.0\r\n\r\n";
    let mut proto = Proto::new(MemoryChannel::new(input), &mut backing).unwrap();

    let mut method = String::new();
    let mut path = String::new();
    let mut msg = Message::new();
    let err = proto.read_request(&mut method, &mut path, &mut msg).wait().unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
    assert!(proto.channel_mut().output.starts_with(b"HTTP/1.1 505"));
    assert!(proto.channel_mut().output.ends_with(
        b"This server only supports HTTP/1.0 and HTTP/1.1\n"
    ));
}

#[test]
fn buffer_exhaustion_on_oversized_header_line() {
    let mut backing = vec![0u8; 32];
    let input = vec![b'a'; 200];
    let mut proto = Proto::new(MemoryChannel::new(&input), &mut backing).unwrap();

    let mut method = String::new();
    let mut path = String::new();
    let mut msg = Message::new();
    let err = proto.read_request(&mut method, &mut path, &mut msg).wait().unwrap_err();
    assert!(matches!(err, Error::BufferExhausted));
    assert!(proto.channel_mut().output.is_empty());
}

#[test]
fn streamed_start_rejected_on_http10() {
    let mut backing = vec![0u8; 512];
    let input = b"GET / HTTP/1.0\r\n\r\n";
    let mut proto = Proto::new(MemoryChannel::new(input), &mut backing).unwrap();
    let mut msg = Message::new();
    proto.read_request(&mut String::new(), &mut String::new(), &mut msg).wait().unwrap();
    proto.read_some_body(&mut msg).wait().unwrap();
    proto.read_trailers(&mut msg).wait().unwrap();

    let head = Message::new();
    let err = proto.write_metadata(200, "OK", &head).wait().unwrap_err();
    assert!(matches!(err, Error::NativeStreamUnsupported));
    assert_eq!(proto.egress_state(), EgressState::Empty);

    // The engine is still usable afterwards.
    let resp = Message::new();
    proto.write_response(200, "OK", &resp).wait().unwrap();
}

#[test]
fn upgrade_halts_further_request_parsing() {
    let mut backing = vec![0u8; 512];
    let input = b"GET /ws HTTP/1.1\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\r\n\
                  OPAQUE-FRAME-BYTES";
    let mut proto = Proto::new(MemoryChannel::new(input), &mut backing).unwrap();
    let mut msg = Message::new();
    proto.read_request(&mut String::new(), &mut String::new(), &mut msg).wait().unwrap();
    proto.read_some_body(&mut msg).wait().unwrap();
    proto.read_trailers(&mut msg).wait().unwrap();

    assert!(proto.is_upgrade());
    // Bytes past the request's header block belong to the upgraded
    // protocol and must sit untouched, not be swallowed as a new request.
    assert_eq!(proto.buffered(), b"OPAQUE-FRAME-BYTES");

    let err = proto.read_request(&mut String::new(), &mut String::new(), &mut msg).wait().unwrap_err();
    assert!(matches!(err, Error::OutOfOrder));
    // Still untouched after the refused attempt.
    assert_eq!(proto.buffered(), b"OPAQUE-FRAME-BYTES");
}

#[test]
fn zero_sized_buffer_fails_construction() {
    let mut backing: Vec<u8> = Vec::new();
    let err = Proto::new(MemoryChannel::new(b""), &mut backing).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument));
}
