// Response writer state machine: bit-exact HTTP/1.x serialization driven
// over the channel. Each operation assembles its framing bytes into an
// owned `scratch: Vec<u8>` once, then writes `scratch` plus a borrowed
// slice of the caller's message body in one scatter-gather write (no
// second copy of the body is made).

use futures::{Async, Future, Poll};

use crate::channel::IoPart;
use crate::error::Error;
use crate::message::Message;
use crate::proto::Proto;
use crate::serializer;

use tokio_io::{AsyncRead, AsyncWrite};

/// Where the egress side currently sits in one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressState {
    /// No response in flight, or the previous one finished cleanly.
    Empty,
    /// A `100 Continue` interim response has been sent; the final response
    /// still needs to be written.
    WroteContinue,
    /// A streamed (chunked) response's headers have been sent; zero or
    /// more chunks may follow before trailers/end.
    ChunkReady,
    /// A streamed response has been fully terminated. Terminal: this
    /// engine does not support starting another response after a
    /// streamed one on the same connection.
    End,
}

enum Phase {
    Init,
    Writing(Vec<u8>),
}

fn map_header_err(_: serializer::HeaderError) -> Error {
    Error::InvalidHeader
}

/// Future returned by [`Proto::write_response`].
pub struct WriteResponse<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    status: u16,
    reason: &'a str,
    msg: &'a Message,
    phase: Phase,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for WriteResponse<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if let Phase::Init = self.phase {
            match self.proto.egress_state {
                EgressState::Empty | EgressState::WroteContinue => {}
                _ => return Err(Error::OutOfOrder),
            }
            let mut scratch = Vec::new();
            serializer::write_status_line(&mut scratch, self.proto.flags.version(), self.status, self.reason);
            serializer::write_headers(&mut scratch, &self.msg.headers).map_err(map_header_err)?;
            serializer::write_content_length(&mut scratch, self.msg.body.len() as u64);
            serializer::end_headers(&mut scratch);
            self.phase = Phase::Writing(scratch);
        }
        let scratch = match &self.phase {
            Phase::Writing(s) => s,
            Phase::Init => unreachable!(),
        };
        let parts = [IoPart::Borrowed(scratch), IoPart::Borrowed(&self.msg.body)];
        match self.proto.channel.poll_write_all(&parts)? {
            Async::NotReady => Ok(Async::NotReady),
            Async::Ready(()) => {
                self.proto.egress_state = EgressState::Empty;
                Ok(Async::Ready(()))
            }
        }
    }
}

/// Future returned by [`Proto::write_continue`].
pub struct WriteContinue<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    scratch: Vec<u8>,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for WriteContinue<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if self.proto.egress_state != EgressState::Empty {
            return Err(Error::OutOfOrder);
        }
        let parts = [IoPart::Borrowed(&self.scratch)];
        match self.proto.channel.poll_write_all(&parts)? {
            Async::NotReady => Ok(Async::NotReady),
            Async::Ready(()) => {
                self.proto.egress_state = EgressState::WroteContinue;
                Ok(Async::Ready(()))
            }
        }
    }
}

/// Future returned by [`Proto::write_metadata`].
pub struct WriteMetadata<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    status: u16,
    reason: &'a str,
    msg: &'a Message,
    phase: Phase,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for WriteMetadata<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if let Phase::Init = self.phase {
            match self.proto.egress_state {
                EgressState::Empty | EgressState::WroteContinue => {}
                _ => return Err(Error::OutOfOrder),
            }
            if !self.proto.flags.http11 {
                debug!("refusing streamed response on an HTTP/1.0 connection");
                return Err(Error::NativeStreamUnsupported);
            }
            let mut scratch = Vec::new();
            serializer::write_status_line(&mut scratch, self.proto.flags.version(), self.status, self.reason);
            serializer::write_headers(&mut scratch, &self.msg.headers).map_err(map_header_err)?;
            serializer::write_chunked_header(&mut scratch);
            serializer::end_headers(&mut scratch);
            self.phase = Phase::Writing(scratch);
        }
        let scratch = match &self.phase {
            Phase::Writing(s) => s,
            Phase::Init => unreachable!(),
        };
        let parts = [IoPart::Borrowed(scratch)];
        match self.proto.channel.poll_write_all(&parts)? {
            Async::NotReady => Ok(Async::NotReady),
            Async::Ready(()) => {
                self.proto.egress_state = EgressState::ChunkReady;
                Ok(Async::Ready(()))
            }
        }
    }
}

/// Future returned by [`Proto::write`]. Writes one chunk framed around
/// `msg.body`; an empty body writes nothing and completes immediately
/// without touching the channel.
pub struct WriteChunk<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    msg: &'a Message,
    phase: Phase,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for WriteChunk<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if self.proto.egress_state != EgressState::ChunkReady {
            return Err(Error::OutOfOrder);
        }
        if self.msg.body.is_empty() {
            return Ok(Async::Ready(()));
        }
        if let Phase::Init = self.phase {
            let mut scratch = Vec::new();
            serializer::write_chunk_size(&mut scratch, self.msg.body.len());
            self.phase = Phase::Writing(scratch);
        }
        let scratch = match &self.phase {
            Phase::Writing(s) => s,
            Phase::Init => unreachable!(),
        };
        let parts = [
            IoPart::Borrowed(scratch),
            IoPart::Borrowed(&self.msg.body),
            IoPart::Borrowed(b"\r\n"),
        ];
        match self.proto.channel.poll_write_all(&parts)? {
            Async::NotReady => Ok(Async::NotReady),
            Async::Ready(()) => Ok(Async::Ready(())),
        }
    }
}

/// Future returned by [`Proto::write_trailers`].
pub struct WriteTrailers<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    msg: &'a Message,
    phase: Phase,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for WriteTrailers<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if let Phase::Init = self.phase {
            if self.proto.egress_state != EgressState::ChunkReady {
                return Err(Error::OutOfOrder);
            }
            let mut scratch = Vec::new();
            serializer::write_trailer_block(&mut scratch, &self.msg.trailers).map_err(map_header_err)?;
            self.phase = Phase::Writing(scratch);
        }
        let scratch = match &self.phase {
            Phase::Writing(s) => s,
            Phase::Init => unreachable!(),
        };
        let parts = [IoPart::Borrowed(scratch)];
        match self.proto.channel.poll_write_all(&parts)? {
            Async::NotReady => Ok(Async::NotReady),
            Async::Ready(()) => {
                self.proto.egress_state = EgressState::End;
                Ok(Async::Ready(()))
            }
        }
    }
}

/// Future returned by [`Proto::write_end`].
pub struct WriteEnd<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for WriteEnd<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if self.proto.egress_state != EgressState::ChunkReady {
            return Err(Error::OutOfOrder);
        }
        let parts = [IoPart::Borrowed(b"0\r\n\r\n")];
        match self.proto.channel.poll_write_all(&parts)? {
            Async::NotReady => Ok(Async::NotReady),
            Async::Ready(()) => {
                self.proto.egress_state = EgressState::End;
                Ok(Async::Ready(()))
            }
        }
    }
}

impl<'buf, S: AsyncRead + AsyncWrite> Proto<'buf, S> {
    /// Writes a complete, framed response: status line, headers, a
    /// generated `content-length`, then `msg.body` verbatim.
    pub fn write_response<'a>(
        &'a mut self,
        status: u16,
        reason: &'a str,
        msg: &'a Message,
    ) -> WriteResponse<'a, 'buf, S> {
        WriteResponse { proto: self, status, reason, msg, phase: Phase::Init }
    }

    /// Writes the `100 Continue` interim response.
    pub fn write_continue<'a>(&'a mut self) -> WriteContinue<'a, 'buf, S> {
        let mut scratch = Vec::new();
        serializer::write_continue_line(&mut scratch);
        WriteContinue { proto: self, scratch }
    }

    /// Starts a streamed (chunked) response: status line, headers, and
    /// `transfer-encoding: chunked`. Requires an HTTP/1.1 connection.
    pub fn write_metadata<'a>(
        &'a mut self,
        status: u16,
        reason: &'a str,
        msg: &'a Message,
    ) -> WriteMetadata<'a, 'buf, S> {
        WriteMetadata { proto: self, status, reason, msg, phase: Phase::Init }
    }

    /// Writes one chunk of a streamed response, taken from `msg.body`.
    pub fn write<'a>(&'a mut self, msg: &'a Message) -> WriteChunk<'a, 'buf, S> {
        WriteChunk { proto: self, msg, phase: Phase::Init }
    }

    /// Ends a streamed response with trailer headers taken from
    /// `msg.trailers`.
    pub fn write_trailers<'a>(&'a mut self, msg: &'a Message) -> WriteTrailers<'a, 'buf, S> {
        WriteTrailers { proto: self, msg, phase: Phase::Init }
    }

    /// Ends a streamed response with no trailers.
    pub fn write_end<'a>(&'a mut self) -> WriteEnd<'a, 'buf, S> {
        WriteEnd { proto: self }
    }
}

#[cfg(test)]
mod test {
    use futures::Future;

    use crate::channel::test_support::MockChannel;
    use crate::message::Message;
    use crate::proto::Proto;

    use super::EgressState;

    #[test]
    fn writes_framed_response() {
        let mut backing = vec![0u8; 256];
        let mut proto = Proto::new(MockChannel::new(b""), &mut backing).unwrap();
        proto.flags.http11 = true;
        let mut msg = Message::new();
        msg.body.extend_from_slice(b"hi");
        proto.write_response(200, "OK", &msg).wait().unwrap();
        assert_eq!(
            proto.channel_mut().output,
            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi".to_vec()
        );
        assert_eq!(proto.egress_state(), EgressState::Empty);
    }

    #[test]
    fn streamed_response_then_trailers() {
        let mut backing = vec![0u8; 256];
        let mut proto = Proto::new(MockChannel::new(b""), &mut backing).unwrap();
        proto.flags.http11 = true;
        let empty = Message::new();
        proto.write_metadata(200, "OK", &empty).wait().unwrap();
        assert_eq!(proto.egress_state(), EgressState::ChunkReady);

        let mut chunk = Message::new();
        chunk.body.extend_from_slice(b"abc");
        proto.write(&chunk).wait().unwrap();

        let mut trailers_msg = Message::new();
        trailers_msg.trailers.append("x-checksum", "deadbeef");
        proto.write_trailers(&trailers_msg).wait().unwrap();

        assert_eq!(
            proto.channel_mut().output,
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
              3\r\nabc\r\n0\r\nx-checksum: deadbeef\r\n\r\n".to_vec()
        );
        assert_eq!(proto.egress_state(), EgressState::End);
    }

    #[test]
    fn write_metadata_rejected_on_http10() {
        let mut backing = vec![0u8; 256];
        let mut proto = Proto::new(MockChannel::new(b""), &mut backing).unwrap();
        proto.flags.http11 = false;
        let empty = Message::new();
        let err = proto.write_metadata(200, "OK", &empty).wait().unwrap_err();
        assert!(matches!(err, crate::error::Error::NativeStreamUnsupported));
        assert_eq!(proto.egress_state(), EgressState::Empty);
    }

    #[test]
    fn empty_chunk_write_is_a_no_op() {
        let mut backing = vec![0u8; 256];
        let mut proto = Proto::new(MockChannel::new(b""), &mut backing).unwrap();
        proto.flags.http11 = true;
        let empty = Message::new();
        proto.write_metadata(200, "OK", &empty).wait().unwrap();
        proto.write(&empty).wait().unwrap();
        assert_eq!(
            proto.channel_mut().output,
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n".to_vec()
        );
    }
}
