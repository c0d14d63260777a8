//! The `IngressEngine`: the incremental HTTP/1.x request parser driver.
//!
//! Built on `httparse` rather than a byte-at-a-time callback parser, but
//! aiming at the same observable events a classic push parser would raise:
//! a message-begin reset, header field/value commits in wire order, a
//! headers-complete point where method/version/framing are fixed, body
//! bytes as they become available, and a message-complete point where
//! trailers (if any) land. Each `httparse::Request::parse` call just
//! replays that event sequence in one shot instead of one callback per
//! byte.

use futures::{Async, Future, Poll};
use httparse;
use tokio_io::{AsyncRead, AsyncWrite};

use crate::channel::IoPart;
use crate::chunked;
use crate::error::Error;
use crate::message::Message;
use crate::method;
use crate::proto::Proto;
use crate::serializer;

/// Where the ingress side currently sits in one request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressState {
    /// No request in flight; ready to parse the next start line.
    Empty,
    /// Start line and headers parsed; body may remain to be read.
    MessageReady,
    /// Body fully delivered; trailers (possibly empty) remain to be read.
    BodyReady,
}

const READY: u8 = 0b001;
const DATA: u8 = 0b010;
const END: u8 = 0b100;

#[derive(Debug, Clone, Copy, Default)]
struct ReadyFlags(u8);

impl ReadyFlags {
    fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }
    fn clear(&mut self, bit: u8) {
        self.0 &= !bit;
    }
    fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

#[derive(Debug, Clone, Copy)]
enum BodyKind {
    Fixed(u64),
    Chunked,
}

/// Persistent ingress state, carried across operations on the same
/// connection.
pub struct IngressEngine {
    pub(crate) state: IngressState,
    flags: ReadyFlags,
    body_kind: Option<BodyKind>,
    remaining: u64,
    chunk: chunked::State,
    pub(crate) upgrade: bool,
}

impl IngressEngine {
    pub fn new() -> IngressEngine {
        IngressEngine {
            state: IngressState::Empty,
            flags: ReadyFlags::default(),
            body_kind: None,
            remaining: 0,
            chunk: chunked::State::new(),
            upgrade: false,
        }
    }

    fn reset_for_next_message(&mut self) {
        self.state = IngressState::Empty;
        self.flags = ReadyFlags::default();
        self.body_kind = None;
        self.remaining = 0;
        self.chunk = chunked::State::new();
        self.upgrade = false;
    }
}

const MIN_HEADERS: usize = 16;
const MAX_HEADERS: usize = 256;

fn push_headers(dst: &mut Message, use_trailers: bool, raw: &[httparse::Header]) {
    let target = if use_trailers { &mut dst.trailers } else { &mut dst.headers };
    for h in raw {
        target.append(h.name.to_ascii_lowercase(), h.value.to_vec());
    }
}

/// The standard `should_keep_alive` rule: HTTP/1.1 connections stay open
/// unless told `Connection: close`; HTTP/1.0 connections close unless told
/// `Connection: keep-alive`.
fn should_keep_alive(http11: bool, connection_header: Option<&[u8]>) -> bool {
    let says = |needle: &str| {
        connection_header
            .map(|v| {
                String::from_utf8_lossy(v)
                    .split(',')
                    .any(|tok| tok.trim().eq_ignore_ascii_case(needle))
            })
            .unwrap_or(false)
    };
    if http11 {
        !says("close")
    } else {
        says("keep-alive")
    }
}

fn has_upgrade(connection_header: Option<&[u8]>, upgrade_header: Option<&[u8]>) -> bool {
    upgrade_header.is_some()
        && connection_header
            .map(|v| {
                String::from_utf8_lossy(v)
                    .split(',')
                    .any(|tok| tok.trim().eq_ignore_ascii_case("upgrade"))
            })
            .unwrap_or(false)
}

/// RFC 7230 §3.3.3 body-length precedence: a `Transfer-Encoding` ending in
/// `chunked` wins outright; otherwise a single, valid `Content-Length`
/// applies; otherwise the request has no body.
fn framing_from_headers(msg: &Message) -> Result<(BodyKind, bool /* force close */), Error> {
    if let Some(te) = msg.headers.get("transfer-encoding") {
        let te = String::from_utf8_lossy(te);
        let last = te.split(',').last().map(|s| s.trim().to_ascii_lowercase());
        if last.as_deref() == Some("chunked") {
            return Ok((BodyKind::Chunked, false));
        }
        return Err(Error::MalformedRequest(
            "unsupported transfer-encoding".into(),
        ));
    }
    let mut lengths = msg.headers.get_all("content-length");
    let first = match lengths.next() {
        Some(v) => v,
        None => return Ok((BodyKind::Fixed(0), false)),
    };
    for other in lengths {
        if other != first {
            return Err(Error::MalformedRequest(
                "conflicting content-length headers".into(),
            ));
        }
    }
    let text = std::str::from_utf8(first)
        .map_err(|_| Error::MalformedRequest("content-length is not ASCII".into()))?;
    let n: u64 = text
        .trim()
        .parse()
        .map_err(|_| Error::MalformedRequest("content-length is not a decimal integer".into()))?;
    Ok((BodyKind::Fixed(n), false))
}

enum HeadOutcome {
    Partial,
    Complete(usize),
    UnsupportedVersion,
}

/// Runs one `httparse::Request::parse` attempt over `input`, retrying once
/// with a larger header table on `TooManyHeaders`. On success, copies the
/// method/target/headers into the caller's buffers.
fn parse_request_head(
    input: &[u8],
    method_out: &mut String,
    path_out: &mut String,
    msg: &mut Message,
) -> Result<(HeadOutcome, Option<(bool, bool, bool)>), Error> {
    let mut small = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut big_storage;
    let result = {
        let mut req = httparse::Request::new(&mut small);
        match req.parse(input) {
            Ok(httparse::Status::Complete(n)) => Some((n, req)),
            Ok(httparse::Status::Partial) => None,
            Err(httparse::Error::TooManyHeaders) => {
                big_storage = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
                // Reborrow with a fresh, larger header array.
                let mut req2 = httparse::Request::new(&mut big_storage);
                match req2.parse(input) {
                    Ok(httparse::Status::Complete(n)) => {
                        return finish_head(n, &req2, method_out, path_out, msg);
                    }
                    Ok(httparse::Status::Partial) => return Ok((HeadOutcome::Partial, None)),
                    Err(httparse::Error::Version) => {
                        return Ok((HeadOutcome::UnsupportedVersion, None));
                    }
                    Err(e) => return Err(Error::from(e)),
                }
            }
            Err(httparse::Error::Version) => {
                return Ok((HeadOutcome::UnsupportedVersion, None));
            }
            Err(e) => return Err(Error::from(e)),
        }
    };
    match result {
        Some((n, req)) => finish_head(n, &req, method_out, path_out, msg),
        None => Ok((HeadOutcome::Partial, None)),
    }
}

fn finish_head(
    consumed: usize,
    req: &httparse::Request,
    method_out: &mut String,
    path_out: &mut String,
    msg: &mut Message,
) -> Result<(HeadOutcome, Option<(bool, bool, bool)>), Error> {
    // Message begin: the wire has handed us a complete request line plus
    // headers, so any state left over in `msg` from a previous request on
    // this connection is stale and must go before we append anything new.
    msg.reset();
    let method = req.method.ok_or(Error::ParseError(httparse::Error::Token))?;
    let path = req.path.ok_or(Error::ParseError(httparse::Error::Token))?;
    let minor = req.version.ok_or(Error::ParseError(httparse::Error::Version))?;
    if !method::is_valid_token(method) {
        return Err(Error::MalformedRequest(format!("invalid method token: {:?}", method)));
    }
    if !method::METHODS.contains(&method) {
        trace!("extension method {:?} not in the fixed method table", method);
    }
    method_out.clear();
    method_out.push_str(method);
    path_out.clear();
    path_out.push_str(path);
    push_headers(msg, false, req.headers);
    let http11 = minor >= 1;
    let connection = msg.headers.get("connection").map(|v| v.to_vec());
    let upgrade_hdr = msg.headers.get("upgrade").map(|v| v.to_vec());
    let upgrade = has_upgrade(connection.as_deref(), upgrade_hdr.as_deref());
    let keep_alive = should_keep_alive(http11, connection.as_deref());
    Ok((HeadOutcome::Complete(consumed), Some((http11, keep_alive, upgrade))))
}

/// Parses a trailer-only header block (no request line), as seen after the
/// zero-size terminating chunk.
fn parse_trailer_block(
    input: &[u8],
    msg: &mut Message,
) -> Result<Option<usize>, Error> {
    let mut small = [httparse::EMPTY_HEADER; MIN_HEADERS];
    match httparse::parse_headers(input, &mut small) {
        Ok(httparse::Status::Complete((n, headers))) => {
            push_headers(msg, true, headers);
            Ok(Some(n))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(httparse::Error::TooManyHeaders) => {
            let mut big = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
            match httparse::parse_headers(input, &mut big) {
                Ok(httparse::Status::Complete((n, headers))) => {
                    push_headers(msg, true, headers);
                    Ok(Some(n))
                }
                Ok(httparse::Status::Partial) => Ok(None),
                Err(e) => Err(Error::from(e)),
            }
        }
        Err(e) => Err(Error::from(e)),
    }
}

/// What the caller-facing future does after a channel read comes back with
/// zero bytes.
fn eof_error(mid_message: bool) -> Error {
    if mid_message {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed mid-message",
        ))
    } else {
        Error::Eof
    }
}

enum ReadRequestPhase {
    Parsing,
    WritingUnsupported { scratch: Vec<u8> },
}

/// Future returned by [`Proto::read_request`].
pub struct ReadRequest<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    method: &'a mut String,
    path: &'a mut String,
    msg: &'a mut Message,
    phase: ReadRequestPhase,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for ReadRequest<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if self.proto.ingress.state != IngressState::Empty {
            return Err(Error::OutOfOrder);
        }
        if self.proto.ingress.upgrade {
            // The previous request negotiated a protocol upgrade; whatever
            // is left in the buffer belongs to that protocol, not to
            // another HTTP request. Parsing it here would misread the new
            // protocol's bytes as a request line. The caller is expected to
            // take the connection over via `Proto::buffered`/`channel_mut`/
            // `into_inner` instead of calling `read_request` again.
            return Err(Error::OutOfOrder);
        }
        loop {
            if let ReadRequestPhase::WritingUnsupported { ref scratch } = self.phase {
                let parts = [IoPart::Borrowed(scratch)];
                match self.proto.channel.poll_write_all(&parts)? {
                    Async::NotReady => return Ok(Async::NotReady),
                    Async::Ready(()) => {
                        debug!("closing channel after 505 response");
                        self.proto.channel.shutdown_best_effort();
                        return Err(Error::ParseError(httparse::Error::Version));
                    }
                }
            }

            let (outcome, framing) = parse_request_head(
                self.proto.buffer.filled(),
                self.method,
                self.path,
                self.msg,
            )
            .map_err(|e| {
                debug!("ingress parse error, dropping buffered bytes: {:?}", e);
                self.proto.buffer.clear();
                e
            })?;

            match outcome {
                HeadOutcome::Complete(consumed) => {
                    self.proto.buffer.consume(consumed);
                    let (http11, keep_alive, upgrade) = framing.expect("complete head carries framing");
                    let (body_kind, force_close) = match framing_from_headers(self.msg) {
                        Ok(v) => v,
                        Err(e) => {
                            debug!("rejecting request with bad framing headers: {:?}", e);
                            self.proto.buffer.clear();
                            return Err(e);
                        }
                    };
                    self.proto.flags.http11 = http11;
                    self.proto.flags.keep_alive = keep_alive && !force_close;
                    self.proto.ingress.body_kind = Some(body_kind);
                    self.proto.ingress.remaining = match body_kind {
                        BodyKind::Fixed(n) => n,
                        BodyKind::Chunked => 0,
                    };
                    self.proto.ingress.chunk = chunked::State::new();
                    self.proto.ingress.upgrade = upgrade;
                    self.proto.ingress.state = IngressState::MessageReady;
                    self.proto.ingress.flags.set(READY);
                }
                HeadOutcome::UnsupportedVersion => {
                    warn!("rejecting request with unsupported HTTP major version");
                    self.msg.reset();
                    self.method.clear();
                    self.path.clear();
                    let mut scratch = Vec::new();
                    serializer::write_unsupported_version_response(&mut scratch);
                    self.phase = ReadRequestPhase::WritingUnsupported { scratch };
                    continue;
                }
                HeadOutcome::Partial => {}
            }

            if self.proto.ingress.flags.has(READY) {
                self.proto.ingress.flags.clear(READY);
                return Ok(Async::Ready(()));
            }
            if self.proto.buffer.is_full() {
                warn!("ingress buffer exhausted while reading request head ({} bytes)",
                      self.proto.buffer.capacity());
                return Err(Error::BufferExhausted);
            }
            match self.proto.channel.poll_read(self.proto.buffer.tail_mut())? {
                Async::NotReady => return Ok(Async::NotReady),
                Async::Ready(0) => return Err(eof_error(self.proto.buffer.len() > 0)),
                Async::Ready(n) => self.proto.buffer.advance(n),
            }
        }
    }
}

/// Future returned by [`Proto::read_some_body`].
pub struct ReadSomeBody<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    msg: &'a mut Message,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for ReadSomeBody<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if self.proto.ingress.state != IngressState::MessageReady {
            return Err(Error::OutOfOrder);
        }
        loop {
            match self.proto.ingress.body_kind.expect("body kind set in MessageReady") {
                BodyKind::Fixed(_) => {
                    if self.proto.ingress.remaining == 0 {
                        self.proto.ingress.state = IngressState::BodyReady;
                        self.proto.ingress.flags.set(END);
                    } else {
                        let avail = self.proto.buffer.filled().len();
                        if avail > 0 {
                            let take = avail.min(self.proto.ingress.remaining as usize);
                            self.msg.body.extend_from_slice(&self.proto.buffer.filled()[..take]);
                            self.proto.buffer.consume(take);
                            self.proto.ingress.remaining -= take as u64;
                            self.proto.ingress.flags.set(DATA);
                            if self.proto.ingress.remaining == 0 {
                                self.proto.ingress.state = IngressState::BodyReady;
                                self.proto.ingress.flags.set(END);
                            }
                        }
                    }
                }
                BodyKind::Chunked => {
                    self.proto.ingress.chunk.parse(&mut self.proto.buffer)?;
                    let avail = self.proto.ingress.chunk.buffered();
                    if avail > 0 {
                        self.msg.body.extend_from_slice(&self.proto.buffer.filled()[..avail]);
                        self.proto.ingress.chunk.consume(avail);
                        self.proto.buffer.consume(avail);
                        self.proto.ingress.flags.set(DATA);
                    }
                    if self.proto.ingress.chunk.is_done() {
                        self.proto.ingress.state = IngressState::BodyReady;
                        self.proto.ingress.flags.set(END);
                    }
                }
            }

            if self.proto.ingress.flags.has(DATA) || self.proto.ingress.flags.has(END) {
                self.proto.ingress.flags.clear(READY);
                self.proto.ingress.flags.clear(DATA);
                return Ok(Async::Ready(()));
            }
            if self.proto.buffer.is_full() {
                warn!("ingress buffer exhausted while reading body");
                return Err(Error::BufferExhausted);
            }
            match self.proto.channel.poll_read(self.proto.buffer.tail_mut())? {
                Async::NotReady => return Ok(Async::NotReady),
                Async::Ready(0) => return Err(eof_error(true)),
                Async::Ready(n) => self.proto.buffer.advance(n),
            }
        }
    }
}

/// Future returned by [`Proto::read_trailers`].
pub struct ReadTrailers<'a, 'buf, S> {
    proto: &'a mut Proto<'buf, S>,
    msg: &'a mut Message,
}

impl<'a, 'buf, S: AsyncRead + AsyncWrite> Future for ReadTrailers<'a, 'buf, S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if self.proto.ingress.state != IngressState::BodyReady {
            return Err(Error::OutOfOrder);
        }
        let chunked = matches!(self.proto.ingress.body_kind, Some(BodyKind::Chunked));
        if !chunked {
            let upgrade = self.proto.ingress.upgrade;
            self.proto.ingress.reset_for_next_message();
            self.proto.ingress.upgrade = upgrade;
            return Ok(Async::Ready(()));
        }
        loop {
            match parse_trailer_block(self.proto.buffer.filled(), self.msg).map_err(|e| {
                debug!("trailer parse error, dropping buffered bytes: {:?}", e);
                self.proto.buffer.clear();
                e
            })? {
                Some(consumed) => {
                    self.proto.buffer.consume(consumed);
                    let upgrade = self.proto.ingress.upgrade;
                    self.proto.ingress.reset_for_next_message();
                    self.proto.ingress.upgrade = upgrade;
                    return Ok(Async::Ready(()));
                }
                None => {}
            }
            if self.proto.buffer.is_full() {
                warn!("ingress buffer exhausted while reading trailers");
                return Err(Error::BufferExhausted);
            }
            match self.proto.channel.poll_read(self.proto.buffer.tail_mut())? {
                Async::NotReady => return Ok(Async::NotReady),
                Async::Ready(0) => return Err(eof_error(true)),
                Async::Ready(n) => self.proto.buffer.advance(n),
            }
        }
    }
}

impl<'buf, S: AsyncRead + AsyncWrite> Proto<'buf, S> {
    /// Reads the next request line, headers and framing. Leaves `msg`'s
    /// body and trailers empty; use [`Proto::read_some_body`] to pull the
    /// body.
    pub fn read_request<'a>(
        &'a mut self,
        method: &'a mut String,
        path: &'a mut String,
        msg: &'a mut Message,
    ) -> ReadRequest<'a, 'buf, S> {
        ReadRequest { proto: self, method, path, msg, phase: ReadRequestPhase::Parsing }
    }

    /// Reads at least one more body byte into `msg.body`, or observes the
    /// body's end (an empty read with no error, after which the engine has
    /// moved to `BodyReady`).
    pub fn read_some_body<'a>(&'a mut self, msg: &'a mut Message) -> ReadSomeBody<'a, 'buf, S> {
        ReadSomeBody { proto: self, msg }
    }

    /// Reads any trailer headers following a chunked body (an empty read
    /// for non-chunked bodies, which have none).
    pub fn read_trailers<'a>(&'a mut self, msg: &'a mut Message) -> ReadTrailers<'a, 'buf, S> {
        ReadTrailers { proto: self, msg }
    }
}
