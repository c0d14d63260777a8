//! `Proto`: the `SocketFacade` that composes the ingress engine, the
//! egress engine and the channel adapter into one per-connection object.
//!
//! Callers drive ingress and egress directly through explicit operations
//! rather than through a trait object the protocol calls back into. The
//! out-of-order guard that keeps reads and writes from interleaving wrongly
//! is enforced here, since it spans both sub-engines.

use crate::buffer::FixedBuf;
use crate::channel::ChannelAdapter;
use crate::egress::EgressState;
use crate::ingress::IngressEngine;
use crate::version::Version;

use tokio_io::{AsyncRead, AsyncWrite};

/// Version/keep-alive bits learned from the most recently parsed request.
/// Kept as plain bools rather than packed into one byte; there are only
/// two of them and bit-packing would buy nothing but obscurity.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Flags {
    pub http11: bool,
    pub keep_alive: bool,
}

impl Flags {
    pub(crate) fn version(&self) -> Version {
        if self.http11 { Version::Http11 } else { Version::Http10 }
    }
}

/// The per-connection HTTP/1.x protocol engine.
///
/// `'buf` is the lifetime of the caller-provided ingress buffer; `S` is the
/// underlying byte channel.
pub struct Proto<'buf, S> {
    pub(crate) channel: ChannelAdapter<S>,
    pub(crate) buffer: FixedBuf<'buf>,
    pub(crate) flags: Flags,
    pub(crate) ingress: IngressEngine,
    pub(crate) egress_state: EgressState,
}

impl<'buf, S: AsyncRead + AsyncWrite> Proto<'buf, S> {
    /// Builds a new engine over `channel`, using `buffer` as the fixed-size
    /// ingress region.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `buffer` is empty. This check is
    /// synchronous: a zero-capacity buffer can never satisfy even the
    /// smallest request line, so there is no point deferring the failure
    /// to the first read.
    pub fn new(channel: S, buffer: &'buf mut [u8]) -> Result<Proto<'buf, S>, crate::error::Error> {
        let buffer = FixedBuf::new(buffer).ok_or(crate::error::Error::InvalidArgument)?;
        Ok(Proto {
            channel: ChannelAdapter::new(channel),
            buffer,
            flags: Flags::default(),
            ingress: IngressEngine::new(),
            egress_state: EgressState::Empty,
        })
    }

    /// Whether the last parsed request (or response being written) is
    /// HTTP/1.1.
    pub fn is_http11(&self) -> bool {
        self.flags.http11
    }

    /// The keep-alive hint derived from the last parsed request. This is
    /// surfaced, not acted on: connection reuse policy is the caller's
    /// concern.
    pub fn keep_alive(&self) -> bool {
        self.flags.keep_alive
    }

    pub fn ingress_state(&self) -> crate::ingress::IngressState {
        self.ingress.state
    }

    pub fn egress_state(&self) -> EgressState {
        self.egress_state
    }

    /// Whether the most recently completed request negotiated a protocol
    /// upgrade (`Connection: upgrade` plus an `Upgrade` header). Once set,
    /// `read_request` refuses to parse any further bytes as HTTP: they
    /// belong to the upgraded protocol, not to another request.
    pub fn is_upgrade(&self) -> bool {
        self.ingress.upgrade
    }

    /// The unparsed bytes currently sitting in the ingress buffer. After an
    /// upgrade, this may already contain bytes the peer sent for the new
    /// protocol ahead of the engine handing the channel back; the caller
    /// must treat them as the start of that stream, not discard them.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.filled()
    }

    /// Borrows the underlying channel, e.g. to shut it down or query peer
    /// info.
    pub fn channel_mut(&mut self) -> &mut S {
        self.channel.get_mut()
    }

    /// Closes out the engine and hands the channel back to the caller.
    pub fn into_inner(self) -> S {
        self.channel.into_inner()
    }
}
