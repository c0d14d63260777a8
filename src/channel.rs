// Thin, protocol-ignorant wrapper over the byte channel. Knows nothing
// about HTTP: a bounded read into a slice, and an all-or-error vectored
// write looping over AsyncWrite::poll_write's short-write behavior.

use std::io;

use futures::{Async, Poll};
use tokio_io::{AsyncRead, AsyncWrite};

/// One piece of a scatter-gather write: a borrowed slice referencing either
/// the engine's own assembled framing `scratch` or the caller's message
/// body in place, so the body is never copied.
pub enum IoPart<'a> {
    Borrowed(&'a [u8]),
}

impl<'a> IoPart<'a> {
    fn as_slice(&self) -> &[u8] {
        match self {
            IoPart::Borrowed(s) => s,
        }
    }
}

/// Wraps an `AsyncRead + AsyncWrite` transport with the two operations the
/// rest of the engine needs: a single bounded read, and an all-or-error
/// vectored write.
pub struct ChannelAdapter<S> {
    inner: S,
    // Part index plus byte offset into it, so a short write can resume
    // correctly on the next poll.
    write_progress: WriteProgress,
}

#[derive(Default)]
struct WriteProgress {
    part: usize,
    offset: usize,
}

impl<S: AsyncRead + AsyncWrite> ChannelAdapter<S> {
    pub fn new(inner: S) -> ChannelAdapter<S> {
        ChannelAdapter { inner, write_progress: WriteProgress::default() }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Best-effort `shutdown()` used when the engine is abandoning the
    /// channel after a protocol error (e.g. the canned 505 response). Any
    /// error or pending state is ignored: the caller is already unwinding
    /// and has nothing useful to do with it.
    pub fn shutdown_best_effort(&mut self) {
        let _ = self.inner.shutdown();
    }

    /// Issues a single bounded read into `dst`. May deliver a short read.
    /// `Ok(Async::Ready(0))` means EOF.
    pub fn poll_read(&mut self, dst: &mut [u8]) -> Poll<usize, io::Error> {
        self.inner.poll_read(dst)
    }

    /// Writes every byte of `parts`, in order, or returns an error. Must be
    /// called again with the *same* `parts` after `Async::NotReady`, like
    /// every other resumable future in this crate.
    pub fn poll_write_all(&mut self, parts: &[IoPart]) -> Poll<(), io::Error> {
        while self.write_progress.part < parts.len() {
            let slice = parts[self.write_progress.part].as_slice();
            let remaining = &slice[self.write_progress.offset..];
            if remaining.is_empty() {
                self.write_progress.part += 1;
                self.write_progress.offset = 0;
                continue;
            }
            match self.inner.poll_write(remaining)? {
                Async::Ready(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write zero bytes into channel",
                    ));
                }
                Async::Ready(n) => {
                    self.write_progress.offset += n;
                }
                Async::NotReady => return Ok(Async::NotReady),
            }
        }
        self.write_progress = WriteProgress::default();
        Ok(Async::Ready(()))
    }
}

#[cfg(test)]
pub mod test_support {
    use std::io;

    use futures::{Async, Poll};
    use tokio_io::{AsyncRead, AsyncWrite};

    /// An in-memory duplex channel used to drive the engine's futures with
    /// `Future::wait()` in tests.
    pub struct MockChannel {
        pub input: io::Cursor<Vec<u8>>,
        pub output: Vec<u8>,
        pub closed: bool,
    }

    impl MockChannel {
        pub fn new(input: &[u8]) -> MockChannel {
            MockChannel {
                input: io::Cursor::new(input.to_vec()),
                output: Vec::new(),
                closed: false,
            }
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            io::Read::read(&mut self.input, buf)
        }
    }

    impl AsyncRead for MockChannel {}

    impl io::Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AsyncWrite for MockChannel {
        fn shutdown(&mut self) -> Poll<(), io::Error> {
            self.closed = true;
            Ok(Async::Ready(()))
        }
    }
}
