// Chunked transfer-coding decoder, run directly over the ingress FixedBuf.
// Strips chunk-size/CRLF framing bytes out of the buffer as it goes, so
// `buffered()` always counts decoded body bytes sitting at the front.
// Stops at the terminal `0` chunk-size line; the trailer part after it is
// a separate grammar, left for `ingress::parse_trailer_block`.

use httparse::{InvalidChunkSize, parse_chunk_size};

use crate::buffer::FixedBuf;

#[derive(Debug, Clone)]
pub struct State {
    buffered: usize,
    pending: usize,
    need_chunk_crlf: bool,
    done: bool,
}

impl State {
    pub fn new() -> State {
        State {
            buffered: 0,
            pending: 0,
            need_chunk_crlf: false,
            done: false,
        }
    }

    // Scans as far as the buffer currently parses cleanly. Returns on a
    // partial chunk-size line or a not-yet-arrived chunk-data CRLF; caller
    // reads more bytes and calls again.
    pub fn parse(&mut self, buf: &mut FixedBuf) -> Result<(), InvalidChunkSize> {
        if self.done {
            return Ok(());
        }
        loop {
            if self.need_chunk_crlf {
                if buf.len() < self.buffered + 2 {
                    return Ok(());
                }
                if &buf.filled()[self.buffered..self.buffered + 2] != b"\r\n" {
                    return Err(InvalidChunkSize);
                }
                buf.remove_range(self.buffered, self.buffered + 2);
                self.need_chunk_crlf = false;
            }
            if self.pending > 0 {
                let avail = buf.len() - self.buffered;
                if avail == 0 {
                    return Ok(());
                }
                let take = avail.min(self.pending);
                self.buffered += take;
                self.pending -= take;
                if self.pending == 0 {
                    self.need_chunk_crlf = true;
                }
                continue;
            }
            if self.buffered >= buf.len() {
                return Ok(());
            }
            use httparse::Status::*;
            match parse_chunk_size(&buf.filled()[self.buffered..])? {
                Complete((bytes, 0)) => {
                    buf.remove_range(self.buffered, self.buffered + bytes);
                    self.done = true;
                    return Ok(());
                }
                Complete((bytes, chunk_size)) => {
                    buf.remove_range(self.buffered, self.buffered + bytes);
                    self.pending = chunk_size as usize;
                }
                Partial => {
                    return Ok(());
                }
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}
