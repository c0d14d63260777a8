use std::io;

use httparse;

quick_error! {
    /// Errors surfaced by the protocol engine.
    ///
    /// See the module-level docs for which states each variant leaves the
    /// ingress/egress state machines in.
    #[derive(Debug)]
    pub enum Error {
        /// A public operation was called while the relevant state machine
        /// was not in an accepting state for it. Neither state machine
        /// advances.
        OutOfOrder {
            description("operation called out of order")
        }
        /// The grammar parser rejected the byte stream.
        ParseError(err: httparse::Error) {
            description("HTTP parse error")
            display("HTTP parse error: {:?}", err)
            from()
        }
        /// The request parsed cleanly but its framing headers were
        /// self-contradictory (e.g. two different `Content-Length` values,
        /// or a `Content-Length` that isn't a plain decimal integer).
        MalformedRequest(msg: String) {
            description("malformed request")
            display("malformed request: {}", msg)
        }
        /// Chunked transfer-coding framing was malformed.
        ChunkSizeError(err: httparse::InvalidChunkSize) {
            description("invalid chunk size")
            from()
        }
        /// The ingress buffer filled up without satisfying the requested
        /// read target. The engine never grows the buffer; the caller is
        /// expected to tear down the connection.
        BufferExhausted {
            description("ingress buffer exhausted before a full \
                request/chunk could be parsed")
        }
        /// `write_metadata` (streamed response) was attempted on an
        /// HTTP/1.0 connection.
        NativeStreamUnsupported {
            description("chunked transfer-encoding is not available on \
                HTTP/1.0 connections")
        }
        /// An egress header key or value contained a bare CR or LF byte.
        InvalidHeader {
            description("header name or value contains CR or LF")
        }
        /// The engine was constructed with a zero-length buffer.
        InvalidArgument {
            description("invalid argument")
        }
        /// The channel reached EOF between messages (an orderly close, not
        /// a protocol failure).
        Eof {
            description("connection closed")
        }
        /// The underlying channel returned an I/O error.
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
    }
}
