//! Bit-exact HTTP/1.x wire serialization helpers for the egress engine.

use std::fmt::Write as _;

use quick_error::quick_error;

use crate::message::Headers;
use crate::version::Version;

quick_error! {
    #[derive(Debug, PartialEq, Eq)]
    pub enum HeaderError {
        InvalidHeaderName {
            description("header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("header value contains invalid characters")
        }
    }
}

fn has_crlf(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// Writes `"HTTP/1.x " <code> " " <reason> "\r\n"`.
pub fn write_status_line(out: &mut Vec<u8>, version: Version, code: u16, reason: &str) {
    let prefix = match version {
        Version::Http11 => "HTTP/1.1 ",
        Version::Http10 => "HTTP/1.0 ",
    };
    out.extend_from_slice(prefix.as_bytes());
    write!(out, "{} {}\r\n", code, reason).expect("write to Vec never fails");
}

/// Writes `"HTTP/1.1 100 Continue\r\n\r\n"`.
pub fn write_continue_line(out: &mut Vec<u8>) {
    out.extend_from_slice(b"HTTP/1.1 100 Continue\r\n\r\n");
}

/// Writes one `"name: value\r\n"` line, rejecting embedded CR/LF.
pub fn write_header(out: &mut Vec<u8>, name: &str, value: &[u8]) -> Result<(), HeaderError> {
    if has_crlf(name.as_bytes()) {
        return Err(HeaderError::InvalidHeaderName);
    }
    if has_crlf(value) {
        return Err(HeaderError::InvalidHeaderValue);
    }
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    Ok(())
}

/// Writes every header in `headers`, verbatim, in insertion order. Caller
/// keys are emitted exactly as stored; this function does not validate or
/// normalize casing, only CR/LF content.
pub fn write_headers(out: &mut Vec<u8>, headers: &Headers) -> Result<(), HeaderError> {
    for (name, value) in headers.iter() {
        write_header(out, name, value)?;
    }
    Ok(())
}

/// Writes the engine-generated `content-length` header: literal lowercase
/// name, decimal value.
pub fn write_content_length(out: &mut Vec<u8>, n: u64) {
    out.extend_from_slice(b"content-length: ");
    write!(out, "{}\r\n", n).expect("write to Vec never fails");
}

/// Writes `"transfer-encoding: chunked\r\n"`.
pub fn write_chunked_header(out: &mut Vec<u8>) {
    out.extend_from_slice(b"transfer-encoding: chunked\r\n");
}

/// Writes `"Connection: close\r\n"`.
pub fn write_connection_close(out: &mut Vec<u8>) {
    out.extend_from_slice(b"Connection: close\r\n");
}

/// Writes the terminating blank line after headers.
pub fn end_headers(out: &mut Vec<u8>) {
    out.extend_from_slice(b"\r\n");
}

/// Writes a chunk-size prefix line: lowercase hex, no leading zeros, no
/// extensions, terminated by CRLF.
pub fn write_chunk_size(out: &mut Vec<u8>, len: usize) {
    write!(out, "{:x}\r\n", len).expect("write to Vec never fails");
}

/// Writes the trailing CRLF after a chunk's body bytes.
pub fn end_chunk(out: &mut Vec<u8>) {
    out.extend_from_slice(b"\r\n");
}

/// Writes the zero-size terminating chunk, optionally followed by trailer
/// headers, then the final CRLF: `"0\r\n" <trailers> "\r\n"`.
pub fn write_trailer_block(out: &mut Vec<u8>, trailers: &Headers) -> Result<(), HeaderError> {
    out.extend_from_slice(b"0\r\n");
    write_headers(out, trailers)?;
    out.extend_from_slice(b"\r\n");
    Ok(())
}

/// The canned HTTP/1.1 505 response for an unsupported major version.
pub const UNSUPPORTED_VERSION_BODY: &[u8] =
    b"This server only supports HTTP/1.0 and HTTP/1.1\n";

pub fn write_unsupported_version_response(out: &mut Vec<u8>) {
    out.extend_from_slice(b"HTTP/1.1 505 HTTP Version Not Supported\r\n");
    write_content_length(out, UNSUPPORTED_VERSION_BODY.len() as u64);
    write_connection_close(out);
    end_headers(out);
    out.extend_from_slice(UNSUPPORTED_VERSION_BODY);
}
