//! Frame and Reply Types
//!
//! A request is always an array of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! ```
//!
//! which decodes to the [`Frame`] `["SET", "foo", "bar"]`.
//!
//! Replies use three encodings:
//! - Simple string: `+PONG\r\n`
//! - Bulk string: `$5\r\nhello\r\n`
//! - Null bulk string: `$-1\r\n`
//!
//! Error replies are simple strings too; clients see `+Get command must
//! include key\r\n`, never a `-` line.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used on the wire
pub const CRLF: &[u8] = b"\r\n";

/// Type prefixes understood by the decoder and written by the serializer
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One decoded request: the command name followed by its arguments.
///
/// A frame always has at least one element; the decoder rejects empty arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    args: Vec<Bytes>,
}

impl Frame {
    /// Builds a frame from already-split arguments.
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Convenience constructor used by tests and benchmarks.
    pub fn from_strs(args: &[&str]) -> Self {
        Self::new(
            args.iter()
                .map(|s| Bytes::copy_from_slice(s.as_bytes()))
                .collect(),
        )
    }

    /// The command name, exactly as the client sent it.
    pub fn name(&self) -> Option<&Bytes> {
        self.args.first()
    }

    /// The argument at position `index` (0 is the command name).
    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encodes the frame as a request, the way a client would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(prefix::ARRAY);
        buf.extend_from_slice(self.args.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        for arg in &self.args {
            buf.push(prefix::BULK_STRING);
            buf.extend_from_slice(arg.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(arg);
            buf.extend_from_slice(CRLF);
        }
        buf
    }
}

/// A reply payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status or error line.
    /// Format: `+<text>\r\n`
    SimpleString(Bytes),

    /// Binary-safe value.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Absent or expired key.
    /// Format: `$-1\r\n`
    Null,
}

impl RespValue {
    /// Creates a new simple string reply.
    ///
    /// # Example
    /// ```
    /// use kvlite::protocol::types::RespValue;
    /// assert_eq!(RespValue::simple_string("OK").serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<Bytes>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new bulk string reply.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn ok() -> Self {
        RespValue::SimpleString(Bytes::from_static(b"OK"))
    }

    pub fn pong() -> Self {
        RespValue::SimpleString(Bytes::from_static(b"PONG"))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// A simple string is a single line, so any CR or LF inside its text is
    /// written as a space.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend(
                    s.iter()
                        .map(|&b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
                );
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
        }
    }
}

/// Human-readable form for log lines.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string_serialize() {
        assert_eq!(RespValue::simple_string("OK").serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_simple_string_stays_on_one_line() {
        let value = RespValue::simple_string("two\r\nlines");
        assert_eq!(value.serialize(), b"+two  lines\r\n");
    }

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_empty_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::new());
        assert_eq!(value.serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_ok_and_pong() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::pong().serialize(), b"+PONG\r\n");
    }

    #[test]
    fn test_display_for_logs() {
        assert_eq!(RespValue::pong().to_string(), "PONG");
        assert_eq!(RespValue::bulk_string(Bytes::from("Ariz")).to_string(), "\"Ariz\"");
        assert_eq!(
            RespValue::bulk_string(Bytes::from_static(&[0xff, 0xfe])).to_string(),
            "(binary data, 2 bytes)"
        );
        assert_eq!(RespValue::null().to_string(), "(nil)");
    }

    #[test]
    fn test_frame_encode() {
        let frame = Frame::from_strs(&["SET", "foo", "bar"]);
        assert_eq!(
            frame.encode(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
        );
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::from_strs(&["GET", "key"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.name(), Some(&Bytes::from("GET")));
        assert_eq!(frame.arg(1), Some(&Bytes::from("key")));
        assert_eq!(frame.arg(2), None);
    }
}
