//! Frame Decoder
//!
//! Turns the bytes of one read into command frames. The accepted grammar is
//! deliberately narrow:
//!
//! ```text
//! Request := '*' Digits CRLF Element{Digits times}
//! Element := '$' Digits CRLF RawBytes{Digits bytes} CRLF
//! ```
//!
//! The decoder works on whatever one read returned. It does not wait for
//! more data: a request that claims more bytes than the buffer holds is a
//! [`ParseError::Truncated`], and every declared length is checked against
//! the remaining buffer before anything is copied.
//!
//! [`decode_frame`] decodes a single request from the front of a buffer and
//! reports how many bytes it used. [`FrameDecoder`] walks a buffer that holds
//! several requests back to back.

use crate::protocol::types::{prefix, Frame, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    EmptyInput,

    /// The request does not start with `*`
    #[error("expected '*', got {0:#04x}")]
    ExpectedArray(u8),

    /// An element does not start with `$`
    #[error("expected '$', got {0:#04x}")]
    ExpectedBulkString(u8),

    /// A length field has no digits or does not fit in a usize
    #[error("invalid length at offset {offset}")]
    InvalidLength { offset: usize },

    #[error("expected CRLF at offset {offset}")]
    ExpectedCrlf { offset: usize },

    /// A bulk string declares more bytes than the buffer holds
    #[error("bulk string of {declared} bytes but only {available} available")]
    Truncated { declared: usize, available: usize },

    /// `*0\r\n`: a request must name a command
    #[error("empty command")]
    EmptyFrame,

    #[error("too many arguments: {declared} (max: {max})")]
    TooManyArguments { declared: usize, max: usize },
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Upper bound on the declared array length of a single request.
pub const MAX_FRAME_ARGS: usize = 1024 * 1024;

/// Decodes one request from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied.
///
/// # Example
///
/// ```
/// use kvlite::protocol::decode_frame;
///
/// let (frame, consumed) = decode_frame(b"*1\r\n$4\r\nPING\r\n").unwrap();
/// assert_eq!(frame.name().map(|n| &n[..]), Some(&b"PING"[..]));
/// assert_eq!(consumed, 14);
/// ```
pub fn decode_frame(buf: &[u8]) -> ParseResult<(Frame, usize)> {
    let mut cursor = Cursor { buf, pos: 0 };
    let frame = cursor.read_frame()?;
    Ok((frame, cursor.pos))
}

/// Iterates over the requests packed into one read.
///
/// Decoding stops at the first error: once the position in the buffer can no
/// longer be trusted, the remaining bytes are abandoned.
#[derive(Debug)]
pub struct FrameDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    /// Decodes the next request, or returns `None` once the buffer is used up.
    ///
    /// An empty buffer yields a single [`ParseError::EmptyInput`].
    pub fn next_frame(&mut self) -> Option<ParseResult<Frame>> {
        if self.failed {
            return None;
        }
        if self.pos > 0 && self.pos == self.buf.len() {
            return None;
        }

        match decode_frame(&self.buf[self.pos..]) {
            Ok((frame, consumed)) => {
                self.pos += consumed;
                Some(Ok(frame))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    /// Bytes decoded so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

impl Iterator for FrameDecoder<'_> {
    type Item = ParseResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

/// Read position over a borrowed buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn read_frame(&mut self) -> ParseResult<Frame> {
        let first = *self.buf.first().ok_or(ParseError::EmptyInput)?;
        if first != prefix::ARRAY {
            return Err(ParseError::ExpectedArray(first));
        }
        self.pos += 1;

        let count = self.read_length()?;
        self.expect_crlf()?;

        if count == 0 {
            return Err(ParseError::EmptyFrame);
        }
        if count > MAX_FRAME_ARGS {
            return Err(ParseError::TooManyArguments {
                declared: count,
                max: MAX_FRAME_ARGS,
            });
        }

        // Every element needs at least "$0\r\n\r\n", so the buffer bounds the
        // real number of elements no matter what the header claims.
        let mut args = Vec::with_capacity(count.min(self.remaining() / 6 + 1));
        for _ in 0..count {
            args.push(self.read_bulk_string()?);
        }

        Ok(Frame::new(args))
    }

    fn read_bulk_string(&mut self) -> ParseResult<Bytes> {
        match self.buf.get(self.pos) {
            Some(&prefix::BULK_STRING) => self.pos += 1,
            Some(&other) => return Err(ParseError::ExpectedBulkString(other)),
            None => return Err(ParseError::ExpectedCrlf { offset: self.pos }),
        }

        let len = self.read_length()?;
        self.expect_crlf()?;

        let available = self.remaining();
        if len > available {
            return Err(ParseError::Truncated {
                declared: len,
                available,
            });
        }

        let data = Bytes::copy_from_slice(&self.buf[self.pos..self.pos + len]);
        self.pos += len;
        self.expect_crlf()?;

        Ok(data)
    }

    /// Reads one or more ASCII digits as a base-10 length.
    fn read_length(&mut self) -> ParseResult<usize> {
        let start = self.pos;
        let mut value: usize = 0;

        while let Some(&b) = self.buf.get(self.pos) {
            if !b.is_ascii_digit() {
                break;
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(usize::from(b - b'0')))
                .ok_or(ParseError::InvalidLength { offset: start })?;
            self.pos += 1;
        }

        if self.pos == start {
            return Err(ParseError::InvalidLength { offset: start });
        }
        Ok(value)
    }

    fn expect_crlf(&mut self) -> ParseResult<()> {
        match self.buf.get(self.pos..self.pos + 2) {
            Some(bytes) if bytes == CRLF => {
                self.pos += 2;
                Ok(())
            }
            _ => Err(ParseError::ExpectedCrlf { offset: self.pos }),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
