//! Incremental Frame Parser
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((frame, consumed)))` - a complete frame, `consumed` bytes were used
//! - `Ok(None)` - the frame is incomplete, wait for more data
//! - `Err(ParseError)` - invalid framing, the connection cannot recover
//!
//! The connection layer appends socket data to a `BytesMut`, calls
//! [`FrameParser::parse`], and advances the buffer by `consumed` on success.

use crate::protocol::frame::{prefix, Frame, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while parsing frames.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk length is negative (but not -1 for null)
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, nesting too deep, ...)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk value (16 MB)
pub const MAX_BULK_SIZE: usize = 16 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Default)]
pub struct FrameParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one frame from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => {
                Ok(parse_line(buf)?.map(|(s, n)| (Frame::Simple(s.to_string()), n)))
            }
            prefix::ERROR => Ok(parse_line(buf)?.map(|(s, n)| (Frame::Error(s.to_string()), n))),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK => self.parse_bulk(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        match parse_line(buf)? {
            Some((s, consumed)) => {
                let n: i64 = s
                    .parse()
                    .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
                Ok(Some((Frame::Integer(n), consumed)))
            }
            None => Ok(None),
        }
    }

    /// Parses a bulk value: `$<length>\r\n<data>\r\n`
    fn parse_bulk(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let (length, header) = match parse_length(buf)? {
            Some(v) => v,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((Frame::Null, header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk value missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some((Frame::Bulk(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let (count, header) = match parse_length(buf)? {
            Some(v) => v,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((Frame::Null, header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Cap the preallocation; a hostile count must not reserve memory up front.
        let mut elements = Vec::with_capacity(count.min(64));
        let mut consumed = header;

        self.depth += 1;
        for _ in 0..count {
            if consumed >= buf.len() {
                return Ok(None);
            }
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((Frame::Array(elements), consumed)))
    }
}

/// Reads a `<prefix><text>\r\n` line, returning the text and bytes consumed.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((s, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Reads the `<prefix><length>\r\n` header of a bulk value or array.
fn parse_length(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match parse_line(buf)? {
        Some((s, consumed)) => {
            let n: i64 = s
                .parse()
                .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
            Ok(Some((n, consumed)))
        }
        None => Ok(None),
    }
}

/// Position of the `\r` of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single frame from bytes with a fresh parser.
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    FrameParser::new().parse(buf)
}
