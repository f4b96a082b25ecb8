//! Wire Frame Types
//!
//! Every message exchanged with a client travels as a single typed frame.
//! The framing is a small, binary-safe, self-delimiting format: each frame
//! starts with a type prefix byte and ends with CRLF (`\r\n`).
//!
//! ## Frame Format
//!
//! - `+` Simple string (response kinds)
//! - `-` Error (framing-level failures only)
//! - `:` Integer (message IDs, result codes, scopes)
//! - `$` Bulk bytes (names, attribute values, credentials)
//! - `*` Array (a whole request or response, nested attribute lists)
//!
//! ## Examples
//!
//! Simple String: `+bind\r\n`
//! Integer: `:49\r\n`
//! Bulk: `$6\r\nsecret\r\n`
//! Null: `$-1\r\n`
//! Request: `*3\r\n:7\r\n$7\r\nabandon\r\n:5\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator closing every frame header
pub const CRLF: &[u8] = b"\r\n";

/// Frame type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single value on the wire.
///
/// Requests and responses are both arrays of frames; the codec module
/// maps them to typed protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Short, non-binary text such as a response kind.
    /// Format: `+<string>\r\n`
    Simple(String),

    /// Framing-level error text.
    /// Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe byte string.
    /// Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// Absent optional value (`$-1\r\n` or `*-1\r\n`)
    Null,

    /// Ordered sequence of frames, possibly nested.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<Frame>),
}

impl Frame {
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Frame::Integer(n)
    }

    /// Creates a bulk frame from anything convertible to `Bytes`.
    ///
    /// # Example
    /// ```
    /// use flashdir::protocol::Frame;
    /// let name = Frame::bulk("cn=alice,dc=enterprise,dc=org");
    /// assert_eq!(name.as_str(), Some("cn=alice,dc=enterprise,dc=org"));
    /// ```
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    pub fn array(values: Vec<Frame>) -> Self {
        Frame::Array(values)
    }

    /// Bulk frame for `Some`, null frame for `None`.
    pub fn optional(data: Option<impl Into<Bytes>>) -> Self {
        match data {
            Some(d) => Frame::Bulk(d.into()),
            None => Frame::Null,
        }
    }

    /// Serializes the frame to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the frame into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                buf.push(prefix::BULK);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::Null => {
                buf.push(prefix::BULK);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Frame::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Text view of a simple or bulk frame (bulk must be valid UTF-8).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(n) => write!(f, "{}", n),
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Frame::integer(49).serialize(), b":49\r\n");
        assert_eq!(Frame::integer(-1).serialize(), b":-1\r\n");
    }

    #[test]
    fn test_bulk_serialize_is_binary_safe() {
        let value = Frame::bulk(Bytes::from_static(b"a\x00b"));
        assert_eq!(value.serialize(), b"$3\r\na\x00b\r\n");
    }

    #[test]
    fn test_optional_serialize() {
        assert_eq!(Frame::optional(None::<Bytes>).serialize(), b"$-1\r\n");
        assert_eq!(Frame::optional(Some("x")).serialize(), b"$1\r\nx\r\n");
    }

    #[test]
    fn test_request_array_serialize() {
        let value = Frame::array(vec![
            Frame::integer(7),
            Frame::bulk("abandon"),
            Frame::integer(5),
        ]);
        assert_eq!(
            value.serialize(),
            b"*3\r\n:7\r\n$7\r\nabandon\r\n:5\r\n".to_vec()
        );
    }

    #[test]
    fn test_display_array() {
        let value = Frame::array(vec![Frame::integer(1), Frame::simple("bind")]);
        assert_eq!(value.to_string(), "[1, bind]");
    }
}
