//! Reply Values and Their Wire Encoding
//!
//! Every reply the dispatcher produces is a [`RespValue`]. Encoding follows
//! the RESP framing clients expect:
//!
//! | Kind            | Bytes                          |
//! |-----------------|--------------------------------|
//! | status          | `+OK\r\n`                      |
//! | error           | `-ERR no such key\r\n`         |
//! | integer         | `:1\r\n`                       |
//! | bulk (present)  | `$3\r\nbar\r\n`                |
//! | bulk (absent)   | `$-1\r\n`                      |
//! | array           | `*2\r\n$1\r\na\r\n$1\r\nb\r\n` |

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Line terminator shared by requests and replies.
pub const CRLF: &[u8] = b"\r\n";

/// Leading marker bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply sent back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status line, must not contain CRLF.
    SimpleString(String),

    /// Error line, must not contain CRLF.
    Error(String),

    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    BulkString(Bytes),

    /// The absent bulk string, `$-1\r\n`.
    Null,

    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `+PONG`
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Encodes the reply into a freshly allocated buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire form of this reply to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => write_status(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_status(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.encode_into(buf);
                }
            }
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            RespValue::BulkString(data) => data.len() + 16,
            RespValue::Array(values) => 16 + values.len() * 16,
            _ => 32,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// Returns true if `body` can travel in a `+` or `-` line as is.
pub fn is_line_safe(body: &[u8]) -> bool {
    !body.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// Writes a status or error line. Stray CR or LF bytes become spaces so the
/// reply stays a single line on the wire.
fn write_status(buf: &mut BytesMut, marker: u8, body: &[u8]) {
    if is_line_safe(body) {
        return write_line(buf, marker, body);
    }
    buf.reserve(body.len() + 3);
    buf.put_u8(marker);
    buf.extend(body.iter().map(|&b| if b == b'\r' || b == b'\n' { b' ' } else { b }));
    buf.put_slice(CRLF);
}

#[inline]
fn write_line(buf: &mut BytesMut, marker: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.put_u8(marker);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_error_lines() {
        assert_eq!(&RespValue::ok().encode()[..], b"+OK\r\n");
        assert_eq!(&RespValue::pong().encode()[..], b"+PONG\r\n");
        assert_eq!(&RespValue::simple_string("string").encode()[..], b"+string\r\n");
        assert_eq!(
            &RespValue::error("ERR no such key").encode()[..],
            b"-ERR no such key\r\n"
        );
    }

    #[test]
    fn test_status_line_never_splits() {
        assert!(is_line_safe(b"plain text"));
        assert!(!is_line_safe(b"a\r\n:999"));

        assert_eq!(
            &RespValue::simple_string("a\r\n:999").encode()[..],
            b"+a  :999\r\n"
        );
        assert_eq!(
            &RespValue::error("ERR bad\nline").encode()[..],
            b"-ERR bad line\r\n"
        );
    }

    #[test]
    fn test_integer_encoding() {
        assert_eq!(&RespValue::integer(1).encode()[..], b":1\r\n");
        assert_eq!(&RespValue::integer(0).encode()[..], b":0\r\n");
        assert_eq!(&RespValue::integer(-7).encode()[..], b":-7\r\n");
    }

    #[test]
    fn test_bulk_string_encoding() {
        assert_eq!(&RespValue::bulk_string("bar").encode()[..], b"$3\r\nbar\r\n");
        assert_eq!(&RespValue::bulk_string("").encode()[..], b"$0\r\n\r\n");
        assert_eq!(
            &RespValue::bulk_string(Bytes::from_static(b"a\r\nb")).encode()[..],
            b"$4\r\na\r\nb\r\n"
        );
    }

    #[test]
    fn test_absent_bulk_encoding() {
        assert_eq!(&RespValue::null().encode()[..], b"$-1\r\n");
    }

    #[test]
    fn test_array_encoding() {
        let keys = RespValue::array(vec![
            RespValue::bulk_string("foo"),
            RespValue::bulk_string("ab"),
        ]);
        assert_eq!(&keys.encode()[..], b"*2\r\n$3\r\nfoo\r\n$2\r\nab\r\n");
        assert_eq!(&RespValue::array(vec![]).encode()[..], b"*0\r\n");
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::new();
        RespValue::ok().encode_into(&mut buf);
        RespValue::integer(3).encode_into(&mut buf);
        assert_eq!(&buf[..], b"+OK\r\n:3\r\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(RespValue::null().to_string(), "(nil)");
        assert_eq!(RespValue::integer(2).to_string(), "(integer) 2");
        assert_eq!(RespValue::array(vec![]).to_string(), "(empty array)");
    }
}
