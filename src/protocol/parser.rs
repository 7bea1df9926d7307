//! Request Decoder
//!
//! Turns one raw request buffer into the ordered list of tokens that make up a
//! command invocation (`["SET", "foo", "bar"]`). Two grammars are accepted:
//!
//! 1. **Framed**: `*<count>\r\n` followed by `count` bulk strings, each written
//!    as `$<len>\r\n<bytes>\r\n`. This is what real Redis clients send.
//! 2. **Inline**: anything that does not start with `*` is split on runs of
//!    ASCII whitespace, so `SET foo bar` typed into a plain socket works.
//!
//! A framed request either decodes completely or not at all. Bytes after the
//! declared element count are ignored; only one command is read per buffer.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Reasons a framed request could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A header line was not closed by `\r\n`.
    #[error("missing line terminator")]
    MissingTerminator,

    /// A count or length header was not a decimal integer.
    #[error("invalid length header: {0:?}")]
    InvalidLength(String),

    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// An element did not start with `$`.
    #[error("expected '$', found {0:#04x}")]
    UnexpectedMarker(u8),

    /// The buffer ended before the declared data.
    #[error("request truncated: {parsed} of {declared} elements decoded")]
    Truncated { parsed: usize, declared: usize },

    #[error("bulk string too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest single bulk string accepted (512 MB, same as Redis).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Upper bound on the pre-allocated token vector, whatever the header claims.
const MAX_PREALLOC: usize = 1024;

/// Decodes one command from `buf`.
///
/// An empty or all-whitespace buffer yields an empty token list. A framing
/// error yields `Err`; no partially decoded tokens are returned.
pub fn parse_command(buf: &[u8]) -> ParseResult<Vec<Bytes>> {
    match buf.first() {
        None => Ok(Vec::new()),
        Some(&prefix::ARRAY) => parse_array(buf),
        Some(_) => Ok(parse_inline(buf)),
    }
}

/// Like [`parse_command`], but framing errors collapse into an empty list.
pub fn tokenize(buf: &[u8]) -> Vec<Bytes> {
    parse_command(buf).unwrap_or_default()
}

fn parse_array(buf: &[u8]) -> ParseResult<Vec<Bytes>> {
    debug_assert!(buf[0] == prefix::ARRAY);

    let (count, mut pos) = read_header(buf, 1)?;
    if count < 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }
    let declared = count as usize;

    let mut tokens = Vec::with_capacity(declared.min(MAX_PREALLOC));
    while tokens.len() < declared {
        let truncated = ParseError::Truncated {
            parsed: tokens.len(),
            declared,
        };

        match buf.get(pos) {
            None => return Err(truncated),
            Some(&prefix::BULK_STRING) => {}
            Some(&other) => return Err(ParseError::UnexpectedMarker(other)),
        }

        let (len, data_start) = read_header(buf, pos + 1)?;
        if len < 0 {
            return Err(ParseError::InvalidBulkLength(len));
        }
        let len = len as usize;
        if len > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }

        let data_end = data_start + len;
        if data_end > buf.len() {
            return Err(truncated);
        }
        if buf.get(data_end..data_end + 2) != Some(CRLF) {
            return Err(ParseError::MissingTerminator);
        }

        tokens.push(Bytes::copy_from_slice(&buf[data_start..data_end]));
        pos = data_end + 2;
    }

    Ok(tokens)
}

/// Reads a decimal header that starts at `start` and ends in CRLF.
///
/// Returns the value and the offset just past the terminator.
fn read_header(buf: &[u8], start: usize) -> ParseResult<(i64, usize)> {
    let rest = buf.get(start..).ok_or(ParseError::MissingTerminator)?;
    let end = find_crlf(rest).ok_or(ParseError::MissingTerminator)?;
    let digits = &rest[..end];

    let value = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned()))?;

    Ok((value, start + end + 2))
}

fn parse_inline(buf: &[u8]) -> Vec<Bytes> {
    buf.split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Position of the first `\r\n` in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
