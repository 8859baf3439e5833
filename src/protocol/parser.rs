//! Incremental RESP Parser
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes used
//! - `Ok(None)` - the message is incomplete, wait for more data
//! - `Err(ParseError)` - invalid protocol data
//!
//! Besides RESP arrays it accepts inline commands (`SET a 1\r\n`), which is
//! what you get when typing into `telnet` or `nc`.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8 in header line")]
    InvalidUtf8,

    /// Negative length other than -1
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// A RESP protocol parser.
///
/// # Example
///
/// ```
/// use driftkv::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap().unwrap();
/// assert_eq!(consumed, 23);
/// assert!(matches!(value, RespValue::Array(_)));
/// ```
#[derive(Debug, Default)]
pub struct RespParser;

impl RespParser {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to parse one RESP value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        parse_value(buf, 0)
    }
}

/// Convenience wrapper around [`RespParser::parse`].
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::ProtocolError(format!(
            "maximum nesting depth exceeded: {}",
            MAX_NESTING_DEPTH
        )));
    }

    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    if !is_type_prefix(first) {
        return parse_inline(buf, depth);
    }

    // Every typed value starts with a header line: <prefix><text>\r\n
    let Some((line, header_len)) = read_line(&buf[1..])? else {
        return Ok(None);
    };
    let header_len = header_len + 1;

    match first {
        prefix::SIMPLE_STRING => Ok(Some((RespValue::SimpleString(line.to_string()), header_len))),
        prefix::ERROR => Ok(Some((RespValue::Error(line.to_string()), header_len))),
        prefix::INTEGER => Ok(Some((RespValue::Integer(parse_int(line)?), header_len))),
        prefix::BULK_STRING => parse_bulk_body(buf, parse_int(line)?, header_len),
        _ => parse_array_body(buf, parse_int(line)?, header_len, depth),
    }
}

/// Parses the payload of `$<len>\r\n<data>\r\n` once the header is known.
fn parse_bulk_body(
    buf: &[u8],
    len: i64,
    header_len: usize,
) -> ParseResult<Option<(RespValue, usize)>> {
    if len == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    let len = checked_len(len)?;
    if len > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let end = header_len + len;
    if buf.len() < end + CRLF.len() {
        return Ok(None);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[header_len..end]);
    Ok(Some((RespValue::BulkString(data), end + CRLF.len())))
}

/// Parses the elements of `*<count>\r\n...` once the header is known.
fn parse_array_body(
    buf: &[u8],
    count: i64,
    header_len: usize,
    depth: usize,
) -> ParseResult<Option<(RespValue, usize)>> {
    if count == -1 {
        return Ok(Some((RespValue::Null, header_len)));
    }
    let count = checked_len(count)?;

    // Cap the preallocation; a huge count with no data behind it is not
    // worth reserving memory for.
    let mut elements = Vec::with_capacity(count.min(64));
    let mut consumed = header_len;
    for _ in 0..count {
        match parse_value(&buf[consumed..], depth + 1)? {
            Some((value, used)) => {
                elements.push(value);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(elements), consumed)))
}

/// Parses an inline command: space-separated words ending in CRLF.
///
/// Blank lines are skipped, so pressing Enter in `telnet` does nothing.
fn parse_inline(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let mut offset = 0;
    loop {
        let Some((line, used)) = read_line(&buf[offset..])? else {
            return Ok(None);
        };
        offset += used;

        let parts: Vec<RespValue> = line
            .split_whitespace()
            .map(|word| RespValue::BulkString(Bytes::copy_from_slice(word.as_bytes())))
            .collect();
        if !parts.is_empty() {
            return Ok(Some((RespValue::Array(parts), offset)));
        }

        match buf.get(offset) {
            None => return Ok(None),
            Some(&next) if is_type_prefix(next) => {
                return Ok(parse_value(&buf[offset..], depth)?
                    .map(|(value, consumed)| (value, offset + consumed)));
            }
            Some(_) => continue,
        }
    }
}

fn is_type_prefix(byte: u8) -> bool {
    matches!(
        byte,
        prefix::SIMPLE_STRING | prefix::ERROR | prefix::INTEGER | prefix::BULK_STRING | prefix::ARRAY
    )
}

/// Returns the text before the first CRLF and the number of bytes up to and
/// including it, or `None` if no CRLF has arrived yet.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match buf.windows(2).position(|w| w == CRLF) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[..pos]).map_err(|_| ParseError::InvalidUtf8)?;
            Ok(Some((line, pos + CRLF.len())))
        }
        None => Ok(None),
    }
}

fn parse_int(line: &str) -> ParseResult<i64> {
    line.parse()
        .map_err(|_| ParseError::InvalidInteger(line.to_string()))
}

fn checked_len(len: i64) -> ParseResult<usize> {
    usize::try_from(len).map_err(|_| ParseError::InvalidLength(len))
}
