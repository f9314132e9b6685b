//! RESP2 parser and encoder
//!
//! Parsing works on a borrowed view of the read buffer and only advances
//! the buffer once a complete frame is available, so partially received
//! frames are left untouched for the next read.

use super::types::{RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Upper bound on a single bulk string (512 MiB, as Redis)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Upper bound on the element count of one array
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Upper bound on an inline command line without its newline
const MAX_INLINE_LEN: usize = 64 * 1024;

/// Arrays nested deeper than this are rejected instead of recursed into
const MAX_DEPTH: usize = 32;

/// RESP2 Parser
pub struct RespParser;

impl RespParser {
    /// Parse a RESP value from a buffer
    ///
    /// Returns Ok(Some(value)) if a complete value was parsed,
    /// Ok(None) if more data is needed,
    /// Err(e) if parsing failed
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }

        match Self::parse_at(buf, 0, 0)? {
            Some((value, consumed)) => {
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Parse the frame starting at `pos`, returning it with the position just past it
    fn parse_at(buf: &[u8], pos: usize, depth: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        if pos >= buf.len() {
            return Ok(None);
        }

        match buf[pos] {
            b'+' => Ok(Self::line(buf, pos)?.map(|(line, next)| {
                (RespValue::SimpleString(String::from_utf8_lossy(line).into_owned()), next)
            })),
            b'-' => Ok(Self::line(buf, pos)?.map(|(line, next)| {
                (RespValue::Error(String::from_utf8_lossy(line).into_owned()), next)
            })),
            b':' => match Self::line(buf, pos)? {
                Some((line, next)) => Ok(Some((RespValue::Integer(Self::number(line)?), next))),
                None => Ok(None),
            },
            b'$' => Self::parse_bulk_string(buf, pos),
            b'*' => Self::parse_array(buf, pos, depth),
            _ if pos == 0 => Self::parse_inline(buf),
            other => Err(RespError::InvalidProtocol(format!(
                "Unknown type prefix: {}",
                other as char
            ))),
        }
    }

    /// Bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    fn parse_bulk_string(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let (line, data_start) = match Self::line(buf, pos)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let len = Self::number(line)?;
        if len == -1 {
            return Ok(Some((RespValue::Null, data_start)));
        }
        if len < 0 || len as usize > MAX_BULK_LEN {
            return Err(RespError::InvalidProtocol(format!(
                "Invalid bulk string length: {}",
                len
            )));
        }

        let data_end = data_start + len as usize;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != CRLF {
            return Err(RespError::InvalidProtocol(
                "Missing CRLF after bulk string data".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((RespValue::BulkString(data), data_end + 2)))
    }

    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    fn parse_array(buf: &[u8], pos: usize, depth: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        if depth >= MAX_DEPTH {
            return Err(RespError::InvalidProtocol(format!(
                "Arrays nested deeper than {}",
                MAX_DEPTH
            )));
        }

        let (line, mut next) = match Self::line(buf, pos)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let count = Self::number(line)?;
        if count == -1 {
            return Ok(Some((RespValue::Null, next)));
        }
        if !(0..=MAX_ARRAY_LEN).contains(&count) {
            return Err(RespError::InvalidProtocol(format!(
                "Invalid array count: {}",
                count
            )));
        }

        let mut elements = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            match Self::parse_at(buf, next, depth + 1)? {
                Some((value, after)) => {
                    elements.push(value);
                    next = after;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), next)))
    }

    /// Inline command: `SET foo bar\r\n`, as typed in telnet
    fn parse_inline(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        let end = match buf.iter().position(|&b| b == b'\n') {
            Some(end) => end,
            None if buf.len() > MAX_INLINE_LEN => {
                return Err(RespError::InvalidProtocol("too big inline request".to_string()))
            }
            None => return Ok(None),
        };
        let line = buf[..end].strip_suffix(b"\r").unwrap_or(&buf[..end]);

        let parts = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| RespValue::BulkString(Bytes::copy_from_slice(part)))
            .collect();

        Ok(Some((RespValue::Array(parts), end + 1)))
    }

    /// Header line starting at `pos` without its type byte, and the position after its CRLF
    fn line(buf: &[u8], pos: usize) -> Result<Option<(&[u8], usize)>, RespError> {
        match buf[pos..].windows(2).position(|w| w == CRLF) {
            Some(offset) => Ok(Some((&buf[pos + 1..pos + offset], pos + offset + 2))),
            None => Ok(None),
        }
    }

    fn number(line: &[u8]) -> Result<i64, RespError> {
        std::str::from_utf8(line)
            .map_err(|_| RespError::InvalidUtf8)?
            .parse::<i64>()
            .map_err(|_| RespError::IntegerOverflow)
    }
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a command line as an array of bulk strings
    pub fn encode_cmd_line(buf: &mut BytesMut, args: &[Bytes]) {
        buf.put_u8(b'*');
        buf.put_slice(args.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for arg in args {
            Self::put_bulk(buf, arg);
        }
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => Self::put_bulk(buf, bytes),
            RespValue::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            RespValue::Array(arr) => {
                buf.put_u8(b'*');
                buf.put_slice(arr.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
            RespValue::NoReply => {}
        }
    }

    fn put_bulk(buf: &mut BytesMut, bytes: &[u8]) {
        buf.put_u8(b'$');
        buf.put_slice(bytes.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(bytes);
        buf.put_slice(CRLF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let mut buf = BytesMut::from("+OK\r\n");
        let result = RespParser::parse(&mut buf).unwrap();
        assert_eq!(result, Some(RespValue::SimpleString("OK".to_string())));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let mut buf = BytesMut::from("-ERR bad thing\r\n");
        let result = RespParser::parse(&mut buf).unwrap();
        assert_eq!(result, Some(RespValue::Error("ERR bad thing".to_string())));
    }

    #[test]
    fn test_parse_null() {
        let mut buf = BytesMut::from("$-1\r\n");
        let result = RespParser::parse(&mut buf).unwrap();
        assert_eq!(result, Some(RespValue::Null));
    }

    #[test]
    fn test_parse_array() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        let result = RespParser::parse(&mut buf).unwrap();
        assert_eq!(
            result,
            Some(RespValue::Array(vec![
                RespValue::BulkString(Bytes::from("foo")),
                RespValue::BulkString(Bytes::from("bar")),
            ]))
        );
    }

    #[test]
    fn test_partial_array_leaves_buffer_untouched() {
        let mut buf = BytesMut::from("*2\r\n$3\r\nfoo\r\n$3\r\nba");
        assert_eq!(RespParser::parse(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 19);

        buf.extend_from_slice(b"r\r\n+PONG\r\n");
        assert!(matches!(RespParser::parse(&mut buf).unwrap(), Some(RespValue::Array(_))));
        assert_eq!(
            RespParser::parse(&mut buf).unwrap(),
            Some(RespValue::simple_string("PONG"))
        );
    }

    #[test]
    fn test_parse_inline_command() {
        let mut buf = BytesMut::from("SET  foo bar\r\n");
        let result = RespParser::parse(&mut buf).unwrap().unwrap();
        assert_eq!(
            result,
            RespValue::multi_bulk([Bytes::from("SET"), Bytes::from("foo"), Bytes::from("bar")])
        );
    }

    #[test]
    fn test_deeply_nested_array_rejected() {
        let mut buf = BytesMut::new();
        for _ in 0..200_000 {
            buf.extend_from_slice(b"*1\r\n");
        }
        buf.extend_from_slice(b"$1\r\nx\r\n");
        assert!(matches!(
            RespParser::parse(&mut buf),
            Err(RespError::InvalidProtocol(_))
        ));
    }

    #[test]
    fn test_nesting_within_limit_parses() {
        let mut buf = BytesMut::from("*1\r\n*1\r\n*1\r\n:7\r\n");
        let value = RespParser::parse(&mut buf).unwrap().unwrap();
        let inner = RespValue::array(vec![RespValue::array(vec![RespValue::integer(7)])]);
        assert_eq!(value, RespValue::array(vec![inner]));
    }

    #[test]
    fn test_huge_array_count_rejected() {
        let mut buf = BytesMut::from("*99999999999\r\n");
        assert!(RespParser::parse(&mut buf).is_err());
    }

    #[test]
    fn test_endless_inline_line_rejected() {
        let mut buf = BytesMut::from(&vec![b'a'; MAX_INLINE_LEN][..]);
        assert_eq!(RespParser::parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"aa");
        assert!(RespParser::parse(&mut buf).is_err());
    }

    #[test]
    fn test_bad_bulk_terminator() {
        let mut buf = BytesMut::from("$3\r\nfooXY");
        assert!(RespParser::parse(&mut buf).is_err());
    }

    #[test]
    fn test_encode_cmd_line() {
        let mut buf = BytesMut::new();
        RespEncoder::encode_cmd_line(&mut buf, &[Bytes::from("GET"), Bytes::from("k")]);
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    #[test]
    fn test_encode_replies() {
        assert_eq!(RespEncoder::encode(&RespValue::ok()), Bytes::from("+OK\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::integer(-3)), Bytes::from(":-3\r\n"));
        assert_eq!(
            RespEncoder::encode(&RespValue::bulk_string("foobar")),
            Bytes::from("$6\r\nfoobar\r\n")
        );
    }
}
