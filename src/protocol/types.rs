//! RESP2 value types
//!
//! Defines the replies produced by the node and the command lines it consumes.

use bytes::Bytes;
use std::fmt;

use super::resp::RespEncoder;

/// A command line: the command name followed by its arguments
pub type CmdLine = Vec<Bytes>;

/// Build a command line from anything viewable as bytes
pub fn cmd_line<I, T>(parts: I) -> CmdLine
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    parts
        .into_iter()
        .map(|part| Bytes::copy_from_slice(part.as_ref()))
        .collect()
}

/// RESP2 value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple strings: +OK\r\n
    SimpleString(String),

    /// Errors: -Error message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n
    BulkString(Bytes),

    /// Null bulk string: $-1\r\n
    Null,

    /// Arrays: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),

    /// Nothing is written back to the client
    NoReply,
}

impl RespValue {
    /// Create a simple string
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// The `+OK` acknowledgement
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Create an error
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Error returned when a command is called with a bad argument count
    pub fn wrong_arity(cmd_name: &str) -> Self {
        RespValue::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            cmd_name
        ))
    }

    /// Error substituted for an internal fault
    pub fn unknown_error() -> Self {
        RespValue::Error("ERR unknown".to_string())
    }

    /// Create an integer
    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Create a null value
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Create an array
    pub fn array(v: Vec<RespValue>) -> Self {
        RespValue::Array(v)
    }

    /// Array of bulk strings
    pub fn multi_bulk<I: IntoIterator<Item = Bytes>>(items: I) -> Self {
        RespValue::Array(items.into_iter().map(RespValue::BulkString).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RespValue::SimpleString(s) if s == "OK")
    }

    /// Try to extract array elements
    pub fn as_array(&self) -> Option<&Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to extract bulk string bytes
    pub fn as_bulk_string(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Try to extract integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert a request frame into a command line
    ///
    /// Requests are non-empty arrays of bulk strings. Returns the offending
    /// value back when the frame has any other shape.
    pub fn into_cmd_line(self) -> Result<CmdLine, RespValue> {
        match self {
            RespValue::Array(parts) if !parts.is_empty() => {
                if !parts.iter().all(|p| matches!(p, RespValue::BulkString(_))) {
                    return Err(RespValue::Array(parts));
                }
                Ok(parts
                    .into_iter()
                    .filter_map(|p| match p {
                        RespValue::BulkString(b) => Some(b),
                        _ => None,
                    })
                    .collect())
            }
            other => Err(other),
        }
    }

    /// Wire encoding of this reply
    pub fn to_bytes(&self) -> Bytes {
        RespEncoder::encode(self)
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "SimpleString({})", s),
            RespValue::Error(e) => write!(f, "Error({})", e),
            RespValue::Integer(i) => write!(f, "Integer({})", i),
            RespValue::BulkString(b) => write!(f, "BulkString({} bytes)", b.len()),
            RespValue::Null => write!(f, "Null"),
            RespValue::Array(arr) => write!(f, "Array({} elements)", arr.len()),
            RespValue::NoReply => write!(f, "NoReply"),
        }
    }
}

/// RESP parsing and encoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum RespError {
    /// Invalid protocol format
    InvalidProtocol(String),

    /// Invalid UTF-8 in string
    InvalidUtf8,

    /// Integer overflow
    IntegerOverflow,
}

impl fmt::Display for RespError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespError::InvalidProtocol(msg) => write!(f, "Invalid protocol: {}", msg),
            RespError::InvalidUtf8 => write!(f, "Invalid UTF-8"),
            RespError::IntegerOverflow => write!(f, "Integer overflow"),
        }
    }
}

impl std::error::Error for RespError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_cmd_line() {
        let frame = RespValue::array(vec![
            RespValue::bulk_string("SET"),
            RespValue::bulk_string("k"),
            RespValue::bulk_string("v"),
        ]);
        assert_eq!(frame.into_cmd_line().unwrap(), cmd_line(["SET", "k", "v"]));
    }

    #[test]
    fn test_into_cmd_line_rejects_non_bulk() {
        let frame = RespValue::array(vec![RespValue::bulk_string("GET"), RespValue::integer(1)]);
        assert!(frame.into_cmd_line().is_err());
        assert!(RespValue::array(vec![]).into_cmd_line().is_err());
        assert!(RespValue::simple_string("PING").into_cmd_line().is_err());
    }

    #[test]
    fn test_cmd_line_from_borrowed_parts() {
        let key = format!("user:{}", 42);
        let line = {
            let value = String::from("v");
            cmd_line(["SET", key.as_str(), value.as_str()])
        };
        assert_eq!(line, vec![Bytes::from("SET"), Bytes::from("user:42"), Bytes::from("v")]);
    }

    #[test]
    fn test_no_reply_is_silent() {
        assert!(RespValue::NoReply.to_bytes().is_empty());
    }
}
