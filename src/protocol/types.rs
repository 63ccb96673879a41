//! RESP2 frame types

use bytes::Bytes;
use std::fmt;

/// A single RESP2 frame
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK\r\n`
    SimpleString(String),

    /// `-ERR message\r\n`
    Error(String),

    /// `:42\r\n`
    Integer(i64),

    /// `$5\r\nhello\r\n`
    BulkString(Bytes),

    /// `$-1\r\n` (also produced for a null array `*-1\r\n`)
    Null,

    /// `*2\r\n...`
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Build a request frame: an array of bulk strings, command name first
    ///
    /// ```
    /// use fallback_kv::protocol::RespValue;
    ///
    /// let cmd = RespValue::command(["GET", "session:1"]);
    /// assert_eq!(cmd.as_array().map(|a| a.len()), Some(2));
    /// ```
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|part| RespValue::BulkString(Bytes::copy_from_slice(part.as_ref())))
                .collect(),
        )
    }

    /// `true` for the `+OK` status reply
    pub fn is_ok(&self) -> bool {
        matches!(self, RespValue::SimpleString(s) if s == "OK")
    }

    pub fn as_array(&self) -> Option<&Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_bulk_string(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(bytes) => Some(bytes),
            _ => None,
        }
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
        }
    }
}

/// Errors raised while decoding RESP2 frames
#[derive(Debug, Clone, PartialEq)]
pub enum RespError {
    /// Malformed frame
    InvalidProtocol(String),

    /// Status or error line is not valid UTF-8
    InvalidUtf8,

    /// Length or integer field could not be parsed
    InvalidInteger(String),
}

impl fmt::Display for RespError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespError::InvalidProtocol(msg) => write!(f, "Invalid protocol: {}", msg),
            RespError::InvalidUtf8 => write!(f, "Invalid UTF-8"),
            RespError::InvalidInteger(raw) => write!(f, "Invalid integer: {:?}", raw),
        }
    }
}

impl std::error::Error for RespError {}
