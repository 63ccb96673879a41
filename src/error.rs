//! Error types

use crate::protocol::RespError;
use std::fmt;

/// Errors raised by a cache backend
///
/// The local store never produces one; they come from the remote client or
/// from JSON encoding in [`Cache::set_json`](crate::cache::Cache::set_json).
#[derive(Debug)]
pub enum CacheError {
    /// Socket failure talking to the remote service
    Io(std::io::Error),

    /// The remote service sent bytes that are not valid RESP
    Protocol(RespError),

    /// The remote service answered with an error reply
    Server(String),

    /// A well-formed reply of the wrong shape for the request
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },

    /// The remote side closed the connection
    ConnectionClosed,

    /// Connecting or probing took longer than allowed
    Timeout,

    /// A value could not be encoded to or decoded from JSON
    Serialization(serde_json::Error),
}

impl CacheError {
    /// `true` when the failure means the remote service cannot be used
    /// anymore, as opposed to a rejected request or a bad value
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, CacheError::Server(_) | CacheError::Serialization(_))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "IO error: {}", e),
            CacheError::Protocol(e) => write!(f, "Protocol error: {}", e),
            CacheError::Server(msg) => write!(f, "Server error: {}", msg),
            CacheError::UnexpectedReply { command, reply } => {
                write!(f, "Unexpected reply to {}: {}", command, reply)
            }
            CacheError::ConnectionClosed => write!(f, "Connection closed by server"),
            CacheError::Timeout => write!(f, "Timed out"),
            CacheError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(e) => Some(e),
            CacheError::Protocol(e) => Some(e),
            CacheError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e)
    }
}

impl From<RespError> for CacheError {
    fn from(e: RespError) -> Self {
        CacheError::Protocol(e)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e)
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
