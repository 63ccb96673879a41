//! RESP2 protocol implementation
//!
//! Frame types plus an incremental parser and an encoder. Used by the remote
//! client to talk to the external cache service.

mod types;
mod resp;

pub use types::{RespValue, RespError};
pub use resp::{RespParser, RespEncoder};
