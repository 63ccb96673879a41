//! RESP2 parser and encoder
//!
//! The parser works on a growing `BytesMut` read buffer: a frame is only
//! consumed once it is complete, so the caller can keep reading from the
//! socket and retry.

use super::types::{RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// RESP2 parser
pub struct RespParser;

impl RespParser {
    /// Parse one frame from the front of `buf`
    ///
    /// Returns `Ok(Some(frame))` and advances `buf` past it when a full frame
    /// is available, `Ok(None)` without touching `buf` when more bytes are
    /// needed.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        match Self::frame_at(&buf[..], 0)? {
            Some((value, consumed)) => {
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decode the frame starting at `pos`, returning it with the offset just
    /// past its end
    fn frame_at(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let Some(&prefix) = buf.get(pos) else {
            return Ok(None);
        };
        let Some((line, next)) = Self::line_at(buf, pos + 1) else {
            return Ok(None);
        };

        match prefix {
            b'+' => {
                let s = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
                Ok(Some((RespValue::SimpleString(s.to_string()), next)))
            }
            b'-' => {
                let s = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
                Ok(Some((RespValue::Error(s.to_string()), next)))
            }
            b':' => Ok(Some((RespValue::Integer(Self::integer(line)?), next))),
            b'$' => {
                let len = Self::integer(line)?;
                if len == -1 {
                    return Ok(Some((RespValue::Null, next)));
                }
                if len < 0 {
                    return Err(RespError::InvalidProtocol(format!(
                        "Invalid bulk string length: {}",
                        len
                    )));
                }

                let end = next
                    .checked_add(len as usize)
                    .ok_or_else(|| RespError::InvalidProtocol(format!("Bulk string too long: {}", len)))?;
                if buf.len() < end + CRLF.len() {
                    return Ok(None);
                }
                if &buf[end..end + CRLF.len()] != CRLF {
                    return Err(RespError::InvalidProtocol(
                        "Missing CRLF after bulk string data".to_string(),
                    ));
                }

                let data = Bytes::copy_from_slice(&buf[next..end]);
                Ok(Some((RespValue::BulkString(data), end + CRLF.len())))
            }
            b'*' => {
                let count = Self::integer(line)?;
                if count == -1 {
                    return Ok(Some((RespValue::Null, next)));
                }
                if count < 0 {
                    return Err(RespError::InvalidProtocol(format!(
                        "Invalid array count: {}",
                        count
                    )));
                }

                // Every element takes at least one byte, so never reserve more
                // than the buffer could hold
                let mut elements = Vec::with_capacity((count as usize).min(buf.len() - next));
                let mut cursor = next;
                for _ in 0..count {
                    match Self::frame_at(buf, cursor)? {
                        Some((value, after)) => {
                            elements.push(value);
                            cursor = after;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((RespValue::Array(elements), cursor)))
            }
            other => Err(RespError::InvalidProtocol(format!(
                "Unknown type prefix: {}",
                other as char
            ))),
        }
    }

    /// Find the CRLF-terminated line starting at `pos`
    fn line_at(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
        let rest = buf.get(pos..)?;
        let idx = rest.windows(CRLF.len()).position(|w| w == CRLF)?;
        Some((&rest[..idx], pos + idx + CRLF.len()))
    }

    fn integer(line: &[u8]) -> Result<i64, RespError> {
        let s = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
        s.parse::<i64>()
            .map_err(|_| RespError::InvalidInteger(s.to_string()))
    }
}

/// RESP2 encoder
pub struct RespEncoder;

impl RespEncoder {
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Append the wire form of `value` to `buf`
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => Self::put_line(buf, b'+', s.as_bytes()),
            RespValue::Error(e) => Self::put_line(buf, b'-', e.as_bytes()),
            RespValue::Integer(i) => Self::put_line(buf, b':', i.to_string().as_bytes()),
            RespValue::BulkString(bytes) => {
                Self::put_line(buf, b'$', bytes.len().to_string().as_bytes());
                buf.put_slice(bytes);
                buf.put_slice(CRLF);
            }
            RespValue::Null => buf.put_slice(b"$-1\r\n"),
            RespValue::Array(arr) => {
                Self::put_line(buf, b'*', arr.len().to_string().as_bytes());
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
        }
    }

    fn put_line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
        buf.put_u8(prefix);
        buf.put_slice(body);
        buf.put_slice(CRLF);
    }
}
