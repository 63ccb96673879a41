//! Command results and their redis-cli style rendering

use bytes::Bytes;
use std::fmt;

/// Result of running a [`Command`](super::Command)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Nil,
    Integer(i64),
    Bulk(Bytes),
    Bool(bool),
    Keys(Vec<String>),
    Pong,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(value) => write!(f, "{:?}", String::from_utf8_lossy(value)),
            Reply::Bool(b) => write!(f, "(integer) {}", *b as i64),
            Reply::Keys(keys) if keys.is_empty() => write!(f, "(empty array)"),
            Reply::Keys(keys) => {
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {:?}", i + 1, key)?;
                }
                Ok(())
            }
            Reply::Pong => write!(f, "PONG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Reply::Ok.to_string(), "OK");
        assert_eq!(Reply::Nil.to_string(), "(nil)");
        assert_eq!(Reply::Integer(2).to_string(), "(integer) 2");
        assert_eq!(Reply::Bool(true).to_string(), "(integer) 1");
        assert_eq!(Reply::Bulk(Bytes::from("alice")).to_string(), "\"alice\"");
        assert_eq!(Reply::Keys(Vec::new()).to_string(), "(empty array)");
        assert_eq!(
            Reply::Keys(vec!["a".to_string(), "ab".to_string()]).to_string(),
            "1) \"a\"\n2) \"ab\""
        );
    }
}
