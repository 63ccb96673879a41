//! Textual commands against a [`Cache`]
//!
//! Turns a redis-cli style argument list (`SET session:1 alice EX 60`) into a
//! [`Command`], runs it and renders the [`Reply`]. Used by the binary for its
//! single-shot command mode.

mod reply;

pub use reply::Reply;

use crate::cache::{Cache, ALL_KEYS};
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value [EX seconds | PX milliseconds]`
    Set {
        key: String,
        value: Bytes,
        ttl: Option<Duration>,
    },
    /// `GET key`
    Get { key: String },
    /// `DEL key [key ...]`
    Del { keys: Vec<String> },
    /// `EXISTS key`
    Exists { key: String },
    /// `FLUSHALL`
    FlushAll,
    /// `KEYS [pattern]`, matching every key when the pattern is omitted
    Keys { pattern: String },
    /// `PING`
    Ping,
}

/// Why an argument list is not a valid command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No command name at all
    Empty,

    UnknownCommand(String),

    WrongArity(&'static str),

    /// Expected an integer argument
    InvalidInteger(String),

    /// Expiry of zero
    InvalidExpire(&'static str),

    /// Unrecognized or conflicting option
    Syntax(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "ERR empty command"),
            CommandError::UnknownCommand(name) => write!(f, "ERR unknown command '{}'", name),
            CommandError::WrongArity(name) => {
                write!(f, "ERR wrong number of arguments for '{}' command", name)
            }
            CommandError::InvalidInteger(raw) => {
                write!(f, "ERR value is not an integer or out of range: {:?}", raw)
            }
            CommandError::InvalidExpire(name) => {
                write!(f, "ERR invalid expire time in '{}' command", name)
            }
            CommandError::Syntax(token) => write!(f, "ERR syntax error near {:?}", token),
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    /// Parse a command line already split into words
    ///
    /// The command name is case-insensitive; keys and values are taken as is.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Command, CommandError> {
        let (name, rest) = args.split_first().ok_or(CommandError::Empty)?;
        let rest: Vec<&str> = rest.iter().map(|a| a.as_ref()).collect();

        match name.as_ref().to_ascii_uppercase().as_str() {
            "SET" => parse_set(&rest),
            "GET" => match rest.as_slice() {
                [key] => Ok(Command::Get { key: key.to_string() }),
                _ => Err(CommandError::WrongArity("get")),
            },
            "DEL" => {
                if rest.is_empty() {
                    return Err(CommandError::WrongArity("del"));
                }
                Ok(Command::Del {
                    keys: rest.iter().map(|k| k.to_string()).collect(),
                })
            }
            "EXISTS" => match rest.as_slice() {
                [key] => Ok(Command::Exists { key: key.to_string() }),
                _ => Err(CommandError::WrongArity("exists")),
            },
            "FLUSHALL" => match rest.as_slice() {
                [] => Ok(Command::FlushAll),
                _ => Err(CommandError::WrongArity("flushall")),
            },
            "KEYS" => match rest.as_slice() {
                [] => Ok(Command::Keys {
                    pattern: ALL_KEYS.to_string(),
                }),
                [pattern] => Ok(Command::Keys {
                    pattern: pattern.to_string(),
                }),
                _ => Err(CommandError::WrongArity("keys")),
            },
            "PING" => match rest.as_slice() {
                [] => Ok(Command::Ping),
                _ => Err(CommandError::WrongArity("ping")),
            },
            other => Err(CommandError::UnknownCommand(other.to_lowercase())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::FlushAll => "FLUSHALL",
            Command::Keys { .. } => "KEYS",
            Command::Ping => "PING",
        }
    }

    /// Run the command against `cache`
    pub async fn execute(&self, cache: &Cache) -> Reply {
        debug!("Executing {} on {} backend", self.name(), cache.kind());

        match self {
            Command::Set { key, value, ttl } => {
                if cache.set(key, value.clone(), *ttl).await {
                    Reply::Ok
                } else {
                    Reply::Nil
                }
            }
            Command::Get { key } => match cache.get(key).await {
                Some(value) => Reply::Bulk(value),
                None => Reply::Nil,
            },
            Command::Del { keys } => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                Reply::Integer(cache.delete(&keys).await as i64)
            }
            Command::Exists { key } => Reply::Bool(cache.exists(key).await),
            Command::FlushAll => {
                if cache.flush_all().await {
                    Reply::Ok
                } else {
                    Reply::Bool(false)
                }
            }
            Command::Keys { pattern } => {
                let mut keys = cache.keys(pattern).await;
                keys.sort_unstable();
                Reply::Keys(keys)
            }
            Command::Ping => {
                if cache.ping().await {
                    Reply::Pong
                } else {
                    Reply::Bool(false)
                }
            }
        }
    }
}

fn parse_set(args: &[&str]) -> Result<Command, CommandError> {
    let [key, value, options @ ..] = args else {
        return Err(CommandError::WrongArity("set"));
    };

    let ttl = match options {
        [] => None,
        [unit, amount] => {
            let amount: u64 = amount
                .parse()
                .map_err(|_| CommandError::InvalidInteger(amount.to_string()))?;
            if amount == 0 {
                return Err(CommandError::InvalidExpire("set"));
            }
            if unit.eq_ignore_ascii_case("EX") {
                Some(Duration::from_secs(amount))
            } else if unit.eq_ignore_ascii_case("PX") {
                Some(Duration::from_millis(amount))
            } else {
                return Err(CommandError::Syntax(unit.to_string()));
            }
        }
        [unit, ..] => return Err(CommandError::Syntax(unit.to_string())),
    };

    Ok(Command::Set {
        key: key.to_string(),
        value: Bytes::copy_from_slice(value.as_bytes()),
        ttl,
    })
}
