//! Configuration for reaching the external cache service
//!
//! Values come from the process environment (after loading a `.env` file if
//! one exists) or from a JSON file. Missing values fall back to defaults; a
//! value that is present but malformed is a [`ConfigError`], which the binary
//! treats as fatal. Whether the service is actually reachable is not a
//! configuration concern.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `redis://[user:pass@]host[:port][/db]`, takes precedence over host/port
    pub redis_url: Option<String>,

    pub redis_host: String,

    pub redis_port: u16,

    /// Upper bound for connecting plus the probe round trip
    pub probe_timeout_ms: u64,

    /// Period of the expired-key sweep; `None` keeps eviction purely lazy
    pub sweep_interval_secs: Option<u64>,

    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            redis_url: None,
            redis_host: DEFAULT_HOST.to_string(),
            redis_port: DEFAULT_PORT,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            sweep_interval_secs: None,
            log_level: "info".to_string(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized variables:
    /// - `REDIS_URL`
    /// - `REDIS_HOST` (default: `localhost`)
    /// - `REDIS_PORT` (default: `6379`)
    /// - `CACHE_PROBE_TIMEOUT_MS` (default: `2000`)
    /// - `CACHE_SWEEP_INTERVAL_SECS` (default: unset)
    /// - `LOG_LEVEL` (default: `info`)
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CacheConfig::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = CacheConfig {
            redis_url: var("REDIS_URL"),
            redis_host: var("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parse_var(&var, "REDIS_PORT")?.unwrap_or(defaults.redis_port),
            probe_timeout_ms: parse_var(&var, "CACHE_PROBE_TIMEOUT_MS")?
                .unwrap_or(defaults.probe_timeout_ms),
            sweep_interval_secs: parse_var(&var, "CACHE_SWEEP_INTERVAL_SECS")?,
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: CacheConfig = serde_json::from_str(&raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: "CACHE_PROBE_TIMEOUT_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                var: "CACHE_SWEEP_INTERVAL_SECS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.endpoint().map(|_| ())
    }

    /// Resolve where the external service lives
    pub fn endpoint(&self) -> Result<RedisEndpoint, ConfigError> {
        match &self.redis_url {
            Some(url) => RedisEndpoint::parse(url),
            None => {
                if self.redis_host.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        var: "REDIS_HOST".to_string(),
                        reason: "cannot be empty".to_string(),
                    });
                }
                Ok(RedisEndpoint {
                    host: self.redis_host.clone(),
                    port: self.redis_port,
                    username: None,
                    password: None,
                    db: None,
                })
            }
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

fn parse_var<T, F>(var: F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                var: name.to_string(),
                reason: format!("{:?}: {}", raw, e),
            }),
        None => Ok(None),
    }
}

/// Network location and credentials of the external service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisEndpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: Option<u32>,
}

impl RedisEndpoint {
    /// Parse a `redis://` connection URL
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let rest = url
            .strip_prefix("redis://")
            .ok_or_else(|| invalid("scheme must be redis://"))?;

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (
                    Some(user.to_string()).filter(|u| !u.is_empty()),
                    Some(pass.to_string()),
                ),
                None => (Some(info.to_string()).filter(|u| !u.is_empty()), None),
            },
            None => (None, None),
        };

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(invalid("unexpected characters after host")),
            }
        } else {
            match hostport.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (hostport, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None => DEFAULT_PORT,
        };

        let db = match path.trim_matches('/') {
            "" => None,
            db => Some(db.parse::<u32>().map_err(|_| invalid("invalid database index"))?),
        };

        Ok(RedisEndpoint {
            host: host.to_string(),
            port,
            username,
            password,
            db,
        })
    }

    /// `host:port` suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for RedisEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Credentials stay out of logs
        write!(f, "redis://{}", self.address())?;
        if let Some(db) = self.db {
            write!(f, "/{}", db)?;
        }
        Ok(())
    }
}

/// Configuration errors, fatal at startup
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { var: String, reason: String },
    InvalidUrl { url: String, reason: String },
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { var, reason } => {
                write!(f, "Invalid value for {}: {}", var, reason)
            }
            ConfigError::InvalidUrl { url, reason } => {
                write!(f, "Invalid connection URL {:?}: {}", url, reason)
            }
            ConfigError::Io(e) => write!(f, "Cannot read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Cannot parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}
