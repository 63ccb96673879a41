//! fallback-kv - An in-memory key-value store that stands in for Redis
//!
//! At startup the [`cache::selector`] probes the configured Redis service.
//! When it answers, every call is forwarded there; otherwise the process runs
//! against a local store with per-key expiry:
//! - `store`: the single-threaded store, its clock and key patterns
//! - `cache`: the thread-safe local cache, the Redis client and the handle
//!   that hides which one is in use
//! - `commands`: redis-cli style commands on top of the handle
//! - `protocol`: the RESP2 codec spoken to the external service

pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod store;

/// Re-export commonly used types
pub use cache::{select_backend, BackendKind, BackendSelector, Cache, CacheBackend, LocalCache};
pub use commands::{Command, CommandError, Reply};
pub use config::{CacheConfig, ConfigError, RedisEndpoint};
pub use error::{CacheError, CacheResult};
pub use store::{KeyPattern, MemoryStore};
