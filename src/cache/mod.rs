//! Cache backends and the handle callers use
//!
//! Two implementations share the [`CacheBackend`] surface: [`LocalCache`]
//! (in-process, never fails) and [`RedisCache`] (the external service). The
//! [`selector`] decides once, at startup, which one a [`Cache`] forwards to.

mod local;
mod redis;
pub mod selector;
mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use local::LocalCache;
pub use redis::RedisCache;
pub use selector::{select_backend, verify_round_trip, BackendSelector};
pub use sweeper::spawn_sweeper;

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Pattern matching every key
pub const ALL_KEYS: &str = "*";

/// Operation surface shared by every backend
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store `value`, replacing any previous value and TTL
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<bool>;

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Returns the number of keys that were actually removed
    async fn delete(&self, keys: &[&str]) -> CacheResult<usize>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    async fn flush_all(&self) -> CacheResult<bool>;

    /// Keys matching `*`, `prefix*` or an exact name, in no particular order
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    async fn ping(&self) -> CacheResult<bool> {
        Ok(true)
    }

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Which backend a [`Cache`] is currently serving from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// The cache as seen by the rest of the application
///
/// Forwards to the remote backend chosen at startup, if any. When the remote
/// side fails with a connectivity error the handle logs it, switches to its
/// local store for good and answers from there, so callers never see the
/// failure. Only the JSON helpers return errors, and only for values that do
/// not encode or decode.
pub struct Cache {
    remote: Option<Arc<dyn CacheBackend>>,
    local: LocalCache,
    degraded: AtomicBool,
}

impl Cache {
    /// A cache that only ever uses `local`
    pub fn local(local: LocalCache) -> Self {
        Cache {
            remote: None,
            local,
            degraded: AtomicBool::new(false),
        }
    }

    /// A cache forwarding to `remote`, with `local` kept as the fallback
    pub fn remote(remote: Arc<dyn CacheBackend>, local: LocalCache) -> Self {
        Cache {
            remote: Some(remote),
            local,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self.active_remote() {
            Some(_) => BackendKind::Remote,
            None => BackendKind::Local,
        }
    }

    /// The fallback store, whether or not it is currently in use
    pub fn local_store(&self) -> &LocalCache {
        &self.local
    }

    pub async fn set(&self, key: &str, value: impl Into<Bytes>, ttl: Option<Duration>) -> bool {
        let value = value.into();
        if let Some(remote) = self.active_remote() {
            match remote.set(key, value.clone(), ttl).await {
                Ok(stored) => return stored,
                Err(e) => {
                    if !self.fall_back("SET", &e) {
                        return false;
                    }
                }
            }
        }
        self.local.set(key, value, ttl)
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if let Some(remote) = self.active_remote() {
            match remote.get(key).await {
                Ok(value) => return value,
                Err(e) => {
                    if !self.fall_back("GET", &e) {
                        return None;
                    }
                }
            }
        }
        self.local.get(key)
    }

    pub async fn delete(&self, keys: &[&str]) -> usize {
        if let Some(remote) = self.active_remote() {
            match remote.delete(keys).await {
                Ok(count) => return count,
                Err(e) => {
                    if !self.fall_back("DEL", &e) {
                        return 0;
                    }
                }
            }
        }
        self.local.delete(keys)
    }

    pub async fn exists(&self, key: &str) -> bool {
        if let Some(remote) = self.active_remote() {
            match remote.exists(key).await {
                Ok(found) => return found,
                Err(e) => {
                    if !self.fall_back("EXISTS", &e) {
                        return false;
                    }
                }
            }
        }
        self.local.exists(key)
    }

    pub async fn flush_all(&self) -> bool {
        if let Some(remote) = self.active_remote() {
            match remote.flush_all().await {
                Ok(done) => return done,
                Err(e) => {
                    if !self.fall_back("FLUSHALL", &e) {
                        return false;
                    }
                }
            }
        }
        self.local.flush_all()
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if let Some(remote) = self.active_remote() {
            match remote.keys(pattern).await {
                Ok(keys) => return keys,
                Err(e) => {
                    if !self.fall_back("KEYS", &e) {
                        return Vec::new();
                    }
                }
            }
        }
        self.local.keys(pattern)
    }

    pub async fn ping(&self) -> bool {
        if let Some(remote) = self.active_remote() {
            match remote.ping().await {
                Ok(alive) => return alive,
                Err(e) => {
                    if !self.fall_back("PING", &e) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Store `value` encoded as JSON
    pub async fn set_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_vec(value)?;
        Ok(self.set(key, encoded, ttl).await)
    }

    /// Fetch and decode a JSON value stored with [`Cache::set_json`]
    pub async fn get_json<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(key).await {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn active_remote(&self) -> Option<&Arc<dyn CacheBackend>> {
        if self.degraded.load(Ordering::Acquire) {
            return None;
        }
        self.remote.as_ref()
    }

    /// Decide what to do after a remote failure
    ///
    /// Connectivity failures switch this handle to the local store and return
    /// `true` so the call is served locally. Anything else (an error reply for
    /// this particular request) returns `false` and the call reports its empty
    /// result.
    fn fall_back(&self, command: &'static str, err: &CacheError) -> bool {
        if !err.is_connectivity() {
            warn!("Remote cache rejected {}: {}", command, err);
            return false;
        }

        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                "Remote cache failed during {} ({}), switching to local store",
                command, err
            );
        }
        true
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("kind", &self.kind())
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("degraded", &self.degraded.load(Ordering::Relaxed))
            .finish()
    }
}
