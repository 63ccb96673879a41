//! Process-local cache backend
//!
//! A cloneable handle to one `MemoryStore` behind a single mutex. Every
//! operation holds the lock from start to finish, so callers on any thread
//! observe operations one at a time.

use super::CacheBackend;
use crate::error::CacheResult;
use crate::store::{Clock, MemoryStore, StoreStats};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe handle to an in-memory store
///
/// Clones share the same store. Separate calls to [`LocalCache::new`] give
/// fully independent stores.
#[derive(Debug, Clone, Default)]
pub struct LocalCache {
    store: Arc<Mutex<MemoryStore>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::from_store(MemoryStore::new())
    }

    /// A cache whose expiry decisions read time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_store(MemoryStore::with_clock(clock))
    }

    pub fn from_store(store: MemoryStore) -> Self {
        LocalCache {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<Duration>) -> bool {
        self.store.lock().set(key, value, ttl)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.store.lock().get(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.store.lock().exists(key)
    }

    /// Delete keys as one locked operation, returning how many existed
    pub fn delete<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.store.lock().delete(keys)
    }

    pub fn flush_all(&self) -> bool {
        self.store.lock().flush_all()
    }

    pub fn keys(&self, pattern: &str) -> Vec<String> {
        self.store.lock().keys(pattern)
    }

    pub fn purge_expired(&self) -> usize {
        self.store.lock().purge_expired()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.lock().stats()
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<bool> {
        Ok(LocalCache::set(self, key, value, ttl))
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        Ok(LocalCache::get(self, key))
    }

    async fn delete(&self, keys: &[&str]) -> CacheResult<usize> {
        Ok(LocalCache::delete(self, keys))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(LocalCache::exists(self, key))
    }

    async fn flush_all(&self) -> CacheResult<bool> {
        Ok(LocalCache::flush_all(self))
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        Ok(LocalCache::keys(self, pattern))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
