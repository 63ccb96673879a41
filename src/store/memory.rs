//! In-memory storage implementation

use super::clock::{Clock, SystemClock};
use super::pattern::KeyPattern;
use bytes::Bytes;
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hash map keyed by string with SipHasher
type StoreMap<V> = HashMap<String, V, BuildHasherDefault<SipHasher13>>;

/// In-memory key-value store with per-key expiry
///
/// Values and expiry deadlines live in two parallel maps. A key has an entry
/// in `expiries` only while it carries a TTL. Expired keys are removed lazily
/// when `get` or `exists` touches them; nothing else looks at the deadlines
/// except `purge_expired`.
///
/// This type is not synchronized. Shared access goes through
/// [`LocalCache`](crate::cache::LocalCache).
#[derive(Debug)]
pub struct MemoryStore {
    /// key -> value
    values: StoreMap<Bytes>,

    /// key -> absolute deadline
    expiries: StoreMap<Instant>,

    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a new memory store with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new memory store with specified initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(capacity, Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(1024, clock)
    }

    fn build(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            values: HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            ),
            expiries: HashMap::with_capacity_and_hasher(
                capacity / 4,
                BuildHasherDefault::<SipHasher13>::default(),
            ),
            clock,
        }
    }

    /// Store `value` under `key`, replacing whatever was there
    ///
    /// With a non-zero `ttl` the key expires `ttl` from now. Without one the
    /// key becomes permanent, dropping any deadline it had before.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<Duration>) -> bool {
        let key = key.into();

        match ttl.filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => match self.clock.now().checked_add(ttl) {
                Some(deadline) => {
                    self.expiries.insert(key.clone(), deadline);
                }
                // Too far out to represent, same as never
                None => {
                    self.expiries.remove(&key);
                }
            },
            None => {
                self.expiries.remove(&key);
            }
        }

        self.values.insert(key, value.into());
        true
    }

    /// Get a value by key, evicting it first if its deadline has passed
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        if self.is_expired(key) {
            self.values.remove(key);
            self.expiries.remove(key);
            return None;
        }

        self.values.get(key).cloned()
    }

    /// Check if a key exists (and is not expired)
    pub fn exists(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Delete keys, returning how many held a value
    pub fn delete<I, K>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut deleted = 0;

        for key in keys {
            let key = key.as_ref();
            if self.values.remove(key).is_some() {
                deleted += 1;
            }
            self.expiries.remove(key);
        }

        deleted
    }

    /// Remove all keys
    pub fn flush_all(&mut self) -> bool {
        self.values.clear();
        self.expiries.clear();
        true
    }

    /// Resident keys matching `pattern`
    ///
    /// Deadlines are not checked, so a key past its expiry that nobody has
    /// read yet is still listed.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        match KeyPattern::parse(pattern) {
            KeyPattern::Exact(key) => self
                .values
                .get_key_value(key)
                .map(|(key, _)| vec![key.clone()])
                .unwrap_or_default(),
            pattern => self
                .values
                .keys()
                .filter(|key| pattern.matches(key))
                .cloned()
                .collect(),
        }
    }

    /// Drop every key whose deadline has passed
    ///
    /// Returns the number of keys removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .expiries
            .iter()
            .filter(|(_, deadline)| now > **deadline)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.values.remove(key);
            self.expiries.remove(key);
        }

        expired.len()
    }

    /// Number of resident keys, expired or not
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        let expired_keys = self
            .expiries
            .values()
            .filter(|deadline| now > **deadline)
            .count();

        StoreStats {
            resident_keys: self.values.len(),
            volatile_keys: self.expiries.len(),
            expired_keys,
        }
    }

    fn is_expired(&self, key: &str) -> bool {
        self.expiries
            .get(key)
            .map(|deadline| self.clock.now() > *deadline)
            .unwrap_or(false)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys physically held, including expired ones not yet evicted
    pub resident_keys: usize,
    /// Keys carrying a deadline
    pub volatile_keys: usize,
    /// Keys past their deadline but still resident
    pub expired_keys: usize,
}
