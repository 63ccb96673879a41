//! Startup choice between the external service and the local store
//!
//! The selector probes the configured service once. If the probe succeeds
//! every call goes to the service for the life of the process; otherwise
//! everything runs against a local store. A failed probe is logged, never
//! returned.

use super::{Cache, CacheBackend, LocalCache, RedisCache};
use crate::config::{CacheConfig, RedisEndpoint};
use crate::error::{CacheError, CacheResult};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Key written and removed by the round-trip check
pub const PROBE_KEY: &str = "fallback-kv:probe";

const PROBE_VALUE: &[u8] = b"probe";
const PROBE_TTL: Duration = Duration::from_secs(60);

/// Write, read back and delete a throwaway key
///
/// Used to vet the external service before trusting it, and as a self-check
/// on the local store.
pub async fn verify_round_trip(backend: &dyn CacheBackend) -> CacheResult<()> {
    backend
        .set(PROBE_KEY, Bytes::from_static(PROBE_VALUE), Some(PROBE_TTL))
        .await?;

    match backend.get(PROBE_KEY).await? {
        Some(value) if value.as_ref() == PROBE_VALUE => {}
        other => {
            return Err(CacheError::UnexpectedReply {
                command: "GET",
                reply: format!("{:?}", other),
            })
        }
    }

    backend.delete(&[PROBE_KEY]).await?;
    Ok(())
}

/// Chooses the backend a [`Cache`] uses
#[derive(Debug, Clone)]
pub struct BackendSelector {
    endpoint: Option<RedisEndpoint>,
    timeout: Duration,
    local: LocalCache,
}

impl BackendSelector {
    pub fn new(config: &CacheConfig) -> Self {
        // A config that fails validation can only reach here if the caller
        // skipped it; treat that endpoint as absent
        let endpoint = match config.endpoint() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                warn!("Ignoring remote cache address: {}", e);
                None
            }
        };

        BackendSelector {
            endpoint,
            timeout: config.probe_timeout(),
            local: LocalCache::new(),
        }
    }

    /// Serve from `local` instead of a fresh store, both as the fallback and
    /// after a mid-life degradation
    pub fn with_local(mut self, local: LocalCache) -> Self {
        self.local = local;
        self
    }

    /// Skip the probe entirely
    pub fn local_only(mut self) -> Self {
        self.endpoint = None;
        self
    }

    /// Probe the service and build the cache handle
    pub async fn select(self) -> Cache {
        let Some(endpoint) = self.endpoint else {
            info!("No remote cache configured, using local store");
            return Cache::local(self.local);
        };

        match probe(endpoint.clone(), self.timeout).await {
            Ok(remote) => {
                info!("Remote cache at {} verified, using it", endpoint);
                Cache::remote(Arc::new(remote), self.local)
            }
            Err(e) => {
                warn!("Remote cache at {} unavailable ({}), using local store", endpoint, e);
                Cache::local(self.local)
            }
        }
    }
}

/// Connect and vet the external service within `timeout`
pub async fn probe(endpoint: RedisEndpoint, timeout: Duration) -> CacheResult<RedisCache> {
    let attempt = async {
        let remote = RedisCache::connect(endpoint, timeout).await?;
        remote.ping().await?;
        verify_round_trip(&remote).await?;
        Ok::<_, CacheError>(remote)
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| CacheError::Timeout)?
}

/// Probe the service described by `config` and return the cache to use
pub async fn select_backend(config: &CacheConfig) -> Cache {
    BackendSelector::new(config).select().await
}
