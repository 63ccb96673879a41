//! Background sweep of expired local keys
//!
//! Lazy eviction only reclaims keys that are touched again. The sweeper is an
//! opt-in periodic pass for workloads that write many short-lived keys and
//! never read them back.

use super::LocalCache;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Spawn a task purging expired keys from `local` every `every`
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. Each pass holds the store lock for its whole duration.
pub fn spawn_sweeper(local: LocalCache, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = local.purge_expired();
            if removed > 0 {
                debug!("Swept {} expired keys, {} remain", removed, local.len());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweeps_untouched_expired_keys() {
        let clock = Arc::new(ManualClock::new());
        let local = LocalCache::with_clock(clock.clone());

        local.set("short", "v", Some(Duration::from_secs(1)));
        local.set("long", "v", Some(Duration::from_secs(60)));
        local.set("forever", "v", None);
        clock.advance(Duration::from_secs(2));

        // Nothing has read "short", so it is still resident
        assert_eq!(local.len(), 3);

        let handle = spawn_sweeper(local.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert_eq!(local.len(), 2);
        assert_eq!(local.stats().expired_keys, 0);
        assert!(local.exists("long"));
        assert!(local.exists("forever"));
    }

    #[tokio::test]
    async fn test_abort_stops_sweeping() {
        let clock = Arc::new(ManualClock::new());
        let local = LocalCache::with_clock(clock.clone());

        let handle = spawn_sweeper(local.clone(), Duration::from_millis(10));
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        local.set("k", "v", Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(local.len(), 1);
    }
}
