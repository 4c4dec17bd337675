use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::data::kv_store::KeyValueStore;

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

/// Best-effort TTL cache in front of every external fetch.
///
/// Entries expire lazily: a read past `expiresAt` deletes the entry.
/// Store failures never reach the caller.
pub struct ExpiringCache {
    store: Arc<dyn KeyValueStore>,
    clock: Clock,
}

impl ExpiringCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(|| Utc::now().timestamp_millis()),
        }
    }

    /// Replace the wall clock (epoch millis)
    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Store value with a TTL in minutes
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_minutes: u64) {
        let ttl_ms = i64::try_from(ttl_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            data: value,
            expires_at: (self.clock)().saturating_add(ttl_ms),
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache write failed for {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, &bytes) {
            warn!("Cache write failed for {}: {:#}", key, e);
        }
    }

    /// Get value if not expired (evict on read)
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {:#}", key, e);
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Discarding corrupt cache entry {}: {}", key, e);
                self.evict(key);
                return None;
            }
        };

        if (self.clock)() > entry.expires_at {
            debug!("Cache entry expired: {}", key);
            self.evict(key);
            return None;
        }

        Some(entry.data)
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn clear(&self, prefix: &str) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache clear failed: {:#}", e);
                return 0;
            }
        };

        keys.iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| match self.store.delete(key) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Cache clear failed for {}: {:#}", key, e);
                    false
                }
            })
            .count()
    }

    fn evict(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!("Cache eviction failed for {}: {:#}", key, e);
        }
    }
}
