use crate::config::Config;
use moka::{future::Cache, Expiry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: serde_json::Value,
    ttl: Duration,
}

// Each entry carries its own lifetime: trending data lives a day, API GETs an hour.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Last-writer-wins key/value cache with per-entry expiry.
pub struct CacheService {
    cache: Cache<String, CacheEntry>,
}

impl CacheService {
    pub fn new(config: &Config) -> Self {
        Self::with_capacity(config.cache_max_entries)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let key = self.normalize_key(key);

        match self.cache.get(&key).await {
            Some(entry) => {
                debug!("Cache hit for key: {}", key);
                Some(entry.value)
            }
            None => {
                debug!("Cache miss for key: {}", key);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let key = self.normalize_key(key);
        debug!("Caching key {} for {}s", key, ttl.as_secs());
        self.cache.insert(key, CacheEntry { value, ttl }).await;
    }

    /// Typed read; an entry that no longer decodes counts as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) {
        let key = self.normalize_key(key);
        self.cache.invalidate(&key).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    fn normalize_key(&self, key: &str) -> String {
        key.trim().to_lowercase()
    }
}
