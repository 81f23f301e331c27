use crate::services::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cached upstream payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: DateTime<Utc>,
    /// Physical lifetime in moka: the entry's ttl plus the stale window
    retain_for: Duration,
}

/// Evicts each entry once its own ttl and the stale window have passed
struct RetentionExpiry;

impl moka::Expiry<String, Arc<CacheEntry>> for RetentionExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Arc<CacheEntry>, _created_at: Instant) -> Option<Duration> {
        Some(entry.retain_for)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.retain_for)
    }
}

/// Content-addressed cache for raw upstream JSON
///
/// Entries expire logically at `expires_at` (checked against the injected
/// clock) but are physically retained for an extra `stale_retention` window,
/// so an expired value can still be served when every mirror is down.
pub struct ResultCache {
    entries: moka::future::Cache<String, Arc<CacheEntry>>,
    default_ttl: Duration,
    stale_retention: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    /// Create a new result cache
    pub fn new(
        max_entries: u64,
        default_ttl: Duration,
        stale_retention: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = moka::future::CacheBuilder::new(max_entries)
            .expire_after(RetentionExpiry)
            .build();

        Self {
            entries,
            default_ttl,
            stale_retention,
            clock,
        }
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key).await?;

        if entry.expires_at > self.clock.now() {
            tracing::trace!("Cache hit: {}", key);
            Some(entry.value.clone())
        } else {
            tracing::trace!("Cache entry expired: {}", key);
            None
        }
    }

    /// Any retained value for `key`, expired or not
    pub async fn get_stale(&self, key: &str) -> Option<Value> {
        self.entries.get(key).await.map(|entry| entry.value.clone())
    }

    /// Store `value` under `key` for `ttl`
    pub async fn put(&self, key: &str, value: Value, ttl: Duration) {
        let logical_ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(logical_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = CacheEntry {
            value,
            expires_at,
            retain_for: ttl.saturating_add(self.stale_retention),
        };
        self.entries.insert(key.to_string(), Arc::new(entry)).await;

        tracing::trace!("Cache set: {} (expires {})", key, expires_at);
    }

    /// Store `value` with the configured TTL
    pub async fn put_default(&self, key: &str, value: Value) {
        self.put(key, value, self.default_ttl).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.entry_count(),
            default_ttl_secs: self.default_ttl.as_secs(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub default_ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use serde_json::json;

    fn cache(clock: Arc<ManualClock>) -> ResultCache {
        ResultCache::new(100, Duration::from_secs(60), Duration::from_secs(3600), clock)
    }

    #[tokio::test]
    async fn test_cache_set_get() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock);

        cache.put_default("k", json!({"elements": []})).await;
        assert_eq!(cache.get("k").await, Some(json!({"elements": []})));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_only_available_as_stale() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock.clone());

        cache.put("k", json!(1), Duration::from_secs(10)).await;
        clock.advance(chrono::Duration::seconds(11));

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_stale("k").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_invalidate_removes() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock);

        cache.put_default("k", json!(1)).await;
        cache.put_default("k", json!(2)).await;
        assert_eq!(cache.get("k").await, Some(json!(2)));

        cache.invalidate("k").await;
        assert_eq!(cache.get_stale("k").await, None);
    }

    #[tokio::test]
    async fn test_long_ttl_outlives_default_retention() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResultCache::new(100, Duration::from_millis(50), Duration::from_millis(50), clock);

        cache.put("long", json!(1), Duration::from_secs(30)).await;
        cache.put_default("short", json!(2)).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(cache.get("long").await, Some(json!(1)));
        assert_eq!(cache.get_stale("short").await, None);
    }
}
