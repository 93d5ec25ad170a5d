//! Two-tier expiring cache for API responses
//!
//! Keeps responses in memory with a short TTL and mirrors them into a durable
//! key/value store with a longer one, so data can survive a restart without
//! ever being served past its durable age limit. Durable-write failures are
//! logged and swallowed: caching must never fail the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::store::KvStore;

/// Prefix distinguishing cache entries from other keys in the shared store.
const STORE_PREFIX: &str = "cache_";

/// How long an in-memory entry is considered fresh.
const MEMORY_TTL_SECS: i64 = 5 * 60;

/// Maximum age at which a durable entry may be rehydrated at startup.
const DURABLE_TTL_SECS: i64 = 10 * 60;

/// A cached payload with the time it was stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    payload: Value,
    stored_at: DateTime<Utc>,
}

/// Expiring cache with an in-memory tier and a durable mirror.
///
/// The in-memory TTL is deliberately stricter than the durable one: an entry
/// can outlive a restart even after it would have expired in memory, but
/// never past the durable age limit.
pub struct ApiCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    store: Arc<dyn KvStore>,
    memory_ttl: Duration,
    durable_ttl: Duration,
}

impl ApiCache {
    /// Creates a cache with the default TTLs (5 minutes in memory, 10 minutes
    /// durable) mirroring into `store`.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_ttls(
            store,
            Duration::seconds(MEMORY_TTL_SECS),
            Duration::seconds(DURABLE_TTL_SECS),
        )
    }

    /// Creates a cache with custom TTLs. Useful for testing expiry without
    /// waiting out the real intervals.
    pub fn with_ttls(store: Arc<dyn KvStore>, memory_ttl: Duration, durable_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
            memory_ttl,
            durable_ttl,
        }
    }

    /// Loads unexpired entries from the durable store into memory, removing
    /// any that are past the durable age limit.
    pub fn init(&self) {
        let now = Utc::now();
        for store_key in self.store.keys_with_prefix(STORE_PREFIX) {
            let key = store_key[STORE_PREFIX.len()..].to_string();
            let Some(raw) = self.store.get(&store_key) else {
                continue;
            };
            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) if now - entry.stored_at <= self.durable_ttl => {
                    if let Ok(mut entries) = self.entries.lock() {
                        entries.insert(key, entry);
                    }
                }
                _ => {
                    // Expired or unreadable; drop it from durable storage too.
                    self.store.remove(&store_key);
                }
            }
        }
    }

    /// Returns the cached value for `key` if present and unexpired.
    ///
    /// An expired entry is removed from memory on the way out; durable
    /// storage is untouched by reads.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if Utc::now() - entry.stored_at > self.memory_ttl {
            entries.remove(key);
            return None;
        }
        serde_json::from_value(entry.payload.clone()).ok()
    }

    /// Stores `value` under `key` with the current timestamp and mirrors it
    /// to durable storage. A durable-write failure never reaches the caller.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(key, %err, "failed to serialize cache payload");
                return;
            }
        };
        let entry = CacheEntry {
            payload,
            stored_at: Utc::now(),
        };

        if let Ok(json) = serde_json::to_string(&entry) {
            if let Err(err) = self.store.set(&format!("{STORE_PREFIX}{key}"), &json) {
                tracing::warn!(key, %err, "failed to mirror cache entry to durable storage");
            }
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), entry);
        }
    }
}

/// Builds the deterministic cache key for a bulk markets request.
///
/// The id list is sorted so the key does not depend on request order.
pub fn markets_key<S: AsRef<str>>(ids: &[S]) -> String {
    let mut ids: Vec<&str> = ids.iter().map(|s| s.as_ref()).collect();
    ids.sort_unstable();
    sanitize(&format!("markets_{}", ids.join("_")))
}

/// Builds the cache key for a free-text search term.
pub fn search_key(term: &str) -> String {
    sanitize(&format!("search_{term}"))
}

/// Builds the cache key for a single coin's detail record.
pub fn coin_key(id: &str) -> String {
    sanitize(&format!("coin_{id}"))
}

/// Lowercases and maps anything outside `[a-z0-9_-]` to `_` so keys are safe
/// as file names in the durable store.
fn sanitize(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::thread;
    use std::time::Duration as StdDuration;

    fn fresh_cache() -> (ApiCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ApiCache::new(store.clone()), store)
    }

    /// Store whose writes always fail, for the swallow-errors property.
    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
        fn set(&self, _key: &str, _value: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }
        fn remove(&self, _key: &str) {}
        fn keys_with_prefix(&self, _prefix: &str) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn test_get_returns_stored_payload() {
        let (cache, _) = fresh_cache();
        cache.set("k", &vec![1, 2, 3]);
        assert_eq!(cache.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let (cache, _) = fresh_cache();
        assert!(cache.get::<Vec<i32>>("missing").is_none());
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let store = Arc::new(MemoryStore::new());
        let cache = ApiCache::with_ttls(
            store,
            Duration::milliseconds(1),
            Duration::seconds(600),
        );

        cache.set("k", &42);
        thread::sleep(StdDuration::from_millis(10));

        assert!(cache.get::<i32>("k").is_none(), "Expired entry should be absent");
        // A second read also misses: the entry was removed, not just skipped.
        assert!(cache.get::<i32>("k").is_none());
    }

    #[test]
    fn test_set_twice_keeps_latest_payload() {
        let (cache, _) = fresh_cache();
        cache.set("k", &"first");
        cache.set("k", &"second");
        assert_eq!(cache.get::<String>("k").as_deref(), Some("second"));
    }

    #[test]
    fn test_set_mirrors_to_durable_store() {
        let (cache, store) = fresh_cache();
        cache.set("k", &7);
        assert!(store.get("cache_k").is_some(), "Entry should be mirrored");
    }

    #[test]
    fn test_durable_write_failure_does_not_propagate() {
        let cache = ApiCache::new(Arc::new(BrokenStore));
        cache.set("k", &7);
        // The in-memory tier still serves the value.
        assert_eq!(cache.get::<i32>("k"), Some(7));
    }

    #[test]
    fn test_init_rehydrates_fresh_entries() {
        let store = Arc::new(MemoryStore::new());
        {
            let cache = ApiCache::new(store.clone());
            cache.set("k", &"persisted");
        }

        // A new cache over the same store starts empty until init().
        let cache = ApiCache::new(store);
        assert!(cache.get::<String>("k").is_none());

        cache.init();
        assert_eq!(cache.get::<String>("k").as_deref(), Some("persisted"));
    }

    #[test]
    fn test_init_discards_entries_past_durable_ttl() {
        let store = Arc::new(MemoryStore::new());
        let stale = CacheEntry {
            payload: serde_json::json!("old"),
            stored_at: Utc::now() - Duration::minutes(11),
        };
        store
            .set("cache_k", &serde_json::to_string(&stale).unwrap())
            .unwrap();

        let cache = ApiCache::new(store.clone());
        cache.init();

        assert!(cache.get::<String>("k").is_none());
        assert!(
            store.get("cache_k").is_none(),
            "Stale entry should be removed from durable storage"
        );
    }

    #[test]
    fn test_init_rehydrates_entries_older_than_memory_ttl() {
        // An entry between the two TTLs survives a restart even though it
        // would already have expired in memory.
        let store = Arc::new(MemoryStore::new());
        let aging = CacheEntry {
            payload: serde_json::json!("aging"),
            stored_at: Utc::now() - Duration::minutes(7),
        };
        store
            .set("cache_k", &serde_json::to_string(&aging).unwrap())
            .unwrap();

        let cache = ApiCache::with_ttls(
            store,
            Duration::minutes(5),
            Duration::minutes(10),
        );
        cache.init();

        // Rehydrated into memory, but its stored_at is past the memory TTL,
        // so the next read treats it as expired.
        assert!(cache.get::<String>("k").is_none());
    }

    #[test]
    fn test_init_discards_unreadable_entries() {
        let store = Arc::new(MemoryStore::new());
        store.set("cache_bad", "{not json").unwrap();

        let cache = ApiCache::new(store.clone());
        cache.init();

        assert!(store.get("cache_bad").is_none());
    }

    #[test]
    fn test_markets_key_is_order_independent() {
        let a = markets_key(&["ethereum", "bitcoin"]);
        let b = markets_key(&["bitcoin", "ethereum"]);
        assert_eq!(a, b);
        assert_eq!(a, "markets_bitcoin_ethereum");
    }

    #[test]
    fn test_search_key_is_sanitized() {
        assert_eq!(search_key("Shiba Inu!"), "search_shiba_inu_");
    }

    #[test]
    fn test_coin_key_format() {
        assert_eq!(coin_key("the-open-network"), "coin_the-open-network");
    }
}
