//! Generic expiring value cache shared by caching providers.
//!
//! One abstraction replaces per-provider TTL bookkeeping: each entry stores
//! the value, its insertion instant, and its time-to-live. Entries are owned
//! by the provider that created them and evicted lazily on read.
//!
//! # Thread Safety
//!
//! The cache uses interior mutability via `parking_lot::Mutex` so a provider
//! shared between concurrent runs stays safe; a purely sequential host pays
//! only an uncontended lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::secret::Secret;

/// A cached value with its insertion time and time-to-live.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Secret,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.inserted_at + self.ttl
    }
}

/// An expiring key-value cache.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Retrieve a value if present and not expired.
    ///
    /// An expired entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<Secret> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert a value with the given time-to-live, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: Secret, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop all expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, entry| !entry.is_expired(now));
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_set_get() {
        let cache = TtlCache::new();
        cache.set("key", Secret::new("value"), Duration::from_secs(60));

        let hit = cache.get("key").unwrap();
        assert_eq!(hit.expose(), "value");
    }

    #[test]
    fn test_cache_miss() {
        let cache = TtlCache::new();
        assert!(cache.get("absent").is_none());
    }

    #[test]
    fn test_cache_expiry() {
        let cache = TtlCache::new();
        cache.set("key", Secret::new("value"), Duration::from_millis(0));

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("key").is_none());
        // Expired entry was evicted on read.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_replace() {
        let cache = TtlCache::new();
        cache.set("key", Secret::new("one"), Duration::from_secs(60));
        cache.set("key", Secret::new("two"), Duration::from_secs(60));

        assert_eq!(cache.get("key").unwrap().expose(), "two");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_purge_expired() {
        let cache = TtlCache::new();
        cache.set("fresh", Secret::new("a"), Duration::from_secs(60));
        cache.set("stale", Secret::new("b"), Duration::from_millis(0));

        std::thread::sleep(Duration::from_millis(5));
        cache.purge_expired();

        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }

    #[test]
    fn test_cache_clear() {
        let cache = TtlCache::new();
        cache.set("key", Secret::new("value"), Duration::from_secs(60));
        cache.clear();
        assert!(cache.is_empty());
    }
}
