use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry<V> {
    inserted_at: Instant,
    value: V,
}

/// Concurrency-safe TTL cache keyed by absolute entry age.
///
/// This system is read-only with respect to the chain, so entries are never
/// invalidated on write; they simply expire. Cloning is cheap and shares the
/// underlying map, which lets detached discovery tasks populate the cache
/// even after their caller has gone away.
pub struct TtlCache<K, V> {
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if present and not expired. Expired entries
    /// are removed on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                value,
            },
        );
    }

    /// Drop all expired entries. Callers that poll frequently can use this
    /// to keep the map from accumulating stale keys.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_secs(30));
        cache.insert("a".to_string(), 7);
        assert_eq!(cache.get(&"a".to_string()), Some(7));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expiry_by_absolute_age() {
        let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_millis(20));
        cache.insert("a".to_string(), 7);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_millis(20));
        cache.insert("old".to_string(), 1);
        std::thread::sleep(Duration::from_millis(40));
        cache.insert("fresh".to_string(), 2);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"fresh".to_string()), Some(2));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_secs(30));
        let detached = cache.clone();
        detached.insert("a".to_string(), 9);
        assert_eq!(cache.get(&"a".to_string()), Some(9));
    }
}
