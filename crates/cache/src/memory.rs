use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ResultCache;

/// Default entry lifetime when the cache is built with [`MemoryCache::new`].
pub const DEFAULT_TTL: Duration = Duration::from_millis(1000);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory [`ResultCache`] with per-entry TTL.
pub struct MemoryCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> MemoryCache<V> {
    /// Cache with the default TTL of one second.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> ResultCache<V> for MemoryCache<V> {
    fn read(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn write(&self, key: &str, value: V, ttl: Option<Duration>) -> Option<V> {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: now + ttl.unwrap_or(self.ttl),
        };

        self.entries
            .lock()
            .insert(key.to_owned(), entry)
            .filter(|previous| previous.is_live(now))
            .map(|previous| previous.value)
    }

    fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        self.entries
            .lock()
            .remove(key)
            .filter(|previous| previous.is_live(now))
            .map(|previous| previous.value)
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn write_returns_previous_value() {
        let cache = MemoryCache::new();

        assert_eq!(cache.write("k", 1, None), None);
        assert_eq!(cache.write("k", 2, None), Some(1));
        assert_eq!(cache.read("k"), Some(2));
    }

    #[test]
    fn expired_read_evicts() {
        let cache = MemoryCache::with_ttl(Duration::from_millis(5));

        cache.write("k", 7, None);
        sleep(Duration::from_millis(10));

        assert_eq!(cache.read("k"), None);
        assert!(cache.is_empty());

        // The key behaves as absent afterwards: a fresh write sees no previous.
        assert_eq!(cache.write("k", 8, None), None);
        assert_eq!(cache.read("k"), Some(8));
    }

    #[test]
    fn ttl_override_beats_default() {
        let cache = MemoryCache::with_ttl(Duration::from_secs(60));

        cache.write("k", 1, Some(Duration::ZERO));
        assert_eq!(cache.read("k"), None);

        cache.write("k", 2, None);
        assert_eq!(cache.read("k"), Some(2));
    }

    #[test]
    fn overwriting_an_expired_key_reports_no_previous() {
        let cache = MemoryCache::with_ttl(Duration::from_millis(5));

        cache.write("k", 1, None);
        sleep(Duration::from_millis(10));

        assert_eq!(cache.write("k", 2, None), None);
    }

    #[test]
    fn remove_returns_previous_live_value() {
        let cache = MemoryCache::new();

        cache.write("k", 3, None);
        assert_eq!(cache.remove("k"), Some(3));
        assert_eq!(cache.remove("k"), None);
        assert_eq!(cache.read("k"), None);
    }

    #[test]
    fn remove_of_expired_entry_reports_absent() {
        let cache = MemoryCache::with_ttl(Duration::from_millis(5));

        cache.write("k", 3, None);
        sleep(Duration::from_millis(10));

        assert_eq!(cache.remove("k"), None);
    }
}
