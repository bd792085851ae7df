//! Content-addressed cache of completed uploads.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::config::CacheConfig;
use super::types::FileInfo;

/// Payloads up to this size are hashed whole.
const FULL_HASH_LIMIT: usize = 1024;
/// Bytes sampled from each of the head, middle and tail of larger payloads.
const SAMPLE_LEN: usize = 256;

/// Compute the cache key for a normalized payload.
///
/// Large payloads are sampled rather than hashed whole, so two different
/// files that agree on every sampled byte, name and type share a key.
#[must_use]
pub fn cache_key(data: &[u8], file_name: &str, mime_type: &str) -> String {
    let mut hasher = DefaultHasher::new();
    if data.len() <= FULL_HASH_LIMIT {
        data.hash(&mut hasher);
    } else {
        let mid = data.len() / 2;
        let half = SAMPLE_LEN / 2;
        data[..SAMPLE_LEN].hash(&mut hasher);
        data[mid - half..mid + half].hash(&mut hasher);
        data[data.len() - SAMPLE_LEN..].hash(&mut hasher);
        data.len().hash(&mut hasher);
    }
    file_name.hash(&mut hasher);
    mime_type.hash(&mut hasher);
    let value = hasher.finish();
    format!("{value:016x}")
}

/// Cache entry with TTL.
#[derive(Clone)]
struct CacheEntry {
    data: FileInfo,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(data: FileInfo, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe upload cache.
///
/// Values are sanitized on the way in, so nothing read back carries
/// pre-signed URLs.
pub struct UploadCache {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry>,
}

impl UploadCache {
    /// Create a new cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_seconds)
    }

    /// Get a cached upload.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<FileInfo> {
        if !self.config.enabled {
            return None;
        }

        self.entries.get(key).and_then(|entry| {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                None
            } else {
                Some(entry.data.clone())
            }
        })
    }

    /// Insert an upload unless a live entry already exists.
    ///
    /// Returns the value now stored under `key`: the existing one if another
    /// task won the race, otherwise `info`.
    pub fn insert(&self, key: &str, info: FileInfo) -> FileInfo {
        self.get_or_insert_with(key, || info)
    }

    /// Atomically read the entry for `key` or insert the value built by `make`.
    pub fn get_or_insert_with<F>(&self, key: &str, make: F) -> FileInfo
    where
        F: FnOnce() -> FileInfo,
    {
        if !self.config.enabled {
            return make().sanitized();
        }

        // Eviction walks every shard, so it must run before the entry guard is taken.
        if let Some(live) = self.get(key) {
            return live;
        }
        self.enforce_max_entries();

        let ttl = self.ttl();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    let fresh = make().sanitized();
                    occupied.insert(CacheEntry::new(fresh.clone(), ttl));
                    fresh
                } else {
                    occupied.get().data.clone()
                }
            }
            Entry::Vacant(vacant) => {
                let fresh = make().sanitized();
                vacant.insert(CacheEntry::new(fresh.clone(), ttl));
                fresh
            }
        }
    }

    /// Remove one entry.
    pub fn remove(&self, key: &str) -> Option<FileInfo> {
        self.entries.remove(key).map(|(_, entry)| entry.data)
    }

    /// Clear the cache.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let expired = self.entries.iter().filter(|e| e.is_expired()).count();
        CacheStats {
            entries: self.entries.len(),
            expired,
            capacity: self.config.max_entries,
        }
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    /// Make room for one more entry, dropping expired then oldest entries.
    fn enforce_max_entries(&self) {
        let max = self.config.max_entries;
        if self.entries.len() < max {
            return;
        }

        self.cleanup_expired();

        if self.entries.len() >= max {
            let to_remove = self.entries.len() - max + 1;
            let mut by_age: Vec<(String, Instant)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.expires_at))
                .collect();
            by_age.sort_by_key(|(_, expires_at)| *expires_at);
            for (key, _) in by_age.into_iter().take(to_remove) {
                self.entries.remove(&key);
            }
        }
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored entries, expired ones included.
    pub entries: usize,
    /// Entries past their TTL that have not been swept yet.
    pub expired: usize,
    /// Configured maximum.
    pub capacity: usize,
}

impl CacheStats {
    /// Entries still servable.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.entries.saturating_sub(self.expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(uid: &str) -> FileInfo {
        FileInfo {
            file_uid: uid.to_string(),
            file_name: format!("{uid}.txt"),
            url: "https://signed.example.com".to_string(),
            object_url: "https://object.example.com".to_string(),
            ..FileInfo::default()
        }
    }

    #[test]
    fn test_cache_key_depends_on_name_and_type() {
        let data = b"hello world";
        let key = cache_key(data, "a.txt", "text/plain");
        assert_eq!(key.len(), 16);
        assert_eq!(key, cache_key(data, "a.txt", "text/plain"));
        assert_ne!(key, cache_key(data, "b.txt", "text/plain"));
        assert_ne!(key, cache_key(data, "a.txt", "text/markdown"));
    }

    #[test]
    fn test_cache_key_samples_large_payloads() {
        let mut data = vec![7u8; 4096];
        let key = cache_key(&data, "big.bin", "application/octet-stream");

        // Outside every sampled window.
        data[600] = 0;
        assert_eq!(key, cache_key(&data, "big.bin", "application/octet-stream"));

        // Inside the middle window.
        data[2048] = 0;
        assert_ne!(key, cache_key(&data, "big.bin", "application/octet-stream"));
    }

    #[test]
    fn test_insert_and_get_sanitizes() {
        let cache = UploadCache::new(CacheConfig::default());
        cache.insert("k1", info("uid-1"));

        let cached = cache.get("k1").unwrap_or_default();
        assert_eq!(cached.file_uid, "uid-1");
        assert!(cached.url.is_empty());
        assert!(cached.object_url.is_empty());
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = UploadCache::new(CacheConfig::default());
        let first = cache.insert("k", info("first"));
        let second = cache.insert("k", info("second"));

        assert_eq!(first.file_uid, "first");
        assert_eq!(second.file_uid, "first");
    }

    #[test]
    fn test_cache_disabled() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = UploadCache::new(config);
        let stored = cache.insert("k", info("uid"));

        assert!(stored.url.is_empty());
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_expired_entries_are_replaced() {
        let config = CacheConfig {
            ttl_seconds: 0,
            ..CacheConfig::default()
        };
        let cache = UploadCache::new(config);
        cache.insert("k", info("old"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("k").is_none());
        let replaced = cache.insert("k", info("new"));
        assert_eq!(replaced.file_uid, "new");
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let config = CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        };
        let cache = UploadCache::new(config);
        cache.insert("a", info("a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b", info("b"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c", info("c"));

        assert_eq!(cache.stats().entries, 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_reinserting_live_key_at_capacity_evicts_nothing() {
        let config = CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        };
        let cache = UploadCache::new(config);
        cache.insert("a", info("a"));
        cache.insert("b", info("b"));

        let again = cache.insert("a", info("a2"));

        assert_eq!(again.file_uid, "a");
        assert_eq!(cache.stats().entries, 2);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_concurrent_writers_agree_on_one_value() {
        let cache = std::sync::Arc::new(UploadCache::new(CacheConfig::default()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.insert("shared", info(&format!("uid-{i}"))))
            })
            .collect();

        let stored: Vec<String> = handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .map(|info| info.file_uid)
            .collect();

        assert_eq!(stored.len(), 8);
        assert!(stored.iter().all(|uid| *uid == stored[0]));
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_clear_and_stats() {
        let cache = UploadCache::new(CacheConfig::default());
        cache.insert("a", info("a"));
        assert_eq!(cache.stats().live(), 1);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats { capacity: 1000, ..CacheStats::default() });
    }
}
