//! Bounded byte cache for tile blobs, keyed by access path.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 1024 * 1024 * 1024;
pub const DEFAULT_TILE_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry {
    bytes: Arc<Vec<u8>>,
    expires_at: Instant,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    // insertion order, the eviction order on overflow
    order: VecDeque<String>,
    total_bytes: usize,
}

/// Thread safe byte cache with a byte capacity and per-entry TTL.
///
/// Expired entries are swept lazily by `has`/`get`; on overflow the oldest
/// insertion is evicted first. Entries are not re-aged on access.
pub struct TileCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl Default for TileCache {
    fn default() -> Self {
        TileCache::with_capacity(DEFAULT_CAPACITY)
    }
}

impl TileCache {
    pub fn with_capacity(capacity: usize) -> Self {
        TileCache {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                total_bytes: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        if bytes.len() > self.capacity {
            log::debug!("Not caching {key}: {} bytes exceeds the cache capacity", bytes.len());
            return;
        }

        let mut state = self.lock();
        Self::remove_entry(&mut state, key);

        state.total_bytes += bytes.len();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                bytes: Arc::new(bytes),
                expires_at: Instant::now() + ttl,
            },
        );
        state.order.push_back(key.to_string());

        while state.total_bytes > self.capacity {
            let Some(oldest) = state.order.front().cloned() else {
                break;
            };
            Self::remove_entry(&mut state, &oldest);
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let mut state = self.lock();
        Self::sweep_expired(&mut state);
        state.entries.get(key).map(|entry| Arc::clone(&entry.bytes))
    }

    pub fn has(&self, key: &str) -> bool {
        let mut state = self.lock();
        Self::sweep_expired(&mut state);
        state.entries.contains_key(key)
    }

    pub fn delete(&self, key: &str) {
        let mut state = self.lock();
        Self::remove_entry(&mut state, key);
    }

    /// Drop every entry, part of the shutdown sequence.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove_entry(state: &mut CacheState, key: &str) {
        if let Some(entry) = state.entries.remove(key) {
            state.total_bytes -= entry.bytes.len();
            if let Some(pos) = state.order.iter().position(|k| k == key) {
                state.order.remove(pos);
            }
        }
    }

    fn sweep_expired(state: &mut CacheState) {
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            Self::remove_entry(state, &key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let cache = TileCache::with_capacity(1024);
        cache.set("a", vec![1, 2, 3], DEFAULT_TILE_TTL);

        assert!(cache.has("a"));
        assert_eq!(cache.get("a").map(|b| b.to_vec()), Some(vec![1, 2, 3]));
        assert_eq!(cache.total_bytes(), 3);

        cache.delete("a");
        assert!(!cache.has("a"));
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn oldest_insertion_is_evicted_on_overflow() {
        let cache = TileCache::with_capacity(10);
        cache.set("a", vec![0; 4], DEFAULT_TILE_TTL);
        cache.set("b", vec![0; 4], DEFAULT_TILE_TTL);
        cache.set("c", vec![0; 4], DEFAULT_TILE_TTL);

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
        assert!(cache.has("c"));
        assert!(cache.total_bytes() <= 10);
    }

    #[test]
    fn reinsert_replaces_bytes() {
        let cache = TileCache::with_capacity(100);
        cache.set("a", vec![0; 10], DEFAULT_TILE_TTL);
        cache.set("a", vec![1; 5], DEFAULT_TILE_TTL);

        assert_eq!(cache.total_bytes(), 5);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_swept() {
        let cache = TileCache::with_capacity(100);
        cache.set("a", vec![0; 10], Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));

        assert!(!cache.has("a"));
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn oversized_entries_are_not_cached() {
        let cache = TileCache::with_capacity(4);
        cache.set("a", vec![0; 10], DEFAULT_TILE_TTL);
        assert!(!cache.has("a"));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = TileCache::with_capacity(100);
        cache.set("a", vec![0; 10], DEFAULT_TILE_TTL);
        cache.set("b", vec![0; 10], DEFAULT_TILE_TTL);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
