use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;

use crate::entry::StoredEntry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::{now_ms, rand_simple};

/// Configuration for eviction on set operations.
#[derive(Debug, Clone, Deserialize)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for HashMapStore.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HashMapStoreConfig {
    /// Remove expired entries on every `set` operation.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Thread-safe in-memory cache store using HashMap with RwLock.
///
/// This is a simple store suitable for:
/// - Low to moderate concurrency (<8 threads)
/// - Small to medium cache sizes (<1000 items)
/// - Applications prioritizing simplicity over performance
///
/// For high-concurrency scenarios, consider using `MokaStore` instead.
pub struct HashMapStore {
    state: RwLock<HashMap<String, StoredEntry>>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl HashMapStore {
    /// Create a new HashMapStore with the given configuration.
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
        }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StoredEntry>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredEntry>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run eviction if configured and random check passes.
    fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        // Check frequency
        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = if config.frequency >= 1.0 {
            true
        } else {
            rand_simple() < config.frequency
        };

        if !should_evict {
            return;
        }

        let mut state = self.write();
        let now = now_ms();

        // First delete all expired entries
        state.retain(|_, v| !v.is_expired(now));

        // If still over max_items, remove the entries closest to expiry
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state
                .iter()
                .map(|(k, v)| (k.clone(), v.expires_at()))
                .collect();
            entries.sort_by_key(|(_, expires)| *expires);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
        }
    }
}

impl Default for HashMapStore {
    fn default() -> Self {
        Self::new(HashMapStoreConfig::default())
    }
}

impl Store for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let state = self.read();

        let Some(stored) = state.get(key) else {
            return Ok(None);
        };

        if !stored.is_expired(now_ms()) {
            return Ok(Some(stored.clone()));
        }

        // Entry is expired, remove it unless it was replaced meanwhile
        drop(state);
        let mut state = self.write();
        if state.get(key).is_some_and(|e| e.is_expired(now_ms())) {
            state.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        self.write().insert(key.to_string(), entry);
        self.maybe_evict();
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.write().remove(key);
        Ok(())
    }

    fn get_or_install(
        &self,
        key: &str,
        candidate: StoredEntry,
        keep_existing: &dyn Fn(&StoredEntry) -> bool,
    ) -> Result<StoredEntry, CacheError> {
        {
            let mut state = self.write();
            let now = now_ms();

            if let Some(existing) = state.get(key)
                && !existing.is_expired(now)
                && keep_existing(existing)
            {
                return Ok(existing.clone());
            }

            state.insert(key.to_string(), candidate.clone());
        }

        self.maybe_evict();
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(value: &str, expires_at: i64) -> StoredEntry {
        StoredEntry::from_typed(Arc::new(value.to_string()), expires_at)
    }

    fn value_of(entry: &StoredEntry) -> String {
        entry.downcast::<String>().unwrap().as_ref().clone()
    }

    #[test]
    fn test_get_set_remove() {
        let store = HashMapStore::new(HashMapStoreConfig::default());

        // Initially empty
        assert!(store.get("key1").unwrap().is_none());

        // Set a value
        store.set("key1", entry("value1", now_ms() + 60_000)).unwrap();

        // Get the value
        let result = store.get("key1").unwrap().unwrap();
        assert_eq!(value_of(&result), "value1");

        // Remove the value, twice
        store.remove("key1").unwrap();
        store.remove("key1").unwrap();

        // Should be gone
        assert!(store.get("key1").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_removed() {
        let store = HashMapStore::default();

        store.set("expired_key", entry("value1", now_ms() - 500)).unwrap();

        assert!(store.get("expired_key").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_or_install() {
        let store = HashMapStore::default();
        let expires = now_ms() + 60_000;

        // Miss installs the candidate
        let winner = store
            .get_or_install("k", entry("first", expires), &|_| true)
            .unwrap();
        assert_eq!(value_of(&winner), "first");

        // Live entry is kept when asked to
        let winner = store
            .get_or_install("k", entry("second", expires), &|_| true)
            .unwrap();
        assert_eq!(value_of(&winner), "first");

        // And replaced otherwise
        let winner = store
            .get_or_install("k", entry("third", expires), &|_| false)
            .unwrap();
        assert_eq!(value_of(&winner), "third");
        assert_eq!(value_of(&store.get("k").unwrap().unwrap()), "third");
    }

    #[test]
    fn test_get_or_install_replaces_expired_without_asking() {
        let store = HashMapStore::default();
        store.set("k", entry("old", now_ms() - 1)).unwrap();

        let winner = store
            .get_or_install("k", entry("new", now_ms() + 60_000), &|_| {
                panic!("expired entries must not be offered")
            })
            .unwrap();
        assert_eq!(value_of(&winner), "new");
    }

    #[test]
    fn test_evict_on_set_caps_size() {
        let store = HashMapStore::new(HashMapStoreConfig {
            evict_on_set: Some(EvictOnSetConfig {
                frequency: 1.0,
                max_items: 2,
            }),
        });
        let now = now_ms();

        store.set("a", entry("a", now + 1_000)).unwrap();
        store.set("b", entry("b", now + 2_000)).unwrap();
        store.set("c", entry("c", now + 3_000)).unwrap();

        assert_eq!(store.len(), 2);
        // The entry closest to expiry is evicted first
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("c").unwrap().is_some());
    }
}
