//! Namespaced cache with time-to-live expiry.
//!
//! Two tiers: an in-memory map consulted first, and an optional persistent
//! [`KeyValueStore`] written through on every `set`. Entries older than the
//! caller's TTL are treated as missing; expired or unreadable persisted
//! entries are removed when encountered.

use super::{KeyValueStore, StorageError};
use crate::platform::Clock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: Value,
    /// Wall-clock milliseconds when the value was stored.
    timestamp: i64,
}

/// TTL-bound key-value cache keyed by `namespace:key`.
#[derive(Clone)]
pub struct TtlCache {
    memory: Rc<RefCell<HashMap<String, CacheEntry>>>,
    store: Option<Rc<dyn KeyValueStore>>,
    clock: Rc<dyn Clock>,
}

impl TtlCache {
    /// Memory-only cache.
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            memory: Rc::new(RefCell::new(HashMap::new())),
            store: None,
            clock,
        }
    }

    /// Cache that also persists entries in `store`.
    pub fn with_store(clock: Rc<dyn Clock>, store: Rc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(clock)
        }
    }

    fn key_for(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    fn is_fresh(&self, entry: &CacheEntry, ttl: Duration) -> bool {
        let age = self.clock.wall_clock().0 - entry.timestamp;
        age < ttl.as_millis() as i64
    }

    /// Returns the cached value if it was stored less than `ttl` ago.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str, ttl: Duration) -> Option<T> {
        let composed = Self::key_for(namespace, key);

        let mem_hit = self
            .memory
            .borrow()
            .get(&composed)
            .filter(|entry| self.is_fresh(entry, ttl))
            .cloned();
        if let Some(entry) = mem_hit {
            return Self::decode(&composed, entry.value);
        }

        let store = self.store.as_ref()?;
        let raw = match store.get_item(&composed) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("TTL cache read failed for {}: {}", composed, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Dropping unreadable cache entry {}: {}", composed, e);
                let _ = store.remove_item(&composed);
                return None;
            }
        };

        if !self.is_fresh(&entry, ttl) {
            let _ = store.remove_item(&composed);
            return None;
        }

        self.memory.borrow_mut().insert(composed.clone(), entry.clone());
        Self::decode(&composed, entry.value)
    }

    fn decode<T: DeserializeOwned>(composed: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("Cached value {} has unexpected shape: {}", composed, e);
                None
            }
        }
    }

    /// Stores `value`, stamping it with the current wall-clock time.
    ///
    /// The memory tier is always updated; an error means only the
    /// persistent tier failed.
    pub fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<(), StorageError> {
        let composed = Self::key_for(namespace, key);
        let value = serde_json::to_value(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let entry = CacheEntry {
            value,
            timestamp: self.clock.wall_clock().0,
        };

        self.memory.borrow_mut().insert(composed.clone(), entry.clone());

        if let Some(store) = &self.store {
            let raw = serde_json::to_string(&entry)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            store.set_item(&composed, &raw)?;
        }
        Ok(())
    }

    /// Drops the entry from both tiers.
    pub fn invalidate(&self, namespace: &str, key: &str) {
        let composed = Self::key_for(namespace, key);
        self.memory.borrow_mut().remove(&composed);
        if let Some(store) = &self.store {
            if let Err(e) = store.remove_item(&composed) {
                log::warn!("Failed to remove {} from storage: {}", composed, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::UnixMillis;
    use crate::platform::ManualClock;
    use crate::storage::MemoryStore;

    const TTL: Duration = Duration::from_secs(60);

    fn clock() -> ManualClock {
        ManualClock::new(UnixMillis(1_700_000_000_000))
    }

    #[test]
    fn test_memory_hit_within_ttl() {
        let clock = clock();
        let cache = TtlCache::new(Rc::new(clock.clone()));
        cache.set("radar", "frames", &vec![1, 2, 3]).unwrap();

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get::<Vec<i32>>("radar", "frames", TTL), Some(vec![1, 2, 3]));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<Vec<i32>>("radar", "frames", TTL), None);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache = TtlCache::new(Rc::new(clock()));
        cache.set("radar", "k", &1).unwrap();
        cache.set("forecast", "k", &2).unwrap();
        assert_eq!(cache.get::<i32>("radar", "k", TTL), Some(1));
        assert_eq!(cache.get::<i32>("forecast", "k", TTL), Some(2));
    }

    #[test]
    fn test_persistent_tier_survives_new_cache() {
        let clock = clock();
        let store = MemoryStore::new();
        let first = TtlCache::with_store(Rc::new(clock.clone()), Rc::new(store.clone()));
        first.set("radar", "frames", &"hello").unwrap();

        let second = TtlCache::with_store(Rc::new(clock.clone()), Rc::new(store.clone()));
        assert_eq!(
            second.get::<String>("radar", "frames", TTL).as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_expired_persistent_entry_is_removed() {
        let clock = clock();
        let store = MemoryStore::new();
        let first = TtlCache::with_store(Rc::new(clock.clone()), Rc::new(store.clone()));
        first.set("radar", "frames", &1).unwrap();

        clock.advance(Duration::from_secs(120));
        let second = TtlCache::with_store(Rc::new(clock.clone()), Rc::new(store.clone()));
        assert_eq!(second.get::<i32>("radar", "frames", TTL), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_persistent_entry_is_removed() {
        let store = MemoryStore::new();
        store.set_item("radar:frames", "{broken").unwrap();

        let cache = TtlCache::with_store(Rc::new(clock()), Rc::new(store.clone()));
        assert_eq!(cache.get::<i32>("radar", "frames", TTL), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let store = MemoryStore::new();
        let cache = TtlCache::with_store(Rc::new(clock()), Rc::new(store.clone()));
        cache.set("radar", "frames", &1).unwrap();
        cache.invalidate("radar", "frames");
        assert_eq!(cache.get::<i32>("radar", "frames", TTL), None);
        assert!(store.is_empty());
    }
}
