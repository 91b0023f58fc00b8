//! Key-value storage backing the engine's TTL cache.
//!
//! This module provides a platform-agnostic interface for small string
//! values. On WASM targets it is backed by `localStorage`; natively (and in
//! tests) by an in-memory map.

#[cfg(target_arch = "wasm32")]
mod local_storage;
mod ttl;

#[cfg(target_arch = "wasm32")]
pub use local_storage::LocalStorageStore;
pub use ttl::TtlCache;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be reached (e.g. storage disabled).
    Unavailable(String),
    /// Serialization or deserialization failed.
    SerializationError(String),
    /// An unexpected error occurred.
    Other(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// A synchronous string key-value store.
///
/// Mirrors the shape of the browser's `localStorage`, which is the
/// persistent tier the TTL cache writes through to.
///
/// Note: This trait does not require `Send` bounds since the engine is
/// single-threaded and JS handles cannot be sent between threads.
pub trait KeyValueStore {
    /// Retrieves a value by key. Returns `Ok(None)` if the key doesn't exist.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores a value, overwriting any existing one.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes a value. Returns `Ok(())` even if the key didn't exist.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// A simple in-memory store.
///
/// Data is not persisted across application restarts.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.data.borrow_mut().remove(key);
        Ok(())
    }
}
