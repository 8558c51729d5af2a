//! In-memory key-value storage.
//!
//! The store is owned by the event loop and lent to the command processor
//! as `&mut`, so it needs no interior locking. Keys and values are
//! binary-safe byte strings.

use bytes::Bytes;
use std::collections::HashMap;
use tracing::{info, trace};

/// Snapshot of store usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of stored keys
    pub item_count: usize,
    /// Total bytes held by keys and values
    pub memory_used: usize,
}

/// Volatile mapping from key to value.
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<Bytes, Bytes>,
    /// Bytes held by keys and values
    memory_used: usize,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        info!("Initializing storage");
        Self::default()
    }

    /// Look up a key.
    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.data.get(key)
    }

    /// Insert or overwrite a key.
    ///
    /// Returns the previous value, if any.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> Option<Bytes> {
        trace!(key_len = key.len(), value_len = value.len(), "set");
        let added = key.len() + value.len();
        let key_len = key.len();
        let previous = self.data.insert(key, value);
        if let Some(ref old) = previous {
            // The key was already counted.
            self.memory_used -= key_len + old.len();
        }
        self.memory_used += added;
        previous
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.data.remove_entry(key) {
            Some((k, v)) => {
                self.memory_used -= k.len() + v.len();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current usage.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            item_count: self.data.len(),
            memory_used: self.memory_used,
        }
    }
}
