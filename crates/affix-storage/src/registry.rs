//! Symbolic storage key → backend instance mapping.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Storage, StorageError, StorageResult};

/// Maps symbolic storage keys (e.g. "cache", "store") to backend instances.
///
/// Cloning is cheap and clones share the same backend table, so one registry
/// can serve any number of attachers concurrently.
#[derive(Clone, Default)]
pub struct StorageRegistry {
    backends: Arc<RwLock<HashMap<String, Arc<dyn Storage>>>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: impl Into<String>, storage: Arc<dyn Storage>) {
        self.backends.write().insert(key.into(), storage);
    }

    /// Resolves a backend, failing with [`StorageError::UnknownStorage`] for
    /// unregistered keys.
    pub fn resolve(&self, key: &str) -> StorageResult<Arc<dyn Storage>> {
        self.backends
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::UnknownStorage(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.backends.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("StorageRegistry").field("keys", &keys).finish()
    }
}
