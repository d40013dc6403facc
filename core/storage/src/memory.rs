//! In-memory storage provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::provider::StorageProvider;
use keyward_common::{Error, Result, StorageKey};

/// In-memory storage provider.
///
/// All data is lost when the last handle is dropped, which makes it the
/// natural backend for the ephemeral session area of a long-running host,
/// as well as for tests. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<u8>>>> {
        self.storage
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<u8>>>> {
        self.storage
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(key.as_str()).cloned())
    }

    async fn put(&self, key: &StorageKey, value: Vec<u8>) -> Result<()> {
        self.write()?.insert(key.as_str().to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool> {
        Ok(self.write()?.remove(key.as_str()).is_some())
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool> {
        Ok(self.read()?.contains_key(key.as_str()))
    }
}
