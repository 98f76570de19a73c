//! In-memory storage provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::provider::{Disposable, StorageProvider};
use mountkv_common::{Result, StorageValue};

/// In-memory storage provider.
///
/// Used as the default provider of a [`crate::Storage`] and useful for
/// testing. All data is lost on drop or dispose.
pub struct MemoryProvider {
    data: RwLock<HashMap<String, StorageValue>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StorageValue>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StorageValue>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.read().contains_key(key))
    }

    async fn get_item(&self, key: &str) -> Result<Option<StorageValue>> {
        Ok(self.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: StorageValue) -> Result<()> {
        self.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.write().remove(key);
        Ok(())
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        Ok(self.read().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.write().clear();
        Ok(())
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        Some(self)
    }
}

#[async_trait]
impl Disposable for MemoryProvider {
    async fn dispose(&self) -> Result<()> {
        self.write().clear();
        Ok(())
    }
}
