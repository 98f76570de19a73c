//! Storage provider trait definition.

use async_trait::async_trait;

use mountkv_common::{Result, StorageValue};

/// Key-value backend that the router delegates to.
///
/// Keys passed to a provider are already normalized and relative to the
/// provider's mount base. All operations are async; a backend that does its
/// work synchronously can implement [`crate::SyncStorageProvider`] instead and
/// be wrapped in [`crate::SyncToAsync`].
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Check if a key exists.
    async fn has_item(&self, key: &str) -> Result<bool>;

    /// Read the value stored at `key`.
    ///
    /// # Returns
    /// - `Ok(None)` if the key does not exist
    /// - `Ok(Some(value))` otherwise
    async fn get_item(&self, key: &str) -> Result<Option<StorageValue>>;

    /// Store `value` at `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: StorageValue) -> Result<()>;

    /// Remove `key`.
    ///
    /// # Postconditions
    /// - `has_item(key)` returns false
    /// - Removing a key that does not exist succeeds
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// List every key held by this provider, relative to its mount base.
    async fn get_keys(&self) -> Result<Vec<String>>;

    /// Remove every key held by this provider.
    async fn clear(&self) -> Result<()>;

    /// Optional dispose capability.
    ///
    /// Providers holding resources that must be released on shutdown or
    /// remount return `Some(self)`.
    fn as_disposable(&self) -> Option<&dyn Disposable> {
        None
    }
}

/// Release resources held by a provider.
#[async_trait]
pub trait Disposable: Send + Sync {
    /// Dispose the provider.
    ///
    /// # Postconditions
    /// - The provider is not used again by the router
    async fn dispose(&self) -> Result<()>;
}
