//! Adapter from synchronous backends to [`StorageProvider`].
//!
//! The router only knows about async providers. Backends that never
//! suspend implement [`SyncStorageProvider`] and are wrapped in
//! [`SyncToAsync`], which answers each call with an already-completed future.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::provider::{Disposable, StorageProvider};
use mountkv_common::{Error, Result, StorageValue};

/// Synchronous version of [`StorageProvider`].
pub trait SyncStorageProvider: Send {
    /// Whether [`SyncStorageProvider::dispose`] does anything.
    const DISPOSABLE: bool = false;

    fn name(&self) -> &str;
    fn has_item(&mut self, key: &str) -> Result<bool>;
    fn get_item(&mut self, key: &str) -> Result<Option<StorageValue>>;
    fn set_item(&mut self, key: &str, value: StorageValue) -> Result<()>;
    fn remove_item(&mut self, key: &str) -> Result<()>;
    fn get_keys(&mut self) -> Result<Vec<String>>;
    fn clear(&mut self) -> Result<()>;

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Wraps a synchronous provider for async use.
///
/// The provider sits behind a mutex, so calls are serialized.
///
/// # Example
///
/// ```rust,ignore
/// let provider = Arc::new(SyncToAsync::new(MySyncBackend::default()));
/// storage.mount("legacy", provider)?;
/// ```
pub struct SyncToAsync<P> {
    inner: Mutex<P>,
    name: String,
}

impl<P: SyncStorageProvider> SyncToAsync<P> {
    /// Create a new adapter wrapping a sync provider.
    pub fn new(inner: P) -> Self {
        let name = inner.name().to_string();
        Self {
            inner: Mutex::new(inner),
            name,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, P>> {
        self.inner
            .lock()
            .map_err(|_| Error::Storage(format!("Provider '{}' lock poisoned", self.name)))
    }
}

#[async_trait]
impl<P: SyncStorageProvider + 'static> StorageProvider for SyncToAsync<P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        self.lock()?.has_item(key)
    }

    async fn get_item(&self, key: &str) -> Result<Option<StorageValue>> {
        self.lock()?.get_item(key)
    }

    async fn set_item(&self, key: &str, value: StorageValue) -> Result<()> {
        self.lock()?.set_item(key, value)
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.remove_item(key)
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        self.lock()?.get_keys()
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear()
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        if P::DISPOSABLE {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl<P: SyncStorageProvider + 'static> Disposable for SyncToAsync<P> {
    async fn dispose(&self) -> Result<()> {
        self.lock()?.dispose()
    }
}
