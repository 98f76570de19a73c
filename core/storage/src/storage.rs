//! Storage router.
//!
//! [`Storage`] is the facade callers use. Single-key operations are routed to
//! exactly one provider by longest mount prefix; `get_keys`, `clear` and
//! `dispose` fan out to every provider and join the results.

use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::lifecycle::{dispose_provider, spawn_disposal, ErrorSink};
use crate::memory::MemoryProvider;
use crate::mount::{MountEntry, MountInfo, MountTable};
use crate::provider::StorageProvider;
use mountkv_common::{join_key, normalize_base_key, normalize_key, Error, Result, StorageValue};

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// Lifecycle state of a [`Storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    /// Accepting operations.
    Active,
    /// `dispose` is running.
    Disposing,
    /// Terminal; every operation fails with [`Error::Disposed`].
    Disposed,
}

/// Result of routing a key.
#[derive(Clone)]
pub struct ResolvedKey {
    /// Provider that owns the key.
    pub provider: Arc<dyn StorageProvider>,
    /// Base of the matched mount; empty for the default provider.
    pub base: String,
    /// Key relative to `base`, as the provider sees it.
    pub key: String,
}

/// Key-value storage that routes keys to mounted providers.
///
/// # Example
///
/// ```rust,ignore
/// let storage = Storage::new();
/// storage.mount("cache", Arc::new(MemoryProvider::new()))?;
///
/// storage.set_item("cache:x", json!(1)).await?; // stored as "x" in the cache provider
/// storage.set_item("y", json!(2)).await?;       // stored in the default provider
/// ```
pub struct Storage {
    default: MountEntry,
    mounts: RwLock<Arc<MountTable>>,
    state: AtomicU8,
    error_sink: Option<ErrorSink>,
}

impl Storage {
    /// Create a storage backed by an in-memory default provider.
    pub fn new() -> Self {
        Self::with_default(Arc::new(MemoryProvider::new()))
    }

    /// Create a storage with the given default provider.
    pub fn with_default(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            default: MountEntry::new(String::new(), provider),
            mounts: RwLock::new(Arc::new(MountTable::new())),
            state: AtomicU8::new(ACTIVE),
            error_sink: None,
        }
    }

    /// Send failures of background disposals to `sink`.
    ///
    /// Without a sink they are only logged.
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StorageState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => StorageState::Active,
            DISPOSING => StorageState::Disposing,
            _ => StorageState::Disposed,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) == ACTIVE {
            Ok(())
        } else {
            Err(Error::Disposed)
        }
    }

    fn snapshot(&self) -> Arc<MountTable> {
        self.mounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new table built from the current one.
    ///
    /// The state is checked under the write lock, so a change either lands
    /// before `dispose` takes the table or fails with [`Error::Disposed`].
    fn update<F>(&self, change: F) -> Result<Option<Arc<dyn StorageProvider>>>
    where
        F: FnOnce(&MountTable) -> (MountTable, Option<Arc<dyn StorageProvider>>),
    {
        let mut guard = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        self.ensure_active()?;
        let (next, previous) = change(&guard);
        *guard = Arc::new(next);
        Ok(previous)
    }

    /// Every provider with its base, default first.
    fn all_entries(&self, table: &MountTable) -> Vec<MountEntry> {
        std::iter::once(self.default.clone())
            .chain(table.entries().iter().cloned())
            .collect()
    }

    /// Mount `provider` at `base`.
    ///
    /// If another provider is already mounted at the same base it is
    /// replaced immediately and disposed in the background. A failure of
    /// that disposal is logged and sent to the error sink; it never fails
    /// this call.
    ///
    /// # Errors
    /// - `base` normalizes to the empty string (the default provider slot)
    /// - The storage has been disposed
    pub fn mount(&self, base: &str, provider: Arc<dyn StorageProvider>) -> Result<()> {
        self.ensure_active()?;

        let base = normalize_base_key(base);
        if base.is_empty() {
            return Err(Error::InvalidInput(
                "Cannot mount over the default provider".to_string(),
            ));
        }

        debug!(base = %base, provider = provider.name(), "Mounting provider");
        let incoming = provider.clone();
        let replaced = self.update(|table| table.with_mount(base.clone(), provider))?;

        if let Some(old) = replaced {
            if !Arc::ptr_eq(&old, &incoming) {
                debug!(base = %base, provider = old.name(), "Replaced provider scheduled for disposal");
                spawn_disposal(base, old, self.error_sink.clone());
            }
        }
        Ok(())
    }

    /// Remove the mount at `base`.
    ///
    /// Keys under `base` fall back to the next matching mount or the default
    /// provider. When `dispose` is set, the removed provider is disposed
    /// before returning. Unknown bases are ignored.
    pub async fn unmount(&self, base: &str, dispose: bool) -> Result<()> {
        self.ensure_active()?;

        let base = normalize_base_key(base);
        if base.is_empty() {
            return Err(Error::InvalidInput(
                "Cannot unmount the default provider".to_string(),
            ));
        }

        let Some(removed) = self.update(|table| table.without_mount(&base))? else {
            return Ok(());
        };
        debug!(base = %base, provider = removed.name(), "Unmounted provider");

        if dispose {
            dispose_provider(removed.as_ref()).await?;
        }
        Ok(())
    }

    /// Route `key` to its provider.
    ///
    /// The key is normalized, matched against mount bases from longest to
    /// shortest and rewritten relative to the winning base. Keys no mount
    /// claims go to the default provider unchanged.
    pub fn resolve(&self, key: &str) -> Result<ResolvedKey> {
        self.ensure_active()?;

        let key = normalize_key(key);
        let table = self.snapshot();
        let matched = table.resolve(&key).map(|(entry, relative)| ResolvedKey {
            provider: entry.provider().clone(),
            base: entry.base().to_string(),
            key: relative.to_string(),
        });
        let resolved = match matched {
            Some(resolved) => resolved,
            None => ResolvedKey {
                provider: self.default.provider().clone(),
                base: String::new(),
                key,
            },
        };
        debug!(base = %resolved.base, key = %resolved.key, "Resolved key");
        Ok(resolved)
    }

    /// Mount that serves `key`.
    pub fn get_mount(&self, key: &str) -> Result<MountInfo> {
        self.ensure_active()?;

        let key = normalize_key(key);
        let table = self.snapshot();
        let entry = table
            .resolve(&key)
            .map(|(entry, _)| entry)
            .unwrap_or(&self.default);
        Ok(entry.info())
    }

    /// All mounts in resolution order, default provider last.
    pub fn mounts(&self) -> Result<Vec<MountInfo>> {
        self.ensure_active()?;

        let table = self.snapshot();
        Ok(table
            .entries()
            .iter()
            .chain(std::iter::once(&self.default))
            .map(MountEntry::info)
            .collect())
    }

    /// Check if `key` exists.
    pub async fn has_item(&self, key: &str) -> Result<bool> {
        let resolved = self.resolve(key)?;
        resolved.provider.has_item(&resolved.key).await
    }

    /// Read the value at `key`.
    pub async fn get_item(&self, key: &str) -> Result<Option<StorageValue>> {
        let resolved = self.resolve(key)?;
        resolved.provider.get_item(&resolved.key).await
    }

    /// Store `value` at `key`.
    pub async fn set_item(&self, key: &str, value: StorageValue) -> Result<()> {
        let resolved = self.resolve(key)?;
        resolved.provider.set_item(&resolved.key, value).await
    }

    /// Remove `key`.
    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let resolved = self.resolve(key)?;
        resolved.provider.remove_item(&resolved.key).await
    }

    /// List the keys of every provider as full normalized keys.
    ///
    /// Keys are not deduplicated. Fails if any provider fails.
    pub async fn get_keys(&self) -> Result<Vec<String>> {
        self.ensure_active()?;

        let entries = self.all_entries(&self.snapshot());
        let lists = fan_out("get_keys", entries, |entry| async move {
            let keys = entry.provider().get_keys().await?;
            Ok::<_, Error>(
                keys.iter()
                    .map(|key| join_key(entry.base(), key))
                    .collect::<Vec<_>>(),
            )
        })
        .await?;

        Ok(lists.into_iter().flatten().collect())
    }

    /// Clear every provider.
    ///
    /// Providers that cleared successfully stay cleared even if another one
    /// fails.
    pub async fn clear(&self) -> Result<()> {
        self.ensure_active()?;

        let entries = self.all_entries(&self.snapshot());
        fan_out("clear", entries, |entry| async move {
            entry.provider().clear().await
        })
        .await?;
        Ok(())
    }

    /// Dispose every provider and shut the storage down.
    ///
    /// The storage ends up [`StorageState::Disposed`] whether or not every
    /// provider disposed cleanly.
    pub async fn dispose(&self) -> Result<()> {
        self.state
            .compare_exchange(ACTIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Disposed)?;

        let table = {
            let mut guard = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, Arc::new(MountTable::new()))
        };
        let entries = self.all_entries(&table);
        let total = entries.len();
        let result = fan_out("dispose", entries, |entry| async move {
            dispose_provider(entry.provider().as_ref()).await
        })
        .await;

        self.state.store(DISPOSED, Ordering::Release);
        info!(providers = total, "Storage disposed");

        result.map(|_| ())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `op` for every entry concurrently and wait for all of them.
///
/// All operations run to completion. If any failed, the first failure in
/// entry order is returned inside [`Error::Aggregate`] and every failure is
/// logged.
async fn fan_out<T, F, Fut>(
    operation: &'static str,
    entries: Vec<MountEntry>,
    op: F,
) -> Result<Vec<T>>
where
    F: Fn(MountEntry) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = entries.len();
    let labels: Vec<(String, String)> = entries
        .iter()
        .map(|e| (e.base().to_string(), e.provider().name().to_string()))
        .collect();

    let results = join_all(entries.into_iter().map(op)).await;

    let mut values = Vec::with_capacity(total);
    let mut first_error = None;
    let mut failed = 0;

    for ((base, provider), result) in labels.into_iter().zip(results) {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                failed += 1;
                warn!(operation, base = %base, provider = %provider, error = %err, "Provider failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        None => Ok(values),
        Some(source) => Err(Error::Aggregate {
            operation,
            failed,
            total,
            source: Box::new(source),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_default_provider_only() {
        let storage = Storage::new();

        storage.set_item("a/b", json!("v")).await.unwrap();

        assert_eq!(storage.get_item("a:b").await.unwrap(), Some(json!("v")));
        assert_eq!(storage.get_keys().await.unwrap(), vec!["a:b".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_rewrites_key() {
        let storage = Storage::new();
        let cache: Arc<dyn StorageProvider> = Arc::new(MemoryProvider::new());
        storage.mount("cache", cache.clone()).unwrap();

        let resolved = storage.resolve("/cache/users/1").unwrap();
        assert!(Arc::ptr_eq(&resolved.provider, &cache));
        assert_eq!(resolved.base, "cache:");
        assert_eq!(resolved.key, "users:1");

        let resolved = storage.resolve("cachex").unwrap();
        assert_eq!(resolved.base, "");
        assert_eq!(resolved.key, "cachex");
    }

    #[tokio::test]
    async fn test_mount_rejects_empty_base() {
        let storage = Storage::new();
        let err = storage
            .mount("/", Arc::new(MemoryProvider::new()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = storage.unmount("", true).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_mounts_listing() {
        let storage = Storage::new();
        storage.mount("a", Arc::new(MemoryProvider::new())).unwrap();
        storage.mount("a:b", Arc::new(MemoryProvider::new())).unwrap();

        let bases: Vec<String> = storage
            .mounts()
            .unwrap()
            .into_iter()
            .map(|m| m.base)
            .collect();
        assert_eq!(bases, vec!["a:b:", "a:", ""]);

        assert_eq!(storage.get_mount("a:b:c").unwrap().base, "a:b:");
        assert_eq!(storage.get_mount("zzz").unwrap().base, "");
        assert_eq!(storage.get_mount("zzz").unwrap().provider, "memory");
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let storage = Storage::new();
        assert_eq!(storage.state(), StorageState::Active);

        storage.dispose().await.unwrap();
        assert_eq!(storage.state(), StorageState::Disposed);
        assert!(matches!(storage.dispose().await, Err(Error::Disposed)));
    }

    #[tokio::test]
    async fn test_remount_same_provider_is_not_disposed() {
        let storage = Storage::new();
        let provider: Arc<dyn StorageProvider> = Arc::new(MemoryProvider::new());
        storage.mount("m", provider.clone()).unwrap();
        storage.set_item("m:k", json!(1)).await.unwrap();

        storage.mount("m", provider).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(storage.get_item("m:k").await.unwrap(), Some(json!(1)));
    }
}
