//! Mount table and longest-prefix resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::provider::StorageProvider;

/// A provider mounted at a normalized base.
///
/// Bases come from [`mountkv_common::normalize_base_key`], so they are either
/// empty or end with the key separator.
#[derive(Clone)]
pub struct MountEntry {
    base: String,
    provider: Arc<dyn StorageProvider>,
    mounted_at: DateTime<Utc>,
}

impl MountEntry {
    pub fn new(base: String, provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            base,
            provider,
            mounted_at: Utc::now(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    pub fn info(&self) -> MountInfo {
        MountInfo {
            base: self.base.clone(),
            provider: self.provider.name().to_string(),
            mounted_at: self.mounted_at,
        }
    }
}

impl fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEntry")
            .field("base", &self.base)
            .field("provider", &self.provider.name())
            .field("mounted_at", &self.mounted_at)
            .finish()
    }
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    /// Normalized base; empty for the default provider.
    pub base: String,
    /// Name reported by the provider.
    pub provider: String,
    pub mounted_at: DateTime<Utc>,
}

/// Immutable list of mounts ordered by descending base length.
///
/// Entries with equal base length keep their insertion order. Changes
/// produce a new table, which lets the router swap tables without readers
/// ever seeing a half-updated one.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a table with `provider` mounted at `base`.
    ///
    /// An existing mount at the same base keeps its position and gets the new
    /// provider; the provider it held is returned.
    pub fn with_mount(
        &self,
        base: String,
        provider: Arc<dyn StorageProvider>,
    ) -> (Self, Option<Arc<dyn StorageProvider>>) {
        let mut entries = self.entries.clone();

        if let Some(slot) = entries.iter_mut().find(|e| e.base == base) {
            let replaced = std::mem::replace(slot, MountEntry::new(base, provider));
            return (Self { entries }, Some(replaced.provider));
        }

        entries.push(MountEntry::new(base, provider));
        // Stable sort, so the new entry stays last among equal lengths.
        entries.sort_by(|a, b| b.base.len().cmp(&a.base.len()));
        (Self { entries }, None)
    }

    /// Return a table without the mount at `base`, and the provider it held.
    pub fn without_mount(&self, base: &str) -> (Self, Option<Arc<dyn StorageProvider>>) {
        let mut entries = self.entries.clone();
        let position = entries.iter().position(|e| e.base == base);
        let removed = position.map(|idx| entries.remove(idx).provider);
        (Self { entries }, removed)
    }

    /// Find the most specific mount for a normalized key.
    ///
    /// Returns the entry and the key relative to its base.
    pub fn resolve<'a, 'k>(&'a self, key: &'k str) -> Option<(&'a MountEntry, &'k str)> {
        self.entries.iter().find_map(|entry| {
            key.strip_prefix(entry.base.as_str())
                .map(|relative| (entry, relative))
        })
    }

    /// Entries in resolution order.
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn get(&self, base: &str) -> Option<&MountEntry> {
        self.entries.iter().find(|e| e.base == base)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
