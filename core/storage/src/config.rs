//! Storage configuration.
//!
//! A configuration names the default provider and the mounts to create, each
//! as a provider type known to a [`ProviderRegistry`] plus its options:
//!
//! ```json
//! {
//!   "default": {"provider": "memory"},
//!   "mounts": [
//!     {"base": "cache", "provider": "memory"},
//!     {"base": "data", "provider": "local", "options": {"root": "/var/lib/mountkv"}}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::registry::ProviderRegistry;
use crate::storage::Storage;
use mountkv_common::Result;

/// A provider type and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered provider type (e.g., "memory", "local").
    pub provider: String,
    /// Provider-specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// A provider mounted at a base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    pub base: String,
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

/// Configuration of a whole [`Storage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Default provider; in-memory when absent.
    #[serde(default)]
    pub default: Option<ProviderConfig>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

impl StorageConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }
}

impl Storage {
    /// Build a storage from configuration.
    ///
    /// Mounts are applied in order, so a later mount at the same base
    /// replaces an earlier one.
    ///
    /// # Errors
    /// - Unknown provider type
    /// - Invalid provider options
    /// - A mount base that normalizes to the empty string
    pub fn from_config(config: &StorageConfig, registry: &ProviderRegistry) -> Result<Self> {
        let storage = match &config.default {
            Some(default) => {
                Storage::with_default(registry.resolve(&default.provider, default.options.clone())?)
            }
            None => Storage::new(),
        };

        for mount in &config.mounts {
            let provider = registry.resolve(&mount.provider.provider, mount.provider.options.clone())?;
            storage.mount(&mount.base, provider)?;
        }

        debug!(mounts = config.mounts.len(), "Storage built from configuration");
        Ok(storage)
    }
}
