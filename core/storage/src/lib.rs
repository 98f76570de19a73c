//! Mount-based key-value storage for MountKV.
//!
//! This module provides a trait-based interface for key-value backends and a
//! [`Storage`] router that mounts backends at key prefixes, the way a
//! filesystem mount table maps directories to devices.
//!
//! # Design Principles
//! - Longest prefix wins: the most specific mount serves a key
//! - Async operations: every provider call is a future, sync backends included
//! - Aggregate operations fan out to all providers and fail as a whole
//! - Replaced providers are disposed in the background

pub mod adapter;
pub mod config;
pub mod lifecycle;
pub mod local;
pub mod memory;
pub mod mount;
pub mod provider;
pub mod registry;
pub mod storage;

pub use adapter::{SyncStorageProvider, SyncToAsync};
pub use config::{MountConfig, ProviderConfig, StorageConfig};
pub use lifecycle::{dispose_provider, ErrorSink};
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use mount::{MountEntry, MountInfo, MountTable};
pub use provider::{Disposable, StorageProvider};
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
pub use storage::{ResolvedKey, Storage, StorageState};

pub use mountkv_common::{Error, Result, StorageValue};
