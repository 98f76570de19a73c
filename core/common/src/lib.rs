//! Common utilities and types shared across MountKV crates.
//!
//! This module provides the error type used by every provider and by the
//! router, plus the key normalization rules that make prefix routing
//! consistent.

pub mod error;
pub mod key;

pub use error::{Error, Result};
pub use key::{join_key, normalize_base_key, normalize_key, KEY_SEPARATOR};

/// Value type stored by providers.
///
/// `Value::Null` is a storable value; an absent key is `None` at the API level.
pub type StorageValue = serde_json::Value;
