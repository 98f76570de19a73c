//! Local filesystem storage provider.

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::provider::StorageProvider;
use mountkv_common::{Error, Result, StorageValue, KEY_SEPARATOR};

/// Characters that are not safe inside a single file name on common filesystems.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'%')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|');

/// Extension of value files.
const VALUE_EXTENSION: &str = ".json";

/// File holding the value of the empty key.
///
/// Encoded segments only contain `%` followed by two hex digits, so no other
/// key maps to this name.
const EMPTY_KEY_FILE: &str = "%.json";

/// Local filesystem storage provider.
///
/// Each key is stored as one JSON file. Key segments become directories, so
/// `users:42` lives at `<root>/users/42.json`. The extension keeps `users`
/// and `users:42` from colliding. The empty key is stored in a reserved file
/// at the root.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Root directory of this provider.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a key to the path of its value file.
    fn to_fs_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Ok(self.root.join(EMPTY_KEY_FILE));
        }

        let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        let mut fs_path = self.root.clone();
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(Error::InvalidInput(format!(
                    "Invalid key segment '{}' in '{}'",
                    segment, key
                )));
            }
            let encoded = utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string();
            if i + 1 == segments.len() {
                fs_path.push(format!("{encoded}{VALUE_EXTENSION}"));
            } else {
                fs_path.push(encoded);
            }
        }
        Ok(fs_path)
    }

    fn decode_segment(name: &str) -> Option<String> {
        percent_decode_str(name)
            .decode_utf8()
            .ok()
            .map(|s| s.into_owned())
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn has_item(&self, key: &str) -> Result<bool> {
        let fs_path = self.to_fs_path(key)?;
        match fs::metadata(&fs_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_item(&self, key: &str) -> Result<Option<StorageValue>> {
        let fs_path = self.to_fs_path(key)?;
        let raw = match fs::read(&fs_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn set_item(&self, key: &str, value: StorageValue) -> Result<()> {
        let fs_path = self.to_fs_path(key)?;
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_vec(&value)?;
        fs::write(&fs_path, raw).await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let fs_path = self.to_fs_path(key)?;
        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        let separator = KEY_SEPARATOR.to_string();
        let mut keys = Vec::new();
        let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(self.root.clone(), Vec::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name();
                let Some(name) = file_name.to_str() else {
                    debug!(path = %entry.path().display(), "Skipping non UTF-8 entry");
                    continue;
                };

                let file_type = entry.file_type().await?;
                if prefix.is_empty() && name == EMPTY_KEY_FILE && file_type.is_file() {
                    keys.push(String::new());
                } else if file_type.is_dir() {
                    if let Some(segment) = Self::decode_segment(name) {
                        let mut child = prefix.clone();
                        child.push(segment);
                        pending.push((entry.path(), child));
                    }
                } else if let Some(stem) = name.strip_suffix(VALUE_EXTENSION) {
                    if let Some(segment) = Self::decode_segment(stem) {
                        let mut segments = prefix.clone();
                        segments.push(segment);
                        keys.push(segments.join(separator.as_str()));
                    }
                }
            }
        }

        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}
