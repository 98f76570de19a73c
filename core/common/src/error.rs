//! Common error types for MountKV.

use thiserror::Error;

/// Top-level error type for MountKV operations.
///
/// Providers report their failures with the storage-level variants; the
/// router passes those through untouched for single-key operations and wraps
/// them in [`Error::Aggregate`] only when several providers took part.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// One or more providers failed during a fan-out operation.
    ///
    /// `source` is the first failure in provider order.
    #[error("{operation} failed on {failed} of {total} providers: {source}")]
    Aggregate {
        operation: &'static str,
        failed: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },

    /// A provider replaced by a remount could not be disposed.
    ///
    /// Only ever delivered out of band; `mount` itself never returns it.
    #[error("Failed to dispose provider replaced at '{base}': {source}")]
    DisposalDuringMount {
        base: String,
        #[source]
        source: Box<Error>,
    },

    /// The storage has been disposed and can no longer be used.
    #[error("Storage has been disposed")]
    Disposed,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_aggregate_keeps_first_cause() {
        let err = Error::Aggregate {
            operation: "clear",
            failed: 2,
            total: 3,
            source: Box::new(Error::Storage("disk full".to_string())),
        };

        assert_eq!(
            err.to_string(),
            "clear failed on 2 of 3 providers: Storage error: disk full"
        );
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
