//! Provider disposal.
//!
//! Disposal is requested in two situations: when the whole storage shuts down
//! (awaited, failures propagate) and when a remount replaces a provider
//! (detached, failures go to the error sink).

use std::sync::Arc;
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::provider::StorageProvider;
use mountkv_common::{Error, Result};

/// Channel receiving failures that cannot be returned to a caller.
pub type ErrorSink = mpsc::UnboundedSender<Error>;

/// Dispose a provider if it supports disposal.
///
/// Providers without the capability succeed immediately.
pub async fn dispose_provider(provider: &dyn StorageProvider) -> Result<()> {
    match provider.as_disposable() {
        Some(disposable) => disposable.dispose().await,
        None => Ok(()),
    }
}

/// Dispose a provider that was replaced at `base`, without waiting for it.
///
/// Runs on the current tokio runtime when there is one, otherwise on a
/// short-lived thread with its own current-thread runtime. Failures are
/// logged and forwarded to `sink` as [`Error::DisposalDuringMount`].
pub fn spawn_disposal(base: String, provider: Arc<dyn StorageProvider>, sink: Option<ErrorSink>) {
    if provider.as_disposable().is_none() {
        return;
    }

    let name = provider.name().to_string();
    let task = {
        let base = base.clone();
        let sink = sink.clone();
        async move {
            match dispose_provider(provider.as_ref()).await {
                Ok(()) => debug!(base = %base, provider = provider.name(), "Disposed replaced provider"),
                Err(err) => report(base, provider.name(), err, sink),
            }
        }
    };

    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => {
            // Providers may use tokio timers or I/O while disposing.
            let spawned = std::thread::Builder::new()
                .name("mountkv-dispose".to_string())
                .spawn(move || {
                    match Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => runtime.block_on(task),
                        Err(err) => report(base, &name, err.into(), sink),
                    }
                });
            if let Err(err) = spawned {
                error!(error = %err, "Failed to start disposal thread");
            }
        }
    }
}

fn report(base: String, provider: &str, err: Error, sink: Option<ErrorSink>) {
    error!(
        base = %base,
        provider,
        error = %err,
        "Failed to dispose replaced provider"
    );
    if let Some(sink) = sink {
        // A dropped receiver means nobody is listening; the log entry stands.
        let _ = sink.send(Error::DisposalDuringMount {
            base,
            source: Box::new(err),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use crate::provider::Disposable;
    use async_trait::async_trait;
    use mountkv_common::StorageValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingDispose {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StorageProvider for FailingDispose {
        fn name(&self) -> &str {
            "failing"
        }

        async fn has_item(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }

        async fn get_item(&self, _key: &str) -> Result<Option<StorageValue>> {
            Ok(None)
        }

        async fn set_item(&self, _key: &str, _value: StorageValue) -> Result<()> {
            Ok(())
        }

        async fn remove_item(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn get_keys(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }

        fn as_disposable(&self) -> Option<&dyn Disposable> {
            Some(self)
        }
    }

    #[async_trait]
    impl Disposable for FailingDispose {
        async fn dispose(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Storage("handle already closed".to_string()))
        }
    }

    fn failing() -> Arc<FailingDispose> {
        Arc::new(FailingDispose {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_dispose_memory_provider() {
        let provider = MemoryProvider::new();
        provider.set_item("a", StorageValue::Bool(true)).await.unwrap();

        dispose_provider(&provider).await.unwrap();
        assert!(provider.get_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispose_failure_propagates() {
        let provider = failing();
        let err = dispose_provider(provider.as_ref()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawned_disposal_reports_to_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = failing();

        spawn_disposal("cache:".to_string(), provider.clone(), Some(tx));

        let reported = rx.recv().await.unwrap();
        match reported {
            Error::DisposalDuringMount { base, source } => {
                assert_eq!(base, "cache:");
                assert!(matches!(*source, Error::Storage(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawned_disposal_without_runtime() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        spawn_disposal("jobs:".to_string(), failing(), Some(tx));

        let reported = rx.blocking_recv().unwrap();
        assert!(matches!(reported, Error::DisposalDuringMount { .. }));
    }

    struct TimedDispose {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StorageProvider for TimedDispose {
        fn name(&self) -> &str {
            "timed"
        }

        async fn has_item(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }

        async fn get_item(&self, _key: &str) -> Result<Option<StorageValue>> {
            Ok(None)
        }

        async fn set_item(&self, _key: &str, _value: StorageValue) -> Result<()> {
            Ok(())
        }

        async fn remove_item(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn get_keys(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }

        fn as_disposable(&self) -> Option<&dyn Disposable> {
            Some(self)
        }
    }

    #[async_trait]
    impl Disposable for TimedDispose {
        async fn dispose(&self) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Storage("flush timed out".to_string()))
        }
    }

    #[test]
    fn test_spawned_disposal_without_runtime_supports_tokio_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = Arc::new(TimedDispose {
            calls: AtomicUsize::new(0),
        });

        spawn_disposal("db:".to_string(), provider.clone(), Some(tx));

        match rx.blocking_recv().unwrap() {
            Error::DisposalDuringMount { base, source } => {
                assert_eq!(base, "db:");
                assert_eq!(source.to_string(), "Storage error: flush timed out");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
