//! In-memory implementations of the storage traits.
//!
//! Used by tests and the developer CLI. Nothing here is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use super::{KeyValueStore, StorageError, StorageProvider, StorageResult};

/// In-memory key-value namespace backed by a `HashMap`.
///
/// Individual operations can be made to fail or to stall to exercise error
/// paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing_reads: Mutex<Vec<String>>,
    fail_writes: Mutex<bool>,
    writes_stalled: Mutex<bool>,
    writes_released: Notify,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        store
    }

    /// Makes every subsequent read of `key` fail.
    pub fn fail_reads_of(&self, key: impl Into<String>) {
        self.failing_reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.into());
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Holds every subsequent write until [`Self::release_writes`].
    pub fn stall_writes(&self) {
        *self.writes_stalled.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Lets stalled writes proceed.
    pub fn release_writes(&self) {
        *self.writes_stalled.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.writes_released.notify_waiters();
    }

    /// Synchronous read used by assertions.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_read(&self, key: &str) -> StorageResult<()> {
        let failing = self.failing_reads.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.iter().any(|k| k == key) {
            return Err(StorageError::Read(format!("read of {key} failed")));
        }
        Ok(())
    }

    async fn check_write(&self, key: &str) -> StorageResult<()> {
        loop {
            let released = self.writes_released.notified();
            if !*self.writes_stalled.lock().unwrap_or_else(PoisonError::into_inner) {
                break;
            }
            released.await;
        }
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StorageError::Write(format!("write of {key} failed")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: String) -> StorageResult<Option<String>> {
        self.check_read(&key)?;
        Ok(self.peek(&key))
    }

    async fn set(&self, key: String, value: String) -> StorageResult<()> {
        self.check_write(&key).await?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        Ok(())
    }

    async fn set_many(&self, entries: HashMap<String, String>) -> StorageResult<()> {
        self.check_write("<bulk>").await?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(entries);
        Ok(())
    }

    async fn delete(&self, key: String) -> StorageResult<()> {
        self.check_write(&key).await?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }

    async fn get_all(&self) -> StorageResult<HashMap<String, String>> {
        self.check_read("<all>")?;
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Storage provider handing out three in-memory namespaces.
#[derive(Debug)]
pub struct MemoryStorageProvider {
    /// Secure namespace.
    pub secure: Arc<MemoryStore>,
    /// Safe namespace.
    pub safe: Arc<MemoryStore>,
    /// Wallet namespace.
    pub wallet: Arc<MemoryStore>,
    documents_dir: String,
}

impl MemoryStorageProvider {
    /// Creates a provider with empty namespaces rooted at `documents_dir`.
    pub fn new(documents_dir: impl Into<String>) -> Self {
        Self {
            secure: Arc::new(MemoryStore::new()),
            safe: Arc::new(MemoryStore::new()),
            wallet: Arc::new(MemoryStore::new()),
            documents_dir: documents_dir.into(),
        }
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn secure(&self) -> Arc<dyn KeyValueStore> {
        self.secure.clone()
    }

    fn safe(&self) -> Arc<dyn KeyValueStore> {
        self.safe.clone()
    }

    fn wallet(&self) -> Arc<dyn KeyValueStore> {
        self.wallet.clone()
    }

    fn documents_dir(&self) -> String {
        self.documents_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a".into(), "1".into()).await.unwrap();
        assert_eq!(store.get("a".into()).await.unwrap(), Some("1".to_string()));
        store.delete("a".into()).await.unwrap();
        assert_eq!(store.get("a".into()).await.unwrap(), None);
        store.delete("missing".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::with_entries([("a", "1")]);
        store.fail_reads_of("a");
        assert!(matches!(
            store.get("a".into()).await,
            Err(StorageError::Read(_))
        ));
        store.set_fail_writes(true);
        assert!(matches!(
            store.set("b".into(), "2".into()).await,
            Err(StorageError::Write(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stalled_write_waits_for_release() {
        let store = MemoryStore::new();
        store.stall_writes();
        let mut write = tokio_test::task::spawn(store.set("a".into(), "1".into()));
        tokio_test::assert_pending!(write.poll());
        assert_eq!(store.peek("a"), None);

        store.release_writes();
        assert!(write.is_woken());
        tokio_test::assert_ready_ok!(write.poll());
        assert_eq!(store.peek("a"), Some("1".to_string()));
    }
}
