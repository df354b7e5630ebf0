//! Platform interfaces for persistent storage.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::StorageResult;

/// Key-value storage namespace provided by the host platform.
///
/// No transactional guarantee is made across multiple keys; callers that
/// write several keys accept that a crash can leave only some of them written.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get(&self, key: String) -> StorageResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set(&self, key: String, value: String) -> StorageResult<()>;

    /// Writes every entry of `entries` in one bulk operation.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    async fn set_many(&self, entries: HashMap<String, String>) -> StorageResult<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn delete(&self, key: String) -> StorageResult<()>;

    /// Returns every key-value pair in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get_all(&self) -> StorageResult<HashMap<String, String>>;
}

/// Provider responsible for the platform storage namespaces and paths.
#[uniffi::export(with_foreign)]
pub trait StorageProvider: Send + Sync {
    /// Hardware-protected storage (keychain / keystore).
    fn secure(&self) -> Arc<dyn KeyValueStore>;

    /// Plain application storage.
    fn safe(&self) -> Arc<dyn KeyValueStore>;

    /// Storage backed by the encrypted wallet.
    fn wallet(&self) -> Arc<dyn KeyValueStore>;

    /// Directory where backup directories and archives are created.
    fn documents_dir(&self) -> String;
}
