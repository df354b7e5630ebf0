//! Error types for the persistent storage collaborators.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`KeyValueStore`](super::KeyValueStore) implementation.
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// Reading a key failed.
    #[error("storage read error: {0}")]
    Read(String),

    /// Writing a key failed.
    #[error("storage write error: {0}")]
    Write(String),

    /// Deleting a key failed.
    #[error("storage delete error: {0}")]
    Delete(String),

    /// A persisted value could not be parsed or encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
