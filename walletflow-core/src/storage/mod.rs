//! Persistent storage collaborators: the key-value namespaces the workflows
//! read from and write to.

pub mod error;
pub mod keys;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStorageProvider, MemoryStore};
pub use traits::{KeyValueStore, StorageProvider};

/// Parses a persisted boolean flag.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] for anything other than `true` or `false`.
pub fn parse_flag(key: &str, value: &str) -> StorageResult<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(StorageError::Serialization(format!(
            "{key} holds {other:?}, expected a boolean"
        ))),
    }
}

/// Encodes a boolean flag the way [`parse_flag`] reads it.
#[must_use]
pub const fn flag_value(flag: bool) -> &'static str {
    if flag {
        "true"
    } else {
        "false"
    }
}
