use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::storage::StorageError;

/// Error outputs from the `WalletOrchestrator` facade.
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum WalletFlowError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that failed validation.
        attribute: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The configuration JSON could not be parsed
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
    /// Unexpected error serializing information
    #[error("serialization_error: {0}")]
    SerializationError(String),
    /// A storage collaborator rejected the request
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The native bridge rejected the request
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// The event bus was shut down
    #[error("event_bus_closed")]
    EventBusClosed,
}

/// A user-visible failure: a stable code plus a human message.
///
/// Every `*_FAIL` event carries one of these so the UI can render an inline
/// error or a retry alert without further queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ErrorInfo {
    /// Stable, machine-readable error code (e.g. `WB-006`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Builds an error from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A stable error code with its base message.
///
/// Failures append the underlying error text to the base message so logs and
/// alerts show both what failed and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorTemplate {
    /// Stable code.
    pub code: &'static str,
    /// Base message shown to the user.
    pub message: &'static str,
}

impl ErrorTemplate {
    const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }

    /// The template without any detail attached.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code, self.message)
    }

    /// The template with `detail` appended to the base message.
    #[must_use]
    pub fn with_detail(&self, detail: impl fmt::Display) -> ErrorInfo {
        ErrorInfo::new(self.code, format!("{} {detail}", self.message))
    }
}

/// Error while moving secure storage into the wallet.
pub const ERROR_PREPARE_BACKUP: ErrorTemplate =
    ErrorTemplate::new("WB-001", "Error while preparing wallet for backup.");
/// Error while generating the local backup archive.
pub const ERROR_GENERATE_BACKUP_FILE: ErrorTemplate =
    ErrorTemplate::new("WB-002", "Error while generating backup file.");
/// Error while handing the archive to the share sheet.
pub const ERROR_EXPORT_BACKUP: ErrorTemplate =
    ErrorTemplate::new("WB-003", "Error while exporting backup file.");
/// Recovery phrase generation exhausted its attempts.
pub const ERROR_GENERATE_RECOVERY_PHRASE: ErrorTemplate =
    ErrorTemplate::new("WB-004", "Error while generating recovery phrase.");
/// A backup hydration task failed.
pub const ERROR_HYDRATING_BACKUP: ErrorTemplate =
    ErrorTemplate::new("WB-005", "Error while hydrating backup data.");
/// The cloud backup protocol failed.
pub const ERROR_CLOUD_BACKUP: ErrorTemplate =
    ErrorTemplate::new("WB-006", "Failed to create cloud backup.");
/// A backup flag or the passphrase could not be persisted or restored.
pub const ERROR_PERSIST_BACKUP: ErrorTemplate =
    ErrorTemplate::new("WB-007", "Error while persisting backup data.");
/// Additional data could not be downloaded or converted.
pub const ERROR_INVALID_ADDITIONAL_DATA: ErrorTemplate =
    ErrorTemplate::new("OCS-000", "Invalid additional data");
/// The notification did not name the pairwise DID it was sent for.
pub const ERROR_MISSING_FOR_DID: ErrorTemplate =
    ErrorTemplate::new("OCS-001", "Missing forDID in notification payload");
/// No connection matches the notification.
pub const ERROR_NO_PAIRWISE_CONNECTION: ErrorTemplate =
    ErrorTemplate::new("OCS-002", "No pairwise connection found");
/// A claim could not be stored or mapped.
pub const ERROR_CLAIM_STORAGE: ErrorTemplate =
    ErrorTemplate::new("CS-001", "Error while storing claim.");
/// The persisted claim map could not be hydrated.
pub const ERROR_CLAIM_HYDRATE: ErrorTemplate =
    ErrorTemplate::new("CS-002", "Error while hydrating claim map.");
/// A connection could not be persisted.
pub const ERROR_SAVE_CONNECTION: ErrorTemplate =
    ErrorTemplate::new("CN-001", "Error while saving connection.");
/// A connection could not be deleted.
pub const ERROR_DELETE_CONNECTION: ErrorTemplate =
    ErrorTemplate::new("CN-002", "Error while deleting connection.");
/// Persisted connections could not be hydrated.
pub const ERROR_HYDRATE_CONNECTIONS: ErrorTemplate =
    ErrorTemplate::new("CN-003", "Error while hydrating connections.");
/// The bulk unacknowledged-message download failed.
pub const ERROR_FETCH_MESSAGES: ErrorTemplate =
    ErrorTemplate::new("MS-001", "Error while downloading messages.");
/// The push token could not be registered or saved.
pub const ERROR_PUSH_TOKEN: ErrorTemplate =
    ErrorTemplate::new("PN-001", "Error while updating push token.");
/// The persisted push token could not be hydrated.
pub const ERROR_HYDRATE_PUSH_TOKEN: ErrorTemplate =
    ErrorTemplate::new("PN-002", "Error while hydrating push token.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_detail_appends_cause() {
        let info = ERROR_GENERATE_BACKUP_FILE.with_detail("disk full");
        assert_eq!(info.code, "WB-002");
        assert_eq!(info.message, "Error while generating backup file. disk full");
        assert_eq!(format!("{info}"), "[WB-002] Error while generating backup file. disk full");
    }
}
