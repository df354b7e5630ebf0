use thiserror::Error;

use crate::bridge::BridgeError;
use crate::error::{ErrorInfo, ErrorTemplate};
use crate::storage::StorageError;

/// Result type for workflow steps.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Why a workflow instance terminated early.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A race was lost to its timer.
    #[error("{message}")]
    Timeout {
        /// Stage that stalled.
        stage: &'static str,
        /// Message shown for this stage.
        message: &'static str,
    },
    /// A stage reported failure through an event.
    #[error("{message}")]
    Stage {
        /// Stage that failed.
        stage: &'static str,
        /// Message shown for this stage.
        message: String,
    },
    /// The native bridge rejected a call.
    #[error("{operation} failed: {source}")]
    Bridge {
        /// Bridge operation name.
        operation: &'static str,
        /// Error returned by the bridge.
        #[source]
        source: BridgeError,
    },
    /// Required input was absent.
    #[error("missing {field}")]
    MissingField {
        /// Absent field.
        field: &'static str,
    },
    /// An expected local record does not exist.
    #[error("no {entity} found for {key}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Key that was looked up.
        key: String,
    },
    /// A storage collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Local file system failure.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed JSON from a collaborator.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// The event bus shut down while waiting.
    #[error("event bus closed")]
    BusClosed,
}

impl From<serde_json::Error> for WorkflowError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl WorkflowError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds the user-visible error for this failure.
    ///
    /// Timeouts and stage failures already carry their final message and keep
    /// it verbatim; everything else is appended to the template's message.
    #[must_use]
    pub fn to_info(&self, template: ErrorTemplate) -> ErrorInfo {
        match self {
            Self::Timeout { message, .. } => ErrorInfo::new(template.code, *message),
            Self::Stage { message, .. } => ErrorInfo::new(template.code, message.clone()),
            other => template.with_detail(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ERROR_CLOUD_BACKUP, ERROR_GENERATE_BACKUP_FILE};

    #[test]
    fn test_stage_messages_are_kept_verbatim() {
        let error = WorkflowError::Timeout {
            stage: "create_handle",
            message: "Could not download wallet in one minute",
        };
        assert_eq!(
            error.to_info(ERROR_CLOUD_BACKUP),
            ErrorInfo::new("WB-006", "Could not download wallet in one minute")
        );
    }

    #[test]
    fn test_other_errors_append_detail() {
        let error = WorkflowError::Bridge {
            operation: "encrypt_wallet",
            source: BridgeError::Rejected("disk full".to_string()),
        };
        let info = error.to_info(ERROR_GENERATE_BACKUP_FILE);
        assert_eq!(info.code, "WB-002");
        assert!(info.message.starts_with("Error while generating backup file."));
        assert!(info.message.ends_with("disk full"));
    }
}
