//! Workflow definitions.
//!
//! Each workflow is a unit struct (or a struct carrying its trigger payload)
//! implementing [`Workflow`](crate::engine::Workflow). The dispatcher decides
//! which event starts which workflow and under which
//! [`TriggerPolicy`](crate::engine::TriggerPolicy).

pub mod backup;
pub mod claim;
pub mod cloud_backup;
pub mod connection;
pub mod hydration;
pub mod messages;
pub mod notification;
pub mod push_token;
pub mod redirect;

/// Local timestamp used in backup file and directory names.
pub(crate) fn file_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string()
}

/// Timestamp persisted for completed backups.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
