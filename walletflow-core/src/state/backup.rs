//! Backup state: recovery passphrase, local export and the cloud backup session.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::ErrorInfo;
use crate::event::{BackupEvent, Event};

/// Recovery passphrase with the salt and derived key.
///
/// `hash` is always the bridge's key derivation of `phrase` and `salt`; a
/// record is only built after that derivation succeeded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, uniffi::Record)]
pub struct PassphraseRecord {
    /// Space separated recovery words.
    pub phrase: String,
    /// Hex encoded salt.
    pub salt: String,
    /// Key derived from `phrase` and `salt`.
    pub hash: String,
}

impl fmt::Debug for PassphraseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseRecord")
            .field("phrase", &"<redacted>")
            .field("salt", &self.salt)
            .field("hash", &"<redacted>")
            .finish()
    }
}

/// Progress of the local backup flow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum,
)]
pub enum LocalBackupStatus {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Generating the recovery phrase.
    RecoveryPhraseLoading,
    /// The recovery phrase was generated and stored.
    RecoveryPhraseSuccess,
    /// Generating the recovery phrase failed.
    RecoveryPhraseFailure,
    /// Building the backup archive.
    GenerateFileLoading,
    /// The archive is ready to export.
    GenerateFileSuccess,
    /// Building the archive failed.
    GenerateFileFailure,
    /// The share sheet is open.
    ExportLoading,
    /// The user shared the archive.
    ExportSuccess,
    /// The share sheet reported an error.
    ExportFailure,
    /// The user closed the share sheet without sharing. Not an error.
    ExportNoShare,
}

/// Progress of copying secure storage into the wallet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum,
)]
pub enum PrepareStatus {
    /// Not requested.
    #[default]
    Idle,
    /// Copying.
    Loading,
    /// Every entry was copied.
    Success,
    /// The wallet rejected a write.
    Failure,
}

/// Cloud backup session status.
///
/// ```text
/// Idle -> Preparing -> CreatingHandle -> AwaitingAck -> [Uploading ->] Complete
///            |               |               |              |
///            +---------------+---- Failed ---+--------------+
/// Complete | Failed -> Idle
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, uniffi::Enum,
)]
pub enum CloudBackupStatus {
    /// No session running.
    #[default]
    Idle,
    /// Copying secure storage into the wallet.
    Preparing,
    /// Waiting for the native layer to open the backup.
    CreatingHandle,
    /// Waiting for the agency to accept and store the backup.
    AwaitingAck,
    /// The agency asked for the backup and it is being sent.
    Uploading,
    /// The agency acknowledged the backup.
    Complete,
    /// The session stopped. See [`BackupSession::error`].
    Failed,
}

impl CloudBackupStatus {
    /// Whether the session may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Preparing)
                | (Self::Preparing, Self::CreatingHandle | Self::Failed)
                | (Self::CreatingHandle, Self::AwaitingAck | Self::Failed)
                | (
                    Self::AwaitingAck,
                    Self::Uploading | Self::Complete | Self::Failed
                )
                | (Self::Uploading, Self::Complete | Self::Failed)
                | (Self::Complete | Self::Failed, Self::Idle)
        )
    }

    /// `Complete` or `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// A session is in progress.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal() && !matches!(self, Self::Idle)
    }
}

/// The cloud backup session and the timestamps of the last good backups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct BackupSession {
    /// Current step.
    pub status: CloudBackupStatus,
    /// Native handle of the backup being uploaded.
    pub wallet_handle: Option<i32>,
    /// RFC 3339 time of the last exported local backup.
    pub last_successful_backup: Option<String>,
    /// RFC 3339 time of the last acknowledged cloud backup.
    pub last_successful_cloud_backup: Option<String>,
    /// Why the session failed.
    pub error: Option<ErrorInfo>,
}

impl BackupSession {
    /// Moves to `next` if the edge exists. Returns whether it moved.
    pub fn advance(&mut self, next: CloudBackupStatus) -> bool {
        if self.status.can_transition_to(next) {
            tracing::debug!(from = ?self.status, to = ?next, "cloud backup transition");
            self.status = next;
            true
        } else {
            tracing::debug!(from = ?self.status, to = ?next, "cloud backup transition ignored");
            false
        }
    }

    fn start(&mut self) {
        if self.status.is_terminal() {
            self.advance(CloudBackupStatus::Idle);
        }
        if self.advance(CloudBackupStatus::Preparing) {
            self.wallet_handle = None;
            self.error = None;
        }
    }
}

/// Persisted backup sub-areas, used to report which one failed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
pub enum BackupArea {
    /// Time of the last exported local backup.
    LastSuccessfulBackup,
    /// Time of the last acknowledged cloud backup.
    LastSuccessfulCloudBackup,
    /// Automatic cloud backup switch.
    AutoCloudBackupEnabled,
    /// Whether the user confirmed the recovery phrase.
    HasVerifiedRecoveryPhrase,
    /// Backup banner visibility.
    BackupBanner,
    /// Recovery phrase and salt in secure storage.
    Passphrase,
}

/// A hydration or persistence failure for one [`BackupArea`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct BackupFailure {
    /// Area that failed.
    pub area: BackupArea,
    /// What went wrong.
    pub error: ErrorInfo,
}

/// Everything the backup screens render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupState {
    /// Never serialized.
    #[serde(skip)]
    pub passphrase: Option<PassphraseRecord>,
    /// Local backup progress.
    pub status: LocalBackupStatus,
    /// Progress of copying secure storage into the wallet.
    pub prepare: PrepareStatus,
    /// Archive built by the last local backup.
    pub backup_path: Option<String>,
    /// Last local backup error.
    pub error: Option<ErrorInfo>,
    /// Cloud backup session.
    pub session: BackupSession,
    /// Show the banner asking for a backup.
    pub show_banner: bool,
    /// Run cloud backups without asking.
    pub auto_cloud_backup_enabled: bool,
    /// The user confirmed the recovery phrase.
    pub has_verified_recovery_phrase: bool,
    /// The user saw the last backup error.
    pub has_viewed_wallet_error: bool,
    /// Hydration and persistence failures, oldest first.
    pub failures: Vec<BackupFailure>,
}

pub(crate) fn reduce(state: &mut BackupState, event: &Event) {
    let event = match event {
        Event::Reset => {
            if let Some(record) = state.passphrase.as_mut() {
                record.zeroize();
            }
            *state = BackupState::default();
            return;
        }
        Event::Backup(event) => event,
        _ => return,
    };

    match event {
        BackupEvent::GenerateRecoveryPhraseLoading => {
            state.status = LocalBackupStatus::RecoveryPhraseLoading;
            state.error = None;
        }
        BackupEvent::GenerateRecoveryPhraseSuccess(record) => {
            state.status = LocalBackupStatus::RecoveryPhraseSuccess;
            state.passphrase = Some(record.clone());
        }
        BackupEvent::GenerateRecoveryPhraseFailure(error) => {
            state.status = LocalBackupStatus::RecoveryPhraseFailure;
            state.error = Some(error.clone());
        }
        BackupEvent::GenerateBackupFileLoading => {
            state.status = LocalBackupStatus::GenerateFileLoading;
            state.error = None;
        }
        BackupEvent::GenerateBackupFileSuccess { archive_path } => {
            state.status = LocalBackupStatus::GenerateFileSuccess;
            state.backup_path = Some(archive_path.clone());
        }
        BackupEvent::GenerateBackupFileFailure(error) => {
            state.status = LocalBackupStatus::GenerateFileFailure;
            state.error = Some(error.clone());
        }
        BackupEvent::PrepareBackupLoading => state.prepare = PrepareStatus::Loading,
        BackupEvent::PrepareBackupSuccess => {
            state.prepare = PrepareStatus::Success;
            if state.session.status == CloudBackupStatus::Preparing {
                state.session.advance(CloudBackupStatus::CreatingHandle);
            }
        }
        BackupEvent::PrepareBackupFailure(error) => {
            state.prepare = PrepareStatus::Failure;
            state.error = Some(error.clone());
        }
        BackupEvent::ExportBackupLoading => {
            state.status = LocalBackupStatus::ExportLoading;
            state.error = None;
        }
        BackupEvent::ExportBackupSuccess { timestamp } => {
            state.status = LocalBackupStatus::ExportSuccess;
            state.session.last_successful_backup = Some(timestamp.clone());
        }
        BackupEvent::ExportBackupFailure(error) => {
            state.status = LocalBackupStatus::ExportFailure;
            state.error = Some(error.clone());
        }
        BackupEvent::ExportBackupNoShare => state.status = LocalBackupStatus::ExportNoShare,
        BackupEvent::PromptBackupBanner(show) | BackupEvent::HydrateBackupBanner(show) => {
            state.show_banner = *show;
        }
        BackupEvent::CloudBackupStart | BackupEvent::StartAutomaticCloudBackup => {
            state.session.start();
        }
        BackupEvent::SetWalletHandle(handle) => {
            if state.session.advance(CloudBackupStatus::AwaitingAck) {
                state.session.wallet_handle = Some(*handle);
            }
        }
        BackupEvent::CloudBackupUploading => {
            state.session.advance(CloudBackupStatus::Uploading);
        }
        BackupEvent::CloudBackupComplete { timestamp } => {
            if state.session.advance(CloudBackupStatus::Complete) {
                state.session.last_successful_cloud_backup = Some(timestamp.clone());
            }
        }
        BackupEvent::CloudBackupFailure(error) => {
            if state.session.advance(CloudBackupStatus::Failed) {
                state.session.error = Some(error.clone());
            }
        }
        BackupEvent::ResetCloudBackupStatus => {
            if state.session.status.is_terminal() {
                state.session.advance(CloudBackupStatus::Idle);
                state.session.error = None;
            }
        }
        BackupEvent::SetAutoCloudBackupEnabled(enabled)
        | BackupEvent::HydrateAutoCloudBackupEnabled(enabled) => {
            state.auto_cloud_backup_enabled = *enabled;
        }
        BackupEvent::ViewedWalletError(viewed) => state.has_viewed_wallet_error = *viewed,
        BackupEvent::HydrateLastBackup(timestamp) => {
            state.session.last_successful_backup = Some(timestamp.clone());
        }
        BackupEvent::HydrateLastCloudBackup(timestamp) => {
            state.session.last_successful_cloud_backup = Some(timestamp.clone());
        }
        BackupEvent::HydrateHasVerifiedRecoveryPhrase(verified) => {
            state.has_verified_recovery_phrase = *verified;
        }
        BackupEvent::HydrateBackupFailure(failure) | BackupEvent::PersistBackupFailure(failure) => {
            state.failures.push(failure.clone());
        }
        BackupEvent::PassphraseCleared => {
            if let Some(mut record) = state.passphrase.take() {
                record.zeroize();
            }
        }
        BackupEvent::RestorePassphrase
        | BackupEvent::PassphraseRestored
        | BackupEvent::ClearPassphrase => {}
    }
}
