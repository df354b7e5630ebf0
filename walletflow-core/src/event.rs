//! Events published on the bus.
//!
//! Every state change and every workflow trigger is one of these. Events are
//! grouped per domain; each domain enum has a payload-free kind used to wait
//! for it.

use std::collections::BTreeMap;
use std::fmt;

use strum::{Display, EnumDiscriminants};

use crate::error::ErrorInfo;
use crate::payload::{
    AppClaimOffer, AppProofRequest, DownloadedNotification, NotificationOpenOptions,
    NotificationPayload, Question,
};
use crate::state::backup::{BackupFailure, PassphraseRecord};
use crate::state::claim::{ClaimMapEntry, SerializedClaimOffer};
use crate::state::connections::Connection;
use crate::state::correlation::MessageMeta;
use crate::state::navigation::{InAppNotification, Redirection};

/// Bridge lifecycle and startup.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(ConfigEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`ConfigEvent`]."
)]
pub enum ConfigEvent {
    /// The native layer finished initialising.
    VcxInitSuccess,
    /// Restore persisted state.
    Hydrate,
}

/// Recovery phrase, local backup and cloud backup.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(BackupEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`BackupEvent`]."
)]
pub enum BackupEvent {
    /// Recovery phrase generation started.
    GenerateRecoveryPhraseLoading,
    /// A recovery phrase is available.
    GenerateRecoveryPhraseSuccess(PassphraseRecord),
    /// No recovery phrase could be generated.
    GenerateRecoveryPhraseFailure(ErrorInfo),
    /// Local backup archive creation started.
    GenerateBackupFileLoading,
    /// The local backup archive was written.
    GenerateBackupFileSuccess {
        /// Absolute path of the zip archive.
        archive_path: String,
    },
    /// The local backup archive could not be written.
    GenerateBackupFileFailure(ErrorInfo),
    /// Secure storage is being written into the wallet.
    PrepareBackupLoading,
    /// Secure storage was written into the wallet.
    PrepareBackupSuccess,
    /// Writing secure storage into the wallet failed.
    PrepareBackupFailure(ErrorInfo),
    /// The share sheet was opened for the archive.
    ExportBackupLoading,
    /// The user shared the archive.
    ExportBackupSuccess {
        /// When the archive was shared.
        timestamp: String,
    },
    /// The share sheet failed.
    ExportBackupFailure(ErrorInfo),
    /// The user dismissed the share sheet.
    ExportBackupNoShare,
    /// Shows or hides the backup banner.
    PromptBackupBanner(bool),
    /// The user started a cloud backup.
    CloudBackupStart,
    /// A cloud backup started without user interaction.
    StartAutomaticCloudBackup,
    /// The bridge created the cloud backup handle.
    SetWalletHandle(i32),
    /// The wallet is being uploaded to the agency.
    CloudBackupUploading,
    /// The agency acknowledged the backup.
    CloudBackupComplete {
        /// When the acknowledgement was processed.
        timestamp: String,
    },
    /// The cloud backup session failed.
    CloudBackupFailure(ErrorInfo),
    /// Returns a finished session to idle.
    ResetCloudBackupStatus,
    /// Turns automatic cloud backups on or off.
    SetAutoCloudBackupEnabled(bool),
    /// Whether the user saw the last wallet backup error.
    ViewedWalletError(bool),
    /// Restored time of the last local backup.
    HydrateLastBackup(String),
    /// Restored time of the last cloud backup.
    HydrateLastCloudBackup(String),
    /// Restored automatic cloud backup flag.
    HydrateAutoCloudBackupEnabled(bool),
    /// Restored recovery phrase verification flag.
    HydrateHasVerifiedRecoveryPhrase(bool),
    /// Restored banner visibility.
    HydrateBackupBanner(bool),
    /// One backup area could not be restored.
    HydrateBackupFailure(BackupFailure),
    /// One backup area could not be persisted.
    PersistBackupFailure(BackupFailure),
    /// Copy the passphrase from the wallet into secure storage.
    RestorePassphrase,
    /// The passphrase was copied into secure storage.
    PassphraseRestored,
    /// Remove the passphrase from secure storage.
    ClearPassphrase,
    /// The passphrase was removed.
    PassphraseCleared,
}

/// Notification handling and message downloads.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(
    name(PushEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`PushEvent`]."
)]
pub enum PushEvent {
    /// A push notification needs its message resolved.
    FetchAdditionalData {
        /// The notification as delivered.
        payload: NotificationPayload,
        /// How the notification was opened.
        open_options: NotificationOpenOptions,
    },
    /// Marks a `uid-forDID` message as being fetched.
    SetPendingFetchKey(String),
    /// Resolving a notification failed.
    FetchAdditionalDataError(ErrorInfo),
    /// Download every unacknowledged message.
    GetUnacknowledgedMessages,
    /// A message download started.
    GetMessagesLoading,
    /// A message download finished.
    GetMessagesSuccess,
    /// A message download failed.
    GetMessagesFail,
    /// The bulk download failed.
    UnacknowledgedMessagesFail(ErrorInfo),
    /// A message was resolved and is ready for the UI.
    PushNotificationReceived(DownloadedNotification),
    /// The platform issued a new push token.
    UpdatePushToken(String),
    /// Restored push token.
    HydratePushToken(String),
    /// The persisted push token could not be read.
    HydratePushTokenFail(ErrorInfo),
    /// The push token was registered and persisted.
    PushTokenSaved(String),
    /// The push token could not be registered.
    PushTokenFail(ErrorInfo),
}

/// A claim arrived for one of the offers of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceived {
    /// Bridge handle of the connection.
    pub connection_handle: i32,
    /// Agency message id.
    pub uid: String,
    /// Pairwise DID of this wallet.
    pub for_did: String,
    /// Pairwise DID of the issuer.
    pub remote_pairwise_did: String,
}

/// Claim storage and the claim map.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(ClaimEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`ClaimEvent`]."
)]
pub enum ClaimEvent {
    /// A claim message arrived; check the offers of its connection.
    ClaimReceivedVcx(ClaimReceived),
    /// Records who issued a stored claim.
    MapClaimToSender {
        /// Claim UUID assigned by the bridge.
        claim_uuid: String,
        /// The issuer.
        entry: ClaimMapEntry,
    },
    /// The credential for an offer was stored.
    ClaimStorageSuccess {
        /// Message the offer arrived in.
        message_id: String,
    },
    /// The credential for an offer could not be stored.
    ClaimStorageFail {
        /// Message the offer arrived in.
        message_id: String,
        /// What went wrong.
        error: ErrorInfo,
    },
    /// The bridge state of an accepted offer changed.
    SerializedClaimOfferUpdated {
        /// Pairwise DID of this wallet.
        for_did: String,
        /// The offer with its new state.
        offer: SerializedClaimOffer,
    },
    /// Restored claim map.
    HydrateClaimMap(BTreeMap<String, ClaimMapEntry>),
    /// The persisted claim map could not be read.
    HydrateClaimMapFail(ErrorInfo),
    /// The claim map could not be persisted.
    ClaimMapPersistFail(ErrorInfo),
}

/// Correlation record lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(CorrelationEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`CorrelationEvent`]."
)]
pub enum CorrelationEvent {
    /// A claim offer was received.
    ClaimOfferReceived {
        /// The converted offer.
        offer: AppClaimOffer,
        /// Message identifiers.
        meta: MessageMeta,
    },
    /// A proof request was received.
    ProofRequestReceived {
        /// The converted request.
        request: AppProofRequest,
        /// Message identifiers.
        meta: MessageMeta,
    },
    /// A question was received.
    QuestionReceived {
        /// The converted question.
        question: Question,
        /// Message identifiers.
        meta: MessageMeta,
    },
    /// The user opened the message.
    Shown {
        /// Record to update.
        uid: String,
    },
    /// The user accepted the message.
    Accepted {
        /// Record to update.
        uid: String,
    },
    /// The user rejected the message.
    Rejected {
        /// Record to update.
        uid: String,
    },
    /// The user ignored the message.
    Ignored {
        /// Record to update.
        uid: String,
    },
    /// The message could not be processed.
    Failed {
        /// Message that failed.
        uid: String,
        /// What went wrong.
        error: ErrorInfo,
    },
    /// Removes the record.
    Deleted {
        /// Record to remove.
        uid: String,
    },
}

/// Connection persistence.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(ConnectionEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`ConnectionEvent`]."
)]
pub enum ConnectionEvent {
    /// Store a connection.
    NewConnection(Connection),
    /// The connection was stored and persisted.
    NewConnectionSuccess(Connection),
    /// The connection could not be persisted.
    NewConnectionFail(ErrorInfo),
    /// Delete the connection with a sender.
    DeleteConnection {
        /// DID of the other party.
        sender_did: String,
    },
    /// The connection was deleted.
    DeleteConnectionSuccess {
        /// Pairwise DID of the deleted connection.
        identifier: String,
    },
    /// The connection could not be deleted.
    DeleteConnectionFail(ErrorInfo),
    /// Accept a serialized invitation.
    AcceptInvitation(String),
    /// Restored connections keyed by identifier.
    HydrateConnections(BTreeMap<String, Connection>),
    /// The persisted connections could not be read.
    HydrateConnectionsFail(ErrorInfo),
}

/// Lock state, screens and redirections.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(NavigationEventKind),
    derive(Hash, Display),
    doc = "Kind of a [`NavigationEvent`]."
)]
pub enum NavigationEvent {
    /// The lock screen is shown.
    LockApp,
    /// The user unlocked the app.
    UnlockApp,
    /// The foreground screen changed.
    ScreenChanged(String),
    /// Queue redirections to replay once navigation is allowed.
    AddPendingRedirection(Vec<Redirection>),
    /// Pending redirections were replayed.
    ClearPendingRedirection,
    /// Ask the UI to navigate.
    NavigateToRoute(Redirection),
    /// The UI consumed the navigation request.
    ClearNavigateToRoute,
    /// Show a banner for a message received in the foreground.
    ShowInAppNotification(InAppNotification),
    /// The banner was dismissed.
    DismissInAppNotification,
}

/// Any event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Bridge lifecycle.
    Config(ConfigEvent),
    /// Backups.
    Backup(BackupEvent),
    /// Notifications.
    Push(PushEvent),
    /// Claims.
    Claim(ClaimEvent),
    /// Correlation records.
    Correlation(CorrelationEvent),
    /// Connections.
    Connection(ConnectionEvent),
    /// Navigation.
    Navigation(NavigationEvent),
    /// Returns every sub-state to its defaults.
    Reset,
}

/// Payload-free identity of an [`Event`], used to wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A [`ConfigEvent`].
    Config(ConfigEventKind),
    /// A [`BackupEvent`].
    Backup(BackupEventKind),
    /// A [`PushEvent`].
    Push(PushEventKind),
    /// A [`ClaimEvent`].
    Claim(ClaimEventKind),
    /// A [`CorrelationEvent`].
    Correlation(CorrelationEventKind),
    /// A [`ConnectionEvent`].
    Connection(ConnectionEventKind),
    /// A [`NavigationEvent`].
    Navigation(NavigationEventKind),
    /// [`Event::Reset`].
    Reset,
}

impl Event {
    /// The kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Config(e) => EventKind::Config(e.into()),
            Self::Backup(e) => EventKind::Backup(e.into()),
            Self::Push(e) => EventKind::Push(e.into()),
            Self::Claim(e) => EventKind::Claim(e.into()),
            Self::Correlation(e) => EventKind::Correlation(e.into()),
            Self::Connection(e) => EventKind::Connection(e.into()),
            Self::Navigation(e) => EventKind::Navigation(e.into()),
            Self::Reset => EventKind::Reset,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(k) => write!(f, "config.{k}"),
            Self::Backup(k) => write!(f, "backup.{k}"),
            Self::Push(k) => write!(f, "push.{k}"),
            Self::Claim(k) => write!(f, "claim.{k}"),
            Self::Correlation(k) => write!(f, "correlation.{k}"),
            Self::Connection(k) => write!(f, "connection.{k}"),
            Self::Navigation(k) => write!(f, "navigation.{k}"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

macro_rules! domain_conversions {
    ($($variant:ident => $event:ty, $kind:ty;)*) => {
        $(
            impl From<$event> for Event {
                fn from(event: $event) -> Self {
                    Self::$variant(event)
                }
            }

            impl From<$kind> for EventKind {
                fn from(kind: $kind) -> Self {
                    Self::$variant(kind)
                }
            }
        )*
    };
}

domain_conversions! {
    Config => ConfigEvent, ConfigEventKind;
    Backup => BackupEvent, BackupEventKind;
    Push => PushEvent, PushEventKind;
    Claim => ClaimEvent, ClaimEventKind;
    Correlation => CorrelationEvent, CorrelationEventKind;
    Connection => ConnectionEvent, ConnectionEventKind;
    Navigation => NavigationEvent, NavigationEventKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ignores_payload() {
        let a: Event = BackupEvent::SetWalletHandle(1).into();
        let b: Event = BackupEvent::SetWalletHandle(2).into();
        assert_eq!(a.kind(), b.kind());
        assert_eq!(a.kind(), BackupEventKind::SetWalletHandle.into());
        assert_ne!(a.kind(), BackupEventKind::CloudBackupStart.into());
    }

    #[test]
    fn test_kind_display() {
        let kind: EventKind = BackupEventKind::PrepareBackupSuccess.into();
        assert_eq!(kind.to_string(), "backup.PrepareBackupSuccess");
        assert_eq!(EventKind::Reset.to_string(), "reset");
    }
}
