//! The object foreign hosts hold on to.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bridge::{Bridge, ClaimOfferState, ShareSheet};
use crate::config::FlowConfig;
use crate::engine::{Collaborators, Engine};
use crate::error::WalletFlowError;
use crate::event::{
    BackupEvent, ClaimEvent, ConfigEvent, ConnectionEvent, CorrelationEvent, Event,
    NavigationEvent, PushEvent,
};
use crate::payload::{NotificationOpenOptions, NotificationPayload};
use crate::state::backup::{BackupSession, LocalBackupStatus};
use crate::state::claim::{ClaimMapEntry, SerializedClaimOffer};
use crate::state::connections::Connection;
use crate::state::correlation::CorrelationRecord;
use crate::state::navigation::{InAppNotification, Redirection};
use crate::state::selectors;
use crate::storage::StorageProvider;

/// Drives every wallet workflow against host-provided collaborators.
///
/// User actions publish an event and return immediately; the resulting
/// workflows run in the background. Progress is read back through the
/// snapshot accessors.
#[derive(Debug, uniffi::Object)]
pub struct WalletOrchestrator {
    engine: Engine,
}

#[uniffi::export(async_runtime = "tokio")]
impl WalletOrchestrator {
    /// Starts the orchestrator.
    ///
    /// `config` is a JSON [`FlowConfig`]; missing fields and a missing config
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`WalletFlowError::InvalidInput`] if `config` cannot be parsed.
    #[uniffi::constructor]
    #[allow(clippy::unused_async)] // workflows are spawned on the runtime this runs on
    pub async fn init(
        bridge: Arc<dyn Bridge>,
        storage: Arc<dyn StorageProvider>,
        share_sheet: Arc<dyn ShareSheet>,
        config: Option<String>,
    ) -> Result<Self, WalletFlowError> {
        let config = match config {
            Some(json) => {
                FlowConfig::from_json(&json).map_err(|e| WalletFlowError::InvalidInput {
                    attribute: "config".to_string(),
                    reason: e.to_string(),
                })?
            }
            None => FlowConfig::default(),
        };
        Ok(Self::start(
            Collaborators {
                bridge,
                storage,
                share_sheet,
            },
            config,
        ))
    }

    /// The native layer finished initialising.
    pub fn bridge_initialized(&self) {
        self.engine.publish(ConfigEvent::VcxInitSuccess);
    }

    /// Restores persisted state.
    pub fn hydrate(&self) {
        self.engine.publish(ConfigEvent::Hydrate);
    }

    /// Produces the recovery phrase, then builds the local backup archive.
    pub fn generate_recovery_phrase(&self) {
        self.engine
            .publish(BackupEvent::GenerateRecoveryPhraseLoading);
    }

    /// Rebuilds the local backup archive with the current recovery phrase.
    pub fn generate_backup_file(&self) {
        self.engine.publish(BackupEvent::GenerateBackupFileLoading);
    }

    /// Shares the last backup archive.
    pub fn export_backup(&self) {
        self.engine.publish(BackupEvent::ExportBackupLoading);
    }

    /// Starts a cloud backup requested by the user.
    pub fn start_cloud_backup(&self) {
        self.engine.publish(BackupEvent::CloudBackupStart);
    }

    /// Starts a cloud backup scheduled by the app.
    pub fn start_automatic_cloud_backup(&self) {
        self.engine.publish(BackupEvent::StartAutomaticCloudBackup);
    }

    /// Returns a finished cloud backup session to idle.
    pub fn reset_cloud_backup_status(&self) {
        self.engine.publish(BackupEvent::ResetCloudBackupStatus);
    }

    /// Turns automatic cloud backups on or off. The choice is persisted.
    pub fn set_auto_cloud_backup_enabled(&self, enabled: bool) {
        self.engine
            .publish(BackupEvent::SetAutoCloudBackupEnabled(enabled));
    }

    /// Records whether the user saw the last backup error.
    pub fn viewed_wallet_error(&self, viewed: bool) {
        self.engine.publish(BackupEvent::ViewedWalletError(viewed));
    }

    /// Shows or hides the backup banner. The choice is persisted.
    pub fn prompt_backup_banner(&self, show: bool) {
        self.engine.publish(BackupEvent::PromptBackupBanner(show));
    }

    /// Copies the passphrase from a restored wallet into secure storage.
    pub fn restore_passphrase(&self) {
        self.engine.publish(BackupEvent::RestorePassphrase);
    }

    /// Removes the recovery phrase from memory and secure storage.
    pub fn clear_passphrase(&self) {
        self.engine.publish(BackupEvent::ClearPassphrase);
    }

    /// A push notification arrived or was opened.
    pub fn push_notification_received(
        &self,
        payload: NotificationPayload,
        open_options: NotificationOpenOptions,
    ) {
        self.engine.publish(PushEvent::FetchAdditionalData {
            payload,
            open_options,
        });
    }

    /// Checks the agency for messages no notification announced.
    pub fn fetch_unacknowledged_messages(&self) {
        self.engine.publish(PushEvent::GetUnacknowledgedMessages);
    }

    /// Registers a new push token with the agency.
    pub fn update_push_token(&self, token: String) {
        self.engine.publish(PushEvent::UpdatePushToken(token));
    }

    /// The app showed its lock screen.
    pub fn lock(&self) {
        self.engine.publish(NavigationEvent::LockApp);
    }

    /// The user unlocked the app.
    pub fn unlock(&self) {
        self.engine.publish(NavigationEvent::UnlockApp);
    }

    /// The foreground screen changed to `screen`.
    pub fn screen_changed(&self, screen: String) {
        self.engine.publish(NavigationEvent::ScreenChanged(screen));
    }

    /// Takes the navigation request the UI should act on, if any.
    #[must_use]
    pub fn take_navigation(&self) -> Option<Redirection> {
        let next = self.engine.store().select(|s| s.navigation.navigate_to.clone());
        if next.is_some() {
            self.engine.publish(NavigationEvent::ClearNavigateToRoute);
        }
        next
    }

    /// Hides the in-app notification banner.
    pub fn dismiss_in_app_notification(&self) {
        self.engine
            .publish(NavigationEvent::DismissInAppNotification);
    }

    /// Remembers a claim offer the user accepted, so the claim that later
    /// arrives on `for_did` can be stored.
    pub fn track_claim_offer(&self, for_did: String, message_id: String, serialized: String) {
        self.engine.publish(ClaimEvent::SerializedClaimOfferUpdated {
            for_did,
            offer: SerializedClaimOffer {
                message_id,
                serialized,
                state: ClaimOfferState::OfferSent,
            },
        });
    }

    /// The message `uid` was shown to the user.
    pub fn message_shown(&self, uid: String) {
        self.engine.publish(CorrelationEvent::Shown { uid });
    }

    /// The user accepted the message `uid`.
    pub fn message_accepted(&self, uid: String) {
        self.engine.publish(CorrelationEvent::Accepted { uid });
    }

    /// The user rejected the message `uid`.
    pub fn message_rejected(&self, uid: String) {
        self.engine.publish(CorrelationEvent::Rejected { uid });
    }

    /// The user ignored a message. Out-of-band proof requests are deleted
    /// shortly after.
    pub fn message_ignored(&self, uid: String) {
        self.engine.publish(CorrelationEvent::Ignored { uid });
    }

    /// Stores a new connection and persists the list.
    pub fn save_connection(&self, connection: Connection) {
        self.engine.publish(ConnectionEvent::NewConnection(connection));
    }

    /// Deletes the connection to `sender_did`.
    pub fn delete_connection(&self, sender_did: String) {
        self.engine
            .publish(ConnectionEvent::DeleteConnection { sender_did });
    }

    /// Accepts a connection invitation and stores the resulting connection.
    pub fn accept_invitation(&self, invitation: String) {
        self.engine
            .publish(ConnectionEvent::AcceptInvitation(invitation));
    }

    /// Returns every in-memory state to its defaults. Persisted data is kept.
    pub fn reset(&self) {
        self.engine.publish(Event::Reset);
    }

    /// Snapshot of the current cloud backup session.
    #[must_use]
    pub fn cloud_backup_session(&self) -> BackupSession {
        self.engine.store().select(|s| s.backup.session.clone())
    }

    /// Where the local backup flow currently is.
    #[must_use]
    pub fn local_backup_status(&self) -> LocalBackupStatus {
        self.engine.store().select(|s| s.backup.status)
    }

    /// Path of the last local backup archive.
    #[must_use]
    pub fn backup_archive_path(&self) -> Option<String> {
        self.engine.store().select(selectors::backup_path)
    }

    /// The recovery phrase generated in this session.
    #[must_use]
    pub fn recovery_phrase(&self) -> Option<String> {
        self.engine
            .store()
            .select(|s| s.backup.passphrase.as_ref().map(|p| p.phrase.clone()))
    }

    /// The correlation record for `uid`, if one exists.
    #[must_use]
    pub fn correlation(&self, uid: &str) -> Option<CorrelationRecord> {
        self.engine
            .store()
            .select(|s| selectors::correlation(s, uid))
    }

    /// Every correlation record, in no particular order.
    #[must_use]
    pub fn correlations(&self) -> Vec<CorrelationRecord> {
        self.engine
            .store()
            .select(|s| s.correlation.records.values().cloned().collect())
    }

    /// Every stored connection.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.engine
            .store()
            .select(|s| s.connections.connections.values().cloned().collect())
    }

    /// Received claims keyed by claim uuid.
    #[must_use]
    pub fn claim_map(&self) -> HashMap<String, ClaimMapEntry> {
        self.engine
            .store()
            .select(selectors::claim_map)
            .into_iter()
            .collect()
    }

    /// Redirections waiting for the app to be unlocked.
    #[must_use]
    pub fn pending_redirections(&self) -> Vec<Redirection> {
        self.engine.store().select(selectors::pending_redirections)
    }

    /// The banner currently shown, if any.
    #[must_use]
    pub fn in_app_notification(&self) -> Option<InAppNotification> {
        self.engine
            .store()
            .select(|s| s.navigation.in_app_notification.clone())
    }

    /// The full state as JSON, for diagnostics. Secrets are left out.
    ///
    /// # Errors
    ///
    /// Returns [`WalletFlowError::SerializationError`] if serialization fails.
    pub fn state_json(&self) -> Result<String, WalletFlowError> {
        serde_json::to_string_pretty(&self.engine.store().snapshot())
            .map_err(|e| WalletFlowError::SerializationError(e.to_string()))
    }
}

impl WalletOrchestrator {
    /// Starts the orchestrator from Rust. Must be called within a tokio runtime.
    #[must_use]
    pub fn start(collaborators: Collaborators, config: FlowConfig) -> Self {
        tracing::info!(platform = ?config.platform, "starting wallet orchestrator");
        Self {
            engine: Engine::start(collaborators, config),
        }
    }

    /// The underlying engine, for waiting on events and inspecting workflows.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MemoryBridge, RecordingShareSheet, ShareOutcome};
    use crate::storage::MemoryStorageProvider;

    async fn orchestrator(config: Option<&str>) -> Result<WalletOrchestrator, WalletFlowError> {
        WalletOrchestrator::init(
            Arc::new(MemoryBridge::new()),
            Arc::new(MemoryStorageProvider::new("/tmp")),
            Arc::new(RecordingShareSheet::new(ShareOutcome::Shared)),
            config.map(str::to_string),
        )
        .await
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let error = orchestrator(Some("{not json")).await.unwrap_err();
        assert!(matches!(
            error,
            WalletFlowError::InvalidInput { ref attribute, .. } if attribute == "config"
        ));
    }

    #[tokio::test]
    async fn test_take_navigation_clears_request() {
        let orchestrator = orchestrator(Some(r#"{"platform":"android"}"#))
            .await
            .unwrap();
        orchestrator
            .engine()
            .publish(NavigationEvent::NavigateToRoute(Redirection::to("Home")));

        assert_eq!(orchestrator.take_navigation(), Some(Redirection::to("Home")));
        assert_eq!(orchestrator.take_navigation(), None);
    }

    #[tokio::test]
    async fn test_state_json_omits_passphrase() {
        let orchestrator = orchestrator(None).await.unwrap();
        let json = orchestrator.state_json().unwrap();
        assert!(json.contains("\"session\""));
        assert!(!json.contains("passphrase"));
    }
}
