//! Starts workflows in response to published events.
//!
//! The dispatcher sees every event in publish order, after the reducers ran.
//! It holds the engine weakly and stops once the engine is dropped.

use std::sync::Weak;

use tokio::sync::mpsc;

use crate::engine::{Engine, EngineInner, TriggerPolicy};
use crate::event::{
    BackupEvent, ClaimEvent, ConfigEvent, ConnectionEvent, CorrelationEvent, Event,
    NavigationEvent, PushEvent,
};
use crate::state::correlation::CorrelationStatus;
use crate::state::selectors;
use crate::workflows::backup::{
    ClearPassphrase, ExportBackup, GenerateRecoveryPhrase, LocalBackup, PersistBanner,
    PrepareBackup, RestorePassphrase,
};
use crate::workflows::claim::{PersistClaimMap, ReceiveClaim};
use crate::workflows::cloud_backup::CloudBackup;
use crate::workflows::connection::{AcceptInvitation, DeleteConnection, SaveConnection};
use crate::workflows::hydration::StartupHydration;
use crate::workflows::messages::FetchUnacknowledgedMessages;
use crate::workflows::notification::{FetchAdditionalData, UpdateStoreAndRedirect};
use crate::workflows::push_token::UpdatePushToken;
use crate::workflows::redirect::{OobDeletion, ReplayPendingRedirections};

pub(crate) async fn run(engine: Weak<EngineInner>, mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        route(&Engine::from_inner(inner), &event);
    }
    tracing::debug!("dispatcher stopped");
}

/// Starts the workflows `event` triggers.
fn route(engine: &Engine, event: &Event) {
    use TriggerPolicy::{Every, Exclusive, Latest};

    match event {
        Event::Config(ConfigEvent::Hydrate) => {
            engine.spawn(StartupHydration, Exclusive);
        }
        Event::Backup(event) => match event {
            BackupEvent::GenerateRecoveryPhraseLoading => {
                engine.spawn(GenerateRecoveryPhrase, Latest);
            }
            BackupEvent::GenerateBackupFileLoading => {
                engine.spawn(LocalBackup, Latest);
            }
            BackupEvent::PrepareBackupLoading => {
                engine.spawn(PrepareBackup, Latest);
            }
            BackupEvent::ExportBackupLoading => {
                engine.spawn(ExportBackup, Latest);
            }
            BackupEvent::CloudBackupStart | BackupEvent::StartAutomaticCloudBackup => {
                engine.spawn(CloudBackup, Exclusive);
            }
            BackupEvent::PromptBackupBanner(show) => {
                engine.spawn(PersistBanner(*show), Latest);
            }
            BackupEvent::RestorePassphrase => {
                engine.spawn(RestorePassphrase, Latest);
            }
            BackupEvent::ClearPassphrase => {
                engine.spawn(ClearPassphrase, Latest);
            }
            _ => {}
        },
        Event::Push(event) => match event {
            PushEvent::FetchAdditionalData {
                payload,
                open_options,
            } => {
                engine.spawn(
                    FetchAdditionalData {
                        payload: payload.clone(),
                        open_options: *open_options,
                    },
                    Every,
                );
            }
            PushEvent::GetUnacknowledgedMessages => {
                engine.spawn(FetchUnacknowledgedMessages, Exclusive);
            }
            PushEvent::PushNotificationReceived(notification)
                if notification.message_type.is_correlated() =>
            {
                engine.spawn(UpdateStoreAndRedirect(notification.clone()), Every);
            }
            PushEvent::UpdatePushToken(token) => {
                engine.spawn(UpdatePushToken(token.clone()), Latest);
            }
            _ => {}
        },
        Event::Claim(event) => match event {
            ClaimEvent::ClaimReceivedVcx(received) => {
                engine.spawn(ReceiveClaim(received.clone()), Every);
            }
            ClaimEvent::MapClaimToSender { .. } => {
                engine.spawn(PersistClaimMap, Every);
            }
            _ => {}
        },
        Event::Correlation(CorrelationEvent::Ignored { uid }) => {
            // The reducer already ran, so a refused transition leaves another status.
            let ignored_out_of_band = engine.store().select(|s| {
                selectors::correlation(s, uid).is_some_and(|r| {
                    r.is_out_of_band() && r.status == CorrelationStatus::Ignored
                })
            });
            if ignored_out_of_band {
                engine.spawn(OobDeletion { uid: uid.clone() }, Every);
            }
        }
        Event::Connection(event) => match event {
            ConnectionEvent::NewConnection(connection) => {
                engine.spawn(SaveConnection(connection.clone()), Every);
            }
            ConnectionEvent::DeleteConnection { sender_did } => {
                engine.spawn(
                    DeleteConnection {
                        sender_did: sender_did.clone(),
                    },
                    Every,
                );
            }
            ConnectionEvent::AcceptInvitation(invitation) => {
                engine.spawn(AcceptInvitation(invitation.clone()), Every);
            }
            _ => {}
        },
        Event::Navigation(NavigationEvent::UnlockApp | NavigationEvent::ScreenChanged(_)) => {
            engine.spawn(ReplayPendingRedirections, Every);
        }
        _ => {}
    }
}
