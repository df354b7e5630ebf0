//! Startup hydration of persisted state.
//!
//! Every area is read by its own forked workflow so that one unreadable
//! value only fails its own area.

use crate::engine::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult};
use crate::error::{
    ERROR_CLAIM_HYDRATE, ERROR_HYDRATE_CONNECTIONS, ERROR_HYDRATE_PUSH_TOKEN, ERROR_HYDRATING_BACKUP,
};
use crate::event::{BackupEvent, ClaimEvent, ConnectionEvent, Event, PushEvent};
use crate::state::backup::{BackupArea, BackupFailure};
use crate::storage::{keys, parse_flag};

use super::claim::load_claim_map;
use super::connection::load_connections;

/// Backup areas restored at startup, all from safe storage.
pub const HYDRATED_BACKUP_AREAS: [BackupArea; 5] = [
    BackupArea::LastSuccessfulBackup,
    BackupArea::LastSuccessfulCloudBackup,
    BackupArea::AutoCloudBackupEnabled,
    BackupArea::HasVerifiedRecoveryPhrase,
    BackupArea::BackupBanner,
];

/// Forks one hydration workflow per persisted area.
#[derive(Debug)]
pub struct StartupHydration;

#[async_trait::async_trait]
impl Workflow for StartupHydration {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::StartupHydration
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        for area in HYDRATED_BACKUP_AREAS {
            ctx.fork(HydrateBackupArea(area));
        }
        ctx.fork(HydrateClaimMap);
        ctx.fork(HydrateConnections);
        ctx.fork(HydratePushToken);
        Ok(())
    }
}

/// Restores one backup area.
#[derive(Debug)]
pub struct HydrateBackupArea(pub BackupArea);

impl HydrateBackupArea {
    const fn storage_key(&self) -> Option<&'static str> {
        match self.0 {
            BackupArea::LastSuccessfulBackup => Some(keys::LAST_SUCCESSFUL_BACKUP),
            BackupArea::LastSuccessfulCloudBackup => Some(keys::LAST_SUCCESSFUL_CLOUD_BACKUP),
            BackupArea::AutoCloudBackupEnabled => Some(keys::AUTO_CLOUD_BACKUP_ENABLED),
            BackupArea::HasVerifiedRecoveryPhrase => Some(keys::HAS_VERIFIED_RECOVERY_PHRASE),
            BackupArea::BackupBanner => Some(keys::SHOW_BANNER),
            BackupArea::Passphrase => None,
        }
    }
}

#[async_trait::async_trait]
impl Workflow for HydrateBackupArea {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::HydrateBackupArea
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let Some(key) = self.storage_key() else {
            return Ok(());
        };
        let Some(value) = ctx.safe().get(key.to_string()).await? else {
            tracing::debug!(area = %self.0, "nothing persisted");
            return Ok(());
        };

        let event = match self.0 {
            BackupArea::LastSuccessfulBackup => BackupEvent::HydrateLastBackup(value),
            BackupArea::LastSuccessfulCloudBackup => BackupEvent::HydrateLastCloudBackup(value),
            BackupArea::AutoCloudBackupEnabled => {
                BackupEvent::HydrateAutoCloudBackupEnabled(parse_flag(key, &value)?)
            }
            BackupArea::HasVerifiedRecoveryPhrase => {
                BackupEvent::HydrateHasVerifiedRecoveryPhrase(parse_flag(key, &value)?)
            }
            BackupArea::BackupBanner => BackupEvent::HydrateBackupBanner(parse_flag(key, &value)?),
            BackupArea::Passphrase => return Ok(()),
        };
        ctx.publish(event);
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(
            BackupEvent::HydrateBackupFailure(BackupFailure {
                area: self.0,
                error: ERROR_HYDRATING_BACKUP.with_detail(error),
            })
            .into(),
        )
    }
}

/// Restores the claim map from secure storage.
#[derive(Debug)]
pub struct HydrateClaimMap;

#[async_trait::async_trait]
impl Workflow for HydrateClaimMap {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::HydrateClaimMap
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        if let Some(map) = load_claim_map(ctx).await? {
            tracing::debug!(claims = map.len(), "claim map restored");
            ctx.publish(ClaimEvent::HydrateClaimMap(map));
        }
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(ClaimEvent::HydrateClaimMapFail(ERROR_CLAIM_HYDRATE.with_detail(error)).into())
    }
}

/// Restores the persisted connections.
#[derive(Debug)]
pub struct HydrateConnections;

#[async_trait::async_trait]
impl Workflow for HydrateConnections {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::HydrateConnections
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let connections = load_connections(ctx).await?;
        if !connections.is_empty() {
            tracing::debug!(connections = connections.len(), "connections restored");
            ctx.publish(ConnectionEvent::HydrateConnections(connections));
        }
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(
            ConnectionEvent::HydrateConnectionsFail(ERROR_HYDRATE_CONNECTIONS.with_detail(error))
                .into(),
        )
    }
}

/// Restores the registered push token.
#[derive(Debug)]
pub struct HydratePushToken;

#[async_trait::async_trait]
impl Workflow for HydratePushToken {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::HydratePushToken
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        if let Some(token) = ctx.safe().get(keys::PUSH_COM_METHOD.to_string()).await? {
            ctx.publish(PushEvent::HydratePushToken(token));
        }
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(PushEvent::HydratePushTokenFail(ERROR_HYDRATE_PUSH_TOKEN.with_detail(error)).into())
    }
}
