//! Cloud backup session and the agency notifications that drive it.
//!
//! [`CloudBackup`] walks the session through `Preparing`, `CreatingHandle`
//! and `AwaitingAck`, racing each hop against the stage timeout. The upload
//! and acknowledgement arrive as push notifications handled by
//! [`WalletBackupReady`], [`WalletBackupAck`] and [`WalletBackupFailure`].

use std::path::PathBuf;

use crate::bridge::{ops, BACKUP_SOURCE_ID, MESSAGE_PENDING};
use crate::engine::{
    race, Winner, Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult,
};
use crate::error::ERROR_CLOUD_BACKUP;
use crate::event::{BackupEvent, BackupEventKind, Event, PushEvent};
use crate::payload::{
    strip_agent_message, AdditionalData, DownloadedNotification, MessageType,
    NotificationOpenOptions,
};
use crate::state::backup::CloudBackupStatus;
use crate::state::selectors;
use crate::storage::{flag_value, keys};

use super::backup::{hash_passphrase, read_or_generate_passphrase, WALLET_FILE_NAME};
use super::{file_timestamp, now_rfc3339};

fn cloud_failure(error: &WorkflowError) -> Option<Event> {
    Some(BackupEvent::CloudBackupFailure(error.to_info(ERROR_CLOUD_BACKUP)).into())
}

/// Runs one cloud backup session up to the agency acknowledgement.
#[derive(Debug)]
pub struct CloudBackup;

#[async_trait::async_trait]
impl Workflow for CloudBackup {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::CloudBackup
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let (phrase, salt) = read_or_generate_passphrase(ctx).await?;
        let key = hash_passphrase(ctx, phrase, salt).await?.hash;
        let stage_timeout = ctx.config().stage_timeout();

        let prepared = ctx.await_any(&[
            BackupEventKind::PrepareBackupSuccess.into(),
            BackupEventKind::PrepareBackupFailure.into(),
        ]);
        ctx.publish(BackupEvent::PrepareBackupLoading);
        match race(prepared, ctx.timer(stage_timeout)).await {
            Winner::First(event) => {
                if let Event::Backup(BackupEvent::PrepareBackupFailure(_)) = event? {
                    return Err(WorkflowError::Stage {
                        stage: "prepare",
                        message: "Failed to write data back to wallet".to_string(),
                    });
                }
            }
            Winner::Second(()) => {
                return Err(WorkflowError::Timeout {
                    stage: "prepare",
                    message: "Could not write data back to wallet in one minute",
                })
            }
        }

        // A handle that arrives after the timeout is dropped with the call.
        let created = ctx.call_bridge(
            ops::CREATE_WALLET_BACKUP,
            ctx.bridge()
                .create_wallet_backup(BACKUP_SOURCE_ID.to_string(), key),
        );
        let handle = match race(created, ctx.timer(stage_timeout)).await {
            Winner::First(handle) => handle?,
            Winner::Second(()) => {
                return Err(WorkflowError::Timeout {
                    stage: "create_handle",
                    message: "Could not download wallet in one minute",
                })
            }
        };

        let acknowledged = ctx.await_any(&[
            BackupEventKind::CloudBackupComplete.into(),
            BackupEventKind::CloudBackupFailure.into(),
        ]);
        ctx.publish(BackupEvent::SetWalletHandle(handle));
        match race(acknowledged, ctx.timer(stage_timeout)).await {
            Winner::First(event) => {
                tracing::info!(outcome = %event?.kind(), "cloud backup session finished");
                Ok(())
            }
            Winner::Second(()) => Err(WorkflowError::Timeout {
                stage: "acknowledge",
                message: "Could not receive wallet backup acknowledgement in one minute",
            }),
        }
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        cloud_failure(error)
    }
}

/// Identifiers of a wallet backup notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupNotification {
    /// Agency message identifier.
    pub uid: String,
    /// Pairwise DID of the receiving connection.
    pub for_did: String,
    /// Pairwise DID of the agency.
    pub remote_pairwise_did: String,
    /// How the notification reached the app.
    pub open_options: NotificationOpenOptions,
}

impl BackupNotification {
    fn received(&self, message_type: MessageType, additional_data: AdditionalData) -> PushEvent {
        PushEvent::PushNotificationReceived(DownloadedNotification {
            message_type,
            uid: self.uid.clone(),
            for_did: self.for_did.clone(),
            remote_pairwise_did: self.remote_pairwise_did.clone(),
            sender_name: None,
            sender_logo_url: None,
            additional_data,
            open_options: self.open_options,
        })
    }
}

async fn fetch_agent_message(ctx: &WorkflowContext, uid: &str) -> WorkflowResult<String> {
    let raw = ctx
        .call_bridge(
            ops::VCX_GET_AGENT_MESSAGES,
            ctx.bridge()
                .vcx_get_agent_messages(MESSAGE_PENDING.to_string(), uid.to_string()),
        )
        .await?;
    Ok(strip_agent_message(&raw).to_string())
}

async fn feed_backup_state(
    ctx: &WorkflowContext,
    handle: i32,
    message: String,
) -> WorkflowResult<()> {
    ctx.call_bridge(
        ops::UPDATE_WALLET_BACKUP_STATE,
        ctx.bridge()
            .update_wallet_backup_state_with_message(handle, message),
    )
    .await
}

/// The agency is ready to receive the wallet: upload it.
#[derive(Debug)]
pub struct WalletBackupReady(pub BackupNotification);

#[async_trait::async_trait]
impl Workflow for WalletBackupReady {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::WalletBackupReady
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let status = ctx.select(selectors::cloud_backup_status);
        if status != CloudBackupStatus::AwaitingAck {
            tracing::debug!(?status, uid = %self.0.uid, "no session awaiting upload, ignoring");
            return Ok(());
        }
        let handle = ctx
            .select(selectors::wallet_handle)
            .ok_or(WorkflowError::MissingField {
                field: "wallet backup handle",
            })?;

        let message = fetch_agent_message(ctx, &self.0.uid).await?;
        ctx.publish(self.0.received(
            MessageType::WalletBackupReady,
            AdditionalData::Raw {
                message: message.clone(),
            },
        ));
        feed_backup_state(ctx, handle, message).await?;

        let archive = PathBuf::from(ctx.documents_dir())
            .join(format!("{WALLET_FILE_NAME}-{}.zip", file_timestamp()));
        ctx.call_bridge(
            ops::BACKUP_WALLET_BACKUP,
            ctx.bridge()
                .backup_wallet_backup(handle, archive.display().to_string()),
        )
        .await?;
        ctx.publish(BackupEvent::CloudBackupUploading);
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        cloud_failure(error)
    }
}

/// The agency stored the backup.
#[derive(Debug)]
pub struct WalletBackupAck(pub BackupNotification);

#[async_trait::async_trait]
impl Workflow for WalletBackupAck {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::WalletBackupAck
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let status = ctx.select(selectors::cloud_backup_status);
        if !matches!(
            status,
            CloudBackupStatus::AwaitingAck | CloudBackupStatus::Uploading
        ) {
            tracing::debug!(?status, uid = %self.0.uid, "no session awaiting acknowledgement, ignoring");
            return Ok(());
        }
        let handle = ctx
            .select(selectors::wallet_handle)
            .ok_or(WorkflowError::MissingField {
                field: "wallet backup handle",
            })?;

        let message = fetch_agent_message(ctx, &self.0.uid).await?;
        ctx.publish(self.0.received(
            MessageType::WalletBackupAck,
            AdditionalData::Raw {
                message: message.clone(),
            },
        ));
        feed_backup_state(ctx, handle, message).await?;

        let timestamp = now_rfc3339();
        ctx.safe()
            .set(
                keys::LAST_SUCCESSFUL_CLOUD_BACKUP.to_string(),
                timestamp.clone(),
            )
            .await?;
        ctx.publish(BackupEvent::CloudBackupComplete { timestamp });
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        cloud_failure(error)
    }
}

/// The agency could not store the backup. Automatic backups are turned off
/// until the user re-enables them.
#[derive(Debug)]
pub struct WalletBackupFailure(pub BackupNotification);

#[async_trait::async_trait]
impl Workflow for WalletBackupFailure {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::WalletBackupFailure
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.publish(
            self.0
                .received(MessageType::WalletBackupFailure, AdditionalData::None),
        );

        let disabled = flag_value(false).to_string();
        ctx.wallet()
            .set(keys::AUTO_CLOUD_BACKUP_ENABLED.to_string(), disabled.clone())
            .await?;
        let safe = ctx.safe();
        safe.set(keys::AUTO_CLOUD_BACKUP_ENABLED.to_string(), disabled)
            .await?;
        safe.set(
            keys::WALLET_BACKUP_FAILURE.to_string(),
            flag_value(true).to_string(),
        )
        .await?;

        ctx.publish(BackupEvent::SetAutoCloudBackupEnabled(false));
        ctx.publish(BackupEvent::ViewedWalletError(false));
        ctx.publish(BackupEvent::CloudBackupFailure(
            ERROR_CLOUD_BACKUP.with_detail("WALLET_BACKUP_FAILURE"),
        ));
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        cloud_failure(error)
    }
}
