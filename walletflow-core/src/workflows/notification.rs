//! Push notification handling: resolving the message a notification points
//! at, then updating the store and deciding where the UI should go.

use crate::bridge::{ops, MESSAGE_PENDING, MESSAGE_REVIEWED};
use crate::engine::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult};
use crate::error::{ERROR_INVALID_ADDITIONAL_DATA, ERROR_MISSING_FOR_DID, ERROR_NO_PAIRWISE_CONNECTION};
use crate::event::{
    ClaimEvent, ClaimReceived, CorrelationEvent, Event, NavigationEvent, NavigationEventKind,
    PushEvent,
};
use crate::payload::{
    pending_fetch_key, question_from_decrypted_payload, AdditionalData, DownloadedConnection,
    DownloadedNotification, MessageStatusUpdate, MessageType, NotificationOpenOptions,
    NotificationPayload, QuestionContext,
};
use crate::state::correlation::MessageMeta;
use crate::state::navigation::{
    InAppNotification, Redirection, CLAIM_OFFER_ROUTE, HOME_ROUTE, PROOF_REQUEST_ROUTE,
    QUESTION_ROUTE,
};
use crate::state::selectors;
use crate::storage::flag_value;

use super::cloud_backup::{
    BackupNotification, WalletBackupAck, WalletBackupFailure, WalletBackupReady,
};

const FOR_DID: &str = "forDID";

/// Resolves the message a notification refers to.
#[derive(Debug)]
pub struct FetchAdditionalData {
    /// The notification as delivered.
    pub payload: NotificationPayload,
    /// How it reached the app.
    pub open_options: NotificationOpenOptions,
}

impl FetchAdditionalData {
    /// Marks the message as being fetched. Returns `false` when another
    /// delivery of the same message already holds the key. Aries messages
    /// carry no key and are always let through.
    fn claim_pending_key(&self, ctx: &WorkflowContext, message_type: &MessageType) -> bool {
        if *message_type == MessageType::Unknown {
            return true;
        }
        let (Some(uid), Some(for_did)) = (&self.payload.uid, &self.payload.for_did) else {
            return true;
        };
        let key = pending_fetch_key(uid, for_did);
        let claimed = ctx.publish_if(
            |s| !selectors::has_pending_fetch_key(s, &key),
            PushEvent::SetPendingFetchKey(key.clone()),
        );
        if !claimed {
            tracing::debug!(%key, "message already being fetched");
        }
        claimed
    }

    fn backup_notification(&self, for_did: String) -> WorkflowResult<BackupNotification> {
        Ok(BackupNotification {
            uid: self
                .payload
                .uid
                .clone()
                .ok_or(WorkflowError::MissingField { field: "uid" })?,
            for_did,
            remote_pairwise_did: self.payload.remote_pairwise_did.clone().unwrap_or_default(),
            open_options: self.open_options,
        })
    }

    async fn download(
        &self,
        ctx: &WorkflowContext,
        message_type: &MessageType,
        connection_handle: i32,
        uid: &str,
        for_did: &str,
    ) -> WorkflowResult<Option<AdditionalData>> {
        match message_type {
            MessageType::Claim => Ok(Some(AdditionalData::Claim { connection_handle })),
            MessageType::Question => {
                let raw = ctx
                    .call_bridge(
                        ops::DOWNLOAD_MESSAGES,
                        ctx.bridge().download_messages(
                            MESSAGE_PENDING.to_string(),
                            Some(vec![uid.to_string()]),
                            Some(vec![for_did.to_string()]),
                        ),
                    )
                    .await?;
                let downloaded: Vec<DownloadedConnection> = serde_json::from_str(&raw)?;
                let Some(message) = downloaded
                    .iter()
                    .flat_map(|c| c.msgs.iter())
                    .rev()
                    .find(|m| m.uid == uid)
                else {
                    tracing::debug!(uid, "question not found among downloaded messages");
                    return Ok(None);
                };
                let decrypted =
                    message
                        .decrypted_payload
                        .as_deref()
                        .ok_or(WorkflowError::MissingField {
                            field: "decryptedPayload",
                        })?;
                let remote = self.payload.remote_pairwise_did.as_deref().unwrap_or_default();
                let question = question_from_decrypted_payload(
                    decrypted,
                    &QuestionContext {
                        connection_handle,
                        uid,
                        for_did,
                        sender_did: message.sender_did.as_deref().unwrap_or(remote),
                        title: self.payload.push_notif_msg_title.as_deref().unwrap_or_default(),
                    },
                )?;
                Ok(Some(AdditionalData::Question(question)))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl Workflow for FetchAdditionalData {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::FetchAdditionalData
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let message_type = MessageType::classify(&self.payload.message_type);
        if !self.claim_pending_key(ctx, &message_type) {
            return Ok(());
        }
        if message_type.uses_bulk_fetch() {
            ctx.publish(PushEvent::GetUnacknowledgedMessages);
            return Ok(());
        }

        ctx.ensure_bridge_ready().await?;
        let for_did = self
            .payload
            .for_did
            .clone()
            .ok_or(WorkflowError::MissingField { field: FOR_DID })?;

        match message_type {
            MessageType::WalletBackupReady => {
                ctx.fork(WalletBackupReady(self.backup_notification(for_did)?));
                return Ok(());
            }
            MessageType::WalletBackupAck => {
                ctx.fork(WalletBackupAck(self.backup_notification(for_did)?));
                return Ok(());
            }
            MessageType::WalletBackupFailure => {
                ctx.fork(WalletBackupFailure(self.backup_notification(for_did)?));
                return Ok(());
            }
            _ => {}
        }

        let not_found = || WorkflowError::NotFound {
            entity: "connection",
            key: for_did.clone(),
        };
        let connection = ctx
            .select(|s| selectors::connection_by_identifier(s, &for_did))
            .ok_or_else(not_found)?;
        let serialized = connection
            .vcx_serialized_connection
            .clone()
            .ok_or_else(not_found)?;
        let uid = self
            .payload
            .uid
            .clone()
            .ok_or(WorkflowError::MissingField { field: "uid" })?;
        let connection_handle = ctx
            .call_bridge(
                ops::GET_CONNECTION_HANDLE,
                ctx.bridge().get_handle_by_serialized_connection(serialized),
            )
            .await?;

        ctx.publish(PushEvent::GetMessagesLoading);
        let additional_data = match self
            .download(ctx, &message_type, connection_handle, &uid, &for_did)
            .await
        {
            Ok(data) => data,
            Err(error) => {
                ctx.publish(PushEvent::GetMessagesFail);
                return Err(error);
            }
        };
        ctx.publish(PushEvent::GetMessagesSuccess);
        let Some(additional_data) = additional_data else {
            return Ok(());
        };

        let unlocked = ctx.await_event(NavigationEventKind::UnlockApp);
        if ctx.select(selectors::is_locked) {
            tracing::debug!(%uid, "holding notification until unlock");
            unlocked.await?;
        }
        ctx.timer(ctx.config().redirect_settle_delay()).await;

        ctx.publish(PushEvent::PushNotificationReceived(DownloadedNotification {
            message_type,
            uid,
            for_did,
            remote_pairwise_did: self.payload.remote_pairwise_did.clone().unwrap_or_default(),
            sender_name: Some(connection.sender_name),
            sender_logo_url: connection
                .logo_url
                .or_else(|| self.payload.sender_logo_url.clone()),
            additional_data,
            open_options: self.open_options,
        }));
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        let info = match error {
            WorkflowError::MissingField { field } if *field == FOR_DID => ERROR_MISSING_FOR_DID.info(),
            WorkflowError::NotFound {
                entity: "connection",
                ..
            } => ERROR_NO_PAIRWISE_CONNECTION.with_detail(error),
            other => ERROR_INVALID_ADDITIONAL_DATA.with_detail(other),
        };
        Some(PushEvent::FetchAdditionalDataError(info).into())
    }
}

/// Records a received message in the store and routes the UI to it.
#[derive(Debug)]
pub struct UpdateStoreAndRedirect(pub DownloadedNotification);

impl UpdateStoreAndRedirect {
    fn meta(&self) -> MessageMeta {
        let n = &self.0;
        MessageMeta {
            uid: n.uid.clone(),
            for_did: n.for_did.clone(),
            remote_pairwise_did: n.remote_pairwise_did.clone(),
            sender_name: n.sender_name.clone(),
            sender_logo_url: n.sender_logo_url.clone(),
        }
    }

    /// Publishes the store update and returns the route and text to show.
    fn update_store(&self, ctx: &WorkflowContext) -> Option<(&'static str, String)> {
        let n = &self.0;
        match &n.additional_data {
            AdditionalData::ClaimOffer(offer) => {
                ctx.publish(CorrelationEvent::ClaimOfferReceived {
                    offer: offer.clone(),
                    meta: self.meta(),
                });
                Some((CLAIM_OFFER_ROUTE, format!("Offering {}", offer.name)))
            }
            AdditionalData::ProofRequest(request) => {
                ctx.publish(CorrelationEvent::ProofRequestReceived {
                    request: request.clone(),
                    meta: self.meta(),
                });
                Some((
                    PROOF_REQUEST_ROUTE,
                    format!("{} wants you to share information", request.requester_name),
                ))
            }
            AdditionalData::Question(question) => {
                ctx.publish(CorrelationEvent::QuestionReceived {
                    question: question.clone(),
                    meta: self.meta(),
                });
                Some((QUESTION_ROUTE, question.title.clone()))
            }
            AdditionalData::Claim { connection_handle } => {
                ctx.publish(ClaimEvent::ClaimReceivedVcx(ClaimReceived {
                    connection_handle: *connection_handle,
                    uid: n.uid.clone(),
                    for_did: n.for_did.clone(),
                    remote_pairwise_did: n.remote_pairwise_did.clone(),
                }));
                None
            }
            AdditionalData::Raw { .. } | AdditionalData::None => None,
        }
    }

    fn redirect(&self, ctx: &WorkflowContext, route: &str, text: String) {
        let n = &self.0;
        let target = Redirection::to(route)
            .with_param("uid", n.uid.as_str())
            .with_param("senderDID", n.remote_pairwise_did.as_str())
            .with_param("image", n.sender_logo_url.clone().unwrap_or_default())
            .with_param("senderName", n.sender_name.clone().unwrap_or_default())
            .with_param("messageType", n.message_type.as_str())
            .with_param("identifier", n.for_did.as_str())
            .with_param(
                "openMessageDirectly",
                flag_value(n.open_options.open_message_directly),
            );

        let deferred = ctx.publish_if(
            |s| !selectors::can_redirect(s),
            NavigationEvent::AddPendingRedirection(vec![
                Redirection::to(HOME_ROUTE),
                target.clone(),
            ]),
        );
        if deferred {
            tracing::debug!(uid = %n.uid, route, "redirect deferred");
        } else if n.open_options.open_message_directly {
            ctx.publish(NavigationEvent::NavigateToRoute(Redirection {
                route: HOME_ROUTE.to_string(),
                params: target.params,
            }));
        } else {
            ctx.publish(NavigationEvent::ShowInAppNotification(InAppNotification {
                sender_name: n.sender_name.clone(),
                sender_image: n.sender_logo_url.clone(),
                sender_did: n.remote_pairwise_did.clone(),
                text,
                message_type: n.message_type.as_str().to_string(),
                message_id: n.uid.clone(),
                identifier: n.for_did.clone(),
            }));
        }
    }

    async fn mark_reviewed(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let n = &self.0;
        let updates = serde_json::to_string(&[MessageStatusUpdate {
            pairwise_did: n.for_did.clone(),
            uids: vec![n.uid.clone()],
        }])?;
        ctx.call_bridge(
            ops::UPDATE_MESSAGES_STATUS,
            ctx.bridge()
                .update_messages_status(MESSAGE_REVIEWED.to_string(), updates),
        )
        .await
    }
}

#[async_trait::async_trait]
impl Workflow for UpdateStoreAndRedirect {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::UpdateStoreAndRedirect
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let Some((route, text)) = self.update_store(ctx) else {
            return Ok(());
        };
        self.redirect(ctx, route, text);

        if self.0.message_type == MessageType::Question {
            if let Err(error) = self.mark_reviewed(ctx).await {
                tracing::warn!(uid = %self.0.uid, %error, "could not mark question as reviewed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes() {
        let workflow = FetchAdditionalData {
            payload: NotificationPayload::default(),
            open_options: NotificationOpenOptions::default(),
        };
        let code = |error: WorkflowError| match workflow.failure_event(&error) {
            Some(Event::Push(PushEvent::FetchAdditionalDataError(info))) => info.code,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(code(WorkflowError::MissingField { field: FOR_DID }), "OCS-001");
        assert_eq!(
            code(WorkflowError::NotFound {
                entity: "connection",
                key: "d1".to_string()
            }),
            "OCS-002"
        );
        assert_eq!(code(WorkflowError::MissingField { field: "uid" }), "OCS-000");
    }
}
