//! Bulk download of unacknowledged agency messages.

use crate::bridge::{ops, MESSAGE_PENDING, MESSAGE_REVIEWED};
use crate::engine::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult};
use crate::error::{ERROR_FETCH_MESSAGES, ERROR_INVALID_ADDITIONAL_DATA};
use crate::event::{Event, PushEvent};
use crate::payload::{
    question_from_decrypted_payload, AdditionalData, ClaimOfferPushPayload, DecryptedPayload,
    DownloadedConnection, DownloadedMessage, DownloadedNotification, MessageStatusUpdate,
    MessageType, NotificationOpenOptions, ProofRequestPushPayload, QuestionContext,
};
use crate::state::connections::Connection;
use crate::state::selectors;

/// Downloads every pending message, publishes the ones not yet correlated
/// and marks them reviewed. A message that cannot be converted is reported on
/// its own and does not stop the batch.
#[derive(Debug)]
pub struct FetchUnacknowledgedMessages;

/// Connection-scoped context for converting the messages of one batch.
struct Batch<'a> {
    connection: &'a Connection,
    serialized_connection: Option<&'a str>,
    /// Resolved on the first question in the batch.
    handle: Option<i32>,
}

impl Batch<'_> {
    async fn connection_handle(&mut self, ctx: &WorkflowContext) -> WorkflowResult<i32> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let serialized = self
            .serialized_connection
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "serialized connection",
                key: self.connection.identifier.clone(),
            })?;
        let handle = ctx
            .call_bridge(
                ops::GET_CONNECTION_HANDLE,
                ctx.bridge()
                    .get_handle_by_serialized_connection(serialized.to_string()),
            )
            .await?;
        self.handle = Some(handle);
        Ok(handle)
    }

    async fn convert(
        &mut self,
        ctx: &WorkflowContext,
        message: &DownloadedMessage,
    ) -> WorkflowResult<Option<DownloadedNotification>> {
        let Some(decrypted) = message.decrypted_payload.as_deref() else {
            return Ok(None);
        };
        let connection = self.connection;
        let envelope: DecryptedPayload = serde_json::from_str(decrypted)?;
        let sender_did = message
            .sender_did
            .clone()
            .unwrap_or_else(|| connection.sender_did.clone());
        let for_did = &connection.identifier;

        let (message_type, additional_data) = match envelope.payload_type.message_type() {
            Some(MessageType::ClaimOffer) => {
                let offer: ClaimOfferPushPayload = serde_json::from_str(&envelope.msg)?;
                (
                    MessageType::ClaimOffer,
                    AdditionalData::ClaimOffer(offer.into_app_claim_offer(&sender_did)),
                )
            }
            Some(MessageType::ProofRequest) => {
                let request: ProofRequestPushPayload = serde_json::from_str(&envelope.msg)?;
                let mut request = request.into_app_proof_request();
                if request.requester_name.is_empty() {
                    request
                        .requester_name
                        .clone_from(&connection.sender_name);
                }
                (
                    MessageType::ProofRequest,
                    AdditionalData::ProofRequest(request),
                )
            }
            Some(MessageType::Question) => {
                let connection_handle = self.connection_handle(ctx).await?;
                let question = question_from_decrypted_payload(
                    decrypted,
                    &QuestionContext {
                        connection_handle,
                        uid: &message.uid,
                        for_did,
                        sender_did: &sender_did,
                        title: "",
                    },
                )?;
                (MessageType::Question, AdditionalData::Question(question))
            }
            _ => {
                tracing::trace!(uid = %message.uid, kind = %envelope.payload_type.name, "not a correlated message");
                return Ok(None);
            }
        };

        Ok(Some(DownloadedNotification {
            message_type,
            uid: message.uid.clone(),
            for_did: for_did.clone(),
            remote_pairwise_did: sender_did,
            sender_name: Some(connection.sender_name.clone()),
            sender_logo_url: connection.logo_url.clone(),
            additional_data,
            open_options: NotificationOpenOptions::default(),
        }))
    }
}

#[async_trait::async_trait]
impl Workflow for FetchUnacknowledgedMessages {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::FetchUnacknowledgedMessages
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.ensure_bridge_ready().await?;
        ctx.publish(PushEvent::GetMessagesLoading);

        let raw = ctx
            .call_bridge(
                ops::DOWNLOAD_MESSAGES,
                ctx.bridge()
                    .download_messages(MESSAGE_PENDING.to_string(), None, None),
            )
            .await?;
        let downloaded: Vec<DownloadedConnection> = serde_json::from_str(&raw)?;

        let mut reviewed = Vec::new();
        for pairwise in downloaded {
            let Some(connection) =
                ctx.select(|s| selectors::connection_by_identifier(s, &pairwise.pairwise_did))
            else {
                tracing::debug!(pairwise_did = %pairwise.pairwise_did, "messages for unknown connection");
                continue;
            };
            let mut batch = Batch {
                connection: &connection,
                serialized_connection: connection.vcx_serialized_connection.as_deref(),
                handle: None,
            };

            let mut uids = Vec::new();
            for message in &pairwise.msgs {
                if message.status_code != MESSAGE_PENDING
                    || ctx.select(|s| selectors::correlation(s, &message.uid).is_some())
                {
                    continue;
                }
                match batch.convert(ctx, message).await {
                    Ok(Some(notification)) => {
                        uids.push(message.uid.clone());
                        ctx.publish(PushEvent::PushNotificationReceived(notification));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(uid = %message.uid, %error, "skipping unreadable message");
                        ctx.publish(PushEvent::FetchAdditionalDataError(
                            ERROR_INVALID_ADDITIONAL_DATA
                                .with_detail(format_args!("{}: {error}", message.uid)),
                        ));
                    }
                }
            }
            if !uids.is_empty() {
                reviewed.push(MessageStatusUpdate {
                    pairwise_did: pairwise.pairwise_did,
                    uids,
                });
            }
        }
        ctx.publish(PushEvent::GetMessagesSuccess);

        if !reviewed.is_empty() {
            tracing::debug!(connections = reviewed.len(), "marking messages reviewed");
            ctx.call_bridge(
                ops::UPDATE_MESSAGES_STATUS,
                ctx.bridge().update_messages_status(
                    MESSAGE_REVIEWED.to_string(),
                    serde_json::to_string(&reviewed)?,
                ),
            )
            .await?;
        }
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(PushEvent::UnacknowledgedMessagesFail(ERROR_FETCH_MESSAGES.with_detail(error)).into())
    }
}
