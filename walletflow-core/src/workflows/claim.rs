//! Claim storage once an issuer delivered a credential, and the claim map.

use std::collections::BTreeMap;

use crate::bridge::{ops, ClaimOfferState};
use crate::engine::{Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult};
use crate::error::ERROR_CLAIM_STORAGE;
use crate::event::{ClaimEvent, ClaimReceived, Event};
use crate::state::claim::{ClaimMapEntry, SerializedClaimOffer};
use crate::state::selectors;
use crate::storage::keys;

/// Reads the persisted claim map, if one was written.
pub(crate) async fn load_claim_map(
    ctx: &WorkflowContext,
) -> WorkflowResult<Option<BTreeMap<String, ClaimMapEntry>>> {
    let Some(raw) = ctx.secure().get(keys::CLAIM_MAP.to_string()).await? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// A claim message arrived on a connection: check every offer sent on it.
#[derive(Debug)]
pub struct ReceiveClaim(pub ClaimReceived);

#[async_trait::async_trait]
impl Workflow for ReceiveClaim {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ClaimReceived
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.ensure_bridge_ready().await?;
        let for_did = &self.0.for_did;
        let offers = ctx.select(|s| selectors::serialized_claim_offers(s, for_did));
        tracing::debug!(%for_did, offers = offers.len(), uid = %self.0.uid, "claim received");
        for offer in offers {
            ctx.fork(ClaimOfferCheck {
                for_did: for_did.clone(),
                offer,
            });
        }
        Ok(())
    }
}

/// Polls one offer and stores its credential once the issuer delivered it.
#[derive(Debug)]
pub struct ClaimOfferCheck {
    /// Connection the offer was sent on.
    pub for_did: String,
    /// The offer to check.
    pub offer: SerializedClaimOffer,
}

#[async_trait::async_trait]
impl Workflow for ClaimOfferCheck {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ClaimOfferCheck
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        if self.offer.state == ClaimOfferState::Accepted {
            tracing::trace!(message_id = %self.offer.message_id, "offer already accepted");
            return Ok(());
        }

        let bridge = ctx.bridge();
        let handle = ctx
            .call_bridge(
                ops::GET_CLAIM_HANDLE,
                bridge.get_claim_handle_by_serialized_claim_offer(self.offer.serialized.clone()),
            )
            .await?;
        let state = ClaimOfferState::from_code(
            ctx.call_bridge(
                ops::UPDATE_CLAIM_OFFER_STATE,
                bridge.update_claim_offer_state(handle),
            )
            .await?,
        );

        if state == ClaimOfferState::Accepted {
            let claim = ctx
                .call_bridge(ops::GET_CLAIM_VCX, bridge.get_claim_vcx(handle))
                .await?;
            match ctx.select(|s| selectors::connection_by_identifier(s, &self.for_did)) {
                Some(connection) => ctx.publish(ClaimEvent::MapClaimToSender {
                    claim_uuid: claim.claim_uuid,
                    entry: ClaimMapEntry {
                        sender_did: connection.sender_did,
                        my_pairwise_did: self.for_did.clone(),
                        logo_url: connection.logo_url,
                    },
                }),
                None => tracing::warn!(for_did = %self.for_did, "claim stored for unknown connection"),
            }
            ctx.publish(ClaimEvent::ClaimStorageSuccess {
                message_id: self.offer.message_id.clone(),
            });
        }

        let serialized = ctx
            .call_bridge(ops::SERIALIZE_CLAIM_OFFER, bridge.serialize_claim_offer(handle))
            .await?;
        ctx.publish(ClaimEvent::SerializedClaimOfferUpdated {
            for_did: self.for_did.clone(),
            offer: SerializedClaimOffer {
                message_id: self.offer.message_id.clone(),
                serialized,
                state,
            },
        });
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(
            ClaimEvent::ClaimStorageFail {
                message_id: self.offer.message_id.clone(),
                error: ERROR_CLAIM_STORAGE.with_detail(error),
            }
            .into(),
        )
    }
}

/// Writes the claim map to secure storage.
///
/// The map is read from the store while holding the write lock, so the last
/// write always carries the newest map.
#[derive(Debug)]
pub struct PersistClaimMap;

#[async_trait::async_trait]
impl Workflow for PersistClaimMap {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::PersistClaimMap
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let _guard = ctx.lock_claim_map().await;
        let map = ctx.select(selectors::claim_map);
        ctx.secure()
            .set(keys::CLAIM_MAP.to_string(), serde_json::to_string(&map)?)
            .await?;
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(ClaimEvent::ClaimMapPersistFail(ERROR_CLAIM_STORAGE.with_detail(error)).into())
    }
}
