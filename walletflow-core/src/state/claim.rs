//! Claim map and the serialized claim offers awaiting their credential.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::bridge::ClaimOfferState;
use crate::error::ErrorInfo;
use crate::event::{ClaimEvent, Event};

/// Who issued a stored claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMapEntry {
    /// Pairwise DID of the issuer.
    #[serde(rename = "senderDID")]
    pub sender_did: String,
    /// Pairwise DID of this wallet on the connection.
    #[serde(rename = "myPairwiseDID")]
    pub my_pairwise_did: String,
    /// Logo of the issuer's connection.
    pub logo_url: Option<String>,
}

/// A claim offer the user accepted, as serialized by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct SerializedClaimOffer {
    /// Agency message the offer arrived in.
    pub message_id: String,
    /// Native serialization of the offer.
    pub serialized: String,
    /// State the bridge last reported.
    pub state: ClaimOfferState,
}

/// Claims and the offers waiting for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimState {
    /// Claim UUID to issuer. Entries are never replaced.
    pub claim_map: BTreeMap<String, ClaimMapEntry>,
    /// Offers per pairwise DID of this wallet.
    pub offers: HashMap<String, Vec<SerializedClaimOffer>>,
    /// Storage errors per offer message id.
    pub errors: HashMap<String, ErrorInfo>,
    /// Last claim map hydration or persistence error.
    pub error: Option<ErrorInfo>,
}

pub(crate) fn reduce(state: &mut ClaimState, event: &Event) {
    let event = match event {
        Event::Reset => {
            *state = ClaimState::default();
            return;
        }
        Event::Claim(event) => event,
        _ => return,
    };

    match event {
        ClaimEvent::MapClaimToSender { claim_uuid, entry } => {
            state
                .claim_map
                .entry(claim_uuid.clone())
                .or_insert_with(|| entry.clone());
        }
        ClaimEvent::ClaimStorageSuccess { message_id } => {
            state.errors.remove(message_id);
        }
        ClaimEvent::ClaimStorageFail { message_id, error } => {
            state.errors.insert(message_id.clone(), error.clone());
        }
        ClaimEvent::SerializedClaimOfferUpdated { for_did, offer } => {
            let offers = state.offers.entry(for_did.clone()).or_default();
            match offers.iter_mut().find(|o| o.message_id == offer.message_id) {
                Some(existing) => *existing = offer.clone(),
                None => offers.push(offer.clone()),
            }
        }
        ClaimEvent::HydrateClaimMap(map) => {
            for (uuid, entry) in map {
                state
                    .claim_map
                    .entry(uuid.clone())
                    .or_insert_with(|| entry.clone());
            }
        }
        ClaimEvent::HydrateClaimMapFail(error) | ClaimEvent::ClaimMapPersistFail(error) => {
            state.error = Some(error.clone());
        }
        ClaimEvent::ClaimReceivedVcx(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sender: &str) -> ClaimMapEntry {
        ClaimMapEntry {
            sender_did: sender.to_string(),
            my_pairwise_did: "me".to_string(),
            logo_url: None,
        }
    }

    #[test]
    fn test_claim_map_is_append_only() {
        let mut state = ClaimState::default();
        let map = |sender: &str| {
            Event::Claim(ClaimEvent::MapClaimToSender {
                claim_uuid: "c1".to_string(),
                entry: entry(sender),
            })
        };
        reduce(&mut state, &map("first"));
        reduce(&mut state, &map("second"));
        assert_eq!(state.claim_map.len(), 1);
        assert_eq!(state.claim_map["c1"].sender_did, "first");
    }

    #[test]
    fn test_offer_update_replaces_by_message_id() {
        let mut state = ClaimState::default();
        for offer_state in [ClaimOfferState::OfferSent, ClaimOfferState::Accepted] {
            reduce(
                &mut state,
                &Event::Claim(ClaimEvent::SerializedClaimOfferUpdated {
                    for_did: "me".to_string(),
                    offer: SerializedClaimOffer {
                        message_id: "m1".to_string(),
                        serialized: "{}".to_string(),
                        state: offer_state,
                    },
                }),
            );
        }
        assert_eq!(state.offers["me"].len(), 1);
        assert_eq!(state.offers["me"][0].state, ClaimOfferState::Accepted);
    }

    #[test]
    fn test_storage_success_clears_error() {
        let mut state = ClaimState::default();
        reduce(
            &mut state,
            &Event::Claim(ClaimEvent::ClaimStorageFail {
                message_id: "m1".to_string(),
                error: ErrorInfo::new("CS-001", "x"),
            }),
        );
        reduce(
            &mut state,
            &Event::Claim(ClaimEvent::ClaimStorageSuccess {
                message_id: "m1".to_string(),
            }),
        );
        assert!(state.errors.is_empty());
    }
}
