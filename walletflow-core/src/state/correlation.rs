//! Correlation records: claim offers, proof requests and questions keyed by
//! the UID of the message that delivered them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ErrorInfo;
use crate::event::{CorrelationEvent, Event};
use crate::payload::{AppClaimOffer, AppProofRequest, Question};

/// Lifecycle of a correlation record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, uniffi::Enum)]
pub enum CorrelationStatus {
    /// Stored but not shown yet.
    #[default]
    Received,
    /// Shown to the user.
    Shown,
    /// The user accepted.
    Accepted,
    /// The user declined.
    Rejected,
    /// The user dismissed it without answering.
    Ignored,
}

impl CorrelationStatus {
    /// The user acted on the record.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Ignored)
    }
}

/// What the record correlates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Enum)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrelationPayload {
    /// A credential offer.
    ClaimOffer {
        /// The converted offer.
        offer: AppClaimOffer,
    },
    /// A proof request.
    ProofRequest {
        /// The converted request.
        request: AppProofRequest,
    },
    /// A structured question.
    Question {
        /// The converted question.
        question: Question,
    },
}

/// Identifiers a received message arrived with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct MessageMeta {
    /// Agency message identifier.
    pub uid: String,
    /// Pairwise DID of this wallet, which identifies the connection.
    pub for_did: String,
    /// Pairwise DID of the sender.
    pub remote_pairwise_did: String,
    /// Display name of the connection.
    pub sender_name: Option<String>,
    /// Logo of the connection.
    pub sender_logo_url: Option<String>,
}

/// A received message the user has to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct CorrelationRecord {
    /// Agency message identifier, also the table key.
    pub uid: String,
    /// Pairwise DID of the sender.
    pub sender_did: String,
    /// Pairwise DID of this wallet on the connection.
    pub connection_ref: String,
    /// Display name of the connection.
    pub sender_name: Option<String>,
    /// Logo of the connection.
    pub sender_logo_url: Option<String>,
    /// Where the user is with the record.
    pub status: CorrelationStatus,
    /// Set when acting on the record failed.
    pub error: Option<ErrorInfo>,
    /// The offer, request or question itself.
    pub payload: CorrelationPayload,
}

impl CorrelationRecord {
    fn new(meta: &MessageMeta, payload: CorrelationPayload) -> Self {
        Self {
            uid: meta.uid.clone(),
            sender_did: meta.remote_pairwise_did.clone(),
            connection_ref: meta.for_did.clone(),
            sender_name: meta.sender_name.clone(),
            sender_logo_url: meta.sender_logo_url.clone(),
            status: CorrelationStatus::Received,
            error: None,
            payload,
        }
    }

    /// An out-of-band proof request, which has no connection to keep it.
    #[must_use]
    pub const fn is_out_of_band(&self) -> bool {
        matches!(&self.payload, CorrelationPayload::ProofRequest { request } if request.out_of_band)
    }
}

/// Correlation records keyed by message UID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationTable {
    /// Every record, keyed by UID.
    pub records: BTreeMap<String, CorrelationRecord>,
}

impl CorrelationTable {
    /// The record for `uid`.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<&CorrelationRecord> {
        self.records.get(uid)
    }

    fn insert_new(&mut self, meta: &MessageMeta, payload: CorrelationPayload) {
        if self.records.contains_key(&meta.uid) {
            tracing::debug!(uid = %meta.uid, "correlation record already exists");
            return;
        }
        self.records
            .insert(meta.uid.clone(), CorrelationRecord::new(meta, payload));
    }

    fn transition(&mut self, uid: &str, next: CorrelationStatus) {
        let Some(record) = self.records.get_mut(uid) else {
            tracing::warn!(uid, ?next, "no correlation record for transition");
            return;
        };
        let allowed = match next {
            CorrelationStatus::Received => false,
            CorrelationStatus::Shown => record.status == CorrelationStatus::Received,
            _ => !record.status.is_terminal(),
        };
        if allowed {
            record.status = next;
        }
    }
}

pub(crate) fn reduce(state: &mut CorrelationTable, event: &Event) {
    let event = match event {
        Event::Reset => {
            *state = CorrelationTable::default();
            return;
        }
        Event::Correlation(event) => event,
        _ => return,
    };

    match event {
        CorrelationEvent::ClaimOfferReceived { offer, meta } => state.insert_new(
            meta,
            CorrelationPayload::ClaimOffer {
                offer: offer.clone(),
            },
        ),
        CorrelationEvent::ProofRequestReceived { request, meta } => state.insert_new(
            meta,
            CorrelationPayload::ProofRequest {
                request: request.clone(),
            },
        ),
        CorrelationEvent::QuestionReceived { question, meta } => state.insert_new(
            meta,
            CorrelationPayload::Question {
                question: question.clone(),
            },
        ),
        CorrelationEvent::Shown { uid } => state.transition(uid, CorrelationStatus::Shown),
        CorrelationEvent::Accepted { uid } => state.transition(uid, CorrelationStatus::Accepted),
        CorrelationEvent::Rejected { uid } => state.transition(uid, CorrelationStatus::Rejected),
        CorrelationEvent::Ignored { uid } => state.transition(uid, CorrelationStatus::Ignored),
        CorrelationEvent::Failed { uid, error } => {
            if let Some(record) = state.records.get_mut(uid) {
                record.error = Some(error.clone());
            }
        }
        CorrelationEvent::Deleted { uid } => {
            state.records.remove(uid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_received(uid: &str, text: &str) -> Event {
        Event::Correlation(CorrelationEvent::QuestionReceived {
            question: Question {
                connection_handle: 1,
                uid: uid.to_string(),
                for_did: "me".to_string(),
                sender_did: "them".to_string(),
                title: String::new(),
                text: text.to_string(),
                detail: None,
                responses: vec![],
                expires_at: None,
            },
            meta: MessageMeta {
                uid: uid.to_string(),
                for_did: "me".to_string(),
                remote_pairwise_did: "them".to_string(),
                ..MessageMeta::default()
            },
        })
    }

    #[test]
    fn test_redelivery_keeps_first_record_and_status() {
        let mut table = CorrelationTable::default();
        reduce(&mut table, &question_received("u1", "first"));
        reduce(
            &mut table,
            &Event::Correlation(CorrelationEvent::Shown {
                uid: "u1".to_string(),
            }),
        );
        reduce(&mut table, &question_received("u1", "second"));

        let record = table.get("u1").unwrap();
        assert_eq!(record.status, CorrelationStatus::Shown);
        assert!(matches!(
            &record.payload,
            CorrelationPayload::Question { question } if question.text == "first"
        ));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut table = CorrelationTable::default();
        reduce(&mut table, &question_received("u1", "q"));
        for event in [
            CorrelationEvent::Rejected {
                uid: "u1".to_string(),
            },
            CorrelationEvent::Accepted {
                uid: "u1".to_string(),
            },
            CorrelationEvent::Shown {
                uid: "u1".to_string(),
            },
        ] {
            reduce(&mut table, &Event::Correlation(event));
        }
        assert_eq!(table.get("u1").unwrap().status, CorrelationStatus::Rejected);

        reduce(
            &mut table,
            &Event::Correlation(CorrelationEvent::Deleted {
                uid: "u1".to_string(),
            }),
        );
        assert!(table.get("u1").is_none());
    }
}
