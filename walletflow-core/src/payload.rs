//! Inbound message shapes and their conversion into the records the store keeps.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Push notification payload as delivered by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Pairwise DID of this wallet the message was sent to.
    #[serde(rename = "forDID")]
    pub for_did: Option<String>,
    /// Agency message identifier.
    pub uid: Option<String>,
    /// Raw message type, see [`MessageType`].
    #[serde(rename = "type")]
    pub message_type: String,
    /// Pairwise DID of the sender.
    #[serde(rename = "remotePairwiseDID")]
    pub remote_pairwise_did: Option<String>,
    /// Body text shown by the OS.
    pub push_notif_msg_text: Option<String>,
    /// Title shown by the OS.
    pub push_notif_msg_title: Option<String>,
    /// Logo of the sender, if the push carried one.
    pub sender_logo_url: Option<String>,
    /// Inline message body, when the agency sent one.
    pub msg: Option<String>,
}

/// How the notification reached the app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct NotificationOpenOptions {
    /// The user tapped the notification in the notification centre.
    pub open_message_directly: bool,
}

/// Classification of a notification's `type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
pub enum MessageType {
    /// An issuer offered a credential.
    #[strum(serialize = "claimOffer")]
    ClaimOffer,
    /// A verifier asked for a proof.
    #[strum(serialize = "proofReq")]
    ProofRequest,
    /// An issuer delivered a credential.
    #[strum(serialize = "claim")]
    Claim,
    /// A structured question.
    #[strum(serialize = "question", serialize = "Question")]
    Question,
    /// The agency is ready to receive a cloud backup.
    #[strum(serialize = "WALLET_BACKUP_READY")]
    WalletBackupReady,
    /// The agency stored the cloud backup.
    #[strum(serialize = "WALLET_BACKUP_ACK")]
    WalletBackupAck,
    /// The agency could not store the cloud backup.
    #[strum(serialize = "WALLET_BACKUP_FAILURE")]
    WalletBackupFailure,
    /// Aries messages; resolved through the bulk download.
    #[strum(serialize = "unknown")]
    Unknown,
    /// Any type not listed above.
    #[strum(default)]
    Other(String),
}

impl MessageType {
    /// Classifies a raw notification type.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        Self::from_str(raw).unwrap_or_else(|_| Self::Other(raw.to_string()))
    }

    /// The wire name, as passed to the UI in redirect parameters.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClaimOffer => "claimOffer",
            Self::ProofRequest => "proofReq",
            Self::Claim => "claim",
            Self::Question => "question",
            Self::WalletBackupReady => "WALLET_BACKUP_READY",
            Self::WalletBackupAck => "WALLET_BACKUP_ACK",
            Self::WalletBackupFailure => "WALLET_BACKUP_FAILURE",
            Self::Unknown => "unknown",
            Self::Other(raw) => raw,
        }
    }

    /// Resolved by downloading every unacknowledged message instead of this one.
    #[must_use]
    pub const fn uses_bulk_fetch(&self) -> bool {
        matches!(self, Self::ClaimOffer | Self::ProofRequest | Self::Unknown)
    }

    /// Drives the cloud backup session.
    #[must_use]
    pub const fn is_backup(&self) -> bool {
        matches!(
            self,
            Self::WalletBackupReady | Self::WalletBackupAck | Self::WalletBackupFailure
        )
    }

    /// Updates a correlation record or the claim store once received.
    #[must_use]
    pub const fn is_correlated(&self) -> bool {
        matches!(
            self,
            Self::ClaimOffer | Self::ProofRequest | Self::Claim | Self::Question
        )
    }
}

/// Data attached to a downloaded notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdditionalData {
    /// Converted claim offer.
    ClaimOffer(AppClaimOffer),
    /// Converted proof request.
    ProofRequest(AppProofRequest),
    /// A credential arrived on the connection with this handle.
    Claim {
        /// Native handle of the connection.
        connection_handle: i32,
    },
    /// Converted question.
    Question(Question),
    /// Agency message fed to the backup state machine.
    Raw {
        /// Message as returned by the agency.
        message: String,
    },
    /// Nothing was attached.
    None,
}

/// A notification after its message was downloaded and converted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadedNotification {
    /// Classified notification type.
    pub message_type: MessageType,
    /// Agency message identifier.
    pub uid: String,
    /// Pairwise DID of the receiving connection.
    pub for_did: String,
    /// Pairwise DID of the sender.
    pub remote_pairwise_did: String,
    /// Display name of the connection.
    pub sender_name: Option<String>,
    /// Logo of the connection.
    pub sender_logo_url: Option<String>,
    /// Converted message body.
    pub additional_data: AdditionalData,
    /// How the notification reached the app.
    pub open_options: NotificationOpenOptions,
}

/// Key deduplicating fetches of the same message.
#[must_use]
pub fn pending_fetch_key(uid: &str, for_did: &str) -> String {
    format!("{uid}-{for_did}")
}

/// Claim offer as sent by the issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimOfferPushPayload {
    /// Offered attributes. Values may be wrapped in single-element arrays.
    pub claim: BTreeMap<String, serde_json::Value>,
    /// Credential name.
    pub claim_name: String,
    /// Credential schema version.
    #[serde(default)]
    pub version: String,
    /// Ledger sequence number of the schema.
    pub schema_seq_no: Option<u64>,
    /// DID of the issuer.
    pub issuer_did: Option<String>,
    /// Name the issuer gave itself.
    pub issuer_name: Option<String>,
    /// Connection name, used when the issuer sent no name.
    #[serde(rename = "remoteName")]
    pub remote_name: Option<String>,
    /// Token price of a paid credential.
    pub price: Option<String>,
}

/// Issuer of a claim offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Issuer {
    /// Display name.
    pub name: String,
    /// Issuer DID.
    pub did: String,
}

/// One attribute revealed by a claim offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct RevealedAttribute {
    /// Attribute name.
    pub label: String,
    /// Attribute value as text.
    pub data: String,
}

/// Claim offer as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct AppClaimOffer {
    /// Who offers the credential.
    pub issuer: Issuer,
    /// Credential name.
    pub name: String,
    /// Credential schema version.
    pub version: String,
    /// Offered attribute values.
    pub revealed_attributes: Vec<RevealedAttribute>,
    /// Ledger sequence number of the schema.
    pub schema_sequence_number: Option<u64>,
    /// Token price of a paid credential.
    pub pay_token_value: Option<String>,
}

impl ClaimOfferPushPayload {
    /// Converts the issuer payload. Attribute values sent as single-element
    /// arrays are flattened to their first element.
    #[must_use]
    pub fn into_app_claim_offer(self, remote_pairwise_did: &str) -> AppClaimOffer {
        let revealed_attributes = self
            .claim
            .into_iter()
            .map(|(label, value)| {
                let value = match value {
                    serde_json::Value::Array(mut values) if !values.is_empty() => {
                        values.swap_remove(0)
                    }
                    other => other,
                };
                let data = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                RevealedAttribute { label, data }
            })
            .collect();

        AppClaimOffer {
            issuer: Issuer {
                name: self.issuer_name.or(self.remote_name).unwrap_or_default(),
                did: self
                    .issuer_did
                    .unwrap_or_else(|| remote_pairwise_did.to_string()),
            },
            name: self.claim_name,
            version: self.version,
            revealed_attributes,
            schema_sequence_number: self.schema_seq_no,
            pay_token_value: self.price,
        }
    }
}

/// Requested attribute: either a single `name` or a group of `names`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestedAttributeEntry {
    /// Single attribute name.
    pub name: Option<String>,
    /// Attribute group requested together.
    pub names: Option<Vec<String>>,
}

/// Body of a proof request.
#[derive(Debug, Clone, Deserialize)]
pub struct ProofRequestData {
    /// Requested attributes keyed by referent.
    pub requested_attributes: BTreeMap<String, RequestedAttributeEntry>,
    /// Proof request name.
    pub name: String,
    /// Proof request version.
    #[serde(default)]
    pub version: String,
}

/// Proof request as sent by the verifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequestPushPayload {
    /// Requested attributes and request name.
    #[serde(rename = "proof_request_data")]
    pub proof_request_data: ProofRequestData,
    /// Name of the verifier's connection.
    pub remote_name: Option<String>,
    /// Native handle, when the request was already deserialized.
    pub proof_handle: Option<i32>,
    /// Set for connectionless requests.
    pub ephemeral_proof_request: Option<String>,
    /// Set for requests attached to an out-of-band invitation.
    pub outofband_proof_request: Option<String>,
}

/// Attribute (or attribute group) the verifier asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct RequestedAttribute {
    /// Attribute names joined with `,`.
    pub label: String,
    /// Attribute names requested together.
    pub names: Vec<String>,
}

/// Proof request as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct AppProofRequest {
    /// Proof request name.
    pub name: String,
    /// Proof request version.
    pub version: String,
    /// Attributes the verifier asks for.
    pub requested_attributes: Vec<RequestedAttribute>,
    /// Name of the verifier.
    pub requester_name: String,
    /// Native proof handle, if known.
    pub proof_handle: Option<i32>,
    /// The request did not arrive over a connection.
    pub ephemeral: bool,
    /// Received through an out-of-band invitation rather than a connection.
    pub out_of_band: bool,
}

impl ProofRequestPushPayload {
    /// Converts the verifier payload. An attribute with both `name` and
    /// `names` yields two entries.
    #[must_use]
    pub fn into_app_proof_request(self) -> AppProofRequest {
        let mut requested_attributes = Vec::new();
        for entry in self.proof_request_data.requested_attributes.into_values() {
            if let Some(name) = entry.name {
                requested_attributes.push(RequestedAttribute {
                    label: name.clone(),
                    names: vec![name],
                });
            }
            if let Some(names) = entry.names {
                requested_attributes.push(RequestedAttribute {
                    label: names.join(","),
                    names,
                });
            }
        }

        AppProofRequest {
            name: self.proof_request_data.name,
            version: self.proof_request_data.version,
            requested_attributes,
            requester_name: self.remote_name.unwrap_or_default(),
            proof_handle: self.proof_handle,
            ephemeral: self.ephemeral_proof_request.is_some(),
            out_of_band: self.outofband_proof_request.is_some(),
        }
    }
}

/// One allowed answer to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct QuestionResponse {
    /// Answer shown to the user.
    pub text: String,
    /// Nonce signed when this answer is chosen.
    pub nonce: String,
}

/// Structured question sent over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Question {
    /// Handle of the connection the question arrived on.
    pub connection_handle: i32,
    /// Agency message identifier.
    pub uid: String,
    /// Pairwise DID of the receiving connection.
    pub for_did: String,
    /// Pairwise DID of the sender.
    pub sender_did: String,
    /// Push title.
    pub title: String,
    /// Question text.
    pub text: String,
    /// Longer explanation, when the sender gave one.
    pub detail: Option<String>,
    /// Allowed answers.
    pub responses: Vec<QuestionResponse>,
    /// Expiry time, when the sender set one.
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionBody {
    question_text: String,
    question_detail: Option<String>,
    #[serde(default)]
    valid_responses: Vec<QuestionResponse>,
    #[serde(rename = "@timing")]
    timing: Option<QuestionTiming>,
}

#[derive(Debug, Deserialize)]
struct QuestionTiming {
    expires_time: Option<String>,
}

/// Push texts and identifiers a question is delivered with.
#[derive(Debug, Clone)]
pub struct QuestionContext<'a> {
    /// Handle of the connection the question arrived on.
    pub connection_handle: i32,
    /// Agency message identifier.
    pub uid: &'a str,
    /// Pairwise DID of the receiving connection.
    pub for_did: &'a str,
    /// Pairwise DID of the sender.
    pub sender_did: &'a str,
    /// Push title, used as the question title.
    pub title: &'a str,
}

/// Builds a question from a decrypted message envelope.
///
/// # Errors
///
/// Returns an error if the envelope or its `@msg` body is not valid JSON.
pub fn question_from_decrypted_payload(
    decrypted: &str,
    context: &QuestionContext<'_>,
) -> Result<Question, serde_json::Error> {
    let envelope: DecryptedPayload = serde_json::from_str(decrypted)?;
    let body: QuestionBody = serde_json::from_str(&envelope.msg)?;
    Ok(Question {
        connection_handle: context.connection_handle,
        uid: context.uid.to_string(),
        for_did: context.for_did.to_string(),
        sender_did: context.sender_did.to_string(),
        title: context.title.to_string(),
        text: body.question_text,
        detail: body.question_detail,
        responses: body.valid_responses,
        expires_at: body.timing.and_then(|t| t.expires_time),
    })
}

/// Messages returned by a download, grouped per pairwise connection.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadedConnection {
    /// Pairwise DID of the receiving connection.
    #[serde(rename = "pairwiseDID")]
    pub pairwise_did: String,
    /// Messages on this connection.
    #[serde(default)]
    pub msgs: Vec<DownloadedMessage>,
}

/// One downloaded agency message.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadedMessage {
    /// Agency message identifier.
    pub uid: String,
    /// Agency status, see [`crate::bridge::MESSAGE_PENDING`].
    #[serde(rename = "statusCode")]
    pub status_code: String,
    /// Pairwise DID of the sender, if the agency knows it.
    #[serde(rename = "senderDID")]
    pub sender_did: Option<String>,
    /// JSON [`DecryptedPayload`], absent for undecryptable messages.
    #[serde(rename = "decryptedPayload")]
    pub decrypted_payload: Option<String>,
}

/// Envelope around a decrypted message body.
#[derive(Debug, Clone, Deserialize)]
pub struct DecryptedPayload {
    /// Type tag of the body.
    #[serde(rename = "@type")]
    pub payload_type: PayloadType,
    /// JSON encoded body.
    #[serde(rename = "@msg")]
    pub msg: String,
}

/// Type tag of a decrypted message.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadType {
    /// Type name such as `CRED_OFFER`.
    pub name: String,
}

impl PayloadType {
    /// Maps the envelope type onto the notification classification.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        match self.name.as_str() {
            "CRED_OFFER" | "credential-offer" => Some(MessageType::ClaimOffer),
            "PROOF_REQ" | "presentation-request" => Some(MessageType::ProofRequest),
            "question" | "Question" => Some(MessageType::Question),
            _ => None,
        }
    }
}

/// Entry of a message status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageStatusUpdate {
    /// Pairwise DID the messages belong to.
    #[serde(rename = "pairwiseDID")]
    pub pairwise_did: String,
    /// Messages to mark as reviewed.
    pub uids: Vec<String>,
}

/// Removes the quotes the agency wraps single messages in.
#[must_use]
pub fn strip_agent_message(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("claimOffer", MessageType::ClaimOffer ; "claim offer")]
    #[test_case("proofReq", MessageType::ProofRequest ; "proof request")]
    #[test_case("claim", MessageType::Claim ; "claim")]
    #[test_case("question", MessageType::Question ; "lowercase question")]
    #[test_case("Question", MessageType::Question ; "capitalised question")]
    #[test_case("WALLET_BACKUP_READY", MessageType::WalletBackupReady ; "backup ready")]
    #[test_case("WALLET_BACKUP_ACK", MessageType::WalletBackupAck ; "backup ack")]
    #[test_case("WALLET_BACKUP_FAILURE", MessageType::WalletBackupFailure ; "backup failure")]
    #[test_case("unknown", MessageType::Unknown ; "aries")]
    #[test_case("redirect", MessageType::Other("redirect".to_string()) ; "unrecognised")]
    fn test_classify(raw: &str, expected: MessageType) {
        assert_eq!(MessageType::classify(raw), expected);
    }

    #[test]
    fn test_bulk_fetch_kinds() {
        assert!(MessageType::ClaimOffer.uses_bulk_fetch());
        assert!(MessageType::Unknown.uses_bulk_fetch());
        assert!(!MessageType::Question.uses_bulk_fetch());
        assert!(MessageType::WalletBackupAck.is_backup());
    }

    #[test]
    fn test_claim_offer_conversion_flattens_arrays() {
        let payload: ClaimOfferPushPayload = serde_json::from_str(
            r#"{
                "claim": {"name": ["Alice"], "height": ["170"], "plain": "x"},
                "claim_name": "Passport",
                "version": "1.0",
                "schema_seq_no": 12,
                "remoteName": "Gov"
            }"#,
        )
        .unwrap();
        let offer = payload.into_app_claim_offer("did:remote");
        assert_eq!(offer.issuer.name, "Gov");
        assert_eq!(offer.issuer.did, "did:remote");
        assert_eq!(offer.schema_sequence_number, Some(12));
        assert_eq!(
            offer.revealed_attributes,
            vec![
                RevealedAttribute {
                    label: "height".into(),
                    data: "170".into()
                },
                RevealedAttribute {
                    label: "name".into(),
                    data: "Alice".into()
                },
                RevealedAttribute {
                    label: "plain".into(),
                    data: "x".into()
                },
            ]
        );
    }

    #[test]
    fn test_proof_request_conversion_expands_names() {
        let payload: ProofRequestPushPayload = serde_json::from_str(
            r#"{
                "proof_request_data": {
                    "name": "Age check",
                    "version": "1.0",
                    "requested_attributes": {
                        "a": {"name": "age"},
                        "b": {"names": ["first", "last"]}
                    }
                },
                "remoteName": "Bar",
                "outofbandProofRequest": "{}"
            }"#,
        )
        .unwrap();
        let request = payload.into_app_proof_request();
        assert_eq!(request.requester_name, "Bar");
        assert!(request.out_of_band);
        assert!(!request.ephemeral);
        assert_eq!(request.requested_attributes.len(), 2);
        assert_eq!(request.requested_attributes[1].label, "first,last");
    }

    #[test]
    fn test_question_from_envelope() {
        let body = serde_json::json!({
            "question_text": "Is it you?",
            "valid_responses": [{"text": "Yes", "nonce": "n1"}],
            "@timing": {"expires_time": "2030-01-01"}
        });
        let envelope = serde_json::json!({
            "@type": {"name": "Question"},
            "@msg": body.to_string(),
        });
        let question = question_from_decrypted_payload(
            &envelope.to_string(),
            &QuestionContext {
                connection_handle: 3,
                uid: "u1",
                for_did: "me",
                sender_did: "them",
                title: "Hi",
            },
        )
        .unwrap();
        assert_eq!(question.text, "Is it you?");
        assert_eq!(question.responses.len(), 1);
        assert_eq!(question.expires_at.as_deref(), Some("2030-01-01"));
    }

    #[test]
    fn test_strip_agent_message() {
        assert_eq!(strip_agent_message("\"{}\""), "{}");
        assert_eq!(strip_agent_message("{}"), "{}");
    }
}
