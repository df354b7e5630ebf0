//! The native credential bridge.
//!
//! Every cryptographic and agency operation is delegated to the host through
//! [`Bridge`]. From the orchestrator's point of view each call is a fallible
//! future with no visible side effect other than its result. None of them has
//! a timeout of its own; workflows race them against timers where needed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::connections::Connection;

pub mod memory;
pub mod share;

pub use memory::{MemoryBridge, RecordingShareSheet};
pub use share::{ShareOutcome, ShareRequest, ShareSheet};

/// Agency response code for messages that have not been reviewed yet.
pub const MESSAGE_PENDING: &str = "MS-103";
/// Agency response code for messages marked as reviewed.
pub const MESSAGE_REVIEWED: &str = "MS-106";
/// Source identifier passed when creating a cloud backup.
pub const BACKUP_SOURCE_ID: &str = "sourceID";

/// Operation names used in logs, errors and test scripting.
pub mod ops {
    #![allow(missing_docs)]
    pub const CREATE_WALLET_BACKUP: &str = "create_wallet_backup";
    pub const ENCRYPT_WALLET: &str = "encrypt_wallet";
    pub const BACKUP_WALLET_BACKUP: &str = "backup_wallet_backup";
    pub const UPDATE_WALLET_BACKUP_STATE: &str = "update_wallet_backup_state_with_message";
    pub const VCX_GET_AGENT_MESSAGES: &str = "vcx_get_agent_messages";
    pub const DOWNLOAD_MESSAGES: &str = "download_messages";
    pub const UPDATE_MESSAGES_STATUS: &str = "update_messages_status";
    pub const GET_WORDS: &str = "get_words";
    pub const PIN_HASH: &str = "pin_hash";
    pub const GET_CONNECTION_HANDLE: &str = "get_handle_by_serialized_connection";
    pub const GET_CLAIM_HANDLE: &str = "get_claim_handle_by_serialized_claim_offer";
    pub const UPDATE_CLAIM_OFFER_STATE: &str = "update_claim_offer_state";
    pub const GET_CLAIM_VCX: &str = "get_claim_vcx";
    pub const SERIALIZE_CLAIM_OFFER: &str = "serialize_claim_offer";
    pub const UPDATE_PUSH_TOKEN: &str = "update_push_token";
    pub const DELETE_CONNECTION: &str = "delete_connection";
    pub const ACCEPT_INVITATION: &str = "accept_invitation";
}

/// Errors raised by a [`Bridge`] or [`ShareSheet`] implementation.
#[derive(Debug, Clone, Error, uniffi::Error)]
pub enum BridgeError {
    /// The native layer rejected the call.
    #[error("bridge call rejected: {0}")]
    Rejected(String),
    /// The user dismissed a platform prompt.
    #[error("cancelled by user")]
    Cancelled,
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for BridgeError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Where and with what key the wallet is exported.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct EncryptWalletRequest {
    /// Destination file of the encrypted wallet.
    pub location: String,
    /// Hashed recovery passphrase used as the export key.
    pub passphrase: String,
}

/// A claim stored in the wallet after its offer was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct VcxClaim {
    /// Identifier of the claim inside the wallet.
    pub claim_uuid: String,
    /// Serialized claim.
    pub claim: String,
}

/// Push registration sent to the agency.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PushTokenConfig {
    /// Stable identifier of this installation.
    pub unique_id: String,
    /// Token prefixed with the push provider (`FCM:`).
    pub push_token: String,
}

/// State of a claim offer as reported by the bridge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, uniffi::Enum,
)]
pub enum ClaimOfferState {
    /// Unknown or freshly created.
    #[default]
    None,
    /// Offer parsed by the bridge.
    Initialized,
    /// Credential request sent to the issuer.
    OfferSent,
    /// Issuer received the request.
    RequestReceived,
    /// Credential downloaded and stored.
    Accepted,
    /// Issuer could not fulfil the request.
    Unfulfilled,
    /// The offer expired.
    Expired,
    /// The credential was revoked.
    Revoked,
}

impl ClaimOfferState {
    /// Maps the numeric state returned by the native layer.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Initialized,
            2 => Self::OfferSent,
            3 => Self::RequestReceived,
            4 => Self::Accepted,
            5 => Self::Unfulfilled,
            6 => Self::Expired,
            7 => Self::Revoked,
            _ => Self::None,
        }
    }
}

/// Native credential-exchange operations.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait Bridge: Send + Sync {
    /// Creates a cloud backup and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn create_wallet_backup(&self, source_id: String, key: String) -> BridgeResult<i32>;

    /// Encrypts the wallet into `request.location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn encrypt_wallet(&self, request: EncryptWalletRequest) -> BridgeResult<()>;

    /// Uploads the wallet for the backup identified by `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn backup_wallet_backup(&self, handle: i32, path: String) -> BridgeResult<()>;

    /// Feeds an agency message into the backup state machine held by the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn update_wallet_backup_state_with_message(
        &self,
        handle: i32,
        message: String,
    ) -> BridgeResult<()>;

    /// Downloads one agency message.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn vcx_get_agent_messages(&self, status_code: String, uid: String)
        -> BridgeResult<String>;

    /// Downloads messages, optionally narrowed to `uids` and `pairwise_dids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn download_messages(
        &self,
        status_code: String,
        uids: Option<Vec<String>>,
        pairwise_dids: Option<Vec<String>>,
    ) -> BridgeResult<String>;

    /// Marks messages as reviewed. `messages` is a JSON list of
    /// `{"pairwiseDID": .., "uids": [..]}` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn update_messages_status(&self, status_code: String, messages: String)
        -> BridgeResult<()>;

    /// Returns `count` words from the recovery word list.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn get_words(&self, count: u32, min_length: u32) -> BridgeResult<Vec<String>>;

    /// Derives the key for `passphrase` and `salt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn pin_hash(&self, passphrase: String, salt: String) -> BridgeResult<String>;

    /// Restores a connection and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn get_handle_by_serialized_connection(&self, serialized: String) -> BridgeResult<i32>;

    /// Restores a claim offer and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn get_claim_handle_by_serialized_claim_offer(
        &self,
        serialized: String,
    ) -> BridgeResult<i32>;

    /// Polls the agency for the claim offer and returns its new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn update_claim_offer_state(&self, claim_handle: i32) -> BridgeResult<u32>;

    /// Returns the stored claim for an accepted offer.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn get_claim_vcx(&self, claim_handle: i32) -> BridgeResult<VcxClaim>;

    /// Serializes the claim offer held under `claim_handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn serialize_claim_offer(&self, claim_handle: i32) -> BridgeResult<String>;

    /// Registers the push token with the agency.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn update_push_token(&self, config: PushTokenConfig) -> BridgeResult<()>;

    /// Deletes a pairwise connection at the agency.
    ///
    /// # Errors
    ///
    /// Returns an error if the native layer rejects the call.
    async fn delete_connection(&self, serialized: String) -> BridgeResult<()>;

    /// Accepts a connection invitation.
    ///
    /// # Errors
    ///
    /// Returns an error if the invitation is invalid or the agency rejects it.
    async fn accept_invitation(&self, invitation: String) -> BridgeResult<Connection>;
}
