//! In-memory bridge and share sheet.
//!
//! FOR TESTING AND LOCAL DEVELOPMENT ONLY. Nothing is encrypted and no agency
//! is contacted. Individual operations can be scripted to fail or to stall
//! until released, which is how the timeout and retry paths are exercised.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use hkdf::Hkdf;
use rand::seq::SliceRandom;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::Notify;

use super::{
    ops, Bridge, BridgeError, BridgeResult, EncryptWalletRequest, PushTokenConfig,
    ShareOutcome, ShareRequest, ShareSheet, VcxClaim,
};
use crate::state::connections::Connection;

const PIN_HASH_INFO: &[u8] = b"walletflow:recovery-passphrase";

const WORDS: &[&str] = &[
    "anchor", "balcony", "candle", "dolphin", "emerald", "falcon", "glacier", "harbor",
    "island", "jasmine", "kettle", "lantern", "meadow", "nectar", "orchid", "pepper",
    "quartz", "ribbon", "saddle", "timber", "umbrella", "velvet", "walnut", "yellow",
];

/// Derives the passphrase key the way [`MemoryBridge::pin_hash`] does.
///
/// # Errors
///
/// Returns an error if the key cannot be expanded.
pub fn derive_pin_hash(passphrase: &str, salt: &str) -> BridgeResult<String> {
    let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), passphrase.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(PIN_HASH_INFO, &mut okm)
        .map_err(|e| BridgeError::Rejected(e.to_string()))?;
    Ok(hex::encode(okm))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Invitation {
    sender_did: String,
    sender_name: String,
    logo_url: Option<String>,
}

/// In-memory [`Bridge`] implementation.
#[derive(Debug, Default)]
pub struct MemoryBridge {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, u32>>,
    stalled: Mutex<HashSet<&'static str>>,
    release: Notify,
    agent_messages: Mutex<HashMap<String, String>>,
    pending_messages: Mutex<Option<String>>,
    claim_offer_state: Mutex<Option<u32>>,
    status_updates: Mutex<Vec<String>>,
    next_handle: AtomicI32,
}

impl MemoryBridge {
    /// Creates a bridge where every operation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: &'static str, times: u32) {
        lock(&self.failures).insert(op, times);
    }

    /// Makes calls of `op` hang until [`MemoryBridge::release`] is called.
    pub fn stall(&self, op: &'static str) {
        lock(&self.stalled).insert(op);
    }

    /// Lets stalled calls of `op` proceed.
    pub fn release(&self, op: &'static str) {
        lock(&self.stalled).remove(op);
        self.release.notify_waiters();
    }

    /// Sets the raw message returned for `uid` by `vcx_get_agent_messages`.
    pub fn set_agent_message(&self, uid: impl Into<String>, raw: impl Into<String>) {
        lock(&self.agent_messages).insert(uid.into(), raw.into());
    }

    /// Sets the JSON returned by `download_messages`.
    pub fn set_pending_messages(&self, json: impl Into<String>) {
        *lock(&self.pending_messages) = Some(json.into());
    }

    /// Sets the numeric state returned by `update_claim_offer_state`.
    pub fn set_claim_offer_state(&self, state: u32) {
        *lock(&self.claim_offer_state) = Some(state);
    }

    /// Number of calls made to `op`, including failed ones.
    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.as_str() == op).count()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Message status payloads passed to `update_messages_status`.
    #[must_use]
    pub fn status_updates(&self) -> Vec<String> {
        lock(&self.status_updates).clone()
    }

    async fn enter(&self, op: &'static str) -> BridgeResult<()> {
        lock(&self.calls).push(op.to_string());
        loop {
            let released = self.release.notified();
            if !lock(&self.stalled).contains(op) {
                break;
            }
            released.await;
        }
        let mut failures = lock(&self.failures);
        if let Some(remaining) = failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BridgeError::Rejected(format!("{op} failed")));
            }
        }
        Ok(())
    }

    fn next_handle(&self) -> i32 {
        self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl Bridge for MemoryBridge {
    async fn create_wallet_backup(&self, _source_id: String, _key: String) -> BridgeResult<i32> {
        self.enter(ops::CREATE_WALLET_BACKUP).await?;
        Ok(self.next_handle())
    }

    async fn encrypt_wallet(&self, request: EncryptWalletRequest) -> BridgeResult<()> {
        self.enter(ops::ENCRYPT_WALLET).await?;
        tokio::fs::write(&request.location, b"walletflow-memory-wallet")
            .await
            .map_err(|e| BridgeError::Rejected(e.to_string()))
    }

    async fn backup_wallet_backup(&self, _handle: i32, _path: String) -> BridgeResult<()> {
        self.enter(ops::BACKUP_WALLET_BACKUP).await
    }

    async fn update_wallet_backup_state_with_message(
        &self,
        _handle: i32,
        _message: String,
    ) -> BridgeResult<()> {
        self.enter(ops::UPDATE_WALLET_BACKUP_STATE).await
    }

    async fn vcx_get_agent_messages(
        &self,
        _status_code: String,
        uid: String,
    ) -> BridgeResult<String> {
        self.enter(ops::VCX_GET_AGENT_MESSAGES).await?;
        Ok(lock(&self.agent_messages)
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| "\"{}\"".to_string()))
    }

    async fn download_messages(
        &self,
        _status_code: String,
        _uids: Option<Vec<String>>,
        _pairwise_dids: Option<Vec<String>>,
    ) -> BridgeResult<String> {
        self.enter(ops::DOWNLOAD_MESSAGES).await?;
        Ok(lock(&self.pending_messages)
            .clone()
            .unwrap_or_else(|| "[]".to_string()))
    }

    async fn update_messages_status(
        &self,
        _status_code: String,
        messages: String,
    ) -> BridgeResult<()> {
        self.enter(ops::UPDATE_MESSAGES_STATUS).await?;
        lock(&self.status_updates).push(messages);
        Ok(())
    }

    async fn get_words(&self, count: u32, min_length: u32) -> BridgeResult<Vec<String>> {
        self.enter(ops::GET_WORDS).await?;
        let min_length = usize::try_from(min_length).unwrap_or(usize::MAX);
        let eligible: Vec<&str> = WORDS
            .iter()
            .copied()
            .filter(|w| w.len() >= min_length)
            .collect();
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                eligible
                    .choose(&mut rng)
                    .map(|w| (*w).to_string())
                    .ok_or_else(|| BridgeError::Rejected("word list is empty".to_string()))
            })
            .collect()
    }

    async fn pin_hash(&self, passphrase: String, salt: String) -> BridgeResult<String> {
        self.enter(ops::PIN_HASH).await?;
        derive_pin_hash(&passphrase, &salt)
    }

    async fn get_handle_by_serialized_connection(&self, _serialized: String) -> BridgeResult<i32> {
        self.enter(ops::GET_CONNECTION_HANDLE).await?;
        Ok(self.next_handle())
    }

    async fn get_claim_handle_by_serialized_claim_offer(
        &self,
        _serialized: String,
    ) -> BridgeResult<i32> {
        self.enter(ops::GET_CLAIM_HANDLE).await?;
        Ok(self.next_handle())
    }

    async fn update_claim_offer_state(&self, _claim_handle: i32) -> BridgeResult<u32> {
        self.enter(ops::UPDATE_CLAIM_OFFER_STATE).await?;
        Ok(lock(&self.claim_offer_state).unwrap_or(4))
    }

    async fn get_claim_vcx(&self, claim_handle: i32) -> BridgeResult<VcxClaim> {
        self.enter(ops::GET_CLAIM_VCX).await?;
        Ok(VcxClaim {
            claim_uuid: format!("claim-{claim_handle}"),
            claim: "{}".to_string(),
        })
    }

    async fn serialize_claim_offer(&self, claim_handle: i32) -> BridgeResult<String> {
        self.enter(ops::SERIALIZE_CLAIM_OFFER).await?;
        Ok(format!("{{\"handle\":{claim_handle}}}"))
    }

    async fn update_push_token(&self, _config: PushTokenConfig) -> BridgeResult<()> {
        self.enter(ops::UPDATE_PUSH_TOKEN).await
    }

    async fn delete_connection(&self, _serialized: String) -> BridgeResult<()> {
        self.enter(ops::DELETE_CONNECTION).await
    }

    async fn accept_invitation(&self, invitation: String) -> BridgeResult<Connection> {
        self.enter(ops::ACCEPT_INVITATION).await?;
        let parsed: Invitation = serde_json::from_str(&invitation)
            .map_err(|e| BridgeError::Rejected(format!("invalid invitation: {e}")))?;
        Ok(Connection {
            identifier: format!("pairwise-{}", uuid::Uuid::new_v4().simple()),
            sender_did: parsed.sender_did,
            sender_name: parsed.sender_name,
            logo_url: parsed.logo_url,
            vcx_serialized_connection: Some(invitation),
        })
    }
}

/// Share sheet that records every request and answers with a fixed outcome.
#[derive(Debug)]
pub struct RecordingShareSheet {
    outcome: Mutex<BridgeResult<ShareOutcome>>,
    requests: Mutex<Vec<ShareRequest>>,
}

impl RecordingShareSheet {
    /// Creates a sheet answering every request with `outcome`.
    #[must_use]
    pub fn new(outcome: ShareOutcome) -> Self {
        Self {
            outcome: Mutex::new(Ok(outcome)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Makes every subsequent request fail with `error`.
    pub fn fail_with(&self, error: BridgeError) {
        *lock(&self.outcome) = Err(error);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ShareRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait::async_trait]
impl ShareSheet for RecordingShareSheet {
    async fn share(&self, request: ShareRequest) -> BridgeResult<ShareOutcome> {
        lock(&self.requests).push(request);
        lock(&self.outcome).clone()
    }
}
