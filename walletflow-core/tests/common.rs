//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;
use walletflow_core::bridge::{MemoryBridge, RecordingShareSheet, ShareOutcome};
use walletflow_core::config::FlowConfig;
use walletflow_core::engine::{Collaborators, Engine, InstanceStatus};
use walletflow_core::event::{ConnectionEventKind, Event, EventKind};
use walletflow_core::payload::{NotificationOpenOptions, NotificationPayload};
use walletflow_core::state::connections::Connection;
use walletflow_core::storage::MemoryStorageProvider;
use walletflow_core::WalletOrchestrator;

pub const FOR_DID: &str = "pairwise-1";
pub const SENDER_DID: &str = "sender-1";
pub const SENDER_NAME: &str = "Faber College";

/// Generous enough for paused-clock tests, where it only advances when idle.
const WAIT: Duration = Duration::from_secs(600);

/// An orchestrator wired to in-memory collaborators, plus a receiver that
/// saw every event published since it started.
pub struct Harness {
    pub orchestrator: WalletOrchestrator,
    pub bridge: Arc<MemoryBridge>,
    pub storage: Arc<MemoryStorageProvider>,
    pub share_sheet: Arc<RecordingShareSheet>,
    pub events: broadcast::Receiver<Event>,
    documents: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FlowConfig::default(), ShareOutcome::Shared)
    }

    pub fn with_config(config: FlowConfig) -> Self {
        Self::build(config, ShareOutcome::Shared)
    }

    pub fn with_share_outcome(outcome: ShareOutcome) -> Self {
        Self::build(FlowConfig::default(), outcome)
    }

    fn build(config: FlowConfig, outcome: ShareOutcome) -> Self {
        init_tracing();
        let documents = tempfile::tempdir().expect("documents dir");
        let bridge = Arc::new(MemoryBridge::new());
        let storage = Arc::new(MemoryStorageProvider::new(
            documents.path().to_string_lossy().into_owned(),
        ));
        let share_sheet = Arc::new(RecordingShareSheet::new(outcome));
        let orchestrator = WalletOrchestrator::start(
            Collaborators {
                bridge: bridge.clone(),
                storage: storage.clone(),
                share_sheet: share_sheet.clone(),
            },
            config,
        );
        let events = orchestrator.engine().subscribe();
        Self {
            orchestrator,
            bridge,
            storage,
            share_sheet,
            events,
            documents,
        }
    }

    pub fn engine(&self) -> &Engine {
        self.orchestrator.engine()
    }

    pub fn documents_dir(&self) -> &Path {
        self.documents.path()
    }

    /// Waits for the next event of one of `kinds`, skipping everything else.
    pub async fn next(&mut self, kinds: &[EventKind]) -> Event {
        let events = &mut self.events;
        let next = async {
            loop {
                match events.recv().await {
                    Ok(event) if kinds.contains(&event.kind()) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => panic!("event bus closed"),
                }
            }
        };
        tokio::time::timeout(WAIT, next)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {kinds:?}"))
    }

    /// Collects every event of `kinds` published until no workflow runs.
    pub async fn drain(&mut self, kinds: &[EventKind]) -> Vec<Event> {
        self.settle().await;
        self.drain_now(kinds)
    }

    /// Collects the events of `kinds` already published, without waiting.
    pub fn drain_now(&mut self, kinds: &[EventKind]) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if kinds.contains(&event.kind()) {
                seen.push(event);
            }
        }
        seen
    }

    /// Waits until no workflow instance is running.
    pub async fn settle(&self) {
        let registry = self.engine().registry();
        let idle = async {
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if registry.instances().is_empty() {
                    break;
                }
            }
        };
        tokio::time::timeout(WAIT, idle)
            .await
            .expect("workflows did not settle");
    }

    /// Waits until `count` instances are suspended on an event.
    pub async fn until_waiting(&self, count: usize) {
        let registry = self.engine().registry();
        let waiting = async {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let suspended = registry
                    .instances()
                    .into_iter()
                    .filter(|i| matches!(i.status, InstanceStatus::Waiting { .. }))
                    .count();
                if suspended >= count {
                    break;
                }
            }
        };
        tokio::time::timeout(WAIT, waiting)
            .await
            .expect("instances never suspended");
    }

    /// Publishes the bridge-ready event and stores the test connection.
    pub async fn ready_with_connection(&mut self) {
        self.orchestrator.bridge_initialized();
        self.orchestrator.save_connection(connection());
        self.next(&[EventKind::Connection(
            ConnectionEventKind::NewConnectionSuccess,
        )])
        .await;
    }

    /// Unlocks the app and lands on a screen that allows redirects.
    pub fn unlock_on_home(&self) {
        self.orchestrator.unlock();
        self.orchestrator.screen_changed("Home".to_string());
    }

    pub fn notify(&self, payload: NotificationPayload) {
        self.orchestrator
            .push_notification_received(payload, NotificationOpenOptions::default());
    }
}

/// Routes workflow logs to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn connection() -> Connection {
    Connection {
        identifier: FOR_DID.to_string(),
        sender_did: SENDER_DID.to_string(),
        sender_name: SENDER_NAME.to_string(),
        logo_url: Some("https://faber.example/logo.png".to_string()),
        vcx_serialized_connection: Some(r#"{"source_id":"faber"}"#.to_string()),
    }
}

pub fn notification(message_type: &str, uid: &str) -> NotificationPayload {
    NotificationPayload {
        for_did: Some(FOR_DID.to_string()),
        uid: Some(uid.to_string()),
        message_type: message_type.to_string(),
        remote_pairwise_did: Some(SENDER_DID.to_string()),
        ..NotificationPayload::default()
    }
}

/// Download response holding one pending claim offer per uid.
pub fn pending_claim_offers(uids: &[&str]) -> String {
    let offer = serde_json::json!({
        "claim": { "name": ["Alice"], "degree": ["Maths"] },
        "claim_name": "Transcript",
        "version": "1.0",
        "issuer_did": SENDER_DID,
    });
    let msgs: Vec<_> = uids
        .iter()
        .map(|uid| {
            serde_json::json!({
                "uid": uid,
                "statusCode": "MS-103",
                "senderDID": SENDER_DID,
                "decryptedPayload": serde_json::json!({
                    "@type": { "name": "CRED_OFFER" },
                    "@msg": offer.to_string(),
                })
                .to_string(),
            })
        })
        .collect();
    serde_json::json!([{ "pairwiseDID": FOR_DID, "msgs": msgs }]).to_string()
}
