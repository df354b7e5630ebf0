//! Integration tests: persistence.
mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{Harness, FOR_DID, SENDER_DID};
use walletflow_core::bridge::{ops, ClaimOfferState};
use walletflow_core::event::{
    BackupEvent, BackupEventKind, ClaimEvent, ClaimEventKind, ConnectionEvent,
    ConnectionEventKind, CorrelationEvent, CorrelationEventKind, Event, EventKind,
    PushEvent, PushEventKind,
};
use walletflow_core::payload::AppProofRequest;
use walletflow_core::state::backup::BackupArea;
use walletflow_core::state::claim::{ClaimMapEntry, SerializedClaimOffer};
use walletflow_core::state::connections::Connection;
use walletflow_core::state::correlation::{CorrelationStatus, MessageMeta};
use walletflow_core::storage::{keys, KeyValueStore};

async fn seed(store: &dyn KeyValueStore, entries: &[(&str, &str)]) {
    for (key, value) in entries {
        store
            .set((*key).to_string(), (*value).to_string())
            .await
            .expect("seed");
    }
}

#[tokio::test(start_paused = true)]
async fn test_hydration_restores_every_area() {
    let mut harness = Harness::new();
    seed(
        harness.storage.safe.as_ref(),
        &[
            (keys::LAST_SUCCESSFUL_BACKUP, "2024-01-01T00:00:00Z"),
            (keys::LAST_SUCCESSFUL_CLOUD_BACKUP, "2024-01-02T00:00:00Z"),
            (keys::AUTO_CLOUD_BACKUP_ENABLED, "true"),
            (keys::HAS_VERIFIED_RECOVERY_PHRASE, "true"),
            (keys::SHOW_BANNER, "true"),
            (keys::PUSH_COM_METHOD, "FCM:token"),
        ],
    )
    .await;
    let connections = BTreeMap::from([(FOR_DID.to_string(), common::connection())]);
    seed(
        harness.storage.secure.as_ref(),
        &[(
            keys::CONNECTIONS,
            &serde_json::to_string(&connections).expect("encode"),
        )],
    )
    .await;

    harness.orchestrator.hydrate();
    harness.settle().await;

    let state = harness.engine().store().snapshot();
    let backup = &state.backup;
    assert_eq!(
        backup.session.last_successful_backup.as_deref(),
        Some("2024-01-01T00:00:00Z")
    );
    assert_eq!(
        backup.session.last_successful_cloud_backup.as_deref(),
        Some("2024-01-02T00:00:00Z")
    );
    assert!(backup.auto_cloud_backup_enabled);
    assert!(backup.has_verified_recovery_phrase);
    assert!(backup.show_banner);
    assert!(backup.failures.is_empty());
    assert_eq!(state.push.push_token.as_deref(), Some("FCM:token"));
    assert_eq!(harness.orchestrator.connections(), vec![common::connection()]);
    assert!(harness
        .drain_now(&[EventKind::Connection(ConnectionEventKind::HydrateConnectionsFail)])
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hydration_failure_stays_in_its_area() {
    let mut harness = Harness::new();
    seed(
        harness.storage.safe.as_ref(),
        &[
            (keys::LAST_SUCCESSFUL_BACKUP, "2024-01-01T00:00:00Z"),
            (keys::AUTO_CLOUD_BACKUP_ENABLED, "maybe"),
            (keys::SHOW_BANNER, "true"),
        ],
    )
    .await;
    harness.storage.safe.fail_reads_of(keys::LAST_SUCCESSFUL_BACKUP);
    harness.storage.safe.fail_reads_of(keys::PUSH_COM_METHOD);

    harness.orchestrator.hydrate();
    let failures = harness
        .drain(&[
            EventKind::Backup(BackupEventKind::HydrateBackupFailure),
            EventKind::Push(PushEventKind::HydratePushTokenFail),
        ])
        .await;

    let mut areas = Vec::new();
    let mut push_token_errors = Vec::new();
    for event in failures {
        match event {
            Event::Backup(BackupEvent::HydrateBackupFailure(failure)) => {
                assert_eq!(failure.error.code, "WB-005");
                areas.push(failure.area);
            }
            Event::Push(PushEvent::HydratePushTokenFail(error)) => push_token_errors.push(error),
            other => panic!("unexpected {other:?}"),
        }
    }
    areas.sort_by_key(|area| format!("{area:?}"));
    assert_eq!(
        areas,
        vec![BackupArea::AutoCloudBackupEnabled, BackupArea::LastSuccessfulBackup]
    );
    assert_eq!(push_token_errors.len(), 1);
    assert_eq!(push_token_errors[0].code, "PN-002");
    let push = harness.engine().store().select(|s| s.push.clone());
    assert_eq!(push.push_token, None);
    assert_eq!(push.error.map(|e| e.code).as_deref(), Some("PN-002"));

    let backup = harness.engine().store().select(|s| s.backup.clone());
    assert!(backup.show_banner);
    assert_eq!(backup.session.last_successful_backup, None);
    assert_eq!(backup.failures.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_claim_map_is_reported() {
    let mut harness = Harness::new();
    seed(harness.storage.secure.as_ref(), &[(keys::CLAIM_MAP, "{not json")]).await;

    harness.orchestrator.hydrate();
    let Event::Claim(ClaimEvent::HydrateClaimMapFail(error)) = harness
        .next(&[EventKind::Claim(ClaimEventKind::HydrateClaimMapFail)])
        .await
    else {
        unreachable!();
    };
    assert_eq!(error.code, "CS-002");
    harness.settle().await;
    assert!(harness.orchestrator.claim_map().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_received_claim_is_mapped_to_its_sender() {
    let mut harness = Harness::new();
    harness.ready_with_connection().await;
    harness.unlock_on_home();
    harness.orchestrator.track_claim_offer(
        FOR_DID.to_string(),
        "offer-1".to_string(),
        r#"{"offer":"serialized"}"#.to_string(),
    );

    harness.notify(common::notification("claim", "claim-msg-1"));
    let Event::Claim(ClaimEvent::ClaimStorageSuccess { message_id }) = harness
        .next(&[
            EventKind::Claim(ClaimEventKind::ClaimStorageSuccess),
            EventKind::Claim(ClaimEventKind::ClaimStorageFail),
        ])
        .await
    else {
        panic!("claim not stored");
    };
    assert_eq!(message_id, "offer-1");
    harness.settle().await;

    let map = harness.orchestrator.claim_map();
    assert_eq!(map.len(), 1);
    let entry = map.values().next().expect("entry");
    assert_eq!(entry.sender_did, SENDER_DID);
    assert_eq!(entry.my_pairwise_did, FOR_DID);

    let persisted = harness
        .storage
        .secure
        .peek(keys::CLAIM_MAP)
        .expect("claim map persisted");
    let persisted: BTreeMap<String, ClaimMapEntry> =
        serde_json::from_str(&persisted).expect("claim map json");
    assert_eq!(persisted.len(), 1);

    // The offer is not checked again once accepted.
    let checks = harness.bridge.call_count(ops::UPDATE_CLAIM_OFFER_STATE);
    harness.notify(common::notification("claim", "claim-msg-2"));
    harness.settle().await;
    assert_eq!(harness.bridge.call_count(ops::UPDATE_CLAIM_OFFER_STATE), checks);
}

#[tokio::test(start_paused = true)]
async fn test_claim_checks_every_pending_offer() {
    let mut harness = Harness::new();
    harness.ready_with_connection().await;
    harness.unlock_on_home();
    harness.engine().publish(ClaimEvent::SerializedClaimOfferUpdated {
        for_did: FOR_DID.to_string(),
        offer: SerializedClaimOffer {
            message_id: "offer-accepted".to_string(),
            serialized: r#"{"offer":"accepted"}"#.to_string(),
            state: ClaimOfferState::Accepted,
        },
    });
    for message_id in ["offer-a", "offer-b"] {
        harness.orchestrator.track_claim_offer(
            FOR_DID.to_string(),
            message_id.to_string(),
            format!(r#"{{"offer":"{message_id}"}}"#),
        );
    }
    // Whichever check reaches the bridge first fails.
    harness.bridge.fail_next(ops::GET_CLAIM_HANDLE, 1);

    harness.notify(common::notification("claim", "claim-msg-1"));
    let outcomes = harness
        .drain(&[
            EventKind::Claim(ClaimEventKind::ClaimStorageSuccess),
            EventKind::Claim(ClaimEventKind::ClaimStorageFail),
        ])
        .await;

    let mut stored = Vec::new();
    let mut failed = Vec::new();
    for event in outcomes {
        match event {
            Event::Claim(ClaimEvent::ClaimStorageSuccess { message_id }) => stored.push(message_id),
            Event::Claim(ClaimEvent::ClaimStorageFail { message_id, error }) => {
                assert_eq!(error.code, "CS-001");
                failed.push(message_id);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(stored.len(), 1);
    assert_eq!(failed.len(), 1);
    assert_ne!(stored[0], failed[0]);
    assert!(!stored.contains(&"offer-accepted".to_string()));
    assert!(!failed.contains(&"offer-accepted".to_string()));

    assert_eq!(harness.bridge.call_count(ops::GET_CLAIM_HANDLE), 2);
    assert_eq!(harness.bridge.call_count(ops::UPDATE_CLAIM_OFFER_STATE), 1);
    assert_eq!(harness.orchestrator.claim_map().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_claim_map_keeps_first_sender() {
    let mut harness = Harness::new();
    let entry = |sender: &str| ClaimMapEntry {
        sender_did: sender.to_string(),
        my_pairwise_did: FOR_DID.to_string(),
        logo_url: None,
    };
    harness.engine().publish(ClaimEvent::MapClaimToSender {
        claim_uuid: "claim-1".to_string(),
        entry: entry("first"),
    });
    harness.engine().publish(ClaimEvent::MapClaimToSender {
        claim_uuid: "claim-1".to_string(),
        entry: entry("second"),
    });
    harness.settle().await;

    assert_eq!(harness.orchestrator.claim_map()["claim-1"].sender_did, "first");
    let persisted: BTreeMap<String, ClaimMapEntry> = serde_json::from_str(
        &harness
            .storage
            .secure
            .peek(keys::CLAIM_MAP)
            .expect("claim map persisted"),
    )
    .expect("claim map json");
    assert_eq!(persisted["claim-1"].sender_did, "first");
    assert!(harness
        .drain_now(&[EventKind::Claim(ClaimEventKind::ClaimMapPersistFail)])
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connection_lifecycle_is_persisted() {
    let mut harness = Harness::new();
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.accept_invitation(
        serde_json::json!({
            "senderDid": "acme-did",
            "senderName": "Acme",
            "logoUrl": null,
        })
        .to_string(),
    );
    let Event::Connection(ConnectionEvent::NewConnectionSuccess(accepted)) = harness
        .next(&[EventKind::Connection(ConnectionEventKind::NewConnectionSuccess)])
        .await
    else {
        unreachable!();
    };
    assert_eq!(accepted.sender_name, "Acme");

    let secure = harness.storage.secure.clone();
    let persisted = || -> BTreeMap<String, Connection> {
        serde_json::from_str(
            &secure
                .peek(keys::CONNECTIONS)
                .expect("connections persisted"),
        )
        .expect("connections json")
    };
    assert!(persisted().contains_key(&accepted.identifier));

    harness.orchestrator.delete_connection("acme-did".to_string());
    let Event::Connection(ConnectionEvent::DeleteConnectionSuccess { identifier }) = harness
        .next(&[
            EventKind::Connection(ConnectionEventKind::DeleteConnectionSuccess),
            EventKind::Connection(ConnectionEventKind::DeleteConnectionFail),
        ])
        .await
    else {
        panic!("connection not deleted");
    };
    assert_eq!(identifier, accepted.identifier);
    assert_eq!(harness.bridge.call_count(ops::DELETE_CONNECTION), 1);
    assert!(persisted().is_empty());
    assert!(harness.orchestrator.connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deleting_unknown_connection_fails() {
    let mut harness = Harness::new();
    harness.orchestrator.delete_connection("nobody".to_string());
    let Event::Connection(ConnectionEvent::DeleteConnectionFail(error)) = harness
        .next(&[EventKind::Connection(ConnectionEventKind::DeleteConnectionFail)])
        .await
    else {
        unreachable!();
    };
    assert_eq!(error.code, "CN-002");
}

fn out_of_band_request(uid: &str) -> CorrelationEvent {
    CorrelationEvent::ProofRequestReceived {
        request: AppProofRequest {
            name: "Age check".to_string(),
            version: "1.0".to_string(),
            requested_attributes: Vec::new(),
            requester_name: "Verifier".to_string(),
            proof_handle: Some(3),
            ephemeral: false,
            out_of_band: true,
        },
        meta: MessageMeta {
            uid: uid.to_string(),
            for_did: FOR_DID.to_string(),
            remote_pairwise_did: SENDER_DID.to_string(),
            sender_name: None,
            sender_logo_url: None,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn test_ignored_out_of_band_request_is_deleted_later() {
    let mut harness = Harness::new();
    harness.engine().publish(out_of_band_request("oob-1"));
    harness.orchestrator.message_ignored("oob-1".to_string());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(harness.orchestrator.correlation("oob-1").is_some());

    harness
        .next(&[EventKind::Correlation(CorrelationEventKind::Deleted)])
        .await;
    assert!(harness.orchestrator.correlation("oob-1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_pending_fetch_keys() {
    let mut harness = Harness::new();
    harness.ready_with_connection().await;
    harness.notify(common::notification("claimOffer", "offer-1"));
    harness.settle().await;
    assert_eq!(
        harness
            .engine()
            .store()
            .select(|s| s.push.pending_fetch_keys.len()),
        1
    );

    harness.orchestrator.reset();
    assert!(harness
        .engine()
        .store()
        .select(|s| s.push.pending_fetch_keys.is_empty()));
    assert!(harness
        .drain_now(&[EventKind::Push(PushEventKind::UnacknowledgedMessagesFail)])
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_accepted_out_of_band_request_is_kept() {
    let mut harness = Harness::new();
    harness.engine().publish(out_of_band_request("oob-2"));
    harness.orchestrator.message_accepted("oob-2".to_string());
    harness.orchestrator.message_ignored("oob-2".to_string());

    tokio::time::sleep(Duration::from_secs(30)).await;
    harness.settle().await;

    let record = harness.orchestrator.correlation("oob-2").expect("record kept");
    assert_eq!(record.status, CorrelationStatus::Accepted);
    assert!(harness
        .drain_now(&[EventKind::Correlation(CorrelationEventKind::Deleted)])
        .is_empty());
}
