//! Integration tests: cloud backup.
mod common;

use std::time::Duration;

use common::Harness;
use walletflow_core::bridge::ops;
use walletflow_core::event::{BackupEvent, BackupEventKind, Event, EventKind};
use walletflow_core::state::backup::CloudBackupStatus;
use walletflow_core::storage::keys;

const FINISHED: [EventKind; 2] = [
    EventKind::Backup(BackupEventKind::CloudBackupComplete),
    EventKind::Backup(BackupEventKind::CloudBackupFailure),
];

fn failure_message(event: Event) -> String {
    match event {
        Event::Backup(BackupEvent::CloudBackupFailure(error)) => {
            assert_eq!(error.code, "WB-006");
            error.message
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_session_reaches_complete() {
    let mut harness = Harness::new();
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();

    let Event::Backup(BackupEvent::SetWalletHandle(handle)) = harness
        .next(&[EventKind::Backup(BackupEventKind::SetWalletHandle)])
        .await
    else {
        unreachable!();
    };
    assert_eq!(
        harness.orchestrator.cloud_backup_session().wallet_handle,
        Some(handle)
    );

    harness.notify(common::notification("WALLET_BACKUP_READY", "ready-1"));
    harness
        .next(&[EventKind::Backup(BackupEventKind::CloudBackupUploading)])
        .await;
    assert_eq!(harness.bridge.call_count(ops::BACKUP_WALLET_BACKUP), 1);

    harness.notify(common::notification("WALLET_BACKUP_ACK", "ack-1"));
    let event = harness.next(&FINISHED).await;
    assert!(matches!(
        event,
        Event::Backup(BackupEvent::CloudBackupComplete { .. })
    ));
    harness.settle().await;

    let session = harness.orchestrator.cloud_backup_session();
    assert_eq!(session.status, CloudBackupStatus::Complete);
    assert!(session.last_successful_cloud_backup.is_some());
    assert!(harness
        .storage
        .safe
        .peek(keys::LAST_SUCCESSFUL_CLOUD_BACKUP)
        .is_some());
    assert_eq!(harness.bridge.call_count(ops::UPDATE_WALLET_BACKUP_STATE), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_handle_creation_times_out() {
    let mut harness = Harness::new();
    harness.bridge.stall(ops::CREATE_WALLET_BACKUP);
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();

    let message = failure_message(harness.next(&FINISHED).await);
    assert!(message.contains("Could not download wallet in one minute"));
    assert_eq!(
        harness.orchestrator.cloud_backup_session().status,
        CloudBackupStatus::Failed
    );

    // A handle released after the timeout does not resume the session.
    harness.bridge.release(ops::CREATE_WALLET_BACKUP);
    harness.settle().await;
    let session = harness.orchestrator.cloud_backup_session();
    assert_eq!(session.status, CloudBackupStatus::Failed);
    assert_eq!(session.wallet_handle, None);
}

#[tokio::test(start_paused = true)]
async fn test_missing_acknowledgement_times_out() {
    let mut harness = Harness::new();
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();

    let message = failure_message(harness.next(&FINISHED).await);
    assert!(message.contains("Could not receive wallet backup acknowledgement in one minute"));
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_ignored() {
    let mut harness = Harness::new();
    harness.bridge.stall(ops::CREATE_WALLET_BACKUP);
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();
    harness.orchestrator.start_automatic_cloud_backup();

    harness.next(&FINISHED).await;
    harness.settle().await;
    assert_eq!(harness.bridge.call_count(ops::CREATE_WALLET_BACKUP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_failure_goes_through_idle() {
    let mut harness = Harness::new();
    harness.bridge.fail_next(ops::CREATE_WALLET_BACKUP, 1);
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();
    failure_message(harness.next(&FINISHED).await);
    harness.settle().await;

    harness.orchestrator.reset_cloud_backup_status();
    harness.orchestrator.start_cloud_backup();
    harness
        .next(&[EventKind::Backup(BackupEventKind::SetWalletHandle)])
        .await;
    assert_eq!(
        harness.orchestrator.cloud_backup_session().status,
        CloudBackupStatus::AwaitingAck
    );
}

#[tokio::test(start_paused = true)]
async fn test_agency_failure_disables_automatic_backups() {
    let mut harness = Harness::new();
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.set_auto_cloud_backup_enabled(true);
    harness.notify(common::notification("WALLET_BACKUP_FAILURE", "failure-1"));

    let message = failure_message(harness.next(&FINISHED).await);
    assert!(message.contains("WALLET_BACKUP_FAILURE"));
    harness.settle().await;

    let safe = &harness.storage.safe;
    assert_eq!(safe.peek(keys::AUTO_CLOUD_BACKUP_ENABLED).as_deref(), Some("false"));
    assert_eq!(safe.peek(keys::WALLET_BACKUP_FAILURE).as_deref(), Some("true"));
    assert_eq!(
        harness.storage.wallet.peek(keys::AUTO_CLOUD_BACKUP_ENABLED).as_deref(),
        Some("false")
    );
    // No session was running, so there is nothing to fail.
    assert_eq!(
        harness.orchestrator.cloud_backup_session().status,
        CloudBackupStatus::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn test_backup_ready_without_session_is_ignored() {
    let mut harness = Harness::new();
    harness.orchestrator.bridge_initialized();
    harness.notify(common::notification("WALLET_BACKUP_READY", "stray"));
    harness.settle().await;

    assert_eq!(harness.bridge.call_count(ops::BACKUP_WALLET_BACKUP), 0);
    assert_eq!(
        harness.orchestrator.cloud_backup_session().status,
        CloudBackupStatus::Idle
    );
    assert!(harness
        .drain(&[EventKind::Backup(BackupEventKind::CloudBackupUploading)])
        .await
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_backup_ready_uploads_once() {
    let mut harness = Harness::new();
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();
    harness
        .next(&[EventKind::Backup(BackupEventKind::SetWalletHandle)])
        .await;

    // Hold the first delivery inside its fetch while the second arrives.
    harness.bridge.stall(ops::VCX_GET_AGENT_MESSAGES);
    harness.notify(common::notification("WALLET_BACKUP_READY", "ready-1"));
    harness.notify(common::notification("WALLET_BACKUP_READY", "ready-1"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.bridge.release(ops::VCX_GET_AGENT_MESSAGES);

    harness
        .next(&[EventKind::Backup(BackupEventKind::CloudBackupUploading)])
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(harness.bridge.call_count(ops::VCX_GET_AGENT_MESSAGES), 1);
    assert_eq!(harness.bridge.call_count(ops::BACKUP_WALLET_BACKUP), 1);
    assert!(harness
        .drain_now(&[EventKind::Backup(BackupEventKind::CloudBackupUploading)])
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_prepare_times_out() {
    let mut harness = Harness::new();
    harness.storage.wallet.stall_writes();
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();

    let message = failure_message(harness.next(&FINISHED).await);
    assert!(message.contains("Could not write data back to wallet in one minute"));
    assert_eq!(harness.bridge.call_count(ops::CREATE_WALLET_BACKUP), 0);

    harness.storage.wallet.release_writes();
    harness.settle().await;
    assert_eq!(
        harness.orchestrator.cloud_backup_session().status,
        CloudBackupStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn test_prepare_failure_aborts_session() {
    let mut harness = Harness::new();
    harness.storage.wallet.set_fail_writes(true);
    harness.orchestrator.bridge_initialized();
    harness.orchestrator.start_cloud_backup();

    let message = failure_message(harness.next(&FINISHED).await);
    assert!(message.contains("Failed to write data back to wallet"));
    harness.settle().await;
    assert_eq!(harness.bridge.call_count(ops::CREATE_WALLET_BACKUP), 0);
    assert_eq!(
        harness.orchestrator.cloud_backup_session().status,
        CloudBackupStatus::Failed
    );
}
