//! Developer CLI running walletflow workflows against in-memory collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{bail, eyre, WrapErr};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;
use walletflow_core::bridge::{ops, MemoryBridge, RecordingShareSheet, ShareOutcome};
use walletflow_core::config::FlowConfig;
use walletflow_core::engine::Collaborators;
use walletflow_core::event::{
    BackupEvent, BackupEventKind, ConnectionEventKind, Event, EventKind, PushEventKind,
};
use walletflow_core::payload::{NotificationOpenOptions, NotificationPayload};
use walletflow_core::state::connections::Connection;
use walletflow_core::storage::{KeyValueStore, MemoryStorageProvider};
use walletflow_core::WalletOrchestrator;

const DEMO_FOR_DID: &str = "pairwise-demo";
const DEMO_SENDER_DID: &str = "sender-demo";
const CLOUD_AGENT_DID: &str = "cloud-agent";

#[derive(Parser, Debug)]
#[command(
    name = "walletflow",
    version,
    about = "Runs wallet workflows against an in-memory bridge and storage"
)]
struct Cli {
    /// Flow configuration as JSON; missing fields take their defaults
    #[arg(long, env = "WALLETFLOW_CONFIG")]
    config: Option<String>,

    /// Directory backup archives are written to
    #[arg(long, env = "WALLETFLOW_DOCUMENTS_DIR")]
    documents_dir: Option<PathBuf>,

    /// Minimum seconds to wait for a flow to finish
    #[arg(long, default_value_t = 30)]
    wait_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a recovery phrase and build the local backup archive
    Backup {
        /// Hand the archive to the share sheet afterwards
        #[arg(long)]
        export: bool,

        /// Make the share sheet report that the user dismissed it
        #[arg(long, requires = "export")]
        dismiss: bool,
    },
    /// Run a cloud backup, answering for the agency
    CloudBackup {
        /// Never answer the wallet backup request, so the stage times out
        #[arg(long)]
        stall: bool,

        /// Overrides the per-stage timeout
        #[arg(long)]
        stage_timeout_ms: Option<u64>,
    },
    /// Deliver a claim offer notification from a demo connection
    Notify {
        /// Keep the app locked so the redirect is deferred
        #[arg(long)]
        locked: bool,

        /// Treat the notification as opened from the notification centre
        #[arg(long)]
        open: bool,
    },
    /// Seed safe storage with KEY=VALUE entries and hydrate from it
    Hydrate {
        #[arg(value_name = "KEY=VALUE", value_parser = parse_entry)]
        entries: Vec<(String, String)>,
    },
}

fn parse_entry(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}

/// One orchestrator plus handles on its in-memory collaborators.
struct Session {
    orchestrator: WalletOrchestrator,
    bridge: Arc<MemoryBridge>,
    storage: Arc<MemoryStorageProvider>,
    events: broadcast::Receiver<Event>,
    wait: Duration,
}

impl Session {
    fn start(
        config: FlowConfig,
        documents_dir: &Path,
        share_outcome: ShareOutcome,
        wait: Duration,
    ) -> Self {
        let bridge = Arc::new(MemoryBridge::new());
        let storage = Arc::new(MemoryStorageProvider::new(
            documents_dir.to_string_lossy().into_owned(),
        ));
        let orchestrator = WalletOrchestrator::start(
            Collaborators {
                bridge: bridge.clone(),
                storage: storage.clone(),
                share_sheet: Arc::new(RecordingShareSheet::new(share_outcome)),
            },
            config,
        );
        let events = orchestrator.engine().subscribe();
        Self {
            orchestrator,
            bridge,
            storage,
            events,
            wait,
        }
    }

    /// Waits for the next event of one of `kinds`.
    async fn wait_for(&mut self, kinds: &[EventKind]) -> eyre::Result<Event> {
        let events = &mut self.events;
        let next = async {
            loop {
                match events.recv().await {
                    Ok(event) if kinds.contains(&event.kind()) => return Ok(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event receiver lagged");
                    }
                    Err(RecvError::Closed) => bail!("event bus closed"),
                }
            }
        };
        tokio::time::timeout(self.wait, next)
            .await
            .map_err(|_| eyre!("timed out waiting for one of {kinds:?}"))?
    }

    /// Waits until no workflow instance is running.
    async fn settle(&self) -> eyre::Result<()> {
        let registry = self.orchestrator.engine().registry();
        let idle = async {
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if registry.instances().is_empty() {
                    break;
                }
            }
        };
        tokio::time::timeout(self.wait, idle)
            .await
            .wrap_err("workflows did not settle")
    }

    fn print_state(&self) -> eyre::Result<()> {
        println!("{}", self.orchestrator.state_json()?);
        Ok(())
    }
}

async fn backup(session: &mut Session, export: bool) -> eyre::Result<()> {
    session.orchestrator.bridge_initialized();
    session.orchestrator.generate_recovery_phrase();

    let done = session
        .wait_for(&[
            EventKind::Backup(BackupEventKind::GenerateBackupFileSuccess),
            EventKind::Backup(BackupEventKind::GenerateBackupFileFailure),
            EventKind::Backup(BackupEventKind::GenerateRecoveryPhraseFailure),
        ])
        .await?;
    match done {
        Event::Backup(BackupEvent::GenerateBackupFileSuccess { archive_path }) => {
            let phrase = session.orchestrator.recovery_phrase().unwrap_or_default();
            println!("recovery phrase: {phrase}");
            println!("archive: {archive_path}");
        }
        Event::Backup(
            BackupEvent::GenerateBackupFileFailure(error)
            | BackupEvent::GenerateRecoveryPhraseFailure(error),
        ) => bail!("backup failed: {error}"),
        other => bail!("unexpected event {other:?}"),
    }

    if export {
        session.orchestrator.export_backup();
        match session
            .wait_for(&[
                EventKind::Backup(BackupEventKind::ExportBackupSuccess),
                EventKind::Backup(BackupEventKind::ExportBackupNoShare),
                EventKind::Backup(BackupEventKind::ExportBackupFailure),
            ])
            .await?
        {
            Event::Backup(BackupEvent::ExportBackupSuccess { timestamp }) => {
                println!("exported at {timestamp}");
            }
            Event::Backup(BackupEvent::ExportBackupFailure(error)) => {
                bail!("export failed: {error}")
            }
            _ => println!("export dismissed"),
        }
    }
    Ok(())
}

fn backup_notification(message_type: &str, uid: &str) -> NotificationPayload {
    NotificationPayload {
        for_did: Some(CLOUD_AGENT_DID.to_string()),
        uid: Some(uid.to_string()),
        message_type: message_type.to_string(),
        ..NotificationPayload::default()
    }
}

async fn cloud_backup(session: &mut Session, stall: bool) -> eyre::Result<()> {
    if stall {
        session.bridge.stall(ops::CREATE_WALLET_BACKUP);
    }
    session.orchestrator.bridge_initialized();
    session.orchestrator.start_cloud_backup();

    let failure = EventKind::Backup(BackupEventKind::CloudBackupFailure);
    let mut next = session
        .wait_for(&[EventKind::Backup(BackupEventKind::SetWalletHandle), failure])
        .await?;

    if let Event::Backup(BackupEvent::SetWalletHandle(handle)) = next {
        tracing::info!(handle, "wallet backup created, answering as the agency");
        session.orchestrator.push_notification_received(
            backup_notification("WALLET_BACKUP_READY", "backup-ready"),
            NotificationOpenOptions::default(),
        );
        next = session
            .wait_for(&[EventKind::Backup(BackupEventKind::CloudBackupUploading), failure])
            .await?;
    }
    if matches!(next, Event::Backup(BackupEvent::CloudBackupUploading)) {
        session.orchestrator.push_notification_received(
            backup_notification("WALLET_BACKUP_ACK", "backup-ack"),
            NotificationOpenOptions::default(),
        );
        next = session
            .wait_for(&[EventKind::Backup(BackupEventKind::CloudBackupComplete), failure])
            .await?;
    }

    match next {
        Event::Backup(BackupEvent::CloudBackupComplete { timestamp }) => {
            println!("cloud backup complete at {timestamp}");
        }
        Event::Backup(BackupEvent::CloudBackupFailure(error)) => {
            println!("cloud backup failed: {error}");
        }
        other => bail!("unexpected event {other:?}"),
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&session.orchestrator.cloud_backup_session())?
    );
    Ok(())
}

fn demo_pending_messages(uid: &str) -> eyre::Result<String> {
    let offer = serde_json::json!({
        "claim": { "name": ["Alice"], "degree": ["Bachelor of Science"] },
        "claim_name": "Diploma",
        "version": "1.0",
        "issuer_did": DEMO_SENDER_DID,
        "issuer_name": "Demo University",
    });
    let decrypted = serde_json::json!({
        "@type": { "name": "CRED_OFFER" },
        "@msg": offer.to_string(),
    });
    let downloaded = serde_json::json!([{
        "pairwiseDID": DEMO_FOR_DID,
        "msgs": [{
            "uid": uid,
            "statusCode": "MS-103",
            "senderDID": DEMO_SENDER_DID,
            "decryptedPayload": decrypted.to_string(),
        }],
    }]);
    serde_json::to_string(&downloaded).wrap_err("encoding demo messages")
}

async fn notify(session: &mut Session, locked: bool, open: bool) -> eyre::Result<()> {
    const UID: &str = "demo-offer";

    session.orchestrator.bridge_initialized();
    session.orchestrator.save_connection(Connection {
        identifier: DEMO_FOR_DID.to_string(),
        sender_did: DEMO_SENDER_DID.to_string(),
        sender_name: "Demo University".to_string(),
        logo_url: None,
        vcx_serialized_connection: Some("{}".to_string()),
    });
    session
        .wait_for(&[EventKind::Connection(ConnectionEventKind::NewConnectionSuccess)])
        .await?;

    if !locked {
        session.orchestrator.unlock();
        session.orchestrator.screen_changed("Home".to_string());
    }
    session.bridge.set_pending_messages(demo_pending_messages(UID)?);
    session.orchestrator.push_notification_received(
        NotificationPayload {
            for_did: Some(DEMO_FOR_DID.to_string()),
            uid: Some(UID.to_string()),
            message_type: "claimOffer".to_string(),
            remote_pairwise_did: Some(DEMO_SENDER_DID.to_string()),
            ..NotificationPayload::default()
        },
        NotificationOpenOptions {
            open_message_directly: open,
        },
    );
    session
        .wait_for(&[
            EventKind::Push(PushEventKind::PushNotificationReceived),
            EventKind::Push(PushEventKind::UnacknowledgedMessagesFail),
        ])
        .await?;
    session.settle().await?;

    let orchestrator = &session.orchestrator;
    println!("correlations: {:#?}", orchestrator.correlations());
    println!("navigate to: {:#?}", orchestrator.take_navigation());
    println!("in-app notification: {:#?}", orchestrator.in_app_notification());
    println!("pending redirections: {:#?}", orchestrator.pending_redirections());
    Ok(())
}

async fn hydrate(session: &Session, entries: Vec<(String, String)>) -> eyre::Result<()> {
    for (key, value) in entries {
        session
            .storage
            .safe
            .set(key.clone(), value)
            .await
            .wrap_err_with(|| format!("seeding {key}"))?;
    }
    session.orchestrator.hydrate();
    session.settle().await?;
    session.print_state()
}

fn load_config(cli: &Cli) -> eyre::Result<FlowConfig> {
    let mut config = match &cli.config {
        Some(json) => FlowConfig::from_json(json)?,
        None => FlowConfig::default(),
    };
    if let Command::CloudBackup {
        stage_timeout_ms: Some(timeout),
        ..
    } = cli.command
    {
        config.stage_timeout_ms = timeout;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("walletflow_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let documents_dir = cli
        .documents_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("walletflow"));
    tokio::fs::create_dir_all(&documents_dir)
        .await
        .wrap_err_with(|| format!("creating {}", documents_dir.display()))?;

    let share_outcome = match cli.command {
        Command::Backup { dismiss: true, .. } => ShareOutcome::Dismissed,
        _ => ShareOutcome::Shared,
    };
    // Long enough for every stage to reach its own timeout first.
    let wait = Duration::from_secs(cli.wait_secs)
        .max(config.stage_timeout() * 4)
        .max(config.local_flush_timeout() * 2);
    let mut session = Session::start(config, &documents_dir, share_outcome, wait);

    match cli.command {
        Command::Backup { export, .. } => backup(&mut session, export).await,
        Command::CloudBackup { stall, .. } => cloud_backup(&mut session, stall).await,
        Command::Notify { locked, open } => notify(&mut session, locked, open).await,
        Command::Hydrate { entries } => hydrate(&session, entries).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(dir: &Path, config: FlowConfig) -> Session {
        Session::start(
            config,
            dir,
            ShareOutcome::Shared,
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_parse_hydrate_entries() {
        let cli = Cli::try_parse_from(["walletflow", "hydrate", "showBanner=true"]).unwrap();
        let Command::Hydrate { entries } = cli.command else {
            panic!("expected hydrate");
        };
        assert_eq!(entries, vec![("showBanner".to_string(), "true".to_string())]);
        assert!(Cli::try_parse_from(["walletflow", "hydrate", "showBanner"]).is_err());
    }

    #[test]
    fn test_stage_timeout_override() {
        let cli = Cli::try_parse_from([
            "walletflow",
            "--config",
            r#"{"platform":"android"}"#,
            "cloud-backup",
            "--stage-timeout-ms",
            "250",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.stage_timeout_ms, 250);
        assert_eq!(config.platform, walletflow_core::config::Platform::Android);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backup_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), FlowConfig::default());
        backup(&mut session, true).await.unwrap();

        let archive = session.orchestrator.backup_archive_path().unwrap();
        assert!(Path::new(&archive).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cloud_backup_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), FlowConfig::default());
        cloud_backup(&mut session, false).await.unwrap();

        assert!(session
            .storage
            .safe
            .peek(walletflow_core::storage::keys::LAST_SUCCESSFUL_CLOUD_BACKUP)
            .is_some());
    }
}
