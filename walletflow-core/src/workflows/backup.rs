//! Recovery phrase, local backup archive, export and the small persistence
//! workflows around them.

use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::bridge::{ops, EncryptWalletRequest, ShareOutcome, ShareRequest};
use crate::config::Platform;
use crate::engine::{
    race, retry, Winner, Workflow, WorkflowContext, WorkflowError, WorkflowKind, WorkflowResult,
};
use crate::error::{
    ERROR_EXPORT_BACKUP, ERROR_GENERATE_BACKUP_FILE, ERROR_GENERATE_RECOVERY_PHRASE,
    ERROR_PERSIST_BACKUP, ERROR_PREPARE_BACKUP,
};
use crate::event::{BackupEvent, BackupEventKind, Event};
use crate::state::backup::{BackupArea, BackupFailure, PassphraseRecord};
use crate::state::selectors;
use crate::storage::{flag_value, keys};

use super::{file_timestamp, now_rfc3339};

/// Base name of exported wallet files and archives.
pub const WALLET_FILE_NAME: &str = "walletflow-backup";

const SALT_FILE_NAME: &str = "salt.json";
const ZIP_MIME_TYPE: &str = "application/zip";
const SALT_BYTES: usize = 32;

/// Reads the persisted passphrase and salt, or generates a fresh pair.
///
/// A generated pair is not persisted here.
pub(crate) async fn read_or_generate_passphrase(
    ctx: &WorkflowContext,
) -> WorkflowResult<(String, String)> {
    let secure = ctx.secure();
    let phrase = secure.get(keys::PASSPHRASE.to_string()).await?;
    let salt = secure.get(keys::PASSPHRASE_SALT.to_string()).await?;
    if let (Some(phrase), Some(salt)) = (phrase, salt) {
        return Ok((phrase, salt));
    }

    tracing::debug!("no persisted passphrase, generating one");
    let config = ctx.config();
    let words = ctx
        .call_bridge(
            ops::GET_WORDS,
            ctx.bridge().get_words(
                config.passphrase_word_count,
                config.passphrase_min_word_length,
            ),
        )
        .await?;
    Ok((words.join(" "), generate_salt()))
}

fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hashes `phrase` with `salt` through the bridge.
pub(crate) async fn hash_passphrase(
    ctx: &WorkflowContext,
    phrase: String,
    salt: String,
) -> WorkflowResult<PassphraseRecord> {
    let hash = ctx
        .call_bridge(
            ops::PIN_HASH,
            ctx.bridge().pin_hash(phrase.clone(), salt.clone()),
        )
        .await?;
    Ok(PassphraseRecord { phrase, salt, hash })
}

async fn generate_and_persist(ctx: &WorkflowContext) -> WorkflowResult<PassphraseRecord> {
    let (phrase, salt) = read_or_generate_passphrase(ctx).await?;
    let record = hash_passphrase(ctx, phrase, salt).await?;
    let secure = ctx.secure();
    secure
        .set(keys::PASSPHRASE.to_string(), record.phrase.clone())
        .await?;
    secure
        .set(keys::PASSPHRASE_SALT.to_string(), record.salt.clone())
        .await?;
    Ok(record)
}

/// Produces the recovery phrase and then starts the local backup.
#[derive(Debug)]
pub struct GenerateRecoveryPhrase;

#[async_trait::async_trait]
impl Workflow for GenerateRecoveryPhrase {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::GenerateRecoveryPhrase
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.ensure_bridge_ready().await?;
        let attempts = ctx.config().recovery_phrase_attempts;
        let record = retry(attempts, || generate_and_persist(ctx)).await?;

        ctx.publish(BackupEvent::GenerateRecoveryPhraseSuccess(record));
        ctx.publish(BackupEvent::GenerateBackupFileLoading);
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(
            BackupEvent::GenerateRecoveryPhraseFailure(
                error.to_info(ERROR_GENERATE_RECOVERY_PHRASE),
            )
            .into(),
        )
    }
}

/// Copies secure storage into the wallet so it is part of the backup.
#[derive(Debug)]
pub struct PrepareBackup;

#[async_trait::async_trait]
impl Workflow for PrepareBackup {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::PrepareBackup
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let mut entries = ctx.secure().get_all().await?;
        entries.retain(|key, _| !keys::is_excluded_from_backup(key));
        tracing::debug!(entries = entries.len(), "copying secure storage into the wallet");
        ctx.wallet().set_many(entries).await?;
        ctx.publish(BackupEvent::PrepareBackupSuccess);
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(BackupEvent::PrepareBackupFailure(error.to_info(ERROR_PREPARE_BACKUP)).into())
    }
}

/// Builds the local backup archive.
///
/// The staging directory is not cleaned up on failure; the next run removes
/// it before starting.
#[derive(Debug)]
pub struct LocalBackup;

#[async_trait::async_trait]
impl Workflow for LocalBackup {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::LocalBackup
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let passphrase = ctx
            .select(selectors::passphrase)
            .ok_or(WorkflowError::MissingField {
                field: "recovery passphrase",
            })?;

        let prepared = ctx.await_any(&[
            BackupEventKind::PrepareBackupSuccess.into(),
            BackupEventKind::PrepareBackupFailure.into(),
        ]);
        ctx.publish(BackupEvent::PrepareBackupLoading);

        let timestamp = file_timestamp();
        let documents = PathBuf::from(ctx.documents_dir());
        let staging = documents.join(format!("Backup-{timestamp}"));
        recreate_dir(&staging).await?;
        write_salt_manifest(&staging, &passphrase.salt).await?;

        match race(prepared, ctx.timer(ctx.config().local_flush_timeout())).await {
            Winner::First(event) => {
                if let Event::Backup(BackupEvent::PrepareBackupFailure(_)) = event? {
                    return Err(WorkflowError::Stage {
                        stage: "prepare",
                        message: "Failed to write data back to wallet".to_string(),
                    });
                }
            }
            Winner::Second(()) => {
                return Err(WorkflowError::Timeout {
                    stage: "prepare",
                    message: "Could not write data back to wallet in 2 minutes",
                })
            }
        }

        let wallet_file = staging.join(format!("{WALLET_FILE_NAME}.wallet"));
        ctx.call_bridge(
            ops::ENCRYPT_WALLET,
            ctx.bridge().encrypt_wallet(EncryptWalletRequest {
                location: wallet_file.display().to_string(),
                passphrase: passphrase.hash.clone(),
            }),
        )
        .await?;

        let archive = documents.join(format!("{WALLET_FILE_NAME}-{timestamp}.zip"));
        archive_dir(staging, archive.clone()).await?;
        tracing::info!(archive = %archive.display(), "backup archive written");

        ctx.publish(BackupEvent::GenerateBackupFileSuccess {
            archive_path: archive.display().to_string(),
        });
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(
            BackupEvent::GenerateBackupFileFailure(ERROR_GENERATE_BACKUP_FILE.with_detail(error))
                .into(),
        )
    }
}

async fn recreate_dir(dir: &Path) -> WorkflowResult<()> {
    let exists = tokio::fs::try_exists(dir)
        .await
        .map_err(|e| WorkflowError::io(format!("checking {}", dir.display()), e))?;
    if exists {
        tracing::debug!(dir = %dir.display(), "removing stale backup directory");
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| WorkflowError::io(format!("removing {}", dir.display()), e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WorkflowError::io(format!("creating {}", dir.display()), e))
}

async fn write_salt_manifest(dir: &Path, salt: &str) -> WorkflowResult<()> {
    let manifest = serde_json::to_vec(&serde_json::json!({ "salt": salt }))?;
    let path = dir.join(SALT_FILE_NAME);
    tokio::fs::write(&path, manifest)
        .await
        .map_err(|e| WorkflowError::io(format!("writing {}", path.display()), e))
}

async fn archive_dir(source: PathBuf, destination: PathBuf) -> WorkflowResult<()> {
    let context = format!("archiving {}", source.display());
    tokio::task::spawn_blocking(move || zip_dir(&source, &destination))
        .await
        .map_err(|e| WorkflowError::io(context.clone(), std::io::Error::other(e)))?
        .map_err(|e| WorkflowError::io(context, std::io::Error::other(e)))
}

/// Writes every regular file directly under `source` into a zip at `destination`.
fn zip_dir(source: &Path, destination: &Path) -> zip::result::ZipResult<()> {
    let mut entries = std::fs::read_dir(source)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut writer = zip::ZipWriter::new(std::fs::File::create(destination)?);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        writer.start_file(entry.file_name().to_string_lossy(), options)?;
        let mut file = std::fs::File::open(entry.path())?;
        std::io::copy(&mut file, &mut writer)?;
    }
    writer.finish()?;
    Ok(())
}

/// Hands the archive to the platform share sheet.
#[derive(Debug)]
pub struct ExportBackup;

#[async_trait::async_trait]
impl Workflow for ExportBackup {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ExportBackup
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let path = ctx
            .select(selectors::backup_path)
            .ok_or(WorkflowError::MissingField {
                field: "backup archive path",
            })?;
        let file_name = Path::new(&path)
            .file_name()
            .map_or_else(|| path.clone(), |name| name.to_string_lossy().into_owned());
        let url = match ctx.config().platform {
            Platform::Android => format!("file://{path}"),
            Platform::Ios => path.clone(),
        };

        let outcome = ctx
            .share_sheet()
            .share(ShareRequest {
                title: format!("Export {file_name}"),
                url,
                mime_type: ZIP_MIME_TYPE.to_string(),
            })
            .await
            .map_err(|source| WorkflowError::Bridge {
                operation: "share",
                source,
            })?;

        match outcome {
            ShareOutcome::Shared => {
                let timestamp = now_rfc3339();
                ctx.publish(BackupEvent::ExportBackupSuccess {
                    timestamp: timestamp.clone(),
                });
                ctx.publish(BackupEvent::PromptBackupBanner(false));
                ctx.safe()
                    .set(keys::LAST_SUCCESSFUL_BACKUP.to_string(), timestamp)
                    .await?;
            }
            ShareOutcome::Dismissed => {
                tracing::debug!("share sheet dismissed");
                ctx.publish(BackupEvent::ExportBackupNoShare);
            }
        }
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(BackupEvent::ExportBackupFailure(error.to_info(ERROR_EXPORT_BACKUP)).into())
    }
}

/// Persists the backup banner flag.
#[derive(Debug)]
pub struct PersistBanner(pub bool);

#[async_trait::async_trait]
impl Workflow for PersistBanner {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::PersistBanner
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        ctx.safe()
            .set(keys::SHOW_BANNER.to_string(), flag_value(self.0).to_string())
            .await?;
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(persist_failure(BackupArea::BackupBanner, error))
    }
}

/// Copies the passphrase and salt from the wallet back into secure storage.
#[derive(Debug)]
pub struct RestorePassphrase;

#[async_trait::async_trait]
impl Workflow for RestorePassphrase {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::RestorePassphrase
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let wallet = ctx.wallet();
        let secure = ctx.secure();
        for key in [keys::PASSPHRASE, keys::PASSPHRASE_SALT] {
            let value = wallet
                .get(key.to_string())
                .await?
                .ok_or(WorkflowError::NotFound {
                    entity: "wallet entry",
                    key: key.to_string(),
                })?;
            secure.set(key.to_string(), value).await?;
        }
        ctx.publish(BackupEvent::PassphraseRestored);
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(persist_failure(BackupArea::Passphrase, error))
    }
}

/// Removes the passphrase and salt from secure storage.
#[derive(Debug)]
pub struct ClearPassphrase;

#[async_trait::async_trait]
impl Workflow for ClearPassphrase {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ClearPassphrase
    }

    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()> {
        let secure = ctx.secure();
        secure.delete(keys::PASSPHRASE.to_string()).await?;
        secure.delete(keys::PASSPHRASE_SALT.to_string()).await?;
        ctx.publish(BackupEvent::PassphraseCleared);
        Ok(())
    }

    fn failure_event(&self, error: &WorkflowError) -> Option<Event> {
        Some(persist_failure(BackupArea::Passphrase, error))
    }
}

fn persist_failure(area: BackupArea, error: &WorkflowError) -> Event {
    BackupEvent::PersistBackupFailure(BackupFailure {
        area,
        error: ERROR_PERSIST_BACKUP.with_detail(error),
    })
    .into()
}
