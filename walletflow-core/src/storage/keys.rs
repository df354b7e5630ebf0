//! Keys persisted by the workflows.

/// Device identifier generated on first push-token registration.
pub const DEVICE_ID: &str = "__uniqueId";
/// Key used to open the wallet.
pub const WALLET_KEY: &str = "WALLET_KEY";
/// Recovery passphrase.
pub const PASSPHRASE: &str = "PASSPHRASE";
/// Salt the recovery passphrase is hashed with.
pub const PASSPHRASE_SALT: &str = "PASSPHRASE_SALT";
/// Timestamp of the last exported local backup.
pub const LAST_SUCCESSFUL_BACKUP: &str = "LAST_SUCCESSFUL_BACKUP";
/// Timestamp of the last completed cloud backup.
pub const LAST_SUCCESSFUL_CLOUD_BACKUP: &str = "LAST_SUCCESSFUL_CLOUD_BACKUP";
/// Whether cloud backups run automatically.
pub const AUTO_CLOUD_BACKUP_ENABLED: &str = "AUTO_CLOUD_BACKUP_ENABLED";
/// Whether the user verified their recovery phrase.
pub const HAS_VERIFIED_RECOVERY_PHRASE: &str = "HAS_VERIFIED_RECOVERY_PHRASE";
/// Set when the agency reported a failed cloud backup.
pub const WALLET_BACKUP_FAILURE: &str = "WALLET_BACKUP_FAILURE";
/// Whether the backup banner is shown.
pub const SHOW_BANNER: &str = "showBanner";
/// Claim UUID to sender mapping.
pub const CLAIM_MAP: &str = "CLAIM_MAP";
/// Persisted connections keyed by identifier.
pub const CONNECTIONS: &str = "CONNECTIONS";
/// Registered push communication method.
pub const PUSH_COM_METHOD: &str = "PUSH_COM_METHOD";

/// Secure-storage keys that are never copied into the wallet before a backup.
///
/// Restoring any of these from a backup would overwrite device-bound state
/// with the state of the device that produced the backup.
pub const BACKUP_EXCLUDED_KEYS: [&str; 4] = [
    DEVICE_ID,
    WALLET_KEY,
    HAS_VERIFIED_RECOVERY_PHRASE,
    AUTO_CLOUD_BACKUP_ENABLED,
];

/// Returns `true` when `key` must not be copied into the wallet.
#[must_use]
pub fn is_excluded_from_backup(key: &str) -> bool {
    BACKUP_EXCLUDED_KEYS.contains(&key)
}
