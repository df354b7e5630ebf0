//! Runtime configuration for the orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WalletFlowError;

/// Host platform. Affects how files are handed to the share sheet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android; share URLs carry a `file://` prefix.
    Android,
    /// iOS; share URLs are plain paths.
    #[default]
    Ios,
}

/// Timeouts, retry bounds and sizing used by the workflows.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct FlowConfig {
    /// Host platform.
    pub platform: Platform,
    /// Timer for every cloud-backup race.
    pub stage_timeout_ms: u64,
    /// How long a local backup waits for secure storage to reach the wallet.
    pub local_flush_timeout_ms: u64,
    /// Attempts allowed for recovery phrase generation.
    pub recovery_phrase_attempts: u32,
    /// Words in a generated recovery phrase.
    pub passphrase_word_count: u32,
    /// Minimum length of every recovery phrase word.
    pub passphrase_min_word_length: u32,
    /// Delay after unlocking before a received message is published.
    pub redirect_settle_delay_ms: u64,
    /// Delay before an ignored out-of-band request is deleted.
    pub oob_deletion_delay_ms: u64,
    /// Event bus capacity.
    pub event_buffer: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            stage_timeout_ms: 60_000,
            local_flush_timeout_ms: 120_000,
            recovery_phrase_attempts: 4,
            passphrase_word_count: 8,
            passphrase_min_word_length: 5,
            redirect_settle_delay_ms: 600,
            oob_deletion_delay_ms: 5_000,
            event_buffer: 1024,
        }
    }
}

impl FlowConfig {
    /// Parses a config from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`WalletFlowError::InvalidConfig`] if the JSON is malformed or
    /// a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, WalletFlowError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WalletFlowError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), WalletFlowError> {
        if self.recovery_phrase_attempts == 0 {
            return Err(WalletFlowError::InvalidConfig(
                "recovery_phrase_attempts must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(WalletFlowError::InvalidConfig(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Timer for each cloud-backup stage.
    #[must_use]
    pub const fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    /// Timer for the local backup wallet flush.
    #[must_use]
    pub const fn local_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.local_flush_timeout_ms)
    }

    #[must_use]
    pub(crate) const fn redirect_settle_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_settle_delay_ms)
    }

    #[must_use]
    pub(crate) const fn oob_deletion_delay(&self) -> Duration {
        Duration::from_millis(self.oob_deletion_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = FlowConfig::from_json("{}").unwrap();
        assert_eq!(config, FlowConfig::default());
        assert_eq!(config.stage_timeout(), Duration::from_secs(60));
        assert_eq!(config.local_flush_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_override() {
        let config =
            FlowConfig::from_json(r#"{"platform":"android","stage_timeout_ms":10}"#)
                .unwrap();
        assert_eq!(config.platform, Platform::Android);
        assert_eq!(config.stage_timeout_ms, 10);
        assert_eq!(config.recovery_phrase_attempts, 4);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = FlowConfig::from_json(r#"{"recovery_phrase_attempts":0}"#).unwrap_err();
        assert!(matches!(err, WalletFlowError::InvalidConfig(_)));
        assert!(FlowConfig::from_json("not json").is_err());
    }
}
