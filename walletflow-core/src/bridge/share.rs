//! Platform share sheet used to export backup archives.

use super::BridgeResult;

/// Content handed to the share sheet.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ShareRequest {
    /// Sheet title.
    pub title: String,
    /// File URL in the platform's format.
    pub url: String,
    /// MIME type of the file.
    pub mime_type: String,
}

/// How the user left the share sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ShareOutcome {
    /// The file was handed to a target.
    Shared,
    /// The sheet was closed without sharing.
    Dismissed,
}

/// Platform share sheet.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait ShareSheet: Send + Sync {
    /// Presents the sheet and resolves once it closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the sheet could not be presented.
    async fn share(&self, request: ShareRequest) -> BridgeResult<ShareOutcome>;
}
