//! Push notification state: the pending-fetch key set, the last received
//! notification and the message download status.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::ErrorInfo;
use crate::event::{Event, PushEvent};
use crate::payload::DownloadedNotification;

/// Status of the last message download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, uniffi::Enum)]
pub enum MessageFetchStatus {
    /// No download started.
    #[default]
    Idle,
    /// Downloading.
    Loading,
    /// The last download finished.
    Success,
    /// The last download failed.
    Failure,
}

/// Push token and notification fetches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushState {
    /// Token registered with the agency.
    pub push_token: Option<String>,
    /// `uid-forDID` keys of fetches that were started. Entries are only
    /// removed by a process reset.
    pub pending_fetch_keys: BTreeSet<String>,
    /// The last notification routed.
    pub notification: Option<DownloadedNotification>,
    /// Status of the last message download.
    pub fetch_status: MessageFetchStatus,
    /// Last push error.
    pub error: Option<ErrorInfo>,
}

pub(crate) fn reduce(state: &mut PushState, event: &Event) {
    let event = match event {
        Event::Reset => {
            *state = PushState::default();
            return;
        }
        Event::Push(event) => event,
        _ => return,
    };

    match event {
        PushEvent::SetPendingFetchKey(key) => {
            state.pending_fetch_keys.insert(key.clone());
        }
        PushEvent::FetchAdditionalDataError(error)
        | PushEvent::PushTokenFail(error)
        | PushEvent::HydratePushTokenFail(error) => {
            state.error = Some(error.clone());
        }
        PushEvent::GetMessagesLoading => state.fetch_status = MessageFetchStatus::Loading,
        PushEvent::GetMessagesSuccess => state.fetch_status = MessageFetchStatus::Success,
        PushEvent::GetMessagesFail => state.fetch_status = MessageFetchStatus::Failure,
        PushEvent::UnacknowledgedMessagesFail(error) => {
            state.fetch_status = MessageFetchStatus::Failure;
            state.error = Some(error.clone());
        }
        PushEvent::PushNotificationReceived(notification) => {
            state.notification = Some(notification.clone());
        }
        PushEvent::HydratePushToken(token) | PushEvent::PushTokenSaved(token) => {
            state.push_token = Some(token.clone());
        }
        PushEvent::FetchAdditionalData { .. }
        | PushEvent::GetUnacknowledgedMessages
        | PushEvent::UpdatePushToken(_) => {}
    }
}
