//! Lock state, the foreground screen and redirections waiting to be replayed.

use std::collections::HashMap;

use serde::Serialize;

use crate::event::{Event, NavigationEvent};

/// Landing screen, where pending redirections are replayed.
pub const HOME_ROUTE: &str = "Home";
/// Claim offer modal.
pub const CLAIM_OFFER_ROUTE: &str = "ClaimOffer";
/// Proof request modal.
pub const PROOF_REQUEST_ROUTE: &str = "ProofRequest";
/// Question modal.
pub const QUESTION_ROUTE: &str = "Question";
/// Lock screen.
pub const LOCK_ENTER_ROUTE: &str = "LockEnter";

/// Screens that already show a modal or own the whole display. Redirecting
/// while one of them is in the foreground would stack a second modal.
pub const DENY_LISTED_ROUTES: [&str; 7] = [
    CLAIM_OFFER_ROUTE,
    PROOF_REQUEST_ROUTE,
    QUESTION_ROUTE,
    LOCK_ENTER_ROUTE,
    "LockEnterPin",
    "LockEnterFingerprint",
    "Restore",
];

/// Whether redirects must wait while `screen` is in the foreground.
#[must_use]
pub fn is_deny_listed(screen: &str) -> bool {
    DENY_LISTED_ROUTES.contains(&screen)
}

/// A navigation request for the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct Redirection {
    /// Screen name.
    pub route: String,
    /// Route parameters.
    pub params: HashMap<String, String>,
}

impl Redirection {
    /// A redirection to `route` without parameters.
    #[must_use]
    pub fn to(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            params: HashMap::new(),
        }
    }

    /// Adds the parameter `key`, replacing an earlier value.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Banner shown while the app is in the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct InAppNotification {
    /// Display name of the connection.
    pub sender_name: Option<String>,
    /// Logo of the connection.
    pub sender_image: Option<String>,
    /// Pairwise DID of the sender.
    pub sender_did: String,
    /// Banner text, e.g. `Offering Transcript`.
    pub text: String,
    /// Raw notification type.
    pub message_type: String,
    /// UID of the message the banner opens.
    pub message_id: String,
    /// Pairwise DID of the receiving connection.
    pub identifier: String,
}

/// Lock state and navigation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationState {
    /// The app starts locked.
    pub is_locked: bool,
    /// Name of the foreground screen.
    pub current_screen: String,
    /// Redirections replayed once the app can redirect again.
    pub pending_redirections: Vec<Redirection>,
    /// Navigation the UI has not taken yet.
    pub navigate_to: Option<Redirection>,
    /// Banner currently shown.
    pub in_app_notification: Option<InAppNotification>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            is_locked: true,
            current_screen: LOCK_ENTER_ROUTE.to_string(),
            pending_redirections: Vec::new(),
            navigate_to: None,
            in_app_notification: None,
        }
    }
}

impl NavigationState {
    /// Redirections can be issued right now.
    #[must_use]
    pub fn can_redirect(&self) -> bool {
        !self.is_locked && !is_deny_listed(&self.current_screen)
    }
}

pub(crate) fn reduce(state: &mut NavigationState, event: &Event) {
    let event = match event {
        Event::Reset => {
            *state = NavigationState::default();
            return;
        }
        Event::Navigation(event) => event,
        _ => return,
    };

    match event {
        NavigationEvent::LockApp => state.is_locked = true,
        NavigationEvent::UnlockApp => state.is_locked = false,
        NavigationEvent::ScreenChanged(screen) => state.current_screen.clone_from(screen),
        NavigationEvent::AddPendingRedirection(redirections) => {
            state.pending_redirections.extend(redirections.iter().cloned());
        }
        NavigationEvent::ClearPendingRedirection => state.pending_redirections.clear(),
        NavigationEvent::NavigateToRoute(redirection) => {
            state.navigate_to = Some(redirection.clone());
        }
        NavigationEvent::ClearNavigateToRoute => state.navigate_to = None,
        NavigationEvent::ShowInAppNotification(notification) => {
            state.in_app_notification = Some(notification.clone());
        }
        NavigationEvent::DismissInAppNotification => state.in_app_notification = None,
    }
}
