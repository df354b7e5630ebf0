//! The shared state store.
//!
//! [`AppState`] is only ever changed by applying an [`Event`] through the
//! reducers registered in a [`ReducerRegistry`]. Reads go through
//! [`Store::select`] or the functions in [`selectors`].

use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::event::{ConfigEvent, Event};

pub mod backup;
pub mod claim;
pub mod connections;
pub mod correlation;
pub mod navigation;
pub mod push;

use backup::BackupState;
use claim::ClaimState;
use connections::ConnectionsState;
use correlation::CorrelationTable;
use navigation::NavigationState;
use push::PushState;

/// Snapshot of everything the orchestrator tracks in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    /// The native layer reported it is initialised.
    pub bridge_ready: bool,
    /// Recovery phrase and backups.
    pub backup: BackupState,
    /// Push token and notification fetches.
    pub push: PushState,
    /// Claim map and accepted offers.
    pub claims: ClaimState,
    /// Received offers, requests and questions.
    pub correlation: CorrelationTable,
    /// Known connections.
    pub connections: ConnectionsState,
    /// Lock state and redirections.
    pub navigation: NavigationState,
}

/// A pure state transition.
pub type Reducer = Box<dyn Fn(&mut AppState, &Event) + Send + Sync>;

/// Ordered set of reducers applied to every event.
#[derive(Default)]
pub struct ReducerRegistry {
    reducers: Vec<(&'static str, Reducer)>,
}

impl std::fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.reducers.iter().map(|(name, _)| name))
            .finish()
    }
}

impl ReducerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reducer. Reducers run in registration order.
    #[must_use]
    pub fn register(
        mut self,
        name: &'static str,
        reducer: impl Fn(&mut AppState, &Event) + Send + Sync + 'static,
    ) -> Self {
        self.reducers.push((name, Box::new(reducer)));
        self
    }

    /// One reducer per sub-state.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .register("config", reduce_config)
            .register("backup", |s, e| backup::reduce(&mut s.backup, e))
            .register("push", |s, e| push::reduce(&mut s.push, e))
            .register("claims", |s, e| claim::reduce(&mut s.claims, e))
            .register("correlation", |s, e| {
                correlation::reduce(&mut s.correlation, e);
            })
            .register("connections", |s, e| {
                connections::reduce(&mut s.connections, e);
            })
            .register("navigation", |s, e| {
                navigation::reduce(&mut s.navigation, e);
            })
    }

    fn apply(&self, state: &mut AppState, event: &Event) {
        for (_, reducer) in &self.reducers {
            reducer(state, event);
        }
    }
}

fn reduce_config(state: &mut AppState, event: &Event) {
    match event {
        Event::Config(ConfigEvent::VcxInitSuccess) => state.bridge_ready = true,
        Event::Reset => state.bridge_ready = false,
        _ => {}
    }
}

/// Holds the current [`AppState`].
#[derive(Debug)]
pub struct Store {
    state: RwLock<AppState>,
    reducers: ReducerRegistry,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(ReducerRegistry::standard())
    }
}

impl Store {
    /// A store with default state and the given reducers.
    #[must_use]
    pub fn new(reducers: ReducerRegistry) -> Self {
        Self {
            state: RwLock::new(AppState::default()),
            reducers,
        }
    }

    /// Runs every reducer on `event`.
    pub(crate) fn apply(&self, event: &Event) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.reducers.apply(&mut state, event);
    }

    /// Reads a value derived from the current state.
    pub fn select<T>(&self, selector: impl FnOnce(&AppState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        selector(&state)
    }

    /// A full copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AppState {
        self.select(Clone::clone)
    }
}

/// Named reads of [`AppState`].
pub mod selectors {
    use std::collections::BTreeMap;

    use super::backup::{CloudBackupStatus, PassphraseRecord};
    use super::claim::{ClaimMapEntry, SerializedClaimOffer};
    use super::connections::Connection;
    use super::correlation::CorrelationRecord;
    use super::navigation::Redirection;
    use super::AppState;

    /// Status of the cloud backup session.
    #[must_use]
    pub const fn cloud_backup_status(state: &AppState) -> CloudBackupStatus {
        state.backup.session.status
    }

    /// Handle of the backup the session is uploading.
    #[must_use]
    pub const fn wallet_handle(state: &AppState) -> Option<i32> {
        state.backup.session.wallet_handle
    }

    /// The recovery passphrase, once generated or restored.
    #[must_use]
    pub fn passphrase(state: &AppState) -> Option<PassphraseRecord> {
        state.backup.passphrase.clone()
    }

    /// Archive built by the last local backup.
    #[must_use]
    pub fn backup_path(state: &AppState) -> Option<String> {
        state.backup.backup_path.clone()
    }

    /// Connection whose pairwise DID on this side is `identifier`.
    #[must_use]
    pub fn connection_by_identifier(state: &AppState, identifier: &str) -> Option<Connection> {
        state.connections.connections.get(identifier).cloned()
    }

    /// Connection with the remote party `sender_did`.
    #[must_use]
    pub fn connection_by_sender(state: &AppState, sender_did: &str) -> Option<Connection> {
        state
            .connections
            .connections
            .values()
            .find(|c| c.sender_did == sender_did)
            .cloned()
    }

    /// Accepted claim offers sent on the connection `for_did`.
    #[must_use]
    pub fn serialized_claim_offers(state: &AppState, for_did: &str) -> Vec<SerializedClaimOffer> {
        state.claims.offers.get(for_did).cloned().unwrap_or_default()
    }

    /// The lock screen is up.
    #[must_use]
    pub const fn is_locked(state: &AppState) -> bool {
        state.navigation.is_locked
    }

    /// Unlocked and not on a deny-listed screen.
    #[must_use]
    pub fn can_redirect(state: &AppState) -> bool {
        state.navigation.can_redirect()
    }

    /// A fetch for `key` was already started.
    #[must_use]
    pub fn has_pending_fetch_key(state: &AppState, key: &str) -> bool {
        state.push.pending_fetch_keys.contains(key)
    }

    /// Redirections waiting to be replayed.
    #[must_use]
    pub fn pending_redirections(state: &AppState) -> Vec<Redirection> {
        state.navigation.pending_redirections.clone()
    }

    /// Claim UUID to issuer.
    #[must_use]
    pub fn claim_map(state: &AppState) -> BTreeMap<String, ClaimMapEntry> {
        state.claims.claim_map.clone()
    }

    /// The correlation record for `uid`.
    #[must_use]
    pub fn correlation(state: &AppState, uid: &str) -> Option<CorrelationRecord> {
        state.correlation.get(uid).cloned()
    }
}
