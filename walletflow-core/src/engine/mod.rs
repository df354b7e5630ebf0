//! Workflow engine.
//!
//! A workflow is a task that drives one multi-step flow. It talks to the
//! outside world only through its [`WorkflowContext`]: bridge calls, bus
//! publishes, event waits, timers and forks. Combined with [`race`] and
//! [`retry`] these are the building blocks every workflow is written with.
//!
//! A workflow that returns an error is terminated and its
//! [`Workflow::failure_event`] is published, so the store always reflects a
//! terminal status. Errors never propagate to the parent or to siblings.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::bridge::{Bridge, ShareSheet};
use crate::bus::EventBus;
use crate::config::FlowConfig;
use crate::event::Event;
use crate::state::Store;
use crate::storage::StorageProvider;

mod combinators;
mod context;
mod error;
mod registry;

pub use combinators::{race, retry, Winner};
pub use context::WorkflowContext;
pub use error::{WorkflowError, WorkflowResult};
pub use registry::{InstanceRegistry, InstanceStatus, TriggerPolicy, WorkflowInstance};

/// Identifies a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowKind {
    /// Fans out the hydration workflows at startup.
    StartupHydration,
    /// Restores one persisted backup area.
    HydrateBackupArea,
    /// Restores the claim map.
    HydrateClaimMap,
    /// Restores the connection list.
    HydrateConnections,
    /// Restores the push token.
    HydratePushToken,
    /// Creates the recovery phrase.
    GenerateRecoveryPhrase,
    /// Builds the local backup archive.
    LocalBackup,
    /// Copies secure storage into the wallet.
    PrepareBackup,
    /// Hands the archive to the share sheet.
    ExportBackup,
    /// Runs one cloud backup session.
    CloudBackup,
    /// Persists the backup banner choice.
    PersistBanner,
    /// Copies the passphrase out of a restored wallet.
    RestorePassphrase,
    /// Removes the passphrase.
    ClearPassphrase,
    /// Uploads the backup the agency asked for.
    WalletBackupReady,
    /// Completes the session on the agency acknowledgement.
    WalletBackupAck,
    /// Fails the session on an agency failure.
    WalletBackupFailure,
    /// Downloads the message a notification announced.
    FetchAdditionalData,
    /// Downloads every pending message.
    FetchUnacknowledgedMessages,
    /// Stores a downloaded message and shows it.
    UpdateStoreAndRedirect,
    /// Registers the push token.
    PushToken,
    /// Fans out claim offer checks.
    ClaimReceived,
    /// Checks one offer for its credential.
    ClaimOfferCheck,
    /// Writes the claim map to secure storage.
    PersistClaimMap,
    /// Deletes an ignored out-of-band proof request later.
    OobDeletion,
    /// Stores a connection.
    SaveConnection,
    /// Deletes a connection.
    DeleteConnection,
    /// Accepts a connection invitation.
    AcceptInvitation,
    /// Replays deferred redirections.
    ReplayPendingRedirections,
}

/// A workflow definition.
#[async_trait::async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Definition this workflow belongs to.
    fn kind(&self) -> WorkflowKind;

    /// Runs the workflow to completion.
    async fn run(&self, ctx: &WorkflowContext) -> WorkflowResult<()>;

    /// Event published when [`Workflow::run`] fails.
    fn failure_event(&self, _error: &WorkflowError) -> Option<Event> {
        None
    }
}

/// Host-provided collaborators.
#[derive(Clone)]
pub struct Collaborators {
    /// Native wallet layer.
    pub bridge: Arc<dyn Bridge>,
    /// Key-value namespaces and the documents directory.
    pub storage: Arc<dyn StorageProvider>,
    /// System share sheet.
    pub share_sheet: Arc<dyn ShareSheet>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct EngineInner {
    bus: EventBus,
    collaborators: Collaborators,
    config: FlowConfig,
    registry: Arc<InstanceRegistry>,
    /// Serialises writes of the persisted claim map.
    claim_map_lock: tokio::sync::Mutex<()>,
    /// Serialises writes of the persisted connections.
    connections_lock: tokio::sync::Mutex<()>,
}

/// Runs workflows against a store and a bus.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates the store and bus and starts the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(collaborators: Collaborators, config: FlowConfig) -> Self {
        let store = Arc::new(Store::default());
        let capacity = usize::try_from(config.event_buffer).unwrap_or(usize::MAX);
        let (bus, dispatch_rx) = EventBus::new(store, capacity);
        let inner = Arc::new(EngineInner {
            bus,
            collaborators,
            config,
            registry: Arc::new(InstanceRegistry::default()),
            claim_map_lock: tokio::sync::Mutex::new(()),
            connections_lock: tokio::sync::Mutex::new(()),
        });
        tokio::spawn(crate::dispatch::run(Arc::downgrade(&inner), dispatch_rx));
        Self { inner }
    }

    pub(crate) const fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Publishes `event` on the bus.
    pub fn publish(&self, event: impl Into<Event>) {
        self.inner.bus.publish(event);
    }

    /// A receiver of every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// The state store.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        self.inner.bus.store()
    }

    /// Live workflow instances.
    #[must_use]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.inner.registry
    }

    /// Configuration the engine was started with.
    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        &self.inner.config
    }

    /// Starts `workflow` under `policy`. Returns the instance id, or `None`
    /// when the policy skipped it.
    pub fn spawn<W: Workflow>(&self, workflow: W, policy: TriggerPolicy) -> Option<Uuid> {
        let kind = workflow.kind();
        let guard = self.inner.registry.register(kind, policy)?;
        let id = guard.id();
        let ctx = WorkflowContext::new(self.clone(), id);
        let span = tracing::info_span!("workflow", workflow = %kind, instance = %id);

        let task = tokio::spawn(
            async move {
                tracing::debug!("started");
                match workflow.run(&ctx).await {
                    Ok(()) => {
                        tracing::debug!("done");
                        guard.finish(InstanceStatus::Done);
                    }
                    Err(error) => {
                        match workflow.failure_event(&error) {
                            Some(event) => {
                                tracing::warn!(%error, "failed");
                                ctx.publish(event);
                            }
                            None => tracing::error!(%error, "failed"),
                        }
                        guard.finish(InstanceStatus::Failed);
                    }
                }
            }
            .instrument(span),
        );

        if policy == TriggerPolicy::Latest {
            self.inner.registry.replace_latest(kind, task.abort_handle());
        }
        Some(id)
    }
}
