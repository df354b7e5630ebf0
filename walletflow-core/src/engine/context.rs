use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::MutexGuard;
use uuid::Uuid;

use super::registry::InstanceStatus;
use super::{Engine, TriggerPolicy, Workflow, WorkflowError, WorkflowResult};
use crate::bridge::{Bridge, BridgeResult, ShareSheet};
use crate::config::FlowConfig;
use crate::event::{ConfigEventKind, Event, EventKind};
use crate::state::AppState;
use crate::storage::KeyValueStore;

/// Handle a running workflow uses to reach the engine.
#[derive(Debug)]
pub struct WorkflowContext {
    engine: Engine,
    instance: Uuid,
}

impl WorkflowContext {
    pub(crate) const fn new(engine: Engine, instance: Uuid) -> Self {
        Self { engine, instance }
    }

    /// Id of the running instance.
    #[must_use]
    pub const fn instance(&self) -> Uuid {
        self.instance
    }

    /// Configuration the engine was started with.
    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        self.engine.config()
    }

    /// Reads a value derived from the current state.
    pub fn select<T>(&self, selector: impl FnOnce(&AppState) -> T) -> T {
        self.engine.store().select(selector)
    }

    /// Publishes `event`. Reducers have run when this returns.
    pub fn publish(&self, event: impl Into<Event>) {
        self.engine.publish(event);
    }

    /// Publishes `event` if `condition` holds, atomically with respect to
    /// other publishes. Returns whether it was published.
    pub fn publish_if(
        &self,
        condition: impl FnOnce(&AppState) -> bool,
        event: impl Into<Event>,
    ) -> bool {
        self.engine.inner.bus.publish_if(condition, event)
    }

    /// Waits for the next event of `kind`.
    ///
    /// The subscription starts when this is called, not when the future is
    /// first polled, so an event published in between is not missed.
    pub fn await_event(
        &self,
        kind: impl Into<EventKind>,
    ) -> impl Future<Output = WorkflowResult<Event>> + Send + 'static {
        self.await_any(&[kind.into()])
    }

    /// Waits for the next event of any of `kinds`.
    pub fn await_any(
        &self,
        kinds: &[EventKind],
    ) -> impl Future<Output = WorkflowResult<Event>> + Send + 'static {
        let mut rx = self.engine.subscribe();
        let kinds = kinds.to_vec();
        let registry = Arc::clone(&self.engine.inner.registry);
        let instance = self.instance;

        async move {
            registry.set_status(
                instance,
                InstanceStatus::Waiting {
                    awaiting: kinds.clone(),
                },
            );
            let result = loop {
                match rx.recv().await {
                    Ok(event) if kinds.contains(&event.kind()) => break Ok(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "waiter fell behind the bus");
                    }
                    Err(RecvError::Closed) => break Err(WorkflowError::BusClosed),
                }
            };
            registry.set_status(instance, InstanceStatus::Running);
            result
        }
    }

    /// The native bridge.
    #[must_use]
    pub fn bridge(&self) -> &Arc<dyn Bridge> {
        &self.engine.inner.collaborators.bridge
    }

    /// The platform share sheet.
    #[must_use]
    pub fn share_sheet(&self) -> &Arc<dyn ShareSheet> {
        &self.engine.inner.collaborators.share_sheet
    }

    /// Awaits a bridge call, tagging a failure with `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Bridge`] if the call fails.
    pub async fn call_bridge<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = BridgeResult<T>> + Send,
    ) -> WorkflowResult<T> {
        tracing::debug!(operation, "bridge call");
        call.await.map_err(|source| {
            tracing::warn!(operation, error = %source, "bridge call failed");
            WorkflowError::Bridge { operation, source }
        })
    }

    /// Sleeps for `duration`.
    pub async fn timer(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Starts `workflow` as an independent child. Its failure is reported
    /// through its own failure event and never reaches this workflow.
    pub fn fork<W: Workflow>(&self, workflow: W) {
        let kind = workflow.kind();
        if let Some(child) = self.engine.spawn(workflow, TriggerPolicy::Every) {
            tracing::debug!(child_workflow = %kind, child = %child, "forked");
        }
    }

    /// Waits until the native layer reported it is initialised.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::BusClosed`] if the bus shuts down first.
    pub async fn ensure_bridge_ready(&self) -> WorkflowResult<()> {
        let ready = self.await_event(ConfigEventKind::VcxInitSuccess);
        if self.select(|s| s.bridge_ready) {
            return Ok(());
        }
        tracing::debug!("waiting for bridge initialisation");
        ready.await.map(|_| ())
    }

    /// Encrypted namespace for secrets.
    #[must_use]
    pub fn secure(&self) -> Arc<dyn KeyValueStore> {
        self.engine.inner.collaborators.storage.secure()
    }

    /// Namespace for non-secret settings.
    #[must_use]
    pub fn safe(&self) -> Arc<dyn KeyValueStore> {
        self.engine.inner.collaborators.storage.safe()
    }

    /// Wallet namespace, part of every backup.
    #[must_use]
    pub fn wallet(&self) -> Arc<dyn KeyValueStore> {
        self.engine.inner.collaborators.storage.wallet()
    }

    /// Directory backup archives are written to.
    #[must_use]
    pub fn documents_dir(&self) -> String {
        self.engine.inner.collaborators.storage.documents_dir()
    }

    /// Exclusive access to the persisted claim map.
    pub async fn lock_claim_map(&self) -> MutexGuard<'_, ()> {
        self.engine.inner.claim_map_lock.lock().await
    }

    /// Exclusive access to the persisted connections.
    pub async fn lock_connections(&self) -> MutexGuard<'_, ()> {
        self.engine.inner.connections_lock.lock().await
    }
}
