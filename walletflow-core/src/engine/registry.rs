//! Book-keeping of running workflow instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;
use uuid::Uuid;

use super::WorkflowKind;
use crate::event::EventKind;

/// Lifecycle of a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Executing or suspended on a bridge call or timer.
    Running,
    /// Suspended until one of `awaiting` is published.
    Waiting {
        /// Event kinds that resume the instance.
        awaiting: Vec<EventKind>,
    },
    /// Finished successfully.
    Done,
    /// Terminated with an error.
    Failed,
}

/// One execution of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowInstance {
    /// Unique per run.
    pub id: Uuid,
    /// Definition being run.
    pub kind: WorkflowKind,
    /// Where the run is.
    pub status: InstanceStatus,
}

/// How a triggering event treats instances of the same kind already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Start a new instance regardless.
    Every,
    /// Abort the previous instance, then start a new one.
    Latest,
    /// Do nothing while an instance is in flight.
    Exclusive,
}

/// Running instances, keyed by id.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Mutex<HashMap<Uuid, WorkflowInstance>>,
    latest: Mutex<HashMap<WorkflowKind, AbortHandle>>,
}

impl InstanceRegistry {
    /// Registers a new instance of `kind` unless `policy` forbids it.
    pub(crate) fn register(
        self: &Arc<Self>,
        kind: WorkflowKind,
        policy: TriggerPolicy,
    ) -> Option<InstanceGuard> {
        let mut instances = lock(&self.instances);
        if policy == TriggerPolicy::Exclusive && instances.values().any(|i| i.kind == kind) {
            tracing::debug!(workflow = %kind, "already in flight, trigger skipped");
            return None;
        }
        let id = Uuid::new_v4();
        instances.insert(
            id,
            WorkflowInstance {
                id,
                kind,
                status: InstanceStatus::Running,
            },
        );
        Some(InstanceGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    /// Remembers `handle` as the newest instance of `kind`, aborting the
    /// previous one.
    pub(crate) fn replace_latest(&self, kind: WorkflowKind, handle: AbortHandle) {
        if let Some(previous) = lock(&self.latest).insert(kind, handle) {
            if !previous.is_finished() {
                tracing::debug!(workflow = %kind, "aborting superseded instance");
                previous.abort();
            }
        }
    }

    pub(crate) fn set_status(&self, id: Uuid, status: InstanceStatus) {
        if let Some(instance) = lock(&self.instances).get_mut(&id) {
            instance.status = status;
        }
    }

    /// Whether an instance of `kind` exists.
    #[must_use]
    pub fn in_flight(&self, kind: WorkflowKind) -> bool {
        lock(&self.instances).values().any(|i| i.kind == kind)
    }

    /// Every live instance.
    #[must_use]
    pub fn instances(&self) -> Vec<WorkflowInstance> {
        lock(&self.instances).values().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes its instance from the registry when dropped, including when the
/// task running it is aborted.
#[derive(Debug)]
pub(crate) struct InstanceGuard {
    registry: Arc<InstanceRegistry>,
    id: Uuid,
}

impl InstanceGuard {
    pub(crate) const fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn finish(self, status: InstanceStatus) {
        self.registry.set_status(self.id, status);
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if let Some(instance) = lock(&self.registry.instances).remove(&self.id) {
            tracing::trace!(workflow = %instance.kind, instance = %self.id, status = ?instance.status, "instance removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_skips_while_in_flight() {
        let registry = Arc::new(InstanceRegistry::default());
        let first = registry
            .register(WorkflowKind::CloudBackup, TriggerPolicy::Exclusive)
            .unwrap();
        assert!(registry
            .register(WorkflowKind::CloudBackup, TriggerPolicy::Exclusive)
            .is_none());
        assert!(registry
            .register(WorkflowKind::PrepareBackup, TriggerPolicy::Exclusive)
            .is_some());

        first.finish(InstanceStatus::Done);
        assert!(!registry.in_flight(WorkflowKind::CloudBackup));
        assert!(registry
            .register(WorkflowKind::CloudBackup, TriggerPolicy::Exclusive)
            .is_some());
    }

    #[test]
    fn test_every_allows_duplicates() {
        let registry = Arc::new(InstanceRegistry::default());
        let _a = registry.register(WorkflowKind::FetchAdditionalData, TriggerPolicy::Every);
        let _b = registry.register(WorkflowKind::FetchAdditionalData, TriggerPolicy::Every);
        assert_eq!(registry.instances().len(), 2);
    }
}
