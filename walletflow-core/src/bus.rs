//! In-process event bus.
//!
//! Publishing applies the reducers, wakes every waiting workflow and queues
//! the event for the dispatcher that starts new workflows, in that order and
//! under one lock, so every observer sees events in publish order.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};

use crate::event::Event;
use crate::state::{AppState, Store};

/// Publishes events to the store, waiting workflows and the dispatcher.
#[derive(Debug)]
pub struct EventBus {
    store: Arc<Store>,
    sender: broadcast::Sender<Event>,
    dispatch: mpsc::UnboundedSender<Event>,
    publish_lock: Mutex<()>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` undelivered events per waiter.
    ///
    /// The returned receiver yields every published event and is meant for
    /// the dispatcher.
    #[must_use]
    pub fn new(store: Arc<Store>, capacity: usize) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (dispatch, dispatch_rx) = mpsc::unbounded_channel();
        let bus = Self {
            store,
            sender,
            dispatch,
            publish_lock: Mutex::new(()),
        };
        (bus, dispatch_rx)
    }

    /// Publishes `event`. Never suspends.
    pub fn publish(&self, event: impl Into<Event>) {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish_locked(event.into());
    }

    /// Publishes `event` only if `condition` holds for the current state.
    ///
    /// The check and the publish happen under the publish lock, so two
    /// callers racing on the same condition cannot both succeed.
    pub(crate) fn publish_if(
        &self,
        condition: impl FnOnce(&AppState) -> bool,
        event: impl Into<Event>,
    ) -> bool {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.store.select(condition) {
            return false;
        }
        self.publish_locked(event.into());
        true
    }

    fn publish_locked(&self, event: Event) {
        tracing::debug!(event = %event.kind(), "publish");
        self.store.apply(&event);
        // No receivers just means nobody is waiting.
        let _ = self.sender.send(event.clone());
        if self.dispatch.send(event).is_err() {
            tracing::trace!("dispatcher stopped, event not dispatched");
        }
    }

    /// A receiver of every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// The store this bus updates.
    #[must_use]
    pub const fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BackupEvent, NavigationEvent, PushEvent};

    #[tokio::test]
    async fn test_publish_updates_store_before_waking() {
        let store = Arc::new(Store::default());
        let (bus, mut dispatched) = EventBus::new(store.clone(), 8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(BackupEvent::PromptBackupBanner(true));
        bus.publish(NavigationEvent::UnlockApp);

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                Event::Backup(BackupEvent::PromptBackupBanner(true))
            );
            assert_eq!(
                rx.recv().await.unwrap(),
                Event::Navigation(NavigationEvent::UnlockApp)
            );
        }
        assert!(store.select(|s| s.backup.show_banner && !s.navigation.is_locked));
        assert_eq!(
            dispatched.recv().await.unwrap(),
            Event::Backup(BackupEvent::PromptBackupBanner(true))
        );
    }

    #[test]
    fn test_publish_if_claims_once() {
        let (bus, _dispatched) = EventBus::new(Arc::new(Store::default()), 8);
        let claim = || {
            bus.publish_if(
                |s| !s.push.pending_fetch_keys.contains("u1-d1"),
                PushEvent::SetPendingFetchKey("u1-d1".to_string()),
            )
        };
        assert!(claim());
        assert!(!claim());
    }
}
