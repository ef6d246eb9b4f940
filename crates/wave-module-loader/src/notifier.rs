//! Fan-out of lifecycle events to subscribers

use crate::event::LifecycleEvent;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

type Callback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// Synchronous event notifier
///
/// `broadcast` walks a copy of the callback list, so callbacks may
/// subscribe or unsubscribe while being invoked. A panicking callback is
/// logged and skipped; the remaining callbacks still run.
#[derive(Default)]
pub(crate) struct EventNotifier {
    callbacks: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl EventNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub(crate) fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns whether it was registered
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Deliver `event` to every current subscriber on this thread
    pub(crate) fn broadcast(&self, event: &LifecycleEvent) {
        let callbacks: Vec<(SubscriptionId, Callback)> = self.callbacks.lock().clone();

        for (id, callback) in callbacks {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                error!(
                    subscription = %id,
                    event = %event.kind,
                    error = %reason,
                    "Lifecycle event callback panicked"
                );
            }
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
