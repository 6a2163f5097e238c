//! Subscriber fan-out
//!
//! `publish` takes a snapshot of the subscriber list under a read lock and
//! invokes callbacks with the lock released, so callbacks may subscribe or
//! unsubscribe (themselves included) while an event is being delivered.

use crate::traits::*;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Subscriber callback. Returning `Err` is logged and otherwise ignored.
pub type EventCallback = Arc<dyn Fn(&ClassifiedEvent) -> Result<()> + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    callback: EventCallback,
}

#[derive(Default)]
struct RegistryInner {
    entries: RwLock<Vec<SubscriberEntry>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }
}

/// Ordered set of event subscribers
///
/// Cloning yields another handle to the same subscriber set.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; it sees every event published from now on
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClassifiedEvent) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.write().push(SubscriberEntry {
            id,
            callback: Arc::new(callback),
        });
        debug!("[Realtime] Subscriber {} registered", id);

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Subscribe through an unbounded channel, for consumers that poll
    ///
    /// The subscription ends when the returned receiver is dropped: the
    /// next failed send removes the internal subscriber.
    pub fn subscribe_channel(&self) -> Receiver<ClassifiedEvent> {
        let (tx, rx): (Sender<ClassifiedEvent>, Receiver<ClassifiedEvent>) =
            crossbeam_channel::unbounded();

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inner);
        let callback: EventCallback = Arc::new(move |event: &ClassifiedEvent| {
            if tx.send(event.clone()).is_err() {
                if let Some(inner) = registry.upgrade() {
                    inner.remove(id);
                }
                return Err(NotifyError::ChannelSend("receiver dropped".to_string()));
            }
            Ok(())
        });

        self.inner.entries.write().push(SubscriberEntry { id, callback });
        debug!("[Realtime] Channel subscriber {} registered", id);
        rx
    }

    /// Deliver `event` to every subscriber registered at call time, in
    /// registration order
    ///
    /// Returns how many callbacks completed without error or panic.
    pub fn publish(&self, event: &ClassifiedEvent) -> usize {
        let snapshot: Vec<(u64, EventCallback)> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|entry| (entry.id, Arc::clone(&entry.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(NotifyError::ChannelSend(_))) => {
                    debug!("[Realtime] Channel subscriber {} went away", id);
                }
                Ok(Err(e)) => {
                    warn!("[Realtime] Subscriber {} failed on {}: {}", id, event.kind(), e);
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        "[Realtime] Subscriber {} panicked on {}: {}",
                        id,
                        event.kind(),
                        message
                    );
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// Handle to one registered callback
///
/// Dropping the handle unsubscribes. Use [`Subscription::detach`] to keep the
/// callback registered for the registry's lifetime.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<RegistryInner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback. Safe to call from inside the callback itself.
    ///
    /// Returns `false` if it was already removed.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.registry.upgrade() {
            Some(inner) => {
                let removed = inner.remove(self.id);
                if removed {
                    debug!("[Realtime] Subscriber {} removed", self.id);
                }
                removed
            }
            None => false,
        }
    }

    /// Keep the callback registered without holding the handle
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
