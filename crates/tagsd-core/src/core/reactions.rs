//! Reaction Bus - in-process stream of reaction-added events
//!
//! Flow: chat gateway → publish() → every listener whose filter matches gets its
//! handler called inline. Handlers run on the delivery path, so they must not block;
//! the confirmation workflow's handler only resolves a oneshot.
//!
//! A listener lives exactly as long as its `Subscription`. Dropping the handle (or
//! calling `unsubscribe`) deregisters it once; later calls are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, trace};

use crate::types::ReactionEvent;

/// Which events a listener wants: one message, one reacting user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionFilter {
    pub message_id: String,
    pub user_id: String,
}

impl ReactionFilter {
    pub fn matches(&self, event: &ReactionEvent) -> bool {
        event.message_id == self.message_id && event.user_id == self.user_id
    }
}

type Handler = Box<dyn FnMut(&ReactionEvent) + Send>;

struct Listener {
    filter: ReactionFilter,
    handler: Handler,
}

#[derive(Default)]
pub struct ReactionBus {
    listeners: Mutex<HashMap<u64, Listener>>,
    next_id: AtomicU64,
}

impl ReactionBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a handler for events matching `filter`.
    ///
    /// The handler must not call back into the bus.
    pub fn subscribe<F>(self: &Arc<Self>, filter: ReactionFilter, handler: F) -> Subscription
    where
        F: FnMut(&ReactionEvent) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            listener = id,
            message_id = %filter.message_id,
            user_id = %filter.user_id,
            "Reaction listener registered"
        );
        self.listeners().insert(
            id,
            Listener {
                filter,
                handler: Box::new(handler),
            },
        );
        Subscription {
            id,
            bus: Arc::downgrade(self),
            active: true,
        }
    }

    /// Deliver an event to matching listeners. Returns how many were called.
    pub fn publish(&self, event: &ReactionEvent) -> usize {
        let mut listeners = self.listeners();
        let mut delivered = 0;
        for listener in listeners.values_mut() {
            if listener.filter.matches(event) {
                (listener.handler)(event);
                delivered += 1;
            }
        }
        trace!(
            message_id = %event.message_id,
            user_id = %event.user_id,
            emoji = %event.emoji,
            delivered,
            "Reaction published"
        );
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    fn remove(&self, id: u64) -> bool {
        self.listeners().remove(&id).is_some()
    }
}

/// Registration handle. Deregisters on drop.
pub struct Subscription {
    id: u64,
    bus: Weak<ReactionBus>,
    active: bool,
}

impl Subscription {
    /// Deregister now. Returns true only for the call that actually removed the listener.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        let removed = self
            .bus
            .upgrade()
            .map(|bus| bus.remove(self.id))
            .unwrap_or(false);
        debug!(listener = self.id, removed, "Reaction listener deregistered");
        removed
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
