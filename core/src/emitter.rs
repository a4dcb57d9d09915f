//! One-shot, type-keyed listener registry.
//!
//! Lets an in-flight effect wait for a message dispatched later by someone
//! else (see [`Context::take`](crate::context::Context::take)). Every
//! [`Emitter::emit`] notifies the listeners registered before it and then
//! forgets them.

use crate::action::Action;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Listener = Box<dyn FnOnce(&Action) + Send>;

/// Identifies a single registered listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_kind: HashMap<String, Vec<(ListenerId, Listener)>>,
}

/// Shared listener table keyed by action type
#[derive(Clone, Default)]
pub struct Emitter {
    listeners: Arc<Mutex<Listeners>>,
}

impl Emitter {
    /// Create an empty emitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a one-shot listener for `kind`
    pub fn sub<F>(&self, kind: impl Into<String>, listener: F) -> ListenerId
    where
        F: FnOnce(&Action) + Send + 'static,
    {
        let mut listeners = self.lock();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners
            .by_kind
            .entry(kind.into())
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove one listener without notifying it
    pub fn unsub(&self, kind: &str, id: ListenerId) {
        let mut listeners = self.lock();
        if let Some(list) = listeners.by_kind.get_mut(kind) {
            list.retain(|(listener_id, _)| *listener_id != id);
            if list.is_empty() {
                listeners.by_kind.remove(kind);
            }
        }
    }

    /// Remove every listener of `kind` without notifying them
    pub fn unsub_type(&self, kind: &str) {
        self.lock().by_kind.remove(kind);
    }

    /// Notify and clear the listeners registered for `action`'s type
    pub fn emit(&self, action: &Action) {
        // Released before calling out so listeners may subscribe again.
        let Some(pending) = self.lock().by_kind.remove(action.kind()) else {
            return;
        };
        tracing::trace!(kind = action.kind(), listeners = pending.len(), "Emitting action");
        for (_, listener) in pending {
            listener(action);
        }
    }

    /// Whether any listener waits for `kind`
    #[must_use]
    pub fn has(&self, kind: &str) -> bool {
        self.lock().by_kind.contains_key(kind)
    }

    /// Number of listeners waiting for `kind`
    #[must_use]
    pub fn listener_count(&self, kind: &str) -> usize {
        self.lock().by_kind.get(kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.lock().by_kind.keys().cloned().collect();
        f.debug_struct("Emitter").field("kinds", &kinds).finish()
    }
}
