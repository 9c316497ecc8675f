//! Listener registry
//!
//! Listeners for one kind run in registration order. The handler slot
//! (`onnavigate`-style property) takes the position of its first assignment;
//! reassigning it swaps the callback in place, clearing it removes it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Something that can be dispatched through an [`EventTarget`].
pub trait Event {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`EventTarget::add_listener`], used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration<E> {
    id: ListenerId,
    handler_slot: bool,
    listener: Listener<E>,
}

struct Registry<E: Event> {
    next_id: u64,
    by_kind: HashMap<E::Kind, Vec<Registration<E>>>,
}

impl<E: Event> Registry<E> {
    fn allocate_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

pub struct EventTarget<E: Event> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: Event> EventTarget<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                by_kind: HashMap::new(),
            })),
        }
    }

    pub fn add_listener<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.allocate_id();
        registry.by_kind.entry(kind).or_default().push(Registration {
            id,
            handler_slot: false,
            listener: Arc::new(listener),
        });
        id
    }

    /// Returns false if the listener was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();
        for registrations in registry.by_kind.values_mut() {
            if let Some(pos) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(pos);
                return true;
            }
        }
        false
    }

    /// Assign (or clear, with `None`) the single handler slot for `kind`.
    pub fn set_handler(&self, kind: E::Kind, handler: Option<Listener<E>>) {
        let mut registry = self.registry.lock();
        let next_id = registry.next_id + 1;
        let registrations = registry.by_kind.entry(kind).or_default();
        let existing = registrations.iter().position(|r| r.handler_slot);

        let allocated = match (existing, handler) {
            (Some(pos), Some(listener)) => {
                registrations[pos].listener = listener;
                false
            }
            (Some(pos), None) => {
                registrations.remove(pos);
                false
            }
            (None, Some(listener)) => {
                registrations.push(Registration {
                    id: ListenerId(next_id),
                    handler_slot: true,
                    listener,
                });
                true
            }
            (None, None) => false,
        };

        if allocated {
            registry.next_id = next_id;
        }
    }

    pub fn has_handler(&self, kind: E::Kind) -> bool {
        self.registry
            .lock()
            .by_kind
            .get(&kind)
            .is_some_and(|regs| regs.iter().any(|r| r.handler_slot))
    }

    /// Number of callbacks (listeners and handler slot) registered for `kind`.
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.registry
            .lock()
            .by_kind
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.registry.lock().by_kind.clear();
    }

    /// Invoke every callback registered for the event's kind.
    ///
    /// The callback list is snapshotted before the first call, so listeners
    /// may add or remove listeners (or dispatch again) without deadlocking;
    /// such changes take effect from the next dispatch.
    pub fn dispatch(&self, event: &E) -> usize {
        let kind = event.kind();
        let listeners: Vec<Listener<E>> = self
            .registry
            .lock()
            .by_kind
            .get(&kind)
            .map(|regs| regs.iter().map(|r| Arc::clone(&r.listener)).collect())
            .unwrap_or_default();

        tracing::trace!(?kind, listeners = listeners.len(), "Dispatching event");

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }
}

impl<E: Event> Default for EventTarget<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Clone for EventTarget<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Event> fmt::Debug for EventTarget<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        let total: usize = registry.by_kind.values().map(Vec::len).sum();
        f.debug_struct("EventTarget")
            .field("listeners", &total)
            .finish()
    }
}
