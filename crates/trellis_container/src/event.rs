//! Container events and the listener multicaster.
//!
//! Listeners are reached two ways: as objects added directly, or as ids that
//! are resolved to singletons when an event is published. Ids are what the
//! refresh sweep records, so listeners that are never requested stay unbuilt
//! until the first event.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::component::ComponentId;

/// Receives container events.
pub trait EventListener: Send + Sync + 'static {
    /// Called for every published event.
    fn on_event(&self, event: &ContainerEvent);
}

/// An event dispatched by the multicaster.
#[derive(Clone)]
pub enum ContainerEvent {
    /// The context finished refreshing and is running.
    Refreshed,
    /// The context is closing; singletons are still alive.
    Closed,
    /// An application-defined payload.
    Published(Arc<dyn Any + Send + Sync>),
}

impl ContainerEvent {
    /// Wraps an application payload.
    #[must_use]
    pub fn published<T: Send + Sync + 'static>(payload: T) -> Self {
        ContainerEvent::Published(Arc::new(payload))
    }

    /// Borrows the payload as `T`, if this is a published event of that type.
    #[must_use]
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        match self {
            ContainerEvent::Published(payload) => payload.downcast_ref::<T>(),
            ContainerEvent::Refreshed | ContainerEvent::Closed => None,
        }
    }
}

impl fmt::Debug for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerEvent::Refreshed => f.write_str("Refreshed"),
            ContainerEvent::Closed => f.write_str("Closed"),
            ContainerEvent::Published(_) => f.write_str("Published(..)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventMulticaster
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ListenerSet {
    listeners: Vec<Arc<dyn EventListener>>,
    ids: Vec<ComponentId>,
}

/// Registered listener objects and listener ids.
///
/// Objects are compared by identity. Both collections keep insertion order
/// and never hold duplicates.
#[derive(Default)]
pub struct EventMulticaster {
    inner: RwLock<ListenerSet>,
}

impl EventMulticaster {
    /// Creates an empty multicaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener object. Returns false if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> bool {
        let mut inner = self.inner.write();
        if inner.listeners.iter().any(|existing| same_listener(existing, &listener)) {
            return false;
        }
        inner.listeners.push(listener);
        true
    }

    /// Adds a listener id. Returns false if it was already registered.
    pub fn add_listener_id(&self, id: ComponentId) -> bool {
        let mut inner = self.inner.write();
        if inner.ids.contains(&id) {
            return false;
        }
        inner.ids.push(id);
        true
    }

    /// Removes a listener object by identity. Returns true if it was present.
    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut inner = self.inner.write();
        let before = inner.listeners.len();
        inner.listeners.retain(|existing| !same_listener(existing, listener));
        inner.listeners.len() != before
    }

    /// Removes a listener id. Returns true if it was present.
    pub fn remove_listener_id(&self, id: &ComponentId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.ids.len();
        inner.ids.retain(|existing| existing != id);
        inner.ids.len() != before
    }

    /// Removes every listener object and id.
    pub fn remove_all(&self) {
        let mut inner = self.inner.write();
        inner.listeners.clear();
        inner.ids.clear();
    }

    /// Returns a snapshot of the listener objects.
    #[must_use]
    pub fn listeners(&self) -> Vec<Arc<dyn EventListener>> {
        self.inner.read().listeners.clone()
    }

    /// Returns a snapshot of the listener ids.
    #[must_use]
    pub fn listener_ids(&self) -> Vec<ComponentId> {
        self.inner.read().ids.clone()
    }

    /// Returns true if this listener object is registered.
    #[must_use]
    pub fn contains_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        self.inner
            .read()
            .listeners
            .iter()
            .any(|existing| same_listener(existing, listener))
    }

    /// Returns true if this listener id is registered.
    #[must_use]
    pub fn contains_listener_id(&self, id: &ComponentId) -> bool {
        self.inner.read().ids.contains(id)
    }

    /// Returns the number of listener objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().listeners.len()
    }

    /// Returns true if no listener objects or ids are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.listeners.is_empty() && inner.ids.is_empty()
    }

    /// Delivers an event to every registered listener object.
    ///
    /// Listener ids are not resolved here; see
    /// [`Context::publish_event`](crate::context::Context::publish_event).
    pub fn multicast(&self, event: &ContainerEvent) {
        for listener in self.listeners() {
            listener.on_event(event);
        }
    }
}

impl fmt::Debug for EventMulticaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("EventMulticaster")
            .field("listeners", &inner.listeners.len())
            .field("ids", &inner.ids)
            .finish()
    }
}

/// Identity comparison for listener objects.
pub(crate) fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    core::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
