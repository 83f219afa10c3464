//! Component identifiers and realized managed objects.
//!
//! A [`Component`] is what the factory hands out: a type-erased, shareable
//! object together with the capability tags it was created with. Capability
//! checks on produced objects (is this an extension? a listener?) read those
//! tags and typed views instead of probing the live value.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use crate::event::EventListener;
use crate::extension::{Capabilities, Extension};

// ─────────────────────────────────────────────────────────────────────────────
// ComponentId
// ─────────────────────────────────────────────────────────────────────────────

/// Name of a component definition or of an inner object.
///
/// Cloning is cheap; the string is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(Arc<str>);

impl ComponentId {
    /// Creates a new identifier.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&ComponentId> for ComponentId {
    fn from(id: &ComponentId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component
// ─────────────────────────────────────────────────────────────────────────────

/// Type-erased object value.
type BoxedValue = Arc<dyn Any + Send + Sync>;

/// A realized managed object.
///
/// Cloning a `Component` clones the handle, not the object: two clones
/// compare equal under [`ptr_eq`](Self::ptr_eq).
///
/// # Example
///
/// ```
/// use trellis_container::component::Component;
///
/// struct Pool { size: usize }
///
/// let component = Component::new(Pool { size: 4 });
/// assert_eq!(component.downcast_ref::<Pool>().unwrap().size, 4);
/// assert!(component.type_name().ends_with("Pool"));
/// ```
#[derive(Clone)]
pub struct Component {
    value: BoxedValue,
    type_name: &'static str,
    capabilities: Capabilities,
    listener: Option<Arc<dyn EventListener>>,
    extension: Option<Arc<dyn Extension>>,
}

impl Component {
    /// Wraps a plain value.
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value.
    #[must_use]
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: core::any::type_name::<T>(),
            capabilities: Capabilities::empty(),
            listener: None,
            extension: None,
        }
    }

    /// Wraps an event listener, tagging it with [`Capabilities::EVENT_LISTENER`].
    #[must_use]
    pub fn listener<L: EventListener>(listener: L) -> Self {
        let listener = Arc::new(listener);
        Self {
            value: listener.clone(),
            type_name: core::any::type_name::<L>(),
            capabilities: Capabilities::EVENT_LISTENER,
            listener: Some(listener),
            extension: None,
        }
    }

    /// Wraps an extension object.
    ///
    /// The hook capabilities are stamped by the factory from the definition
    /// that produced the extension.
    #[must_use]
    pub fn extension<E: Extension>(extension: E) -> Self {
        let extension = Arc::new(extension);
        Self {
            value: extension.clone(),
            type_name: core::any::type_name::<E>(),
            capabilities: Capabilities::empty(),
            listener: None,
            extension: Some(extension),
        }
    }

    /// Adds capability tags to this component.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    /// Returns the capability tags of this component.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the type name of the wrapped value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if this component is tagged as an event listener and
    /// carries a listener view.
    #[must_use]
    pub fn is_listener(&self) -> bool {
        self.listener.is_some() && self.capabilities.contains(Capabilities::EVENT_LISTENER)
    }

    /// Returns the event-listener view of this component, if any.
    #[must_use]
    pub fn as_listener(&self) -> Option<&Arc<dyn EventListener>> {
        self.listener.as_ref()
    }

    /// Returns the extension view of this component, if any.
    #[must_use]
    pub fn as_extension(&self) -> Option<&Arc<dyn Extension>> {
        self.extension.as_ref()
    }

    /// Borrows the wrapped value as `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns a shared handle to the wrapped value as `T`.
    #[must_use]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Returns true if both components wrap the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Component) -> bool {
        core::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("type_name", &self.type_name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ContainerEvent;

    struct Pool {
        size: usize,
    }

    struct Audit;
    impl EventListener for Audit {
        fn on_event(&self, _event: &ContainerEvent) {}
    }

    struct Noop;
    impl Extension for Noop {}

    #[test]
    fn component_id_display_and_equality() {
        let a = ComponentId::from("dataSource");
        let b = ComponentId::from(String::from("dataSource"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "dataSource");
        assert_eq!(a.as_str(), "dataSource");
    }

    #[test]
    fn plain_component_has_no_views() {
        let component = Component::new(Pool { size: 2 });
        assert!(component.capabilities().is_empty());
        assert!(component.as_listener().is_none());
        assert!(component.as_extension().is_none());
        assert!(!component.is_listener());
        assert_eq!(component.downcast::<Pool>().unwrap().size, 2);
        assert!(component.downcast_ref::<Audit>().is_none());
    }

    #[test]
    fn listener_component_is_tagged() {
        let component = Component::listener(Audit);
        assert!(component.is_listener());
        assert!(component.capabilities().contains(Capabilities::EVENT_LISTENER));
        assert!(component.downcast_ref::<Audit>().is_some());
    }

    #[test]
    fn extension_component_exposes_view() {
        let component = Component::extension(Noop)
            .with_capabilities(Capabilities::AFTER_INIT | Capabilities::BEFORE_INIT);
        assert!(component.as_extension().is_some());
        assert!(component.capabilities().intersects(Capabilities::INSTANCE_HOOKS));
    }

    #[test]
    fn clones_share_identity() {
        let component = Component::new(Pool { size: 1 });
        let clone = component.clone();
        let other = Component::new(Pool { size: 1 });
        assert!(component.ptr_eq(&clone));
        assert!(!component.ptr_eq(&other));
    }
}
