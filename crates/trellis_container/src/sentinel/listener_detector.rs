//! Detection of event listeners among created components.
//!
//! [`SingletonEligibility`] records which ids may register as listeners.
//! [`EventListenerDetector`] adds eligible listeners to the context and
//! removes them again when they are destroyed.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::component::{Component, ComponentId};
use crate::context::ContextHandle;
use crate::error::HookError;
use crate::extension::{
    Capabilities, Extension, ExtensionDescriptor, ExtensionRef, HookOutcome, Tier,
};
use crate::registry::Definition;

// ─────────────────────────────────────────────────────────────────────────────
// SingletonEligibility
// ─────────────────────────────────────────────────────────────────────────────

/// Which ids may be registered as listeners when created.
///
/// `true` is recorded for singleton-scoped definitions when their merged
/// definition is resolved. `false` marks a listener whose scope was unknown
/// when it was created. A key is written at most twice, so last write wins.
#[derive(Debug, Default)]
pub struct SingletonEligibility {
    entries: RwLock<HashMap<ComponentId, bool>>,
}

impl SingletonEligibility {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded flag, if any.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> Option<bool> {
        self.entries.read().get(id).copied()
    }

    /// Records a flag.
    pub fn set(&self, id: ComponentId, eligible: bool) {
        self.entries.write().insert(id, eligible);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no entries are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventListenerDetector
// ─────────────────────────────────────────────────────────────────────────────

/// Registers singleton listeners with the multicaster as they are created,
/// and unregisters them on destruction.
///
/// Catches listeners the refresh sweep cannot see: singletons created later,
/// and inner singletons that have no top-level definition.
pub struct EventListenerDetector {
    handle: ContextHandle,
    eligibility: Arc<SingletonEligibility>,
}

impl EventListenerDetector {
    /// Id of the detector in the instance-hook chain.
    pub const ID: &'static str = "trellis.event_listener_detector";

    /// Creates a detector for a context.
    #[must_use]
    pub fn new(handle: ContextHandle, eligibility: Arc<SingletonEligibility>) -> Self {
        Self {
            handle,
            eligibility,
        }
    }

    /// Returns the eligibility map.
    #[must_use]
    pub fn eligibility(&self) -> &Arc<SingletonEligibility> {
        &self.eligibility
    }

    /// Wraps the detector for the instance-hook chain.
    #[must_use]
    pub fn into_extension(self) -> ExtensionRef {
        ExtensionRef::new(
            ExtensionDescriptor::new(
                Self::ID,
                Capabilities::MERGED_DEFINITION | Capabilities::AFTER_INIT | Capabilities::DESTRUCTION,
                Tier::Eager,
            ),
            Arc::new(self),
        )
    }
}

impl Extension for EventListenerDetector {
    fn name(&self) -> &str {
        "EventListenerDetector"
    }

    fn merged_definition(
        &self,
        definition: &Definition,
        _resolved_type: &'static str,
        id: &ComponentId,
    ) -> Result<(), HookError> {
        if definition.is_singleton() {
            self.eligibility.set(id.clone(), true);
        }
        Ok(())
    }

    fn after_init(&self, component: Component, id: &ComponentId) -> Result<HookOutcome, HookError> {
        if !component.is_listener() {
            return Ok(HookOutcome::Continue(component));
        }
        let Some(listener) = component.as_listener().cloned() else {
            return Ok(HookOutcome::Continue(component));
        };

        match self.eligibility.get(id) {
            Some(true) => {
                tracing::debug!(component = %id, "registering listener");
                self.handle.add_listener(listener);
            }
            Some(false) => {}
            None => {
                if !self.handle.contains_component(id) {
                    tracing::warn!(
                        component = %id,
                        type_name = component.type_name(),
                        "inner component is an event listener but is not reachable for \
                         event multicasting because it does not have singleton scope"
                    );
                }
                self.eligibility.set(id.clone(), false);
            }
        }
        Ok(HookOutcome::Continue(component))
    }

    fn requires_destruction(&self, component: &Component) -> bool {
        component.is_listener()
    }

    fn before_destruction(&self, component: &Component, id: &ComponentId) -> Result<(), HookError> {
        if let Some(listener) = component.as_listener() {
            let multicaster = self.handle.multicaster();
            multicaster.remove_listener(listener);
            multicaster.remove_listener_id(id);
        }
        Ok(())
    }
}
