//! The extension contract.
//!
//! Extensions are the unit of composition around object creation. Every hook
//! a container invokes, from registry mutation at bootstrap to destruction at
//! shutdown, is a method on [`Extension`].
//!
//! # Capabilities, Not Type Tests
//!
//! Whether a hook runs is decided by the capability tags in the extension's
//! [`ExtensionDescriptor`], which come from its definition. An extension that
//! overrides [`after_init`](Extension::after_init) but is not tagged
//! [`AFTER_INIT`](Capabilities::AFTER_INIT) is never asked.
//!
//! # Example
//!
//! ```
//! use trellis_container::component::{Component, ComponentId};
//! use trellis_container::error::HookError;
//! use trellis_container::extension::{Capabilities, Extension, HookOutcome, Tier};
//! use trellis_container::registry::Definition;
//!
//! struct Timing;
//!
//! impl Extension for Timing {
//!     fn after_init(&self, component: Component, id: &ComponentId) -> Result<HookOutcome, HookError> {
//!         println!("{id} ready");
//!         Ok(HookOutcome::Continue(component))
//!     }
//! }
//!
//! let definition = Definition::extension(|_, _| Ok(Timing))
//!     .with_capabilities(Capabilities::AFTER_INIT)
//!     .with_tier(Tier::Ordered(10));
//! ```

mod capability;

pub use capability::{Capabilities, Tier, sort_by_rank};

use core::fmt;
use std::sync::Arc;

use downcast_rs::{DowncastSync, impl_downcast};

use crate::component::{Component, ComponentId};
use crate::error::HookError;
use crate::factory::Factory;
use crate::registry::{Definition, Registry};

// ─────────────────────────────────────────────────────────────────────────────
// HookOutcome
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a before-init or after-init hook.
#[derive(Debug)]
pub enum HookOutcome {
    /// Pass the (possibly replaced) component to the next hook.
    Continue(Component),
    /// Skip the remaining hooks of this stage and use this component.
    ///
    /// Short-circuiting the before-init stage does not skip after-init.
    ShortCircuit(Component),
}

impl HookOutcome {
    /// Returns the carried component.
    #[must_use]
    pub fn into_component(self) -> Component {
        match self {
            HookOutcome::Continue(component) | HookOutcome::ShortCircuit(component) => component,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extension Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A container extension.
///
/// Extensions take part in up to three lifecycles:
///
/// 1. **Registry phase** - [`mutate_registry()`](Self::mutate_registry) may
///    register new definitions, including new extensions
/// 2. **Factory phase** - [`process_factory()`](Self::process_factory) may
///    rewrite definitions of objects that are not built yet
/// 3. **Per object** - the merged-definition, before-init, after-init and
///    destruction hooks run for every object created after the extension
///    joined the instance-hook chain
///
/// All methods default to no-ops.
pub trait Extension: DowncastSync {
    /// Returns the extension's name for logging and error messages.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Adds or modifies definitions.
    ///
    /// Called once, before any ordinary object is built.
    fn mutate_registry(&self, _registry: &Registry) -> Result<(), HookError> {
        Ok(())
    }

    /// Reads or rewrites the factory's definitions.
    ///
    /// Called once, after every registry mutator has run.
    fn process_factory(&self, _factory: &Factory) -> Result<(), HookError> {
        Ok(())
    }

    /// Observes the resolved definition of an object about to be built.
    ///
    /// Called at most once per id, before instantiation.
    fn merged_definition(
        &self,
        _definition: &Definition,
        _resolved_type: &'static str,
        _id: &ComponentId,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Sees an object before its initialization.
    fn before_init(&self, component: Component, _id: &ComponentId) -> Result<HookOutcome, HookError> {
        Ok(HookOutcome::Continue(component))
    }

    /// Sees an object after its initialization.
    fn after_init(&self, component: Component, _id: &ComponentId) -> Result<HookOutcome, HookError> {
        Ok(HookOutcome::Continue(component))
    }

    /// Returns true if [`before_destruction()`](Self::before_destruction)
    /// should be called for this singleton.
    fn requires_destruction(&self, _component: &Component) -> bool {
        true
    }

    /// Sees a singleton before it is discarded.
    fn before_destruction(&self, _component: &Component, _id: &ComponentId) -> Result<(), HookError> {
        Ok(())
    }
}

impl_downcast!(sync Extension);

// ─────────────────────────────────────────────────────────────────────────────
// ExtensionDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Identity, capability tags and tier of one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    id: ComponentId,
    capabilities: Capabilities,
    tier: Tier,
}

impl ExtensionDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(id: impl Into<ComponentId>, capabilities: Capabilities, tier: Tier) -> Self {
        Self {
            id: id.into(),
            capabilities,
            tier,
        }
    }

    /// Returns the extension's id.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Returns the capability tags.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ExtensionRef
// ─────────────────────────────────────────────────────────────────────────────

/// A materialized extension with its descriptor.
///
/// This is what the bootstrap phases invoke and what the instance-hook chain
/// holds. Cloning shares the extension object.
#[derive(Clone)]
pub struct ExtensionRef {
    descriptor: ExtensionDescriptor,
    extension: Arc<dyn Extension>,
}

impl ExtensionRef {
    /// Pairs a descriptor with an extension object.
    #[must_use]
    pub fn new(descriptor: ExtensionDescriptor, extension: Arc<dyn Extension>) -> Self {
        Self {
            descriptor,
            extension,
        }
    }

    /// Creates a pre-supplied extension with tier [`Tier::Eager`].
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_container::extension::{Capabilities, Extension, ExtensionRef, Tier};
    ///
    /// struct Scanner;
    /// impl Extension for Scanner {}
    ///
    /// let eager = ExtensionRef::eager("scanner", Capabilities::REGISTRY_MUTATOR, Scanner);
    /// assert_eq!(eager.tier(), Tier::Eager);
    /// ```
    #[must_use]
    pub fn eager<E: Extension>(
        id: impl Into<ComponentId>,
        capabilities: Capabilities,
        extension: E,
    ) -> Self {
        Self::new(
            ExtensionDescriptor::new(id, capabilities, Tier::Eager),
            Arc::new(extension),
        )
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    /// Returns the extension's id.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        self.descriptor.id()
    }

    /// Returns the capability tags.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.descriptor.capabilities()
    }

    /// Returns the tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.descriptor.tier()
    }

    /// Returns true if the extension is tagged with every given capability.
    #[must_use]
    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }

    /// Returns the extension object.
    #[must_use]
    pub fn extension(&self) -> &Arc<dyn Extension> {
        &self.extension
    }

    /// Returns the extension's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.extension.name()
    }

    /// Borrows the extension object as `E`.
    #[must_use]
    pub fn downcast_ref<E: Extension>(&self) -> Option<&E> {
        self.extension.downcast_ref::<E>()
    }

    /// Returns true if both refer to the same extension object.
    #[must_use]
    pub fn same_instance(&self, other: &ExtensionRef) -> bool {
        core::ptr::addr_eq(Arc::as_ptr(&self.extension), Arc::as_ptr(&other.extension))
    }
}

impl fmt::Debug for ExtensionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRef")
            .field("descriptor", &self.descriptor)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PluginA;
    impl Extension for PluginA {}

    struct Renamed;
    impl Extension for Renamed {
        fn name(&self) -> &str {
            "renamed"
        }
    }

    #[test]
    fn extension_default_name() {
        assert!(PluginA.name().contains("PluginA"));
        assert_eq!(Renamed.name(), "renamed");
    }

    #[test]
    fn default_hooks_pass_component_through() {
        let component = Component::new(5_u32);
        let id = ComponentId::from("five");

        let outcome = PluginA.before_init(component.clone(), &id).unwrap();
        assert!(matches!(outcome, HookOutcome::Continue(_)));
        assert!(outcome.into_component().ptr_eq(&component));

        let outcome = PluginA.after_init(component.clone(), &id).unwrap();
        assert!(outcome.into_component().ptr_eq(&component));
        assert!(PluginA.requires_destruction(&component));
    }

    #[test]
    fn eager_ref_has_eager_tier() {
        let eager = ExtensionRef::eager("a", Capabilities::REGISTRY_MUTATOR, PluginA);
        assert_eq!(eager.tier(), Tier::Eager);
        assert!(eager.has(Capabilities::REGISTRY_MUTATOR));
        assert!(!eager.has(Capabilities::FACTORY_READER));
        assert_eq!(eager.id().as_str(), "a");
    }

    #[test]
    fn same_instance_compares_objects() {
        let a = ExtensionRef::eager("a", Capabilities::AFTER_INIT, PluginA);
        let clone = a.clone();
        let other = ExtensionRef::eager("a", Capabilities::AFTER_INIT, PluginA);
        assert!(a.same_instance(&clone));
        assert!(!a.same_instance(&other));
    }

    #[test]
    fn downcast_to_concrete_extension() {
        let a = ExtensionRef::eager("a", Capabilities::AFTER_INIT, PluginA);
        assert!(a.downcast_ref::<PluginA>().is_some());
        assert!(a.downcast_ref::<Renamed>().is_none());
    }
}
