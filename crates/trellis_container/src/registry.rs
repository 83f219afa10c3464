//! Component definitions and the definition registry.
//!
//! A [`Definition`] describes how to build one managed object and which
//! capabilities and tier that object declares. The [`Registry`] maps ids to
//! definitions in discovery order and answers capability queries from the
//! definitions alone, so the bootstrap can classify extensions without
//! instantiating anything.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::component::{Component, ComponentId};
use crate::error::{ConfigurationError, HookError};
use crate::event::EventListener;
use crate::extension::{Capabilities, Extension, Tier};
use crate::factory::Factory;

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// How many instances a definition yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One shared instance per factory, cached and torn down with the factory.
    #[default]
    Singleton,
    /// A new instance per request, never cached and never torn down.
    Prototype,
}

// ─────────────────────────────────────────────────────────────────────────────
// Definition
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a component from its definition.
type Constructor =
    Arc<dyn Fn(&Factory, &Definition) -> Result<Component, HookError> + Send + Sync>;

/// Metadata describing how to build one managed object.
///
/// Cloning is cheap; the constructor is shared.
///
/// # Example
///
/// ```
/// use trellis_container::extension::{Capabilities, Extension, Tier};
/// use trellis_container::registry::{Definition, Scope};
///
/// struct Pool { size: usize }
///
/// let pool = Definition::of(|_, definition| {
///     let size = definition.attribute("size").and_then(|s| s.parse().ok()).unwrap_or(4);
///     Ok(Pool { size })
/// })
/// .with_attribute("size", "8");
/// assert_eq!(pool.scope(), Scope::Singleton);
///
/// struct Audit;
/// impl Extension for Audit {}
///
/// let audit = Definition::extension(|_, _| Ok(Audit))
///     .with_capabilities(Capabilities::AFTER_INIT)
///     .with_tier(Tier::HighPriority(0));
/// assert!(audit.capabilities().contains(Capabilities::AFTER_INIT));
/// ```
#[derive(Clone)]
pub struct Definition {
    type_name: &'static str,
    scope: Scope,
    capabilities: Capabilities,
    tier: Tier,
    lazy_init: bool,
    attributes: BTreeMap<String, String>,
    constructor: Constructor,
}

impl Definition {
    /// Creates a definition from a constructor returning a ready component.
    #[must_use]
    pub fn from_fn<F>(type_name: &'static str, constructor: F) -> Self
    where
        F: Fn(&Factory, &Definition) -> Result<Component, HookError> + Send + Sync + 'static,
    {
        Self {
            type_name,
            scope: Scope::Singleton,
            capabilities: Capabilities::empty(),
            tier: Tier::Unordered,
            lazy_init: false,
            attributes: BTreeMap::new(),
            constructor: Arc::new(constructor),
        }
    }

    /// Creates a definition for a plain object of type `T`.
    #[must_use]
    pub fn of<T, F>(constructor: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Factory, &Definition) -> Result<T, HookError> + Send + Sync + 'static,
    {
        Self::from_fn(core::any::type_name::<T>(), move |factory, definition| {
            constructor(factory, definition).map(Component::new)
        })
    }

    /// Creates a definition for an extension of type `E`.
    ///
    /// The extension's hook capabilities and tier are declared with
    /// [`with_capabilities()`](Self::with_capabilities) and
    /// [`with_tier()`](Self::with_tier).
    #[must_use]
    pub fn extension<E, F>(constructor: F) -> Self
    where
        E: Extension,
        F: Fn(&Factory, &Definition) -> Result<E, HookError> + Send + Sync + 'static,
    {
        Self::from_fn(core::any::type_name::<E>(), move |factory, definition| {
            constructor(factory, definition).map(Component::extension)
        })
    }

    /// Creates a definition for an event listener of type `L`.
    #[must_use]
    pub fn listener<L, F>(constructor: F) -> Self
    where
        L: EventListener,
        F: Fn(&Factory, &Definition) -> Result<L, HookError> + Send + Sync + 'static,
    {
        Self::from_fn(core::any::type_name::<L>(), move |factory, definition| {
            constructor(factory, definition).map(Component::listener)
        })
        .with_capabilities(Capabilities::EVENT_LISTENER)
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Shorthand for `with_scope(Scope::Prototype)`.
    #[must_use]
    pub fn prototype(self) -> Self {
        self.with_scope(Scope::Prototype)
    }

    /// Adds capability tags.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    /// Sets the tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Excludes a singleton from pre-instantiation at the end of refresh.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy_init = true;
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the type name of the object this definition builds.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns true for singleton scope.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.scope == Scope::Singleton
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

    /// Returns true if the definition is excluded from pre-instantiation.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.lazy_init
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns all attributes in key order.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Sets an attribute in place, returning the previous value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Sets the scope in place.
    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    /// Sets lazy initialization in place.
    pub fn set_lazy(&mut self, lazy: bool) {
        self.lazy_init = lazy;
    }

    /// Runs the constructor.
    pub(crate) fn construct(&self, factory: &Factory) -> Result<Component, HookError> {
        (self.constructor)(factory, self)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("capabilities", &self.capabilities)
            .field("tier", &self.tier)
            .field("lazy_init", &self.lazy_init)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Definitions in discovery order.
#[derive(Default)]
struct Entries {
    order: Vec<ComponentId>,
    definitions: HashMap<ComponentId, Definition>,
}

/// Insertion-ordered map of id to definition.
///
/// Uses interior mutability so registry mutators can register definitions
/// through a shared reference while the bootstrap iterates.
///
/// # Example
///
/// ```
/// use trellis_container::extension::Capabilities;
/// use trellis_container::registry::{Definition, Registry};
///
/// let registry = Registry::new();
/// registry.register("a", Definition::of(|_, _| Ok(1_u8))).unwrap();
/// registry
///     .register("b", Definition::of(|_, _| Ok(2_u8)).with_capabilities(Capabilities::FACTORY_READER))
///     .unwrap();
///
/// let readers = registry.query(Capabilities::FACTORY_READER, true);
/// assert_eq!(readers.len(), 1);
/// assert_eq!(readers[0].as_str(), "b");
/// ```
pub struct Registry {
    entries: RwLock<Entries>,
    allow_overriding: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry that allows overriding definitions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_overriding(true)
    }

    /// Creates an empty registry with the given overriding policy.
    #[must_use]
    pub fn with_overriding(allow_overriding: bool) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            allow_overriding,
        }
    }

    /// Registers a definition.
    ///
    /// Re-registering an id replaces the definition but keeps its discovery
    /// position.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::DuplicateDefinition`] if the id exists and
    /// overriding is disabled.
    pub fn register(
        &self,
        id: impl Into<ComponentId>,
        definition: Definition,
    ) -> Result<(), ConfigurationError> {
        let id = id.into();
        let mut entries = self.entries.write();

        if entries.definitions.contains_key(&id) {
            if !self.allow_overriding {
                return Err(ConfigurationError::DuplicateDefinition(id));
            }
            tracing::debug!(component = %id, "overriding definition");
        } else {
            entries.order.push(id.clone());
        }

        entries.definitions.insert(id, definition);
        Ok(())
    }

    /// Rewrites a definition.
    ///
    /// `f` edits a copy taken without holding the registry lock, so it may
    /// read or register other definitions. The copy replaces the stored
    /// definition afterwards.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::NoSuchDefinition`] if the id is unknown, or if
    /// `f` removed it.
    pub fn update<R>(
        &self,
        id: &ComponentId,
        f: impl FnOnce(&mut Definition) -> R,
    ) -> Result<R, ConfigurationError> {
        let mut definition = self
            .definition(id)
            .ok_or_else(|| ConfigurationError::NoSuchDefinition(id.clone()))?;
        let result = f(&mut definition);

        let mut entries = self.entries.write();
        let stored = entries
            .definitions
            .get_mut(id)
            .ok_or_else(|| ConfigurationError::NoSuchDefinition(id.clone()))?;
        *stored = definition;
        Ok(result)
    }

    /// Removes a definition and returns it.
    pub fn remove(&self, id: &ComponentId) -> Option<Definition> {
        let mut entries = self.entries.write();
        let removed = entries.definitions.remove(id)?;
        entries.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Returns a copy of a definition.
    #[must_use]
    pub fn definition(&self, id: &ComponentId) -> Option<Definition> {
        self.entries.read().definitions.get(id).cloned()
    }

    /// Returns true if a definition with this id exists.
    #[must_use]
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entries.read().definitions.contains_key(id)
    }

    /// Returns the ids of definitions tagged with any of the given
    /// capabilities, in discovery order.
    ///
    /// Only definitions are consulted; nothing is instantiated.
    #[must_use]
    pub fn query(&self, capability: Capabilities, include_non_singletons: bool) -> Vec<ComponentId> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter(|id| {
                entries.definitions.get(*id).is_some_and(|definition| {
                    definition.capabilities().intersects(capability)
                        && (include_non_singletons || definition.is_singleton())
                })
            })
            .cloned()
            .collect()
    }

    /// Returns true if the definition is tagged with every given capability.
    #[must_use]
    pub fn is_type_match(&self, id: &ComponentId, capability: Capabilities) -> bool {
        self.entries
            .read()
            .definitions
            .get(id)
            .is_some_and(|definition| definition.capabilities().contains(capability))
    }

    /// Returns all ids in discovery order.
    #[must_use]
    pub fn ids(&self) -> Vec<ComponentId> {
        self.entries.read().order.clone()
    }

    /// Returns the number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    /// Returns true if no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().order.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("ids", &self.entries.read().order)
            .field("allow_overriding", &self.allow_overriding)
            .finish()
    }
}
