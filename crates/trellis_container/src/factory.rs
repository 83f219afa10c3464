//! The component factory and its instance-hook chain.
//!
//! The [`Factory`] builds components from the definitions in its
//! [`Registry`], caches singletons, and runs every creation and teardown
//! through the instance-hook chain.
//!
//! # Creation Lifecycle
//!
//! 1. **Merged definition** - hooks tagged
//!    [`MERGED_DEFINITION`](Capabilities::MERGED_DEFINITION) observe the
//!    definition, at most once per id
//! 2. **Construction** - the definition's constructor runs and the result is
//!    stamped with the definition's capability tags
//! 3. **Before init** - hooks tagged [`BEFORE_INIT`](Capabilities::BEFORE_INIT)
//!    may replace the component or short-circuit the stage
//! 4. **After init** - the same for [`AFTER_INIT`](Capabilities::AFTER_INIT)
//!
//! Each creation reads the chain as it is at that moment. Objects created
//! during bootstrap only see the extensions registered so far.
//!
//! # Concurrency
//!
//! The chain is swapped atomically and read without locks. Singleton creation
//! is serialized by a re-entrant lock so a constructor can request its own
//! dependencies from the same factory.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, ReentrantMutex};

use crate::component::{Component, ComponentId};
use crate::error::{ConfigurationError, HookPhase, LifecycleError, TeardownError};
use crate::extension::{Capabilities, ExtensionDescriptor, ExtensionRef, HookOutcome, Tier};
use crate::registry::{Definition, Registry};

/// Initialization stage walked by [`Factory::run_init_stage`].
#[derive(Debug, Clone, Copy)]
enum InitStage {
    Before,
    After,
}

impl InitStage {
    fn capability(self) -> Capabilities {
        match self {
            InitStage::Before => Capabilities::BEFORE_INIT,
            InitStage::After => Capabilities::AFTER_INIT,
        }
    }

    fn phase(self) -> HookPhase {
        match self {
            InitStage::Before => HookPhase::BeforeInit,
            InitStage::After => HookPhase::AfterInit,
        }
    }
}

/// Builds components and owns the instance-hook chain.
pub struct Factory {
    /// Definitions this factory builds from.
    registry: Arc<Registry>,

    /// Singleton cache.
    singletons: Mutex<HashMap<ComponentId, Component>>,

    /// Singleton ids in creation order; teardown walks it in reverse.
    disposal_order: Mutex<Vec<ComponentId>>,

    /// Singletons currently being created on the locking thread.
    in_creation: Mutex<HashSet<ComponentId>>,

    /// Ids whose merged-definition hooks have run.
    merged_applied: Mutex<HashSet<ComponentId>>,

    /// Serializes singleton creation. Re-entrant for nested dependencies.
    creation_lock: ReentrantMutex<()>,

    /// Set while [`destroy_singletons()`](Self::destroy_singletons) runs.
    in_destruction: AtomicBool,

    /// The instance-hook chain.
    chain: ArcSwap<Vec<ExtensionRef>>,
}

impl Factory {
    /// Creates a factory over a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            singletons: Mutex::new(HashMap::new()),
            disposal_order: Mutex::new(Vec::new()),
            in_creation: Mutex::new(HashSet::new()),
            merged_applied: Mutex::new(HashSet::new()),
            creation_lock: ReentrantMutex::new(()),
            in_destruction: AtomicBool::new(false),
            chain: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Component Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the component with this id, creating it if needed.
    ///
    /// Singletons are created once and cached. Prototypes are created on
    /// every call.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NoSuchDefinition`] if the id is unknown
    /// - [`LifecycleError::CurrentlyInCreation`] if a singleton requests
    ///   itself while being created
    /// - [`LifecycleError::CreationNotAllowed`] if an uncached singleton is
    ///   requested while singletons are being destroyed
    /// - [`LifecycleError::Construction`] or [`LifecycleError::HookFailed`]
    ///   if creation fails
    pub fn get_instance(&self, id: &ComponentId) -> Result<Component, LifecycleError> {
        if let Some(component) = self.cached(id) {
            return Ok(component);
        }

        let definition = self
            .registry
            .definition(id)
            .ok_or_else(|| LifecycleError::NoSuchDefinition(id.clone()))?;

        if !definition.is_singleton() {
            return self.create(id, &definition);
        }

        let _guard = self.creation_lock.lock();

        // Another thread may have finished while we waited.
        if let Some(component) = self.cached(id) {
            return Ok(component);
        }

        if self.in_destruction.load(Ordering::Acquire) {
            return Err(LifecycleError::CreationNotAllowed(id.clone()));
        }

        if !self.in_creation.lock().insert(id.clone()) {
            return Err(LifecycleError::CurrentlyInCreation(id.clone()));
        }
        let result = self.create(id, &definition);
        self.in_creation.lock().remove(id);

        let component = result?;
        self.singletons.lock().insert(id.clone(), component.clone());
        self.disposal_order.lock().push(id.clone());
        Ok(component)
    }

    /// Returns the component with this id as `T`.
    ///
    /// # Errors
    ///
    /// Everything [`get_instance()`](Self::get_instance) returns, plus
    /// [`LifecycleError::TypeMismatch`] if the component is not a `T`.
    pub fn get<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ComponentId>,
    ) -> Result<Arc<T>, LifecycleError> {
        let id = id.into();
        let component = self.get_instance(&id)?;
        component
            .downcast::<T>()
            .ok_or_else(|| LifecycleError::TypeMismatch {
                id,
                expected: core::any::type_name::<T>(),
                actual: component.type_name(),
            })
    }

    /// Instantiates an extension and pairs it with its definition's descriptor.
    ///
    /// Capabilities and tier come from the definition, never from the object.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::NoSuchDefinition`] if the id is unknown
    /// - [`ConfigurationError::ReservedTier`] if the definition declares
    ///   [`Tier::Eager`]
    /// - [`ConfigurationError::Instantiation`] if creation fails
    /// - [`ConfigurationError::NotAnExtension`] if the object has no
    ///   extension view
    pub fn get_extension(&self, id: &ComponentId) -> Result<ExtensionRef, ConfigurationError> {
        let definition = self
            .registry
            .definition(id)
            .ok_or_else(|| ConfigurationError::NoSuchDefinition(id.clone()))?;

        if definition.tier() == Tier::Eager {
            return Err(ConfigurationError::ReservedTier {
                id: id.clone(),
                tier: definition.tier(),
            });
        }

        let component = self
            .get_instance(id)
            .map_err(|source| ConfigurationError::Instantiation {
                id: id.clone(),
                source,
            })?;

        let extension = component.as_extension().cloned().ok_or_else(|| {
            ConfigurationError::NotAnExtension {
                id: id.clone(),
                type_name: component.type_name(),
            }
        })?;

        Ok(ExtensionRef::new(
            ExtensionDescriptor::new(id.clone(), definition.capabilities(), definition.tier()),
            extension,
        ))
    }

    /// Creates an inner object through the full hook lifecycle.
    ///
    /// The id is not registered, the object is not cached, and it is not torn
    /// down with the factory.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Construction`] or [`LifecycleError::HookFailed`].
    pub fn create_inner(
        &self,
        id: impl Into<ComponentId>,
        definition: &Definition,
    ) -> Result<Component, LifecycleError> {
        self.create(&id.into(), definition)
    }

    /// Returns true if a singleton with this id has been created.
    #[must_use]
    pub fn is_instantiated(&self, id: &ComponentId) -> bool {
        self.singletons.lock().contains_key(id)
    }

    /// Returns the number of cached singletons.
    #[must_use]
    pub fn singleton_count(&self) -> usize {
        self.singletons.lock().len()
    }

    /// Creates every non-lazy singleton in discovery order.
    ///
    /// # Errors
    ///
    /// The first creation failure.
    pub fn preinstantiate_singletons(&self) -> Result<(), LifecycleError> {
        for id in self.registry.ids() {
            let eager = self
                .registry
                .definition(&id)
                .is_some_and(|definition| definition.is_singleton() && !definition.is_lazy());
            if eager {
                self.get_instance(&id)?;
            }
        }
        Ok(())
    }

    fn cached(&self, id: &ComponentId) -> Option<Component> {
        self.singletons.lock().get(id).cloned()
    }

    fn create(&self, id: &ComponentId, definition: &Definition) -> Result<Component, LifecycleError> {
        let chain = self.chain.load_full();
        tracing::debug!(component = %id, type_name = definition.type_name(), "creating component");

        self.apply_merged_definition(&chain, id, definition)?;

        let component = definition
            .construct(self)
            .map_err(|source| LifecycleError::Construction {
                id: id.clone(),
                source,
            })?
            .with_capabilities(definition.capabilities());

        let component = Self::run_init_stage(&chain, InitStage::Before, component, id)?;
        Self::run_init_stage(&chain, InitStage::After, component, id)
    }

    fn apply_merged_definition(
        &self,
        chain: &[ExtensionRef],
        id: &ComponentId,
        definition: &Definition,
    ) -> Result<(), LifecycleError> {
        if !self.merged_applied.lock().insert(id.clone()) {
            return Ok(());
        }

        for entry in chain.iter().filter(|e| e.has(Capabilities::MERGED_DEFINITION)) {
            if let Err(source) =
                entry
                    .extension()
                    .merged_definition(definition, definition.type_name(), id)
            {
                // A later attempt must see the hooks again.
                self.merged_applied.lock().remove(id);
                return Err(LifecycleError::HookFailed {
                    id: id.clone(),
                    extension: entry.id().clone(),
                    phase: HookPhase::MergedDefinition,
                    source,
                });
            }
        }
        Ok(())
    }

    fn run_init_stage(
        chain: &[ExtensionRef],
        stage: InitStage,
        component: Component,
        id: &ComponentId,
    ) -> Result<Component, LifecycleError> {
        let mut current = component;
        for entry in chain.iter().filter(|e| e.has(stage.capability())) {
            let outcome = match stage {
                InitStage::Before => entry.extension().before_init(current, id),
                InitStage::After => entry.extension().after_init(current, id),
            }
            .map_err(|source| LifecycleError::HookFailed {
                id: id.clone(),
                extension: entry.id().clone(),
                phase: stage.phase(),
                source,
            })?;

            match outcome {
                HookOutcome::Continue(next) => current = next,
                HookOutcome::ShortCircuit(next) => {
                    tracing::trace!(
                        component = %id,
                        extension = %entry.id(),
                        phase = %stage.phase(),
                        "short-circuited"
                    );
                    return Ok(next);
                }
            }
        }
        Ok(current)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Instance-Hook Chain
    // ─────────────────────────────────────────────────────────────────────────

    /// Appends an extension to the instance-hook chain.
    ///
    /// An extension already in the chain is moved to the end rather than
    /// duplicated.
    pub fn add_instance_extension(&self, extension: ExtensionRef) {
        tracing::debug!(
            extension = %extension.id(),
            tier = ?extension.tier(),
            "adding instance extension"
        );
        self.chain.rcu(|chain| {
            let mut next: Vec<ExtensionRef> = chain
                .iter()
                .filter(|existing| !existing.same_instance(&extension))
                .cloned()
                .collect();
            next.push(extension.clone());
            next
        });
    }

    /// Returns the number of extensions in the instance-hook chain.
    #[must_use]
    pub fn instance_extension_count(&self) -> usize {
        self.chain.load().len()
    }

    /// Returns a snapshot of the instance-hook chain.
    #[must_use]
    pub fn instance_extensions(&self) -> Vec<ExtensionRef> {
        self.chain.load().as_ref().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────────

    /// Destroys every cached singleton in reverse creation order.
    ///
    /// For each singleton, destruction hooks run in chain order, skipping
    /// extensions whose [`requires_destruction()`](crate::extension::Extension::requires_destruction)
    /// returns false. Failures are logged and collected; teardown always
    /// continues.
    ///
    /// Singletons not yet destroyed stay reachable from the hooks. Requests
    /// for any other singleton fail with
    /// [`LifecycleError::CreationNotAllowed`] until teardown finishes.
    pub fn destroy_singletons(&self) -> Vec<TeardownError> {
        let _guard = self.creation_lock.lock();
        self.in_destruction.store(true, Ordering::Release);
        let order = core::mem::take(&mut *self.disposal_order.lock());
        let chain = self.chain.load_full();
        let mut errors = Vec::new();

        for id in order.iter().rev() {
            let Some(component) = self.singletons.lock().remove(id) else {
                continue;
            };
            tracing::debug!(component = %id, "destroying singleton");

            for entry in chain.iter().filter(|e| e.has(Capabilities::DESTRUCTION)) {
                if !entry.extension().requires_destruction(&component) {
                    continue;
                }
                if let Err(source) = entry.extension().before_destruction(&component, id) {
                    tracing::warn!(
                        component = %id,
                        extension = %entry.id(),
                        error = %source,
                        "destruction hook failed"
                    );
                    errors.push(TeardownError {
                        id: id.clone(),
                        extension: entry.id().clone(),
                        source,
                    });
                }
            }
        }

        self.singletons.lock().clear();
        self.merged_applied.lock().clear();
        self.in_destruction.store(false, Ordering::Release);
        errors
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("registry", &self.registry)
            .field("singletons", &self.singleton_count())
            .field("instance_extensions", &self.instance_extension_count())
            .finish_non_exhaustive()
    }
}
