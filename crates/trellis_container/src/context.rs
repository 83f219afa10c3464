//! The context that drives refresh and close.
//!
//! A [`Context`] collects definitions and pre-supplied extensions, then builds
//! a fresh [`Factory`] on every [`refresh()`](Context::refresh).
//!
//! # Lifecycle
//!
//! ```text
//! Created → RegistryPhaseDone → FactoryPhaseDone → InstanceChainBuilt → Running
//!                                                                          │
//!                                                   Terminated ← Destroying┘
//! ```
//!
//! Each refresh walks the states in order:
//!
//! 1. **Prepare** - a fresh factory is built from the registered definitions;
//!    pre-supplied instance extensions join the chain, followed by an early
//!    [`EventListenerDetector`]
//! 2. **Registry phase** - [`RegistryExtensionRunner`]
//! 3. **Factory phase** - [`FactoryExtensionRunner`]
//! 4. **Instance chain** - [`InstanceExtensionRegistrar`]
//! 5. **Listener sweep** - every listener definition's id is registered
//! 6. **Pre-instantiation** - every non-lazy singleton is created
//! 7. **Refreshed** - [`ContainerEvent::Refreshed`] is published
//!
//! Eager and pre-supplied instance extensions are consumed by a refresh. A
//! failed refresh destroys the singletons it created and leaves the context
//! [`Terminated`](ContainerState::Terminated).
//!
//! # Example
//!
//! ```
//! use trellis_container::context::{ContainerConfig, Context};
//! use trellis_container::registry::Definition;
//!
//! let mut context = Context::with_config(ContainerConfig::default().with_preinstantiate_singletons(false));
//! context.register("answer", Definition::of(|_, _| Ok(42_u32)));
//! context.refresh().unwrap();
//!
//! assert_eq!(*context.get::<u32>("answer").unwrap(), 42);
//! assert!(context.close().is_empty());
//! ```

use core::fmt;
use std::sync::Arc;

use crate::bootstrap::{FactoryExtensionRunner, InstanceExtensionRegistrar, RegistryExtensionRunner};
use crate::component::{Component, ComponentId};
use crate::error::{ContainerError, LifecycleError, TeardownError};
use crate::event::{ContainerEvent, EventListener, EventMulticaster, same_listener};
use crate::extension::{Capabilities, ExtensionRef};
use crate::factory::Factory;
use crate::registry::{Definition, Registry};
use crate::sentinel::{EventListenerDetector, SingletonEligibility};

// ─────────────────────────────────────────────────────────────────────────────
// ContainerState
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`Context`].
///
/// Progresses linearly per refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContainerState {
    /// Not refreshed yet, or a refresh is preparing.
    #[default]
    Created,
    /// Registry mutators have run.
    RegistryPhaseDone,
    /// Factory readers have run.
    FactoryPhaseDone,
    /// The instance-hook chain is complete.
    InstanceChainBuilt,
    /// Refresh completed; components may be requested.
    Running,
    /// Close in progress.
    Destroying,
    /// Closed, or the last refresh failed.
    Terminated,
}

// ─────────────────────────────────────────────────────────────────────────────
// ContainerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Container settings.
///
/// # Example
///
/// ```
/// use trellis_container::context::ContainerConfig;
///
/// let config = ContainerConfig::new()
///     .with_definition_overriding(false)
///     .with_detect_listeners(false);
/// assert!(!config.allow_definition_overriding());
/// assert!(config.preinstantiate_singletons());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Whether re-registering an id replaces its definition.
    allow_definition_overriding: bool,
    /// Whether refresh creates every non-lazy singleton.
    preinstantiate_singletons: bool,
    /// Whether the listener detector joins the instance-hook chain.
    detect_listeners: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            allow_definition_overriding: true,
            preinstantiate_singletons: true,
            detect_listeners: true,
        }
    }
}

impl ContainerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether re-registering an id replaces its definition.
    #[must_use]
    pub fn with_definition_overriding(mut self, allow: bool) -> Self {
        self.allow_definition_overriding = allow;
        self
    }

    /// Sets whether refresh creates every non-lazy singleton.
    #[must_use]
    pub fn with_preinstantiate_singletons(mut self, enabled: bool) -> Self {
        self.preinstantiate_singletons = enabled;
        self
    }

    /// Sets whether the listener detector joins the instance-hook chain.
    ///
    /// When disabled, the chain ends with the last ordinary extension and
    /// only listeners found by the refresh sweep receive events.
    #[must_use]
    pub fn with_detect_listeners(mut self, enabled: bool) -> Self {
        self.detect_listeners = enabled;
        self
    }

    /// Returns whether definition overriding is allowed.
    #[must_use]
    pub fn allow_definition_overriding(&self) -> bool {
        self.allow_definition_overriding
    }

    /// Returns whether non-lazy singletons are created by refresh.
    #[must_use]
    pub fn preinstantiate_singletons(&self) -> bool {
        self.preinstantiate_singletons
    }

    /// Returns whether the listener detector is installed.
    #[must_use]
    pub fn detect_listeners(&self) -> bool {
        self.detect_listeners
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ContextHandle
// ─────────────────────────────────────────────────────────────────────────────

/// The part of a context the listener detector talks to.
#[derive(Clone)]
pub struct ContextHandle {
    registry: Arc<Registry>,
    multicaster: Arc<EventMulticaster>,
}

impl ContextHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(registry: Arc<Registry>, multicaster: Arc<EventMulticaster>) -> Self {
        Self {
            registry,
            multicaster,
        }
    }

    /// Registers a listener object with the multicaster.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.multicaster.add_listener(listener);
    }

    /// Returns true if the context defines a component with this id.
    #[must_use]
    pub fn contains_component(&self, id: &ComponentId) -> bool {
        self.registry.contains(id)
    }

    /// Returns the multicaster.
    #[must_use]
    pub fn multicaster(&self) -> &Arc<EventMulticaster> {
        &self.multicaster
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// A refreshable container.
pub struct Context {
    /// Settings applied on every refresh.
    config: ContainerConfig,

    /// Definition source, replayed into a fresh registry on every refresh.
    definitions: Vec<(ComponentId, Definition)>,

    /// Eager extensions for the next refresh.
    eager_extensions: Vec<ExtensionRef>,

    /// Instance extensions added to the next factory before bootstrap.
    instance_extensions: Vec<ExtensionRef>,

    /// Listener objects registered on every refresh.
    listeners: Vec<Arc<dyn EventListener>>,

    /// The current factory. `None` before the first refresh and after close.
    factory: Option<Arc<Factory>>,

    /// The current multicaster. Replaced on every refresh.
    multicaster: Arc<EventMulticaster>,

    /// The detector's eligibility map. Replaced on every refresh.
    eligibility: Arc<SingletonEligibility>,

    /// Current lifecycle state.
    state: ContainerState,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Creates a context with the given configuration.
    #[must_use]
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            config,
            definitions: Vec::new(),
            eager_extensions: Vec::new(),
            instance_extensions: Vec::new(),
            listeners: Vec::new(),
            factory: None,
            multicaster: Arc::new(EventMulticaster::new()),
            eligibility: Arc::new(SingletonEligibility::new()),
            state: ContainerState::Created,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Definition Source
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a definition, applied on the next refresh.
    pub fn register(&mut self, id: impl Into<ComponentId>, definition: Definition) -> &mut Self {
        self.definitions.push((id.into(), definition));
        self
    }

    /// Adds an eager extension for the next refresh.
    ///
    /// Eager registry mutators run before every discovered one, in the order
    /// added. Eager factory readers run after every registry mutator.
    pub fn add_extension(&mut self, extension: ExtensionRef) -> &mut Self {
        self.eager_extensions.push(extension);
        self
    }

    /// Adds an instance extension that joins the chain before bootstrap on
    /// the next refresh.
    pub fn add_instance_extension(&mut self, extension: ExtensionRef) -> &mut Self {
        self.instance_extensions.push(extension);
        self
    }

    /// Adds a listener object, registered with the multicaster on every
    /// refresh.
    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh / Close
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds a fresh factory and runs the bootstrap.
    ///
    /// A running context is closed first.
    ///
    /// # Errors
    ///
    /// [`ContainerError::Configuration`] if a bootstrap phase fails, or
    /// [`ContainerError::Lifecycle`] if a component cannot be created. The
    /// context is then [`Terminated`](ContainerState::Terminated).
    pub fn refresh(&mut self) -> Result<(), ContainerError> {
        if self.state == ContainerState::Running {
            for error in self.close() {
                tracing::warn!(error = %error, "teardown failed during re-refresh");
            }
        }

        tracing::info!(definitions = self.definitions.len(), "refreshing context");
        self.state = ContainerState::Created;

        let registry = Arc::new(Registry::with_overriding(
            self.config.allow_definition_overriding(),
        ));
        for (id, definition) in &self.definitions {
            if let Err(error) = registry.register(id.clone(), definition.clone()) {
                self.state = ContainerState::Terminated;
                return Err(error.into());
            }
        }

        let factory = Arc::new(Factory::new(registry));
        self.multicaster = Arc::new(EventMulticaster::new());
        self.eligibility = Arc::new(SingletonEligibility::new());
        for listener in &self.listeners {
            self.multicaster.add_listener(listener.clone());
        }
        self.factory = Some(factory.clone());

        if let Err(error) = self.bootstrap(&factory) {
            tracing::warn!(error = %error, state = ?self.state, "refresh failed");
            for teardown in factory.destroy_singletons() {
                tracing::warn!(error = %teardown, "teardown failed after refresh failure");
            }
            self.eligibility.clear();
            self.factory = None;
            self.state = ContainerState::Terminated;
            return Err(error);
        }

        self.state = ContainerState::Running;
        tracing::info!(
            components = factory.registry().len(),
            singletons = factory.singleton_count(),
            instance_extensions = factory.instance_extension_count(),
            "context refreshed"
        );
        Ok(())
    }

    fn bootstrap(&mut self, factory: &Arc<Factory>) -> Result<(), ContainerError> {
        let detector = self.config.detect_listeners().then(|| {
            EventListenerDetector::new(
                ContextHandle::new(factory.registry().clone(), self.multicaster.clone()),
                self.eligibility.clone(),
            )
            .into_extension()
        });

        for extension in core::mem::take(&mut self.instance_extensions) {
            factory.add_instance_extension(extension);
        }
        if let Some(detector) = &detector {
            factory.add_instance_extension(detector.clone());
        }

        let processed =
            RegistryExtensionRunner::new(factory).run(core::mem::take(&mut self.eager_extensions))?;
        self.state = ContainerState::RegistryPhaseDone;

        FactoryExtensionRunner::new(factory).run(&processed)?;
        self.state = ContainerState::FactoryPhaseDone;

        InstanceExtensionRegistrar::new(factory).register(detector)?;
        self.state = ContainerState::InstanceChainBuilt;

        for id in factory.registry().query(Capabilities::EVENT_LISTENER, true) {
            self.multicaster.add_listener_id(id);
        }

        if self.config.preinstantiate_singletons() {
            factory.preinstantiate_singletons()?;
        }

        self.dispatch(factory, &ContainerEvent::Refreshed)?;
        Ok(())
    }

    /// Closes the context.
    ///
    /// Publishes [`ContainerEvent::Closed`], then destroys every singleton.
    /// Does nothing unless the context is running.
    ///
    /// Returns the destruction hooks that failed; teardown never stops early.
    pub fn close(&mut self) -> Vec<TeardownError> {
        if self.state != ContainerState::Running {
            return Vec::new();
        }
        let Some(factory) = self.factory.take() else {
            return Vec::new();
        };

        tracing::info!("closing context");
        self.state = ContainerState::Destroying;

        if let Err(error) = self.dispatch(&factory, &ContainerEvent::Closed) {
            tracing::warn!(error = %error, "failed to publish close event");
        }
        let errors = factory.destroy_singletons();
        self.eligibility.clear();

        self.state = ContainerState::Terminated;
        tracing::info!(teardown_errors = errors.len(), "context closed");
        errors
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Runtime
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Returns the current factory, if refreshed.
    #[must_use]
    pub fn factory(&self) -> Option<&Arc<Factory>> {
        self.factory.as_ref()
    }

    /// Returns the current multicaster.
    #[must_use]
    pub fn multicaster(&self) -> &Arc<EventMulticaster> {
        &self.multicaster
    }

    /// Returns the listener detector's eligibility map.
    #[must_use]
    pub fn eligibility(&self) -> &Arc<SingletonEligibility> {
        &self.eligibility
    }

    /// Returns a handle to this context's registry and multicaster.
    #[must_use]
    pub fn handle(&self) -> Option<ContextHandle> {
        self.factory
            .as_ref()
            .map(|factory| ContextHandle::new(factory.registry().clone(), self.multicaster.clone()))
    }

    /// Returns true if the current factory defines this id.
    #[must_use]
    pub fn contains_component(&self, id: impl Into<ComponentId>) -> bool {
        let id = id.into();
        self.factory
            .as_ref()
            .is_some_and(|factory| factory.registry().contains(&id))
    }

    /// Returns the component with this id.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ContextNotActive`] unless running, or any creation
    /// failure.
    pub fn get_instance(&self, id: impl Into<ComponentId>) -> Result<Component, LifecycleError> {
        self.running_factory()?.get_instance(&id.into())
    }

    /// Returns the component with this id as `T`.
    ///
    /// # Errors
    ///
    /// As [`get_instance()`](Self::get_instance), plus
    /// [`LifecycleError::TypeMismatch`].
    pub fn get<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ComponentId>,
    ) -> Result<Arc<T>, LifecycleError> {
        self.running_factory()?.get::<T>(id)
    }

    /// Publishes an event to every listener object and listener id.
    ///
    /// Listener ids are resolved to components on each publish; a listener
    /// reachable both ways is notified once.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ContextNotActive`] unless running, or a failure
    /// creating a listener.
    pub fn publish_event(&self, event: ContainerEvent) -> Result<(), LifecycleError> {
        let factory = self.running_factory()?;
        self.dispatch(factory, &event)
    }

    fn running_factory(&self) -> Result<&Arc<Factory>, LifecycleError> {
        match &self.factory {
            Some(factory) if self.state == ContainerState::Running => Ok(factory),
            _ => Err(LifecycleError::ContextNotActive(self.state)),
        }
    }

    fn dispatch(&self, factory: &Factory, event: &ContainerEvent) -> Result<(), LifecycleError> {
        let mut targets = self.multicaster.listeners();
        for id in self.multicaster.listener_ids() {
            let component = factory.get_instance(&id)?;
            if let Some(listener) = component.as_listener()
                && !targets.iter().any(|existing| same_listener(existing, listener))
            {
                targets.push(listener.clone());
            }
        }

        tracing::debug!(event = ?event, listeners = targets.len(), "publishing event");
        for listener in targets {
            listener.on_event(event);
        }
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("definitions", &self.definitions.len())
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ContainerConfig::default();
        assert!(config.allow_definition_overriding());
        assert!(config.preinstantiate_singletons());
        assert!(config.detect_listeners());
    }

    #[test]
    fn runtime_calls_require_running() {
        let context = Context::new();
        assert_eq!(context.state(), ContainerState::Created);
        assert!(matches!(
            context.get_instance("anything"),
            Err(LifecycleError::ContextNotActive(ContainerState::Created))
        ));
        assert!(context.publish_event(ContainerEvent::Refreshed).is_err());
        assert!(context.handle().is_none());
    }

    #[test]
    fn refresh_and_close() {
        let mut context = Context::new();
        context.register("answer", Definition::of(|_, _| Ok(42_u32)));
        context.refresh().unwrap();

        assert_eq!(context.state(), ContainerState::Running);
        assert!(context.contains_component("answer"));
        assert!(context.factory().unwrap().is_instantiated(&"answer".into()));

        assert!(context.close().is_empty());
        assert_eq!(context.state(), ContainerState::Terminated);
        assert!(context.get_instance("answer").is_err());
        assert!(context.close().is_empty());
    }

    #[test]
    fn duplicate_definition_fails_refresh() {
        let mut context = Context::with_config(ContainerConfig::new().with_definition_overriding(false));
        context.register("a", Definition::of(|_, _| Ok(1_u8)));
        context.register("a", Definition::of(|_, _| Ok(2_u8)));

        let error = context.refresh().unwrap_err();
        assert!(matches!(error, ContainerError::Configuration(_)));
        assert_eq!(context.state(), ContainerState::Terminated);
    }

    #[test]
    fn overriding_keeps_last_definition() {
        let mut context = Context::new();
        context.register("a", Definition::of(|_, _| Ok(1_u8)));
        context.register("a", Definition::of(|_, _| Ok(2_u8)));
        context.refresh().unwrap();
        assert_eq!(*context.get::<u8>("a").unwrap(), 2);
    }
}
