//! Integration tests for the core extensions running inside a context.

use std::sync::Arc;

use trellis_container::component::Component;
use trellis_container::context::{ContainerState, Context};
use trellis_container::error::{ConfigurationError, ContainerError, HookError, HookPhase};
use trellis_container::extension::{Capabilities, Extension, ExtensionRef};
use trellis_container::registry::{Definition, Registry};
use trellis_core_extensions::{PropertyOverrideExtension, TracingConfig, TracingExtension};
use tracing::Level;

struct Pool {
    size: usize,
}

fn pool() -> Definition {
    Definition::of(|_, definition| {
        let size = definition
            .attribute("size")
            .map(str::parse::<usize>)
            .transpose()
            .map_err(|error| HookError::with_source("invalid pool size", error))?
            .unwrap_or(4);
        Ok(Pool { size })
    })
}

/// Registers `pool` during the registry phase.
struct PoolScanner;

impl Extension for PoolScanner {
    fn mutate_registry(&self, registry: &Registry) -> Result<(), HookError> {
        registry.register("pool", pool())?;
        Ok(())
    }
}

#[test]
fn overrides_apply_before_components_are_built() {
    let mut context = Context::new();
    context.register(
        "overrides",
        PropertyOverrideExtension::new()
            .with_override("pool.size", "16")
            .into_definition(0),
    );
    context.register("pool", pool());
    context.refresh().unwrap();

    assert_eq!(context.get::<Pool>("pool").unwrap().size, 16);
    let overrides = context.get_instance("overrides").unwrap();
    let extension = overrides
        .as_extension()
        .and_then(|extension| extension.downcast_ref::<PropertyOverrideExtension>())
        .unwrap();
    assert_eq!(extension.applied(), vec!["pool.size"]);
}

#[test]
fn overrides_reach_components_registered_by_mutators() {
    let mut context = Context::new();
    context.add_extension(ExtensionRef::eager(
        "scanner",
        Capabilities::REGISTRY_MUTATOR,
        PoolScanner,
    ));
    context.register(
        "overrides",
        PropertyOverrideExtension::from_json(r#"{ "pool": { "size": 32 } }"#)
            .unwrap()
            .into_definition(0),
    );
    context.refresh().unwrap();

    assert_eq!(context.get::<Pool>("pool").unwrap().size, 32);
}

#[test]
fn unknown_component_fails_refresh() {
    let mut context = Context::new();
    context.register(
        "overrides",
        PropertyOverrideExtension::new()
            .with_override("missing.size", "1")
            .into_definition(0),
    );

    let error = context.refresh().unwrap_err();
    let ContainerError::Configuration(ConfigurationError::HookFailed { phase, extension, .. }) = &error
    else {
        panic!("expected factory hook failure, got {error:?}");
    };
    assert_eq!(*phase, HookPhase::FactoryProcessing);
    assert_eq!(extension.as_str(), "overrides");
    assert_eq!(context.state(), ContainerState::Terminated);
}

#[test]
fn unknown_component_ignored_when_configured() {
    let mut context = Context::new();
    context.register(
        "overrides",
        PropertyOverrideExtension::new()
            .with_override("missing.size", "1")
            .with_override("pool.size", "2")
            .ignore_unknown_components(true)
            .into_definition(0),
    );
    context.register("pool", pool());
    context.refresh().unwrap();

    assert_eq!(context.get::<Pool>("pool").unwrap().size, 2);
}

#[test]
fn invalid_override_value_fails_component_creation() {
    let mut context = Context::new();
    context.register(
        "overrides",
        PropertyOverrideExtension::new()
            .with_override("pool.size", "lots")
            .into_definition(0),
    );
    context.register("pool", pool().lazy());
    context.refresh().unwrap();

    let error = context.get_instance("pool").unwrap_err();
    assert!(error.to_string().contains("constructor of component 'pool' failed"));
}

#[test]
fn tracing_extension_registers_config() {
    let mut context = Context::new();
    context.add_extension(
        TracingExtension::new()
            .with_level(Level::DEBUG)
            .into_extension(),
    );
    context.refresh().unwrap();

    let config: Arc<TracingConfig> = context.get(TracingExtension::CONFIG_ID).unwrap();
    assert_eq!(config.level, Level::DEBUG);

    // The extension itself is not a component.
    let component: Option<Component> = context.get_instance(TracingExtension::ID).ok();
    assert!(component.is_none());
}
