//! Bootstrap ordering tests for `trellis_container`.
//!
//! Covers the registry phase (eager mutators, tiers, fixed-point discovery),
//! the factory phase (tiers, deferred instantiation) and construction of the
//! instance-hook chain (sentinel positions, logger target).


use std::sync::Arc;

use trellis_container::bootstrap::{
    FactoryExtensionRunner, InstanceExtensionRegistrar, RegistryExtensionRunner,
};
use trellis_container::component::ComponentId;
use trellis_container::context::{ContainerConfig, ContainerState, Context};
use trellis_container::error::{ConfigurationError, ContainerError, HookError, HookPhase};
use trellis_container::extension::{Capabilities, Extension, ExtensionRef, Tier};
use trellis_container::factory::Factory;
use trellis_container::registry::{Definition, Registry};
use trellis_container::sentinel::{EventListenerDetector, UnprocessedInstanceLogger};
use test_utils::{Log, Plain, Spy, capture_warnings, entries, names_for, new_log, plain};

const MUTATOR: Capabilities = Capabilities::REGISTRY_MUTATOR.union(Capabilities::FACTORY_READER);
const READER: Capabilities = Capabilities::FACTORY_READER;
const INIT_HOOKS: Capabilities = Capabilities::BEFORE_INIT.union(Capabilities::AFTER_INIT);

fn chain_ids(factory: &Factory) -> Vec<String> {
    factory
        .instance_extensions()
        .iter()
        .map(|extension| extension.id().to_string())
        .collect()
}

fn refreshed(context: &mut Context) -> Arc<Factory> {
    context.refresh().unwrap();
    context.factory().unwrap().clone()
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY PHASE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn scenario_a_mutators_then_factory_hooks() {
    let log = new_log();
    let c = Spy::new("C", &log).definition(MUTATOR, Tier::Unordered);
    let a = Spy::new("A", &log)
        .registering("C", c)
        .definition(MUTATOR, Tier::HighPriority(1));
    let b = Spy::new("B", &log).definition(MUTATOR, Tier::Ordered(5));

    let mut context = Context::new();
    context.register("B", b);
    context.register("A", a);
    context.add_extension(ExtensionRef::eager("P1", READER, Spy::new("P1", &log)));
    context.refresh().unwrap();

    assert_eq!(names_for(&log, "mutate"), vec!["A", "B", "C"]);
    // Mutators' factory hooks run first, then eager readers.
    assert_eq!(names_for(&log, "factory"), vec!["A", "B", "C", "P1"]);
}

#[test]
fn eager_mutators_run_first_in_given_order() {
    let log = new_log();
    let mut context = Context::new();
    context.register(
        "discovered",
        Spy::new("discovered", &log).definition(MUTATOR, Tier::HighPriority(i32::MIN)),
    );
    context.add_extension(ExtensionRef::eager("z", MUTATOR, Spy::new("z", &log)));
    context.add_extension(ExtensionRef::eager("a", MUTATOR, Spy::new("a", &log)));
    context.refresh().unwrap();

    assert_eq!(names_for(&log, "mutate"), vec!["z", "a", "discovered"]);
    assert_eq!(names_for(&log, "factory"), vec!["z", "a", "discovered"]);
}

#[test]
fn fixed_point_discovers_nested_registrations() {
    let log = new_log();
    let level3 = Spy::new("L3", &log).definition(MUTATOR, Tier::Unordered);
    let level2 = Spy::new("L2", &log)
        .registering("L3", level3)
        .definition(MUTATOR, Tier::Unordered);
    let level1 = Spy::new("L1", &log)
        .registering("L2", level2)
        .definition(MUTATOR, Tier::Unordered);

    let registry = Arc::new(Registry::new());
    registry.register("L1", level1).unwrap();
    let factory = Factory::new(registry.clone());

    let processed = RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();

    assert_eq!(names_for(&log, "mutate"), vec!["L1", "L2", "L3"]);
    let remaining: Vec<_> = registry
        .query(Capabilities::REGISTRY_MUTATOR, true)
        .into_iter()
        .filter(|id| !processed.contains(id))
        .collect();
    assert!(remaining.is_empty());
}

/// Rewrites or removes another mutator's definition from `mutate_registry`.
struct Editor {
    target: &'static str,
    remove: bool,
}

impl Extension for Editor {
    fn mutate_registry(&self, registry: &Registry) -> Result<(), HookError> {
        let id = ComponentId::from(self.target);
        if self.remove {
            let _ = registry.remove(&id);
        } else {
            registry.update(&id, |definition| {
                definition.set_attribute("flavor", "rewritten");
            })?;
        }
        Ok(())
    }
}

/// An unordered mutator recording the `flavor` it was built with.
fn flavored(name: &'static str, log: &Log) -> Definition {
    let log = log.clone();
    Definition::extension(move |_, definition| {
        let flavor = definition.attribute("flavor").unwrap_or("none");
        log.lock().unwrap().push(format!("{name}:built:{flavor}"));
        Ok(Spy::new(name, &log))
    })
    .with_capabilities(MUTATOR)
    .with_attribute("flavor", "original")
}

#[test]
fn fixed_point_round_builds_each_mutator_after_earlier_ones_ran() {
    let log = new_log();
    let registry = Arc::new(Registry::new());
    registry
        .register(
            "m1",
            Definition::extension(|_, _| {
                Ok(Editor {
                    target: "m2",
                    remove: false,
                })
            })
            .with_capabilities(MUTATOR),
        )
        .unwrap();
    registry.register("m2", flavored("m2", &log)).unwrap();
    let factory = Factory::new(registry);

    RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();

    assert_eq!(entries(&log), vec!["m2:built:rewritten", "m2:mutate", "m2:factory"]);
}

#[test]
fn fixed_point_round_skips_mutators_removed_earlier_in_the_round() {
    let log = new_log();
    let registry = Arc::new(Registry::new());
    registry
        .register(
            "m1",
            Definition::extension(|_, _| {
                Ok(Editor {
                    target: "m2",
                    remove: true,
                })
            })
            .with_capabilities(MUTATOR),
        )
        .unwrap();
    registry.register("m2", flavored("m2", &log)).unwrap();
    let factory = Factory::new(registry);

    let processed = RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();

    assert!(entries(&log).is_empty());
    assert!(!factory.is_instantiated(&"m2".into()));
    assert!(processed.contains(&ComponentId::from("m1")));
}

#[test]
fn high_priority_registered_during_step_two_runs_with_ordered() {
    let log = new_log();
    let late = Spy::new("late_hp", &log).definition(MUTATOR, Tier::HighPriority(3));
    let first = Spy::new("first", &log)
        .registering("late_hp", late)
        .definition(MUTATOR, Tier::HighPriority(0));
    let ordered = Spy::new("ordered", &log).definition(MUTATOR, Tier::Ordered(1));

    let mut context = Context::new();
    context.register("ordered", ordered);
    context.register("first", first);
    context.refresh().unwrap();

    assert_eq!(names_for(&log, "mutate"), vec!["first", "ordered", "late_hp"]);
}

#[test]
fn mutator_hooks_fire_at_most_once() {
    let log = new_log();
    // Re-registering its own id must not make the mutator run again.
    let again = Spy::new("self", &log).definition(MUTATOR, Tier::Unordered);
    let mutator = Spy::new("self", &log)
        .registering("self", again)
        .definition(MUTATOR, Tier::Ordered(0));

    let mut context = Context::new();
    context.register("self", mutator);
    context.refresh().unwrap();

    assert_eq!(names_for(&log, "mutate"), vec!["self"]);
    assert_eq!(names_for(&log, "factory"), vec!["self"]);
}

#[test]
fn failing_mutator_aborts_refresh() {
    let log = new_log();
    let mut context = Context::new();
    context.register(
        "broken",
        Spy::new("broken", &log)
            .failing_on("mutate")
            .definition(MUTATOR, Tier::Unordered),
    );
    context.register(
        "after",
        Spy::new("after", &log).definition(READER, Tier::Unordered),
    );

    let error = context.refresh().unwrap_err();
    let ContainerError::Configuration(ConfigurationError::HookFailed {
        phase, extension, ..
    }) = &error
    else {
        panic!("expected hook failure, got {error:?}");
    };
    assert_eq!(*phase, HookPhase::RegistryMutation);
    assert_eq!(extension.as_str(), "broken");
    assert_eq!(context.state(), ContainerState::Terminated);
    assert!(names_for(&log, "factory").is_empty());
}

#[test]
fn discovered_definitions_cannot_claim_eager_tier() {
    let log = new_log();
    let mut context = Context::new();
    context.register(
        "sneaky",
        Spy::new("sneaky", &log).definition(MUTATOR, Tier::Eager),
    );

    let error = context.refresh().unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Configuration(ConfigurationError::ReservedTier { .. })
    ));
    assert!(entries(&log).is_empty());
}

#[test]
fn tagged_plain_objects_are_rejected() {
    let log = new_log();
    let mut context = Context::new();
    context.register("impostor", plain("impostor", &log).with_capabilities(READER));

    let error = context.refresh().unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Configuration(ConfigurationError::NotAnExtension { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY PHASE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn factory_readers_run_by_tier() {
    let log = new_log();
    let mut context = Context::new();
    for (name, tier) in [
        ("U1", Tier::Unordered),
        ("O2", Tier::Ordered(2)),
        ("H1", Tier::HighPriority(5)),
        ("U2", Tier::Unordered),
        ("O1", Tier::Ordered(1)),
        ("H0", Tier::HighPriority(0)),
    ] {
        context.register(name, Spy::new(name, &log).definition(READER, tier));
    }
    context.refresh().unwrap();

    assert_eq!(
        names_for(&log, "factory"),
        vec!["H0", "H1", "O1", "O2", "U1", "U2"]
    );
}

#[test]
fn factory_phase_defers_instantiation() {
    let log = new_log();
    let registry = Arc::new(Registry::new());
    registry.register("svc", plain("svc", &log)).unwrap();
    registry
        .register(
            "high",
            Spy::new("high", &log)
                .rewriting("svc", "setting", "rewritten")
                .definition(READER, Tier::HighPriority(0)),
        )
        .unwrap();
    registry
        .register(
            "ordered",
            Spy::new("ordered", &log).definition(READER, Tier::Ordered(0)),
        )
        .unwrap();
    registry
        .register(
            "unordered",
            Spy::new("unordered", &log).definition(READER, Tier::Unordered),
        )
        .unwrap();
    let factory = Factory::new(registry);

    let processed = RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();
    FactoryExtensionRunner::new(&factory).run(&processed).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "high:new",
            "high:factory",
            "ordered:new",
            "ordered:factory",
            "unordered:new",
            "unordered:factory",
        ]
    );
    assert!(!factory.is_instantiated(&"svc".into()));

    let svc = factory.get::<Plain>("svc").unwrap();
    assert_eq!(svc.setting.as_deref(), Some("rewritten"));
}

#[test]
fn processed_mutators_are_skipped_by_factory_phase() {
    let log = new_log();
    let registry = Arc::new(Registry::new());
    registry
        .register("both", Spy::new("both", &log).definition(MUTATOR, Tier::Unordered))
        .unwrap();
    let factory = Factory::new(registry);

    let processed = RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();
    assert!(processed.contains(&ComponentId::from("both")));
    FactoryExtensionRunner::new(&factory).run(&processed).unwrap();

    assert_eq!(names_for(&log, "factory"), vec!["both"]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCE-HOOK CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn scenario_b_chain_layout() {
    let log = new_log();
    let mut context = Context::new();
    context.register("X", Spy::new("X", &log).definition(INIT_HOOKS, Tier::Unordered));
    context.register("Y", Spy::new("Y", &log).definition(INIT_HOOKS, Tier::HighPriority(0)));
    let factory = refreshed(&mut context);

    assert_eq!(
        chain_ids(&factory),
        vec![
            UnprocessedInstanceLogger::ID,
            "Y",
            "X",
            EventListenerDetector::ID,
        ]
    );
}

#[test]
fn merged_aware_extensions_move_behind_ordinary_ones() {
    let log = new_log();
    let merged_caps = Capabilities::MERGED_DEFINITION | Capabilities::AFTER_INIT;
    let mut context = Context::new();
    context.register("M2", Spy::new("M2", &log).definition(merged_caps, Tier::Ordered(0)));
    context.register("X", Spy::new("X", &log).definition(INIT_HOOKS, Tier::Unordered));
    context.register("M1", Spy::new("M1", &log).definition(merged_caps, Tier::HighPriority(0)));
    context.register("O", Spy::new("O", &log).definition(INIT_HOOKS, Tier::Ordered(1)));
    let factory = refreshed(&mut context);

    assert_eq!(
        chain_ids(&factory),
        vec![
            UnprocessedInstanceLogger::ID,
            "O",
            "X",
            "M1",
            "M2",
            EventListenerDetector::ID,
        ]
    );
}

#[test]
fn detector_is_last_and_pre_supplied_extensions_lead() {
    let log = new_log();
    let mut context = Context::new();
    context.add_instance_extension(ExtensionRef::eager("pre", INIT_HOOKS, Spy::new("pre", &log)));
    context.register("X", Spy::new("X", &log).definition(INIT_HOOKS, Tier::Unordered));
    let factory = refreshed(&mut context);

    let ids = chain_ids(&factory);
    assert_eq!(ids.first().map(String::as_str), Some("pre"));
    assert_eq!(ids.last().map(String::as_str), Some(EventListenerDetector::ID));
    assert_eq!(ids.len(), 4);
}

#[test]
fn chain_without_detector_ends_with_last_ordinary_extension() {
    let log = new_log();
    let mut context = Context::with_config(ContainerConfig::new().with_detect_listeners(false));
    context.register("X", Spy::new("X", &log).definition(INIT_HOOKS, Tier::Unordered));
    context.register("Y", Spy::new("Y", &log).definition(INIT_HOOKS, Tier::Ordered(0)));
    let factory = refreshed(&mut context);

    assert_eq!(
        chain_ids(&factory),
        vec![UnprocessedInstanceLogger::ID, "Y", "X"]
    );
}

#[test]
fn logger_target_counts_preexisting_logger_and_discovered() {
    let log = new_log();
    let registry = Arc::new(Registry::new());
    for name in ["a", "b", "c"] {
        registry
            .register(name, Spy::new(name, &log).definition(INIT_HOOKS, Tier::Unordered))
            .unwrap();
    }
    // Registered later by a mutator; counted because discovery happens after
    // the registry phase.
    registry
        .register(
            "spawner",
            Spy::new("spawner", &log)
                .registering(
                    "d",
                    Spy::new("d", &log).definition(Capabilities::DESTRUCTION, Tier::Unordered),
                )
                .definition(MUTATOR, Tier::Unordered),
        )
        .unwrap();
    let factory = Arc::new(Factory::new(registry));
    factory.add_instance_extension(ExtensionRef::eager("pre1", INIT_HOOKS, Spy::new("pre1", &log)));
    factory.add_instance_extension(ExtensionRef::eager("pre2", INIT_HOOKS, Spy::new("pre2", &log)));

    let processed = RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();
    FactoryExtensionRunner::new(&factory).run(&processed).unwrap();
    let target = InstanceExtensionRegistrar::new(&factory).register(None).unwrap();

    assert_eq!(target, 2 + 1 + 4);
    assert_eq!(factory.instance_extension_count(), target);

    let logger = factory
        .instance_extensions()
        .into_iter()
        .find(|extension| extension.id().as_str() == UnprocessedInstanceLogger::ID)
        .unwrap();
    assert_eq!(logger.downcast_ref::<UnprocessedInstanceLogger>().unwrap().target(), target);
}

#[test]
fn components_built_during_chain_construction_are_reported() {
    let log = new_log();
    let spy = Spy::new("needy", &log);
    let mut context = Context::new();
    context.register("early", plain("early", &log));
    context.register("late", plain("late", &log));
    context.register(
        "needy",
        Definition::extension(move |factory, _| {
            factory.get_instance(&"early".into())?;
            Ok(spy.clone())
        })
        .with_capabilities(INIT_HOOKS),
    );
    context.register(
        "other",
        Spy::new("other", &log).definition(INIT_HOOKS, Tier::Unordered),
    );

    let (result, warnings) = capture_warnings(|| context.refresh());
    result.unwrap();

    let reported: Vec<_> = warnings
        .iter()
        .filter(|warning| warning.message.contains("before full extension registration"))
        .collect();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].field("component"), Some("early"));

    // The early component missed the extension registered after it.
    let early_hooks: Vec<_> = entries(&log)
        .into_iter()
        .filter(|entry| entry.ends_with(":early") && entry.starts_with("other:"))
        .collect();
    assert!(early_hooks.is_empty());
    assert!(entries(&log).contains(&String::from("other:after:late")));
}

#[test]
fn extensions_are_not_carried_over_between_refreshes() {
    let log: Log = new_log();
    let mut context = Context::new();
    context.add_extension(ExtensionRef::eager("once", MUTATOR, Spy::new("once", &log)));
    context.add_instance_extension(ExtensionRef::eager("pre", INIT_HOOKS, Spy::new("pre", &log)));
    context.refresh().unwrap();
    assert_eq!(names_for(&log, "mutate"), vec!["once"]);

    let factory = refreshed(&mut context);
    assert_eq!(names_for(&log, "mutate"), vec!["once"]);
    assert!(!chain_ids(&factory).contains(&String::from("pre")));
    assert_eq!(context.state(), ContainerState::Running);
}
