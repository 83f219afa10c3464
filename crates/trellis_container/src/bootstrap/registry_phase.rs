//! Registry mutators, run to a fixed point.

use hashbrown::HashSet;

use super::instantiate;
use super::tier_of;
use crate::component::ComponentId;
use crate::error::{ConfigurationError, HookPhase};
use crate::extension::{Capabilities, ExtensionRef};
use crate::factory::Factory;

/// Runs registry mutators, then the factory hooks of everything it ran.
///
/// Order of registry-mutation hooks:
///
/// 1. Eager mutators, in the order supplied
/// 2. Discovered high-priority mutators, by rank
/// 3. Discovered ranked mutators not yet run (including high-priority ones
///    registered in step 2), by rank
/// 4. Anything else, re-queried until a query finds nothing new. Within a
///    round each mutator is instantiated only after the ones before it have
///    run, so they may still rewrite or remove its definition.
///
/// Factory hooks then run on every mutator above tagged
/// [`FACTORY_READER`](Capabilities::FACTORY_READER), in the same order,
/// followed by the eager factory readers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_container::component::ComponentId;
/// use trellis_container::error::HookError;
/// use trellis_container::extension::{Capabilities, Extension, ExtensionRef};
/// use trellis_container::bootstrap::RegistryExtensionRunner;
/// use trellis_container::factory::Factory;
/// use trellis_container::registry::{Definition, Registry};
///
/// struct Seed;
/// impl Extension for Seed {
///     fn mutate_registry(&self, registry: &Registry) -> Result<(), HookError> {
///         registry.register("seeded", Definition::of(|_, _| Ok(1_u8)))?;
///         Ok(())
///     }
/// }
///
/// let factory = Factory::new(Arc::new(Registry::new()));
/// let eager = vec![ExtensionRef::eager("seed", Capabilities::REGISTRY_MUTATOR, Seed)];
/// let processed = RegistryExtensionRunner::new(&factory).run(eager).unwrap();
///
/// assert!(processed.contains(&ComponentId::from("seed")));
/// assert!(factory.registry().contains(&"seeded".into()));
/// ```
pub struct RegistryExtensionRunner<'a> {
    factory: &'a Factory,
    /// Ids whose registry-mutation hook has run (or is about to).
    processed: HashSet<ComponentId>,
    /// Every mutator invoked, in invocation order.
    invoked: Vec<ExtensionRef>,
}

impl<'a> RegistryExtensionRunner<'a> {
    /// Creates a runner over a factory.
    #[must_use]
    pub fn new(factory: &'a Factory) -> Self {
        Self {
            factory,
            processed: HashSet::new(),
            invoked: Vec::new(),
        }
    }

    /// Runs the phase and returns the ids already processed.
    ///
    /// # Errors
    ///
    /// The first instantiation or hook failure, as a [`ConfigurationError`].
    pub fn run(
        mut self,
        eager: Vec<ExtensionRef>,
    ) -> Result<HashSet<ComponentId>, ConfigurationError> {
        let (eager_mutators, eager_readers): (Vec<_>, Vec<_>) = eager
            .into_iter()
            .partition(|extension| extension.has(Capabilities::REGISTRY_MUTATOR));

        for extension in eager_mutators {
            self.processed.insert(extension.id().clone());
            self.mutate(extension)?;
        }

        let high_priority: Vec<_> = self
            .unprocessed()
            .into_iter()
            .filter(|id| tier_of(self.factory.registry(), id).is_high_priority())
            .collect();
        self.run_ranked(&high_priority)?;

        let ordered: Vec<_> = self
            .unprocessed()
            .into_iter()
            .filter(|id| tier_of(self.factory.registry(), id).is_ordered())
            .collect();
        self.run_ranked(&ordered)?;

        let mut round = 0_usize;
        loop {
            let found = self.unprocessed();
            if found.is_empty() {
                break;
            }
            round += 1;
            tracing::debug!(round, found = found.len(), "discovered registry mutators");

            self.processed.extend(found.iter().cloned());
            for id in &found {
                // An earlier mutator in this round may have removed it.
                if !self.factory.registry().contains(id) {
                    tracing::debug!(extension = %id, "mutator definition removed before it ran");
                    continue;
                }
                let extension = self.factory.get_extension(id)?;
                self.mutate(extension)?;
            }
        }

        for extension in self
            .invoked
            .iter()
            .chain(eager_readers.iter())
            .filter(|extension| extension.has(Capabilities::FACTORY_READER))
        {
            tracing::debug!(extension = %extension.id(), "processing factory");
            extension
                .extension()
                .process_factory(self.factory)
                .map_err(|source| ConfigurationError::HookFailed {
                    phase: HookPhase::FactoryProcessing,
                    extension: extension.id().clone(),
                    source,
                })?;
        }

        Ok(self.processed)
    }

    /// Mutator definitions not yet processed, in discovery order.
    fn unprocessed(&self) -> Vec<ComponentId> {
        self.factory
            .registry()
            .query(Capabilities::REGISTRY_MUTATOR, true)
            .into_iter()
            .filter(|id| !self.processed.contains(id))
            .collect()
    }

    fn run_ranked(&mut self, ids: &[ComponentId]) -> Result<(), ConfigurationError> {
        self.processed.extend(ids.iter().cloned());
        for extension in instantiate(self.factory, ids, true)? {
            self.mutate(extension)?;
        }
        Ok(())
    }

    fn mutate(&mut self, extension: ExtensionRef) -> Result<(), ConfigurationError> {
        tracing::debug!(
            extension = %extension.id(),
            tier = ?extension.tier(),
            "mutating registry"
        );
        extension
            .extension()
            .mutate_registry(self.factory.registry())
            .map_err(|source| ConfigurationError::HookFailed {
                phase: HookPhase::RegistryMutation,
                extension: extension.id().clone(),
                source,
            })?;
        self.invoked.push(extension);
        Ok(())
    }
}
