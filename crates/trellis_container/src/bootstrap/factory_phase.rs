//! Factory readers not already run by the registry phase.

use hashbrown::HashSet;

use super::{TierPartition, instantiate};
use crate::component::ComponentId;
use crate::error::{ConfigurationError, HookPhase};
use crate::extension::{Capabilities, ExtensionRef};
use crate::factory::Factory;

/// Runs factory readers by tier.
///
/// High-priority readers are instantiated and run first. Ordered readers are
/// instantiated only after that, and unordered readers only after the ordered
/// ones have run, so each tier may still rewrite the definitions of the next.
/// No other component is instantiated by this phase.
pub struct FactoryExtensionRunner<'a> {
    factory: &'a Factory,
}

impl<'a> FactoryExtensionRunner<'a> {
    /// Creates a runner over a factory.
    #[must_use]
    pub fn new(factory: &'a Factory) -> Self {
        Self { factory }
    }

    /// Runs every factory reader whose id is not in `processed`.
    ///
    /// # Errors
    ///
    /// The first instantiation or hook failure, as a [`ConfigurationError`].
    pub fn run(&self, processed: &HashSet<ComponentId>) -> Result<(), ConfigurationError> {
        let registry = self.factory.registry();
        let discovered = registry
            .query(Capabilities::FACTORY_READER, true)
            .into_iter()
            .filter(|id| !processed.contains(id));
        let partition = TierPartition::of(registry, discovered);

        tracing::debug!(
            high_priority = partition.high_priority.len(),
            ordered = partition.ordered.len(),
            unordered = partition.unordered.len(),
            "running factory readers"
        );

        self.invoke_all(instantiate(self.factory, &partition.high_priority, true)?)?;
        self.invoke_all(instantiate(self.factory, &partition.ordered, true)?)?;
        self.invoke_all(instantiate(self.factory, &partition.unordered, false)?)?;
        Ok(())
    }

    fn invoke_all(&self, extensions: Vec<ExtensionRef>) -> Result<(), ConfigurationError> {
        for extension in extensions {
            tracing::debug!(
                extension = %extension.id(),
                tier = ?extension.tier(),
                "processing factory"
            );
            extension
                .extension()
                .process_factory(self.factory)
                .map_err(|source| ConfigurationError::HookFailed {
                    phase: HookPhase::FactoryProcessing,
                    extension: extension.id().clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
