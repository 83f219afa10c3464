//! Construction of the instance-hook chain.

use std::sync::Arc;

use super::{TierPartition, instantiate};
use crate::error::ConfigurationError;
use crate::extension::{Capabilities, ExtensionRef};
use crate::factory::Factory;
use crate::sentinel::UnprocessedInstanceLogger;

/// Appends every discovered instance extension to the factory's chain.
///
/// The resulting chain ends with:
///
/// ```text
/// ..pre-existing, UnprocessedInstanceLogger, high-priority, ordered,
///   unordered, merged-definition-aware (moved), listener detector
/// ```
///
/// Extensions tagged [`MERGED_DEFINITION`](Capabilities::MERGED_DEFINITION)
/// are moved to the end, keeping their relative order, so they run last
/// among ordinary extensions. The detector, when given, is moved after them.
pub struct InstanceExtensionRegistrar<'a> {
    factory: &'a Arc<Factory>,
}

impl<'a> InstanceExtensionRegistrar<'a> {
    /// Creates a registrar over a factory.
    #[must_use]
    pub fn new(factory: &'a Arc<Factory>) -> Self {
        Self { factory }
    }

    /// Builds the chain.
    ///
    /// Returns the logger's target count: the extensions already in the
    /// chain, plus the logger itself, plus every discovered definition.
    ///
    /// # Errors
    ///
    /// The first instantiation failure, as a [`ConfigurationError`].
    pub fn register(&self, detector: Option<ExtensionRef>) -> Result<usize, ConfigurationError> {
        let registry = self.factory.registry();
        let discovered = registry.query(Capabilities::INSTANCE_HOOKS, true);
        let target = self.factory.instance_extension_count() + 1 + discovered.len();

        self.factory.add_instance_extension(
            UnprocessedInstanceLogger::new(Arc::downgrade(self.factory), target).into_extension(),
        );

        let partition = TierPartition::of(registry, discovered);
        let mut merged_aware = Vec::new();

        for (ids, sort) in [
            (&partition.high_priority, true),
            (&partition.ordered, true),
            (&partition.unordered, false),
        ] {
            for extension in instantiate(self.factory, ids, sort)? {
                if extension.has(Capabilities::MERGED_DEFINITION) {
                    merged_aware.push(extension.clone());
                }
                self.factory.add_instance_extension(extension);
            }
        }

        for extension in merged_aware {
            self.factory.add_instance_extension(extension);
        }

        if let Some(detector) = detector {
            self.factory.add_instance_extension(detector);
        }

        tracing::debug!(
            target_count = target,
            registered = self.factory.instance_extension_count(),
            "instance-hook chain built"
        );
        Ok(target)
    }
}
