//! The three bootstrap phases run by each refresh.
//!
//! # Phases
//!
//! 1. [`RegistryExtensionRunner`] - runs registry mutators to a fixed point,
//!    then the factory hooks of every mutator and eager reader
//! 2. [`FactoryExtensionRunner`] - runs the remaining factory readers by tier
//! 3. [`InstanceExtensionRegistrar`] - builds the instance-hook chain,
//!    bracketed by the two sentinels
//!
//! # Tiers
//!
//! Within every phase, high-priority extensions run before ordered ones, and
//! ordered ones before unordered ones. Ranked tiers are sorted by rank with a
//! stable sort; unordered extensions keep discovery order. Eager extensions
//! run first, in the order they were supplied.
//!
//! Tiers are read from definitions. An extension is only instantiated once
//! its tier's turn has come, so earlier extensions can still rewrite the
//! definitions of later ones.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_container::bootstrap::{FactoryExtensionRunner, RegistryExtensionRunner};
//! use trellis_container::factory::Factory;
//! use trellis_container::registry::Registry;
//!
//! let factory = Factory::new(Arc::new(Registry::new()));
//! let processed = RegistryExtensionRunner::new(&factory).run(Vec::new()).unwrap();
//! FactoryExtensionRunner::new(&factory).run(&processed).unwrap();
//! ```

mod factory_phase;
mod instance_phase;
mod registry_phase;

pub use factory_phase::FactoryExtensionRunner;
pub use instance_phase::InstanceExtensionRegistrar;
pub use registry_phase::RegistryExtensionRunner;

use crate::component::ComponentId;
use crate::error::ConfigurationError;
use crate::extension::{ExtensionRef, Tier, sort_by_rank};
use crate::factory::Factory;
use crate::registry::Registry;

/// Discovered extension ids split by their definitions' tiers.
#[derive(Debug, Default)]
pub(crate) struct TierPartition {
    pub(crate) high_priority: Vec<ComponentId>,
    pub(crate) ordered: Vec<ComponentId>,
    pub(crate) unordered: Vec<ComponentId>,
}

impl TierPartition {
    /// Partitions ids by tier without instantiating anything.
    ///
    /// Definitions declaring [`Tier::Eager`] land in `unordered` and are
    /// rejected when instantiated.
    pub(crate) fn of(registry: &Registry, ids: impl IntoIterator<Item = ComponentId>) -> Self {
        let mut partition = Self::default();
        for id in ids {
            match tier_of(registry, &id) {
                Tier::HighPriority(_) => partition.high_priority.push(id),
                Tier::Ordered(_) => partition.ordered.push(id),
                Tier::Eager | Tier::Unordered => partition.unordered.push(id),
            }
        }
        partition
    }
}

/// Returns the tier declared by a definition.
pub(crate) fn tier_of(registry: &Registry, id: &ComponentId) -> Tier {
    registry
        .definition(id)
        .map(|definition| definition.tier())
        .unwrap_or_default()
}

/// Instantiates a group of extensions, optionally sorting them by rank.
pub(crate) fn instantiate(
    factory: &Factory,
    ids: &[ComponentId],
    sort: bool,
) -> Result<Vec<ExtensionRef>, ConfigurationError> {
    let mut extensions = ids
        .iter()
        .map(|id| factory.get_extension(id))
        .collect::<Result<Vec<_>, _>>()?;
    if sort {
        sort_by_rank(&mut extensions);
    }
    Ok(extensions)
}
