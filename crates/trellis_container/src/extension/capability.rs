//! Capability tags and invocation tiers.
//!
//! Both are declared on definitions, so the bootstrap can classify an
//! extension without instantiating it.

use bitflags::bitflags;

use super::ExtensionRef;

bitflags! {
    /// The hooks a component takes part in.
    ///
    /// Tags are fixed when a definition is registered (or when an eager
    /// extension is supplied) and are queried through typed lookups.
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_container::extension::Capabilities;
    ///
    /// let tags = Capabilities::BEFORE_INIT | Capabilities::MERGED_DEFINITION;
    /// assert!(tags.intersects(Capabilities::INSTANCE_HOOKS));
    /// assert!(!tags.contains(Capabilities::REGISTRY_MUTATOR));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u16 {
        /// Adds or modifies definitions before any object is built.
        const REGISTRY_MUTATOR = 1 << 0;
        /// Reads or rewrites the factory once registry mutation is complete.
        const FACTORY_READER = 1 << 1;
        /// Sees every object before its initialization.
        const BEFORE_INIT = 1 << 2;
        /// Sees every object after its initialization.
        const AFTER_INIT = 1 << 3;
        /// Sees every singleton before it is discarded.
        const DESTRUCTION = 1 << 4;
        /// Sees every resolved definition before instantiation.
        const MERGED_DEFINITION = 1 << 5;
        /// Receives container events.
        const EVENT_LISTENER = 1 << 6;

        /// Any per-object lifecycle hook.
        const INSTANCE_HOOKS = Self::BEFORE_INIT.bits()
            | Self::AFTER_INIT.bits()
            | Self::DESTRUCTION.bits()
            | Self::MERGED_DEFINITION.bits();
    }
}

/// Priority classification controlling invocation order.
///
/// Ranks sort ascending; lower ranks run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tier {
    /// Pre-supplied instance; order fixed by the caller, never re-sorted.
    Eager,
    /// Runs before every ordered and unordered extension of its phase.
    HighPriority(i32),
    /// Runs after high-priority and before unordered extensions.
    Ordered(i32),
    /// Runs last, in discovery order.
    #[default]
    Unordered,
}

impl Tier {
    /// Rank used when no explicit rank is declared.
    pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

    /// Returns the declared rank, if any.
    #[must_use]
    pub fn rank(&self) -> Option<i32> {
        match self {
            Tier::HighPriority(rank) | Tier::Ordered(rank) => Some(*rank),
            Tier::Eager | Tier::Unordered => None,
        }
    }

    /// Returns the rank used for sorting.
    #[must_use]
    pub fn sort_key(&self) -> i32 {
        self.rank().unwrap_or(Self::LOWEST_PRECEDENCE)
    }

    /// Returns true for the high-priority tier.
    #[must_use]
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Tier::HighPriority(_))
    }

    /// Returns true if the tier carries a rank.
    ///
    /// High priority is a refinement of ordered, so both qualify.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.rank().is_some()
    }
}

/// Sorts extensions by rank.
///
/// The sort is stable: equal ranks keep discovery order.
pub fn sort_by_rank(extensions: &mut [ExtensionRef]) {
    extensions.sort_by_key(|extension| extension.tier().sort_key());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{Extension, ExtensionDescriptor};
    use std::sync::Arc;

    struct Noop;
    impl Extension for Noop {}

    fn extension(id: &str, tier: Tier) -> ExtensionRef {
        ExtensionRef::new(
            ExtensionDescriptor::new(id, Capabilities::FACTORY_READER, tier),
            Arc::new(Noop),
        )
    }

    #[test]
    fn instance_hooks_composite() {
        assert!(Capabilities::INSTANCE_HOOKS.contains(Capabilities::BEFORE_INIT));
        assert!(Capabilities::INSTANCE_HOOKS.contains(Capabilities::DESTRUCTION));
        assert!(!Capabilities::INSTANCE_HOOKS.contains(Capabilities::FACTORY_READER));
        assert!(!Capabilities::INSTANCE_HOOKS.contains(Capabilities::EVENT_LISTENER));
    }

    #[test]
    fn tier_ranks() {
        assert_eq!(Tier::HighPriority(3).rank(), Some(3));
        assert_eq!(Tier::Ordered(-1).rank(), Some(-1));
        assert_eq!(Tier::Unordered.rank(), None);
        assert_eq!(Tier::Eager.sort_key(), Tier::LOWEST_PRECEDENCE);
        assert!(Tier::HighPriority(0).is_ordered());
        assert!(!Tier::Unordered.is_ordered());
        assert_eq!(Tier::default(), Tier::Unordered);
    }

    #[test]
    fn sort_by_rank_is_stable() {
        let mut extensions = vec![
            extension("c", Tier::Ordered(5)),
            extension("a", Tier::Ordered(1)),
            extension("d", Tier::Ordered(5)),
            extension("b", Tier::Ordered(1)),
            extension("z", Tier::Unordered),
        ];
        sort_by_rank(&mut extensions);

        let ids: Vec<_> = extensions.iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "z"]);
    }
}
