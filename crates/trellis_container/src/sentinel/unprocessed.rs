//! Reporting of components created before the instance-hook chain was complete.

use std::sync::{Arc, Weak};

use crate::component::{Component, ComponentId};
use crate::error::HookError;
use crate::extension::{
    Capabilities, Extension, ExtensionDescriptor, ExtensionRef, HookOutcome, Tier,
};
use crate::factory::Factory;

/// Warns about components created while the instance-hook chain was still
/// being built.
///
/// This happens when an extension's own construction requests an unrelated
/// component: that component misses every extension registered after it.
/// Extensions themselves are not reported.
pub struct UnprocessedInstanceLogger {
    factory: Weak<Factory>,
    target: usize,
}

impl UnprocessedInstanceLogger {
    /// Id of the logger in the instance-hook chain.
    pub const ID: &'static str = "trellis.unprocessed_instance_logger";

    /// Creates a logger that stays quiet once the factory's chain holds
    /// `target` extensions.
    #[must_use]
    pub fn new(factory: Weak<Factory>, target: usize) -> Self {
        Self { factory, target }
    }

    /// Returns the target chain length.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Wraps the logger for the instance-hook chain.
    #[must_use]
    pub fn into_extension(self) -> ExtensionRef {
        ExtensionRef::new(
            ExtensionDescriptor::new(
                Self::ID,
                Capabilities::BEFORE_INIT | Capabilities::AFTER_INIT,
                Tier::Eager,
            ),
            Arc::new(self),
        )
    }
}

impl Extension for UnprocessedInstanceLogger {
    fn name(&self) -> &str {
        "UnprocessedInstanceLogger"
    }

    fn after_init(&self, component: Component, id: &ComponentId) -> Result<HookOutcome, HookError> {
        if component.capabilities().intersects(Capabilities::INSTANCE_HOOKS) {
            return Ok(HookOutcome::Continue(component));
        }

        let Some(factory) = self.factory.upgrade() else {
            return Ok(HookOutcome::Continue(component));
        };

        let registered = factory.instance_extension_count();
        if registered < self.target {
            tracing::warn!(
                component = %id,
                type_name = component.type_name(),
                registered,
                target_count = self.target,
                "component created before full extension registration completed; \
                 it is not eligible for every instance extension"
            );
        }
        Ok(HookOutcome::Continue(component))
    }
}
