//! The extension orchestration core of the Trellis container.
//!
//! `trellis_container` discovers, tiers, orders and invokes container extension
//! hooks while the container bootstraps, while objects are created, and while
//! singletons are torn down:
//!
//! - [`component`] - Identifiers and realized managed objects
//! - [`extension`] - The extension contract, capability tags and tiers
//! - [`registry`] - Component definitions and the definition registry
//! - [`factory`] - Object creation through the instance-hook chain
//! - [`bootstrap`] - The registry, factory and instance-chain phases
//! - [`sentinel`] - Built-in extensions with fixed chain positions
//! - [`event`] - Event listeners and the multicaster
//! - [`context`] - The refresh/close driver that owns all of the above
//! - [`error`] - Configuration, lifecycle and teardown errors
//!
//! # Bootstrap Order
//!
//! Every refresh runs the same sequence on a fresh [`Factory`](factory::Factory):
//!
//! 1. **Registry phase** - registry mutators run to a fixed point
//! 2. **Factory phase** - factory readers run in tiers
//! 3. **Instance phase** - the instance-hook chain is built once
//! 4. **Running** - objects are created through the finished chain
//!
//! # Example
//!
//! ```
//! use trellis_container::context::Context;
//! use trellis_container::registry::Definition;
//!
//! struct Greeter { greeting: String }
//!
//! let mut context = Context::new();
//! context.register(
//!     "greeter",
//!     Definition::of(|_, _| Ok(Greeter { greeting: "hello".into() })),
//! );
//! context.refresh().unwrap();
//!
//! let greeter = context.get::<Greeter>("greeter").unwrap();
//! assert_eq!(greeter.greeting, "hello");
//! ```

/// The bootstrap phases.
pub mod bootstrap;

/// Component identifiers and realized objects.
pub mod component;

/// Refresh/close driver.
pub mod context;

/// Error taxonomy.
pub mod error;

/// Event listeners and multicasting.
pub mod event;

/// The extension contract.
pub mod extension;

/// Object creation and the instance-hook chain.
pub mod factory;

/// Component definitions.
pub mod registry;

/// Built-in sentinel extensions.
pub mod sentinel;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::component::*;
    pub use crate::context::*;
    pub use crate::error::*;
    pub use crate::event::*;
    pub use crate::extension::*;
    pub use crate::factory::*;
    pub use crate::registry::*;
}
