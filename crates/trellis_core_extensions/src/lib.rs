//! Core infrastructure extensions for Trellis.
//!
//! This crate provides extensions most containers want, built only on the
//! public extension contract of `trellis_container`:
//!
//! - [`TracingExtension`] - Installs the `tracing` subscriber during bootstrap
//! - [`PropertyOverrideExtension`] - Rewrites definition attributes before any
//!   ordinary component is built
//!
//! # Example
//!
//! ```
//! use trellis_container::context::Context;
//! use trellis_container::registry::Definition;
//! use trellis_core_extensions::{PropertyOverrideExtension, TracingExtension};
//! use tracing::Level;
//!
//! struct Pool { size: usize }
//!
//! let mut context = Context::new();
//! context.add_extension(TracingExtension::default().with_level(Level::WARN).into_extension());
//! context.register(
//!     "overrides",
//!     PropertyOverrideExtension::new()
//!         .with_override("pool.size", "16")
//!         .into_definition(0),
//! );
//! context.register(
//!     "pool",
//!     Definition::of(|_, definition| {
//!         let size = definition.attribute("size").unwrap_or("4").parse().unwrap_or(4);
//!         Ok(Pool { size })
//!     }),
//! );
//! context.refresh().unwrap();
//!
//! assert_eq!(context.get::<Pool>("pool").unwrap().size, 16);
//! ```

mod property_override;
mod tracing_extension;

pub use property_override::{PropertyOverrideError, PropertyOverrideExtension};
pub use tracing_extension::{TracingConfig, TracingExtension, TracingFormat};
