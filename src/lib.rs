//! A managed-object container driven by ordered extension hooks.
//!
//! Re-exports the Trellis crates:
//!
//! - [`trellis_container`] - Extension orchestration, the factory and the context
//! - [`trellis_core_extensions`] - Tracing and attribute-override extensions

/// Extension orchestration core.
pub use trellis_container;

/// Ready-made infrastructure extensions.
pub use trellis_core_extensions;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use trellis_container::prelude::*;
    pub use trellis_core_extensions::{
        PropertyOverrideExtension, TracingConfig, TracingExtension, TracingFormat,
    };
}
