//! Tracing and observability extension.
//!
//! Provides [`TracingExtension`] which configures the `tracing` subscriber and
//! exposes its configuration as a component.
//!
//! # Lifecycle
//!
//! - **`mutate_registry()`** registers the [`TracingConfig`] singleton under
//!   [`TracingExtension::CONFIG_ID`] so other components can read the intended
//!   configuration.
//! - **`process_factory()`** initializes the tracing subscriber. Registry
//!   mutators discovered later can still influence the definitions before
//!   anything is logged through the installed subscriber.
//!
//! # Example
//!
//! ```
//! use trellis_container::context::Context;
//! use trellis_core_extensions::{TracingConfig, TracingExtension, TracingFormat};
//! use tracing::Level;
//!
//! let mut context = Context::new();
//! context.add_extension(
//!     TracingExtension::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact)
//!         .into_extension(),
//! );
//! context.refresh().unwrap();
//!
//! let config = context.get::<TracingConfig>(TracingExtension::CONFIG_ID).unwrap();
//! assert_eq!(config.level, Level::DEBUG);
//! ```

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trellis_container::error::HookError;
use trellis_container::extension::{Capabilities, Extension, ExtensionRef};
use trellis_container::factory::Factory;
use trellis_container::registry::{Definition, Registry};

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing configuration component.
///
/// Registered as a singleton by [`TracingExtension`]. Components can read
/// this to adapt their logging to the configured level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// The configured log level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingExtension
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing and logging extension.
///
/// Added as an eager registry mutator and factory reader, so the
/// subscriber is installed before the instance-hook chain is built.
///
/// # Configuration Options
///
/// ```
/// use trellis_core_extensions::{TracingExtension, TracingFormat};
/// use tracing::Level;
///
/// // Development: pretty output with span enter/exit
/// let dev = TracingExtension::default()
///     .with_level(Level::DEBUG)
///     .with_span_events(true);
///
/// // Production: JSON output for log aggregation
/// let prod = TracingExtension::default()
///     .with_format(TracingFormat::Json)
///     .with_env_filter("trellis_container=info,my_app=debug");
/// ```
#[derive(Debug, Clone)]
pub struct TracingExtension {
    /// Maximum log level.
    level: Level,
    /// Output format.
    format: TracingFormat,
    /// Environment filter (e.g., "`trellis_container=debug`").
    env_filter: Option<String>,
    /// Whether to include span events (enter/exit).
    span_events: bool,
}

impl Default for TracingExtension {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingExtension {
    /// Id of the extension when added to a context.
    pub const ID: &'static str = "trellis.tracing";

    /// Id of the registered [`TracingConfig`] component.
    pub const CONFIG_ID: &'static str = "trellis.tracing_config";

    /// Creates a new `TracingExtension` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a custom environment filter string.
    ///
    /// Format: `target=level,target=level,...`. An unparsable filter falls
    /// back to the configured level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Returns the configuration registered by this extension.
    #[must_use]
    pub fn config(&self) -> TracingConfig {
        TracingConfig {
            level: self.level,
            format: self.format,
        }
    }

    /// Wraps this extension for [`Context::add_extension`](trellis_container::context::Context::add_extension).
    #[must_use]
    pub fn into_extension(self) -> ExtensionRef {
        ExtensionRef::eager(
            Self::ID,
            Capabilities::REGISTRY_MUTATOR | Capabilities::FACTORY_READER,
            self,
        )
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }

    /// Installs the global subscriber. Does nothing if one is already set.
    fn install(&self) {
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        let registry = tracing_subscriber::registry().with(self.env_filter());
        let installed = match self.format {
            TracingFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Compact => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events),
                )
                .try_init(),
        };

        match installed {
            Ok(()) => tracing::info!(
                level = %self.level,
                format = ?self.format,
                "tracing subscriber installed"
            ),
            Err(_) => tracing::debug!("global subscriber already set; keeping it"),
        }
    }
}

impl Extension for TracingExtension {
    fn name(&self) -> &str {
        Self::ID
    }

    fn mutate_registry(&self, registry: &Registry) -> Result<(), HookError> {
        let config = self.config();
        registry.register(Self::CONFIG_ID, Definition::of(move |_, _| Ok(config)))?;
        Ok(())
    }

    fn process_factory(&self, _factory: &Factory) -> Result<(), HookError> {
        self.install();
        Ok(())
    }
}
