//! Error types for bootstrap, object creation and teardown.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`ConfigurationError`] | discovery and tiering during refresh | aborts the refresh |
//! | [`LifecycleError`] | hooks and constructors during object creation | aborts that object |
//! | [`TeardownError`] | destruction hooks | logged, teardown continues |

use core::fmt;

use thiserror::Error;

use crate::component::ComponentId;
use crate::context::ContainerState;
use crate::extension::Tier;

/// Boxed error carried as a [`HookError`] source.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// HookPhase
// ─────────────────────────────────────────────────────────────────────────────

/// The hook that was running when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// [`Extension::mutate_registry`](crate::extension::Extension::mutate_registry).
    RegistryMutation,
    /// [`Extension::process_factory`](crate::extension::Extension::process_factory).
    FactoryProcessing,
    /// [`Extension::merged_definition`](crate::extension::Extension::merged_definition).
    MergedDefinition,
    /// [`Extension::before_init`](crate::extension::Extension::before_init).
    BeforeInit,
    /// [`Extension::after_init`](crate::extension::Extension::after_init).
    AfterInit,
    /// [`Extension::before_destruction`](crate::extension::Extension::before_destruction).
    Destruction,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPhase::RegistryMutation => "registry-mutation",
            HookPhase::FactoryProcessing => "factory-processing",
            HookPhase::MergedDefinition => "merged-definition",
            HookPhase::BeforeInit => "before-init",
            HookPhase::AfterInit => "after-init",
            HookPhase::Destruction => "destruction",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookError
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned by extension hooks and component constructors.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HookError {
    /// Creates a hook error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a hook error wrapping another error.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ConfigurationError> for HookError {
    fn from(error: ConfigurationError) -> Self {
        Self::with_source(error.to_string(), error)
    }
}

impl From<LifecycleError> for HookError {
    fn from(error: LifecycleError) -> Self {
        Self::with_source(error.to_string(), error)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConfigurationError
// ─────────────────────────────────────────────────────────────────────────────

/// Malformed extension or registry state found during bootstrap.
///
/// Fatal: aborts the whole refresh.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A definition with this id exists and overriding is disabled.
    #[error("component '{0}' is already defined and overriding is disabled")]
    DuplicateDefinition(ComponentId),

    /// No definition with this id exists.
    #[error("no component named '{0}' is defined")]
    NoSuchDefinition(ComponentId),

    /// A definition declared a tier reserved for pre-supplied extensions.
    #[error("component '{id}' declares tier {tier:?}, which is reserved for pre-supplied extensions")]
    ReservedTier {
        /// The offending definition.
        id: ComponentId,
        /// The declared tier.
        tier: Tier,
    },

    /// A definition tagged as an extension produced something else.
    #[error("component '{id}' is tagged as an extension but produced '{type_name}'")]
    NotAnExtension {
        /// The offending definition.
        id: ComponentId,
        /// Type of the produced object.
        type_name: &'static str,
    },

    /// An extension could not be instantiated.
    #[error("failed to instantiate extension '{id}'")]
    Instantiation {
        /// The extension's id.
        id: ComponentId,
        /// The creation failure.
        #[source]
        source: LifecycleError,
    },

    /// A bootstrap hook failed.
    #[error("{phase} hook of extension '{extension}' failed")]
    HookFailed {
        /// The failing hook.
        phase: HookPhase,
        /// The extension's id.
        extension: ComponentId,
        /// The hook's error.
        #[source]
        source: HookError,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// LifecycleError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure while creating a single object.
///
/// Aborts that object's creation only; objects already created are unaffected.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No definition with this id exists.
    #[error("no component named '{0}' is defined")]
    NoSuchDefinition(ComponentId),

    /// A singleton requested itself while being created.
    #[error("component '{0}' is currently in creation")]
    CurrentlyInCreation(ComponentId),

    /// The definition's constructor failed.
    #[error("constructor of component '{id}' failed")]
    Construction {
        /// The component's id.
        id: ComponentId,
        /// The constructor's error.
        #[source]
        source: HookError,
    },

    /// A singleton was requested while singletons are being destroyed.
    #[error("component '{0}' cannot be created while singletons are being destroyed")]
    CreationNotAllowed(ComponentId),

    /// A per-object hook failed.
    #[error("{phase} hook of extension '{extension}' failed for component '{id}'")]
    HookFailed {
        /// The component being created.
        id: ComponentId,
        /// The failing extension.
        extension: ComponentId,
        /// The failing hook.
        phase: HookPhase,
        /// The hook's error.
        #[source]
        source: HookError,
    },

    /// The component exists but is not of the requested type.
    #[error("component '{id}' is a '{actual}', not a '{expected}'")]
    TypeMismatch {
        /// The component's id.
        id: ComponentId,
        /// The requested type.
        expected: &'static str,
        /// The actual type.
        actual: &'static str,
    },

    /// The context is not running.
    #[error("context is {0:?}, not running")]
    ContextNotActive(ContainerState),
}

// ─────────────────────────────────────────────────────────────────────────────
// TeardownError
// ─────────────────────────────────────────────────────────────────────────────

/// A destruction hook failed.
///
/// Never fatal: teardown continues with the remaining extensions and objects.
#[derive(Debug, Error)]
#[error("destruction hook of extension '{extension}' failed for component '{id}'")]
pub struct TeardownError {
    /// The singleton being destroyed.
    pub id: ComponentId,
    /// The failing extension.
    pub extension: ComponentId,
    /// The hook's error.
    #[source]
    pub source: HookError,
}

// ─────────────────────────────────────────────────────────────────────────────
// ContainerError
// ─────────────────────────────────────────────────────────────────────────────

/// Error surfaced to the caller of [`Context::refresh`](crate::context::Context::refresh).
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Bootstrap configuration failure.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Object creation failure.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
