//! Attribute overrides applied before any ordinary component is built.
//!
//! [`PropertyOverrideExtension`] is a factory reader. Each override key names
//! a component and one of its definition attributes, separated by the first
//! `.`: `"pool.size"` sets the `size` attribute of component `pool`.
//!
//! Overrides come from code or from a JSON object. Both flat and nested
//! objects are accepted:
//!
//! ```json
//! { "pool.size": 16, "cache": { "ttl": "30s", "enabled": true } }
//! ```

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use trellis_container::component::ComponentId;
use trellis_container::error::HookError;
use trellis_container::extension::{Capabilities, Extension, Tier};
use trellis_container::factory::Factory;
use trellis_container::registry::Definition;

/// Errors produced while reading or applying overrides.
#[derive(Debug, Error)]
pub enum PropertyOverrideError {
    /// The key has no `component.attribute` separator.
    #[error("invalid override key '{0}': expected 'component.attribute'")]
    InvalidKey(String),

    /// The key names a component that is not defined.
    #[error("override '{key}' targets unknown component '{component}'")]
    UnknownComponent {
        /// The full override key.
        key: String,
        /// The component part of the key.
        component: String,
    },

    /// The JSON value for this key is not a scalar.
    #[error("override '{0}' must be a string, number or boolean")]
    UnsupportedValue(String),

    /// The JSON document is not an object.
    #[error("override document must be a JSON object")]
    NotAnObject,

    /// The JSON document could not be parsed.
    #[error("failed to parse override document")]
    Json(#[from] serde_json::Error),
}

/// Factory reader that sets definition attributes from `component.attribute`
/// keys.
///
/// # Example
///
/// ```
/// use trellis_core_extensions::PropertyOverrideExtension;
///
/// let overrides = PropertyOverrideExtension::from_json(r#"{ "pool": { "size": 16 } }"#)
///     .unwrap()
///     .with_override("cache.ttl", "30s");
/// assert_eq!(overrides.overrides().get("pool.size").map(String::as_str), Some("16"));
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PropertyOverrideExtension {
    /// Override values by `component.attribute` key.
    overrides: BTreeMap<String, String>,

    /// Skip keys whose component is not defined instead of failing.
    #[serde(default)]
    ignore_unknown_components: bool,

    /// Keys applied by the last factory phase.
    #[serde(skip)]
    applied: Mutex<Vec<String>>,
}

impl Clone for PropertyOverrideExtension {
    fn clone(&self) -> Self {
        Self {
            overrides: self.overrides.clone(),
            ignore_unknown_components: self.ignore_unknown_components,
            applied: Mutex::new(self.applied.lock().clone()),
        }
    }
}

impl PropertyOverrideExtension {
    /// Creates an extension with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from a JSON object.
    ///
    /// Nested objects one level deep are flattened into
    /// `component.attribute` keys. Numbers and booleans are stored in their
    /// JSON text form.
    ///
    /// # Errors
    ///
    /// [`PropertyOverrideError::Json`] for malformed input,
    /// [`PropertyOverrideError::NotAnObject`] if the document is not an
    /// object, [`PropertyOverrideError::UnsupportedValue`] for arrays, nulls
    /// and deeper nesting, and [`PropertyOverrideError::InvalidKey`] for a flat
    /// key without a separator.
    pub fn from_json(json: &str) -> Result<Self, PropertyOverrideError> {
        let Value::Object(document) = serde_json::from_str::<Value>(json)? else {
            return Err(PropertyOverrideError::NotAnObject);
        };

        let mut extension = Self::new();
        for (key, value) in document {
            if let Value::Object(attributes) = value {
                for (attribute, value) in attributes {
                    let key = format!("{key}.{attribute}");
                    let value = scalar(&key, value)?;
                    extension.overrides.insert(key, value);
                }
            } else {
                split_key(&key)?;
                let value = scalar(&key, value)?;
                extension.overrides.insert(key, value);
            }
        }
        Ok(extension)
    }

    /// Adds or replaces an override.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Sets whether keys naming undefined components are skipped.
    #[must_use]
    pub fn ignore_unknown_components(mut self, ignore: bool) -> Self {
        self.ignore_unknown_components = ignore;
        self
    }

    /// Returns the configured overrides.
    #[must_use]
    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    /// Returns the keys applied by the last factory phase, in key order.
    #[must_use]
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().clone()
    }

    /// Wraps this extension in an ordered factory-reader definition.
    #[must_use]
    pub fn into_definition(self, rank: i32) -> Definition {
        Definition::extension(move |_, _| Ok(self.clone()))
            .with_capabilities(Capabilities::FACTORY_READER)
            .with_tier(Tier::Ordered(rank))
    }

    fn apply(&self, factory: &Factory) -> Result<Vec<String>, PropertyOverrideError> {
        let mut applied = Vec::with_capacity(self.overrides.len());
        for (key, value) in &self.overrides {
            let (component, attribute) = split_key(key)?;
            let id = ComponentId::from(component);

            let updated = factory
                .registry()
                .update(&id, |definition| definition.set_attribute(attribute, value.as_str()));
            match updated {
                Ok(previous) => {
                    tracing::debug!(
                        component = %id,
                        attribute,
                        value = value.as_str(),
                        replaced = previous.is_some(),
                        "attribute overridden"
                    );
                    applied.push(key.clone());
                }
                Err(_) if self.ignore_unknown_components => {
                    tracing::debug!(key = key.as_str(), "skipping override for unknown component");
                }
                Err(_) => {
                    return Err(PropertyOverrideError::UnknownComponent {
                        key: key.clone(),
                        component: component.to_string(),
                    });
                }
            }
        }
        Ok(applied)
    }
}

impl Extension for PropertyOverrideExtension {
    fn name(&self) -> &str {
        "trellis.property_override"
    }

    fn process_factory(&self, factory: &Factory) -> Result<(), HookError> {
        let applied = self
            .apply(factory)
            .map_err(|error| HookError::with_source(error.to_string(), error))?;
        tracing::info!(overrides = applied.len(), "property overrides applied");
        *self.applied.lock() = applied;
        Ok(())
    }
}

fn split_key(key: &str) -> Result<(&str, &str), PropertyOverrideError> {
    match key.split_once('.') {
        Some((component, attribute)) if !component.is_empty() && !attribute.is_empty() => {
            Ok((component, attribute))
        }
        _ => Err(PropertyOverrideError::InvalidKey(key.to_string())),
    }
}

fn scalar(key: &str, value: Value) -> Result<String, PropertyOverrideError> {
    match value {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        Value::Bool(value) => Ok(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(PropertyOverrideError::UnsupportedValue(key.to_string()))
        }
    }
}
