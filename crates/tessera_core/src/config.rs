//! # Engine Configuration
//!
//! Loaded once at startup, either built in code or parsed from TOML.
//!
//! ```toml
//! initial_capacity = 4096
//! max_entities = 1000000
//! auto_register = false
//! ```

use serde::Deserialize;

use crate::error::{EcsError, EcsResult};

/// Configuration for an [`EngineContext`](crate::EngineContext).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Entity slots reserved up front in the handle provider and record map.
    pub initial_capacity: usize,
    /// Maximum number of entity slots that may ever be issued.
    pub max_entities: u32,
    /// Register component types on first use by an editor.
    ///
    /// When `false`, only types passed to
    /// [`EngineContext::register`](crate::EngineContext::register) are known
    /// and any other type fails with
    /// [`EcsError::UnregisteredComponentType`].
    pub auto_register: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            max_entities: u32::MAX,
            auto_register: true,
        }
    }
}

impl EngineConfig {
    /// Config for tools and tests that must declare every component type.
    #[must_use]
    pub fn sealed() -> Self {
        Self {
            auto_register: false,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the document does not parse or
    /// fails validation.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] when `max_entities` is zero or
    /// smaller than `initial_capacity`.
    pub fn validate(&self) -> EcsResult<()> {
        if self.max_entities == 0 {
            return Err(EcsError::InvalidConfig(
                "max_entities must be greater than zero".to_owned(),
            ));
        }
        if self.initial_capacity > self.max_entities as usize {
            return Err(EcsError::InvalidConfig(format!(
                "initial_capacity {} exceeds max_entities {}",
                self.initial_capacity, self.max_entities
            )));
        }
        Ok(())
    }
}
