//! # Ljudvakt Configuration System
//!
//! Hierarchical configuration management for the ljudvakt session manager.
//!
//! ## Features
//! - **Unified Configuration**: single source of truth across all components
//! - **Validation**: runtime validation of critical parameters
//! - **Environment Awareness**: `LJUDVAKT_*` variables override file values

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod core;
mod error;
mod reserve;
mod state;
mod telemetry;
mod validation;

pub use core::CoreConfig;
pub use error::ConfigError;
pub use reserve::ReserveConfig;
pub use state::StateConfig;
pub use telemetry::TelemetryConfig;

/// Top-level configuration container for all ljudvakt components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct LjudvaktConfig {
    /// Dispatch engine parameters.
    #[validate(nested)]
    pub core: CoreConfig,

    /// Persistent state parameters (debounce, location override).
    #[validate(nested)]
    pub state: StateConfig,

    /// Logging and metrics configuration.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    /// Device reservation parameters.
    #[validate(nested)]
    pub reserve: ReserveConfig,
}

impl LjudvaktConfig {
    /// Load configuration from a specific file.
    ///
    /// Hierarchy: defaults, then the file, then `LJUDVAKT_*` environment
    /// variables (nested keys split on `__`).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }
        Self::extract(
            Figment::from(Serialized::defaults(LjudvaktConfig::default())).merge(Yaml::file(path)),
        )
    }

    /// Load defaults plus environment overrides, without a file.
    pub fn load_defaults() -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(LjudvaktConfig::default())))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("LJUDVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
