//! Device reservation configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Parameters for the device reservation plugin.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ReserveConfig {
    /// Whether the reservation plugin is loaded at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Application name advertised on the request bus.
    #[serde(default = "default_application_name")]
    #[validate(custom(function = validation::validate_non_empty))]
    pub application_name: String,

    /// Priority used for devices that do not advertise one.
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

fn default_application_name() -> String {
    "Ljudvakt".into()
}

fn default_priority() -> i32 {
    10
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            application_name: default_application_name(),
            priority: default_priority(),
        }
    }
}
