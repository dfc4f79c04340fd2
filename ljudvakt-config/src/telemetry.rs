//! Telemetry configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Logging and metrics parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default tracing filter, overridable through `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    #[validate(custom(function = validation::validate_non_empty))]
    pub log_filter: String,

    /// Whether the daemon maintains a Prometheus metrics registry.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            metrics: default_true(),
        }
    }
}
