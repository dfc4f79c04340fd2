//! Dispatch engine configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Parameters of the event dispatch engine.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CoreConfig {
    /// Pending-queue depth above which the daemon logs a warning. The queue
    /// itself is unbounded; this is an observability threshold, not a limit.
    #[serde(default = "default_queue_warning_threshold")]
    #[validate(range(min = 16, max = 1048576))]
    pub queue_warning_threshold: usize,
}

fn default_queue_warning_threshold() -> usize {
    512
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_warning_threshold: default_queue_warning_threshold(),
        }
    }
}
