//! Persistent state configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Parameters for the persistent key-value state facility.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StateConfig {
    /// Debounce for deferred saves, in milliseconds.
    #[serde(default = "default_save_timeout_ms")]
    #[validate(range(min = 0, max = 600000))]
    pub save_timeout_ms: u64,

    /// Overrides the state directory; the XDG state home is used when unset.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

fn default_save_timeout_ms() -> u64 {
    1000
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            save_timeout_ms: default_save_timeout_ms(),
            base_dir: None,
        }
    }
}
