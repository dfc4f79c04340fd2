//! Structured logging with tracing.
//!
//! The daemon installs one fmt subscriber at startup; `RUST_LOG` takes
//! precedence over the configured default filter. `log_event` records a
//! policy-relevant occurrence with its metadata attached as structured
//! fields.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::EnvFilter;

pub struct EventLogger;

impl EventLogger {
    /// Installs the subscriber with the `info` default filter.
    pub fn init() {
        Self::init_with_filter("info");
    }

    /// Installs the subscriber; `RUST_LOG` overrides `default_filter`.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub fn init_with_filter(default_filter: &str) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init();
    }

    /// Log a policy event with key metadata.
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!("policy_event", event_type = event_type);
        let _guard = span.enter();
        tracing::info!(metadata = ?metadata, "policy event");
    }
}
