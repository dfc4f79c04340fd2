//! # Ljudvakt Telemetry and Monitoring
//!
//! Crate for logging and metrics functionalities.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
