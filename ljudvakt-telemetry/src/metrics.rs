//! Prometheus registry for dispatch observability.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

/// Counters and histograms the daemon maintains about the dispatch engine.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub dispatched_events: Counter,
    pub hook_failures: Counter,
    pub dispatch_latency: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let dispatched_events =
            Counter::new("ljudvakt_events_total", "Total dispatched events").unwrap();
        let hook_failures =
            Counter::new("ljudvakt_hook_failures_total", "Hook executions that failed").unwrap();
        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "ljudvakt_dispatch_latency_ns",
                "Per-event dispatch time",
            )
            .buckets(vec![10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0]),
        )
        .unwrap();

        registry.register(Box::new(dispatched_events.clone())).unwrap();
        registry.register(Box::new(hook_failures.clone())).unwrap();
        registry.register(Box::new(dispatch_latency.clone())).unwrap();

        Self {
            registry,
            dispatched_events,
            hook_failures,
            dispatch_latency,
        }
    }

    /// Text-encodes the registry for scraping or debug dumps.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}
