//! # Metrics Collection Module
//!
//! Request metrics tracking and Prometheus export via `GET /metrics`.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `chatwire_requests_total{schema, mode, status, model}` - Completed requests
//! - `chatwire_errors_total{schema, error_type}` - Errors by type
//! - `chatwire_client_disconnects_total{schema}` - Streams abandoned by the client
//! - `chatwire_fragments_total{schema}` - Content events written to streams
//!
//! **Histograms:**
//! - `chatwire_request_duration_seconds{schema, mode}` - Request duration

pub mod handler;

// Re-export PrometheusBuilder for test compatibility
pub use metrics_exporter_prometheus::PrometheusBuilder;

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const REQUESTS_TOTAL: &str = "chatwire_requests_total";
pub const ERRORS_TOTAL: &str = "chatwire_errors_total";
pub const CLIENT_DISCONNECTS_TOTAL: &str = "chatwire_client_disconnects_total";
pub const FRAGMENTS_TOTAL: &str = "chatwire_fragments_total";
pub const REQUEST_DURATION_SECONDS: &str = "chatwire_request_duration_seconds";

/// Central coordinator for metrics recording and rendering.
pub struct MetricsCollector {
    /// Server startup time for uptime calculation
    start_time: Instant,
    /// Thread-safe cache for sanitized Prometheus labels
    label_cache: DashMap<String, String>,
    /// Prometheus handle for rendering metrics
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsCollector {
    pub fn new(
        start_time: Instant,
        prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        Self {
            start_time,
            label_cache: DashMap::new(),
            prometheus_handle,
        }
    }

    /// Get sanitized Prometheus label (cached for performance).
    ///
    /// Output matches `[a-zA-Z_][a-zA-Z0-9_]*`; invalid characters become underscores.
    pub fn sanitize_label(&self, label: &str) -> String {
        if let Some(cached) = self.label_cache.get(label) {
            return cached.clone();
        }

        let mut sanitized = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();

        if sanitized.is_empty() || sanitized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            sanitized.insert(0, '_');
        }

        self.label_cache
            .insert(label.to_string(), sanitized.clone());
        sanitized
    }

    /// Record a finished request and its duration.
    pub fn record_request(
        &self,
        schema: &'static str,
        mode: &'static str,
        status: u16,
        model: &str,
        duration: Duration,
    ) {
        metrics::counter!(REQUESTS_TOTAL,
            "schema" => schema,
            "mode" => mode,
            "status" => status.to_string(),
            "model" => self.sanitize_label(model)
        )
        .increment(1);
        metrics::histogram!(REQUEST_DURATION_SECONDS,
            "schema" => schema,
            "mode" => mode
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_error(&self, schema: &'static str, error_type: &'static str) {
        metrics::counter!(ERRORS_TOTAL,
            "schema" => schema,
            "error_type" => error_type
        )
        .increment(1);
    }

    pub fn record_disconnect(&self, schema: &'static str) {
        metrics::counter!(CLIENT_DISCONNECTS_TOTAL, "schema" => schema).increment(1);
    }

    pub fn record_fragment(&self, schema: &'static str) {
        metrics::counter!(FRAGMENTS_TOTAL, "schema" => schema).increment(1);
    }

    /// Get uptime in seconds since server startup.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render Prometheus metrics in text format.
    pub fn render_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

/// Initialize the Prometheus exporter with custom histogram buckets.
///
/// Duration buckets span streaming completions that may run for minutes:
/// [0.01, 0.05, 0.1, 0.25, 0.5, 1, 2.5, 5, 10, 30, 60, 120, 300] seconds.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::Matcher;

    let duration_buckets = &[
        0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            duration_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}

/// Install the global recorder, or hand back a detached handle when one is
/// already installed (several routers in one process).
pub fn setup_metrics_or_detached() -> metrics_exporter_prometheus::PrometheusHandle {
    setup_metrics().unwrap_or_else(|e| {
        tracing::debug!("Metrics already initialized, creating new handle: {}", e);
        PrometheusBuilder::new().build_recorder().handle()
    })
}
