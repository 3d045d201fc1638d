//! Prometheus metrics collection for stackrelay
//!
//! This module provides metrics instrumentation for tracking:
//! - Request outcomes by endpoint
//! - Provider call latency by operation
//! - Relayed stream chunks, stream failures and client disconnects
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::error::Operation;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Request outcome for type-safe metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Response produced (JSON body or committed stream)
    Success,
    /// Rejected by validation
    Rejected,
    /// Provider failed before a response was committed
    ProviderFailed,
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::ProviderFailed => "provider_failed",
        }
    }
}

/// Metrics collector for stackrelay
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    requests_total: IntCounterVec,
    provider_duration: HistogramVec,
    stream_chunks: IntCounter,
    stream_failures: IntCounter,
    client_disconnects: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 2 endpoints x 3 outcomes
        let requests_total = IntCounterVec::new(
            Opts::new(
                "stackrelay_requests_total",
                "Total number of gateway requests by endpoint and outcome",
            ),
            &["endpoint", "outcome"],
        )?;

        let provider_duration = HistogramVec::new(
            HistogramOpts::new(
                "stackrelay_provider_duration_seconds",
                "Provider call latency in seconds (until the reply or stream is available)",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["operation"],
        )?;

        let stream_chunks = IntCounter::new(
            "stackrelay_stream_chunks_total",
            "Total number of chunks relayed to streaming clients",
        )?;

        let stream_failures = IntCounter::new(
            "stackrelay_stream_failures_total",
            "Streams terminated abnormally after the response was committed",
        )?;

        let client_disconnects = IntCounter::new(
            "stackrelay_client_disconnects_total",
            "Streams abandoned by the client before the provider finished",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(provider_duration.clone()))?;
        registry.register(Box::new(stream_chunks.clone()))?;
        registry.register(Box::new(stream_failures.clone()))?;
        registry.register(Box::new(client_disconnects.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            provider_duration,
            stream_chunks,
            stream_failures,
            client_disconnects,
        })
    }

    /// Record one finished request
    pub fn record_request(&self, operation: Operation, outcome: Outcome) {
        self.requests_total
            .with_label_values(&[operation.as_str(), outcome.as_str()])
            .inc();
    }

    /// Record provider call latency
    pub fn observe_provider_duration(&self, operation: Operation, seconds: f64) {
        self.provider_duration
            .with_label_values(&[operation.as_str()])
            .observe(seconds);
    }

    pub fn stream_chunk(&self) {
        self.stream_chunks.inc();
    }

    pub fn stream_failure(&self) {
        self.stream_failures.inc();
    }

    pub fn client_disconnect(&self) {
        self.client_disconnects.inc();
    }

    /// Requests recorded for an endpoint/outcome pair
    pub fn requests_count(&self, operation: Operation, outcome: Outcome) -> u64 {
        self.requests_total
            .with_label_values(&[operation.as_str(), outcome.as_str()])
            .get()
    }

    pub fn stream_chunks_count(&self) -> u64 {
        self.stream_chunks.get()
    }

    pub fn stream_failures_count(&self) -> u64 {
        self.stream_failures.get()
    }

    pub fn client_disconnects_count(&self) -> u64 {
        self.client_disconnects.get()
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_families.len(),
                "Prometheus text encoder failed"
            );
            e
        })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Metrics output is not valid UTF-8: {}", e))
        })
    }
}
