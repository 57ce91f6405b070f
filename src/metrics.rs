//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Gateway
    pub gateway_requests: IntCounter,
    pub gateway_failures: IntCounter,
    pub predefined_calls: IntCounterVec,

    // Endpoint pool
    pub upstream_transport_failures: IntCounterVec,
    pub endpoint_demotions: IntCounterVec,
    pub endpoint_restorations: IntCounterVec,
    pub pool_exhausted: IntCounterVec,
    pub available_endpoints: IntGaugeVec,

    // Signing
    pub signing_success: IntCounter,
    pub signing_failures: IntCounter,
    pub nonce_resyncs: IntCounter,

    // Histograms
    pub upstream_latency: Histogram,
    pub signing_cycle_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let gateway_requests = IntCounter::with_opts(Opts::new(
            "gateway_requests_total",
            "Total number of inbound JSON-RPC requests",
        ))?;

        let gateway_failures = IntCounter::with_opts(Opts::new(
            "gateway_failures_total",
            "Inbound requests answered with a non-200 status",
        ))?;

        let predefined_calls = IntCounterVec::new(
            Opts::new("predefined_calls_total", "Requests served by a predefined function"),
            &["method"],
        )?;

        let upstream_transport_failures = IntCounterVec::new(
            Opts::new(
                "upstream_transport_failures_total",
                "Transport-level failures reported against upstream endpoints",
            ),
            &["network"],
        )?;

        let endpoint_demotions = IntCounterVec::new(
            Opts::new("endpoint_demotions_total", "Endpoints marked unavailable"),
            &["network"],
        )?;

        let endpoint_restorations = IntCounterVec::new(
            Opts::new("endpoint_restorations_total", "Endpoints restored to the pool"),
            &["network"],
        )?;

        let pool_exhausted = IntCounterVec::new(
            Opts::new("pool_exhausted_total", "Selections that found no available endpoint"),
            &["network"],
        )?;

        let available_endpoints = IntGaugeVec::new(
            Opts::new("available_endpoints", "Endpoints currently eligible for selection"),
            &["network"],
        )?;

        let signing_success = IntCounter::with_opts(Opts::new(
            "signing_cycles_success_total",
            "Signing cycles that submitted successfully and advanced the nonce",
        ))?;

        let signing_failures = IntCounter::with_opts(Opts::new(
            "signing_cycles_failed_total",
            "Signing cycles that failed without advancing the nonce",
        ))?;

        let nonce_resyncs = IntCounter::with_opts(Opts::new(
            "nonce_resyncs_total",
            "Nonce counter resynchronizations against the chain",
        ))?;

        let upstream_latency = Histogram::with_opts(
            HistogramOpts::new("upstream_latency_seconds", "Upstream JSON-RPC call latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        let signing_cycle_latency = Histogram::with_opts(
            HistogramOpts::new(
                "signing_cycle_latency_seconds",
                "Duration the nonce lock is held for a build-sign-submit cycle",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        registry.register(Box::new(gateway_requests.clone()))?;
        registry.register(Box::new(gateway_failures.clone()))?;
        registry.register(Box::new(predefined_calls.clone()))?;
        registry.register(Box::new(upstream_transport_failures.clone()))?;
        registry.register(Box::new(endpoint_demotions.clone()))?;
        registry.register(Box::new(endpoint_restorations.clone()))?;
        registry.register(Box::new(pool_exhausted.clone()))?;
        registry.register(Box::new(available_endpoints.clone()))?;
        registry.register(Box::new(signing_success.clone()))?;
        registry.register(Box::new(signing_failures.clone()))?;
        registry.register(Box::new(nonce_resyncs.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(signing_cycle_latency.clone()))?;

        Ok(Self {
            registry,
            gateway_requests,
            gateway_failures,
            predefined_calls,
            upstream_transport_failures,
            endpoint_demotions,
            endpoint_restorations,
            pool_exhausted,
            available_endpoints,
            signing_success,
            signing_failures,
            nonce_resyncs,
            upstream_latency,
            signing_cycle_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
