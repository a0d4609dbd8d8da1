//! Prometheus metrics for invalidation traffic

use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    HistogramOpts, IntCounter, Opts, Registry,
};
use std::sync::Arc;

const DURATION_BUCKETS: [f64; 11] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Metrics for queued and flushed invalidations
#[derive(Clone)]
pub struct InvalidationMetrics {
    /// Invalidations accepted into the queue
    pub queued_total: Arc<CounterVec>,

    /// Invalidations dropped as duplicates of a pending one
    pub deduplicated_total: Arc<CounterVec>,

    /// Concrete requests handed to the sender
    pub dispatched_requests_total: Arc<IntCounter>,

    /// Classified per-server failures
    pub failures_total: Arc<CounterVec>,

    /// Duration of flush calls
    pub flush_duration_seconds: Arc<Histogram>,
}

impl InvalidationMetrics {
    /// Create metrics registered in the default registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let queued_total = register_counter_vec!(
            "proxy_invalidate_queued_total",
            "Total number of invalidations queued",
            &["operation"] // operation: purge, refresh, ban
        )?;

        let deduplicated_total = register_counter_vec!(
            "proxy_invalidate_deduplicated_total",
            "Total number of duplicate invalidations skipped",
            &["operation"]
        )?;

        let dispatched_requests_total = register_int_counter!(
            "proxy_invalidate_dispatched_requests_total",
            "Total number of requests sent to caching proxies"
        )?;

        let failures_total = register_counter_vec!(
            "proxy_invalidate_failures_total",
            "Total number of failed requests to caching proxies",
            &["kind"] // kind: unreachable, response
        )?;

        let flush_duration_seconds = register_histogram!(
            "proxy_invalidate_flush_duration_seconds",
            "Duration of flush operations in seconds",
            DURATION_BUCKETS.to_vec()
        )?;

        Ok(Self {
            queued_total: Arc::new(queued_total),
            deduplicated_total: Arc::new(deduplicated_total),
            dispatched_requests_total: Arc::new(dispatched_requests_total),
            failures_total: Arc::new(failures_total),
            flush_duration_seconds: Arc::new(flush_duration_seconds),
        })
    }

    /// Create metrics with custom registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let queued_total = CounterVec::new(
            Opts::new(
                "proxy_invalidate_queued_total",
                "Total number of invalidations queued",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(queued_total.clone()))?;

        let deduplicated_total = CounterVec::new(
            Opts::new(
                "proxy_invalidate_deduplicated_total",
                "Total number of duplicate invalidations skipped",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(deduplicated_total.clone()))?;

        let dispatched_requests_total = IntCounter::new(
            "proxy_invalidate_dispatched_requests_total",
            "Total number of requests sent to caching proxies",
        )?;
        registry.register(Box::new(dispatched_requests_total.clone()))?;

        let failures_total = CounterVec::new(
            Opts::new(
                "proxy_invalidate_failures_total",
                "Total number of failed requests to caching proxies",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let flush_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "proxy_invalidate_flush_duration_seconds",
                "Duration of flush operations in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(flush_duration_seconds.clone()))?;

        Ok(Self {
            queued_total: Arc::new(queued_total),
            deduplicated_total: Arc::new(deduplicated_total),
            dispatched_requests_total: Arc::new(dispatched_requests_total),
            failures_total: Arc::new(failures_total),
            flush_duration_seconds: Arc::new(flush_duration_seconds),
        })
    }

    /// Record an enqueue attempt
    pub fn record_queued(&self, operation: &str, accepted: bool) {
        if accepted {
            self.queued_total.with_label_values(&[operation]).inc();
        } else {
            self.deduplicated_total.with_label_values(&[operation]).inc();
        }
    }

    /// Record requests handed to the sender
    pub fn record_dispatched(&self, count: usize) {
        self.dispatched_requests_total.inc_by(count as u64);
    }

    /// Record a classified failure
    pub fn record_failure(&self, kind: &str) {
        self.failures_total.with_label_values(&[kind]).inc();
    }

    /// Record flush duration
    pub fn record_flush_duration(&self, duration_secs: f64) {
        self.flush_duration_seconds.observe(duration_secs);
    }
}
