//! Delivery metrics for the bulk dispatcher

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Counters updated by dispatcher workers.
///
/// Each instance owns its registry so several dispatchers can coexist in one
/// process.
#[derive(Clone)]
pub struct DispatchMetrics {
    registry: Registry,
    batches_total: IntCounter,
    batches_failed_total: IntCounter,
    points_sent_total: IntCounter,
    push_duration: Histogram,
}

/// Point-in-time copy of the dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub batches_total: u64,
    pub batches_failed_total: u64,
    pub points_sent_total: u64,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let batches_total = IntCounter::with_opts(Opts::new(
            "prom2tsdb_batches_total",
            "Total number of batches pushed to OpenTSDB",
        ))?;
        let batches_failed_total = IntCounter::with_opts(Opts::new(
            "prom2tsdb_batches_failed_total",
            "Total number of batches OpenTSDB did not fully accept",
        ))?;
        let points_sent_total = IntCounter::with_opts(Opts::new(
            "prom2tsdb_points_sent_total",
            "Total number of data points accepted by OpenTSDB",
        ))?;
        let push_duration = Histogram::with_opts(HistogramOpts::new(
            "prom2tsdb_push_duration_seconds",
            "Duration of a single batch push",
        ))?;

        registry.register(Box::new(batches_total.clone()))?;
        registry.register(Box::new(batches_failed_total.clone()))?;
        registry.register(Box::new(points_sent_total.clone()))?;
        registry.register(Box::new(push_duration.clone()))?;

        Ok(Self {
            registry,
            batches_total,
            batches_failed_total,
            points_sent_total,
            push_duration,
        })
    }

    /// Record an accepted batch
    pub fn record_success(&self, points: usize, elapsed: Duration) {
        self.batches_total.inc();
        self.points_sent_total.inc_by(points as u64);
        self.push_duration.observe(elapsed.as_secs_f64());
    }

    /// Record a batch that failed for any reason
    pub fn record_failure(&self, elapsed: Duration) {
        self.batches_total.inc();
        self.batches_failed_total.inc();
        self.push_duration.observe(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            batches_total: self.batches_total.get(),
            batches_failed_total: self.batches_failed_total.get(),
            points_sent_total: self.points_sent_total.get(),
        }
    }

    /// Render the counters in Prometheus text exposition format
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for DispatchMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
