// Decision metrics for the coupon engine
//
// Lock-free counters of decision outcomes plus timing of whole decisions,
// so that slow collaborator lookups show up without a tracing backend.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Decisions slower than this are counted and logged
const SLOW_DECISION_THRESHOLD_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct DecisionMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    coupons_created: AtomicU64,
    creations_rejected: AtomicU64,
    redemptions_succeeded: AtomicU64,
    redemptions_rejected: AtomicU64,
    redemption_retries: AtomicU64,
    redemption_conflicts: AtomicU64,
    transient_failures: AtomicU64,

    decisions: AtomicU64,
    total_decision_time_us: AtomicU64,
    slow_decisions: AtomicU64,
}

/// Which counter an outcome lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    CreationRejected,
    Redeemed,
    RedemptionRejected,
    Conflict,
    Transient,
}

impl DecisionMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Created => &self.inner.coupons_created,
            Outcome::CreationRejected => &self.inner.creations_rejected,
            Outcome::Redeemed => &self.inner.redemptions_succeeded,
            Outcome::RedemptionRejected => &self.inner.redemptions_rejected,
            Outcome::Conflict => &self.inner.redemption_conflicts,
            Outcome::Transient => &self.inner.transient_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A lost compare-and-swap that will be retried
    pub fn record_retry(&self) {
        self.inner.redemption_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Start timing a decision; recorded when the timer is dropped
    pub fn start_decision(&self, operation: &'static str) -> DecisionTimer {
        DecisionTimer {
            start: Instant::now(),
            operation,
            metrics: self.clone(),
        }
    }

    fn record_decision(&self, operation: &'static str, duration: Duration) {
        self.inner.decisions.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_decision_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_DECISION_THRESHOLD_MS {
            self.inner.slow_decisions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow {} decision: {}ms", operation, duration.as_millis());
        }
    }

    pub fn avg_decision_time_ms(&self) -> f64 {
        let count = self.inner.decisions.load(Ordering::Relaxed);
        let total_us = self.inner.total_decision_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            coupons_created: self.inner.coupons_created.load(Ordering::Relaxed),
            creations_rejected: self.inner.creations_rejected.load(Ordering::Relaxed),
            redemptions_succeeded: self.inner.redemptions_succeeded.load(Ordering::Relaxed),
            redemptions_rejected: self.inner.redemptions_rejected.load(Ordering::Relaxed),
            redemption_retries: self.inner.redemption_retries.load(Ordering::Relaxed),
            redemption_conflicts: self.inner.redemption_conflicts.load(Ordering::Relaxed),
            transient_failures: self.inner.transient_failures.load(Ordering::Relaxed),
            decisions: self.inner.decisions.load(Ordering::Relaxed),
            avg_decision_time_ms: self.avg_decision_time_ms(),
            slow_decisions: self.inner.slow_decisions.load(Ordering::Relaxed),
        }
    }
}

impl Default for DecisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the elapsed time of one decision on drop
pub struct DecisionTimer {
    start: Instant,
    operation: &'static str,
    metrics: DecisionMetrics,
}

impl Drop for DecisionTimer {
    fn drop(&mut self) {
        self.metrics
            .record_decision(self.operation, self.start.elapsed());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MetricsSummary {
    pub coupons_created: u64,
    pub creations_rejected: u64,
    pub redemptions_succeeded: u64,
    pub redemptions_rejected: u64,
    pub redemption_retries: u64,
    pub redemption_conflicts: u64,
    pub transient_failures: u64,
    pub decisions: u64,
    pub avg_decision_time_ms: f64,
    pub slow_decisions: u64,
}
