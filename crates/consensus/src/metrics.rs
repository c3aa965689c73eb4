//! Prometheus metrics for the consensus engine.
//!
//! Metric names are part of the operational contract: existing dashboards
//! key on them, so they must not change.

use prometheus::{IntCounter, IntGauge, Registry};

/// Engine metrics registered against an injected registry.
///
/// The registry is injected at initialization rather than taken from the
/// process-wide default, and a registration conflict is surfaced as a
/// fatal initialization error.
pub(crate) struct Metrics {
    /// Number of currently processing blocks.
    pub processing: IntGauge,
    /// Number of blocks accepted by this instance.
    pub accepted: IntGauge,
    /// Number of blocks rejected by this instance.
    pub rejected: IntGauge,
    /// Number of polls that moved at least one decision.
    pub polls_successful: IntCounter,
    /// Number of polls that moved nothing.
    pub polls_failed: IntCounter,
}

impl Metrics {
    /// Create the metric set and register it with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let processing = IntGauge::new("blks_processing", "Number of currently processing blocks")?;
        let accepted = IntGauge::new("blks_accepted_count", "Number of blocks accepted")?;
        let rejected = IntGauge::new("blks_rejected_count", "Number of blocks rejected")?;
        let polls_successful =
            IntCounter::new("polls_successful", "Number of successful polls")?;
        let polls_failed = IntCounter::new("polls_failed", "Number of failed polls")?;

        registry.register(Box::new(processing.clone()))?;
        registry.register(Box::new(accepted.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(polls_successful.clone()))?;
        registry.register(Box::new(polls_failed.clone()))?;

        Ok(Self {
            processing,
            accepted,
            rejected,
            polls_successful,
            polls_failed,
        })
    }
}
