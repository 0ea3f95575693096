//! Metrics and observability utilities
//!
//! Emits through the `metrics` facade with standardized naming. Installing
//! an exporter is the caller's concern; without one, recording is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all PaperWatch metrics
pub const METRICS_PREFIX: &str = "paperwatch";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_source_fetches_total", METRICS_PREFIX),
        Unit::Count,
        "Adapter invocations by origin and outcome"
    );

    describe_histogram!(
        format!("{}_source_fetch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Adapter fetch latency in seconds"
    );

    describe_counter!(
        format!("{}_source_items_total", METRICS_PREFIX),
        Unit::Count,
        "Items returned by adapters"
    );

    describe_counter!(
        format!("{}_items_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Items dropped before scoring, by reason"
    );

    describe_gauge!(
        format!("{}_selection_size", METRICS_PREFIX),
        Unit::Count,
        "Selected items per tier in the last run"
    );

    describe_counter!(
        format!("{}_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Completed runs by status"
    );

    tracing::info!("Metrics registered");
}

/// Times one adapter fetch
pub struct FetchTimer {
    start: Instant,
    origin: String,
}

impl FetchTimer {
    pub fn start(origin: &str) -> Self {
        Self {
            start: Instant::now(),
            origin: origin.to_string(),
        }
    }

    /// Record the outcome and return the measured latency
    pub fn finish(self, item_count: usize, success: bool) -> Duration {
        let latency = self.start.elapsed();
        record_source_fetch(&self.origin, latency, item_count, success);
        latency
    }
}

/// Helper to record adapter fetch metrics
pub fn record_source_fetch(origin: &str, latency: Duration, item_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_source_fetches_total", METRICS_PREFIX),
        "origin" => origin.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_source_fetch_duration_seconds", METRICS_PREFIX),
        "origin" => origin.to_string()
    )
    .record(latency.as_secs_f64());

    if success {
        counter!(
            format!("{}_source_items_total", METRICS_PREFIX),
            "origin" => origin.to_string()
        )
        .increment(item_count as u64);
    }
}

/// Helper to record items dropped before scoring
pub fn record_dropped(reason: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        format!("{}_items_dropped_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(count as u64);
}

/// Helper to record the tier mix of a selection
pub fn record_selection(p0: usize, p1: usize, p2: usize) {
    for (tier, count) in [("P0", p0), ("P1", p1), ("P2", p2)] {
        gauge!(
            format!("{}_selection_size", METRICS_PREFIX),
            "tier" => tier
        )
        .set(count as f64);
    }
}

/// Helper to record a finished run
pub fn record_run(status: &str) {
    counter!(
        format!("{}_runs_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_timer() {
        let timer = FetchTimer::start("PubMed");
        std::thread::sleep(Duration::from_millis(5));
        let latency = timer.finish(3, true);
        assert!(latency >= Duration::from_millis(5));
    }
}
