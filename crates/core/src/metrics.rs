//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (outcomes, per-stage durations)
//! - External program output (forwarded and suppressed lines)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs total by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidscope_jobs_total", "Total jobs by outcome"),
        &["outcome"], // "completed", "analysis_failed", "locate_failed", "transcode_failed", "abandoned"
    )
    .unwrap()
});

/// Stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("vidscope_stage_duration_seconds", "Duration of each job stage")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Output Metrics
// =============================================================================

/// Output lines forwarded to clients.
pub static LINES_FORWARDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidscope_lines_forwarded_total",
        "Output lines forwarded to clients",
    )
    .unwrap()
});

/// Output lines held back by the suppression filter.
pub static LINES_SUPPRESSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidscope_lines_suppressed_total",
        "Output lines suppressed by the line filter",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_TOTAL.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(LINES_FORWARDED.clone()),
        Box::new(LINES_SUPPRESSED.clone()),
    ]
}
