//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the vidscope server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket session metrics
//! - Core job metrics, registered from `vidscope_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::error;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidscope_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidscope_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidscope_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket sessions.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidscope_ws_connections_active",
        "Number of active WebSocket sessions",
    )
    .unwrap()
});

/// Total WebSocket sessions (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidscope_ws_connections_total",
        "Total WebSocket sessions since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidscope_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// Client messages that could not be parsed as a job request.
pub static WS_MALFORMED_MESSAGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidscope_ws_malformed_messages_total",
        "Client messages ignored because they were not valid job requests",
    )
    .unwrap()
});

/// Sessions that ended because the client could not be written to.
pub static WS_SESSION_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidscope_ws_session_errors_total",
        "Sessions ended by a connection failure",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MALFORMED_MESSAGES.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_SESSION_ERRORS.clone()))
        .unwrap();

    // Core metrics (jobs, stages, output lines)
    for metric in vidscope_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

static SESSION_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]{32}").ok());

/// Normalize a path for metric labels (replace session ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    match SESSION_ID.as_ref() {
        Some(re) => re.replace_all(path, "{id}").into_owned(),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_session_result() {
        let path = "/static/3f2b8c1d9e7a4b6c8d0e1f2a3b4c5d6e.mp4";
        assert_eq!(normalize_path(path), "/static/{id}.mp4");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/static/output.mp4"), "/static/output.mp4");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("vidscope_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        WS_CONNECTIONS_ACTIVE.set(0);
        WS_CONNECTIONS_TOTAL.inc();
        vidscope_core::metrics::JOBS_TOTAL
            .with_label_values(&["completed"])
            .inc_by(0);
        vidscope_core::metrics::LINES_FORWARDED.inc_by(0);

        let output = encode_metrics();
        assert!(output.contains("vidscope_ws_connections_active"));
        assert!(output.contains("vidscope_ws_connections_total"));
        assert!(output.contains("vidscope_jobs_total"));
        assert!(output.contains("vidscope_lines_forwarded_total"));
    }
}
