//! Metrics definitions for the circle service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `circle_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: parameterized paths (session ids replaced by `{id}`)
//! - `status`: success, error, timeout
//! - `event`: the six room event tags
//! - `outcome`: `accepted` or an error code
//! - `operation`: bounded by code (lock_room, insert_room, list_participants, ...)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("circle_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Room transitions hold a row lock; the tail matters more than the median
        .set_buckets_for_metric(
            Matcher::Prefix("circle_room_transition".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set room transition buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("circle_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("circle_transport_call".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set transport call buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `circle_http_requests_total`, `circle_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures framework-level rejections (415, 400 JSON errors, 404, 405) too.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("circle_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("circle_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/ready" | "/metrics" => path.to_string(),
        _ => normalize_session_endpoint(path),
    }
}

/// Replace the session id in `/api/v1/sessions/{id}/...` with a placeholder.
fn normalize_session_endpoint(path: &str) -> String {
    let Some(rest) = path.strip_prefix("/api/v1/sessions/") else {
        return "/other".to_string();
    };

    let mut segments = rest.splitn(2, '/');
    let _session_id = segments.next();

    match segments.next() {
        Some(
            tail @ ("join" | "room" | "room/events" | "room/history" | "room/mute"
            | "room/mute-all" | "room/remove"),
        ) => format!("/api/v1/sessions/{{id}}/{tail}"),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Room Transition Metrics
// ============================================================================

/// Record one `apply_event` outcome.
///
/// Metric: `circle_room_transitions_total`, `circle_room_transition_duration_seconds`
/// Labels: `event`, `outcome` (`accepted` or the rejection code)
pub fn record_room_transition(event: &str, outcome: &str, duration: Duration) {
    histogram!("circle_room_transition_duration_seconds",
        "event" => event.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("circle_room_transitions_total",
        "event" => event.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution.
///
/// Metric: `circle_db_query_duration_seconds`, `circle_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("circle_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("circle_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Transport Metrics
// ============================================================================

/// Record a call to the media transport.
///
/// Metric: `circle_transport_calls_total`, `circle_transport_call_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_transport_call(operation: &str, status: &str, duration: Duration) {
    histogram!("circle_transport_call_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("circle_transport_calls_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a state publish that was dropped after commit.
///
/// Metric: `circle_publish_failures_total`
pub fn record_publish_failure() {
    counter!("circle_publish_failures_total").increment(1);
}

// ============================================================================
// Background Task Metrics
// ============================================================================

/// Record sessions ended by the keeper-absence task in one run.
///
/// Metric: `circle_keeper_absence_sessions_ended_total`
pub fn record_keeper_absence_ended(count: u64) {
    counter!("circle_keeper_absence_sessions_ended_total").increment(count);
}
