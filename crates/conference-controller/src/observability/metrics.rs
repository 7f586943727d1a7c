//! Metrics definitions for the Conference Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `cc_` prefix for Conference Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `endpoint`: ~12 values (parameterized paths)
//! - `event`: lifecycle and platform event names (~10 values)
//! - `trigger`: 2 values (participant_connected, stream_published)
//! - `operation`: 8 values (platform operations)
//! - `actor_type`: 2 values (registry, conference), panics only
//!
//! Slugs, session IDs and participant IDs are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // HTTP request buckets - public API (p95 < 200ms)
        .set_buckets_for_metric(
            Matcher::Prefix("cc_http".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Platform calls - external REST API
        .set_buckets_for_metric(
            Matcher::Prefix("cc_platform".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set platform request buckets: {e}"))?
        // Fan-out covers many concurrent platform calls
        .set_buckets_for_metric(
            Matcher::Prefix("cc_fanout".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set fan-out buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `cc_http_requests_total`, `cc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("cc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("cc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
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

/// Normalize a request path, replacing slugs with a placeholder.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/v1/conferences" => "/v1/conferences",
        "/v1/callbacks/platform" => "/v1/callbacks/platform",
        "/v1/callbacks/voice/join" => "/v1/callbacks/voice/join",
        "/v1/callbacks/voice/status" => "/v1/callbacks/voice/status",
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> &'static str {
    if let Some(rest) = path.strip_prefix("/v1/conferences/") {
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [slug] if !slug.is_empty() => return "/v1/conferences/{slug}",
            [slug, "participants"] if !slug.is_empty() => {
                return "/v1/conferences/{slug}/participants"
            }
            _ => {}
        }
    }

    // Unknown paths normalized to "/other" to bound cardinality
    "/other"
}

// ============================================================================
// Conference & Participant Metrics (Gauges)
// ============================================================================

/// Set current count of live conferences
///
/// Metric: `cc_conferences_active`
pub fn set_conferences_active(count: usize) {
    gauge!("cc_conferences_active").set(count as f64);
}

/// Set current count of admitted participants
///
/// Metric: `cc_participants_active`
pub fn set_participants_active(count: usize) {
    gauge!("cc_participants_active").set(count as f64);
}

/// Record a conference lifecycle event
///
/// Metric: `cc_conference_lifecycle_total`
/// Labels: `event` (created, empty, ended, stale, crashed)
pub fn record_conference_lifecycle(event: &'static str) {
    counter!("cc_conference_lifecycle_total", "event" => event).increment(1);
}

/// Record a participant admission
///
/// Metric: `cc_admissions_total`
/// Labels: `mode` (web, phone), `status` (success, error)
pub fn record_admission(mode: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("cc_admissions_total", "mode" => mode, "status" => status).increment(1);
}

/// Record a participant cleanup timer firing
///
/// Metric: `cc_cleanup_timers_fired_total`
pub fn record_cleanup_timer_fired() {
    counter!("cc_cleanup_timers_fired_total").increment(1);
}

// ============================================================================
// Fan-out Metrics
// ============================================================================

/// Record one subscribe call issued by fan-out
///
/// Metric: `cc_subscriptions_total`
/// Labels: `trigger`, `result` (success, error)
pub fn record_subscription(trigger: &'static str, success: bool) {
    let result = if success { "success" } else { "error" };
    counter!("cc_subscriptions_total", "trigger" => trigger, "result" => result).increment(1);
}

/// Record fan-out duration (all subscribe calls for one trigger)
///
/// Metric: `cc_fanout_duration_seconds`
/// Labels: `trigger`
pub fn record_fanout_duration(trigger: &'static str, duration: Duration) {
    histogram!("cc_fanout_duration_seconds", "trigger" => trigger)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Platform Metrics
// ============================================================================

/// Record a media platform request
///
/// Metric: `cc_platform_request_duration_seconds`, `cc_platform_errors_total`
/// Labels: `operation`
pub fn record_platform_request(operation: &'static str, duration: Duration, success: bool) {
    histogram!("cc_platform_request_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());

    if !success {
        counter!("cc_platform_errors_total", "operation" => operation).increment(1);
    }
}

/// Record an inbound platform event
///
/// Metric: `cc_platform_events_total`
/// Labels: `event`, `outcome` (applied, ignored, rejected)
pub fn record_platform_event(event: &'static str, outcome: &'static str) {
    counter!("cc_platform_events_total", "event" => event, "outcome" => outcome).increment(1);
}

// ============================================================================
// Actor Metrics
// ============================================================================

/// Record an actor panic
///
/// Metric: `cc_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("cc_actor_panics_total", "actor_type" => actor_type).increment(1);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they only exercise the
    // recording paths.

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/v1/conferences"), "/v1/conferences");
        assert_eq!(
            normalize_endpoint("/v1/conferences/river-otter"),
            "/v1/conferences/{slug}"
        );
        assert_eq!(
            normalize_endpoint("/v1/conferences/river-otter/participants"),
            "/v1/conferences/{slug}/participants"
        );
        assert_eq!(normalize_endpoint("/v1/conferences/"), "/other");
        assert_eq!(normalize_endpoint("/v1/conferences/a/b/c"), "/other");
        assert_eq!(normalize_endpoint("/admin"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(409), "error");
    }

    #[test]
    fn test_recording_functions() {
        record_http_request("POST", "/v1/conferences", 201, Duration::from_millis(12));
        set_conferences_active(3);
        set_participants_active(7);
        record_conference_lifecycle("created");
        record_admission("web", true);
        record_cleanup_timer_fired();
        record_subscription("stream_published", false);
        record_fanout_duration("participant_connected", Duration::from_millis(40));
        record_platform_request("subscribe", Duration::from_millis(30), false);
        record_platform_event("participant-joined", "applied");
        record_actor_panic("registry");
    }
}
