//! HTTP routes for the Conference Controller.
//!
//! Defines the Axum router and application state.

use crate::actors::ConferenceRegistryHandle;
use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::observability::{health_router, HealthState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the conference registry actor.
    pub registry: ConferenceRegistryHandle,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready` - Liveness and readiness probes
/// - `/metrics` - Prometheus metrics endpoint
/// - `/v1/conferences...` - Conference and participant API
/// - `/v1/callbacks/...` - Platform and telephone bridge callbacks
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(
    state: Arc<AppState>,
    health_state: Arc<HealthState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let api_routes = Router::new()
        .route(
            "/v1/conferences",
            get(handlers::list_conferences).post(handlers::create_conference),
        )
        .route(
            "/v1/conferences/:slug",
            get(handlers::get_conference).delete(handlers::delete_conference),
        )
        .route(
            "/v1/conferences/:slug/participants",
            get(handlers::list_participants).post(handlers::join_conference),
        )
        .route("/v1/callbacks/platform", post(handlers::platform_event))
        .route("/v1/callbacks/voice/join", post(handlers::voice_join))
        .route("/v1/callbacks/voice/status", post(handlers::voice_status))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .merge(health_router(health_state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        // AppState must be Clone for Axum's State extractor.
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
