//! HTTP routes for the circle service.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_participant, AuthState};
use crate::services::RoomTransport;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,

    pub config: Config,

    /// Media transport (LiveKit in production, a mock in tests).
    pub transport: Arc<dyn RoomTransport>,
}

/// Build the application routes.
///
/// Public: `/health`, `/ready`, `/metrics`. Everything under `/api/v1`
/// requires a participant bearer token.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        jwt_secret: state.config.jwt_secret.clone(),
        clock_skew: state.config.jwt_clock_skew(),
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/sessions/:id/join", post(handlers::join_session))
        .route("/api/v1/sessions/:id/room", get(handlers::get_room_state))
        .route(
            "/api/v1/sessions/:id/room/events",
            post(handlers::apply_room_event),
        )
        .route(
            "/api/v1/sessions/:id/room/history",
            get(handlers::get_room_history),
        )
        .route(
            "/api/v1/sessions/:id/room/mute",
            post(handlers::mute_participant),
        )
        .route(
            "/api/v1/sessions/:id/room/mute-all",
            post(handlers::mute_all_participants),
        )
        .route(
            "/api/v1/sessions/:id/room/remove",
            post(handlers::remove_participant),
        )
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_participant,
        ))
        .with_state(state);

    // Layers apply bottom-up; the metrics middleware is outermost so it also
    // sees timeouts and auth rejections
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
