use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Metrics queries ─────────────────────────────────────
        .route("/api/metrics", get(handlers::metrics::export_metrics))
        .route(
            "/api/metrics/aggregated",
            get(handlers::metrics::get_aggregated),
        )
        .route(
            "/api/metrics/sources/:source",
            get(handlers::metrics::get_source),
        )
        .route("/api/metrics/realtime", get(handlers::metrics::get_realtime))
        .route("/api/metrics/stream", get(handlers::metrics::metrics_stream))
        .route("/api/metrics/clear", post(handlers::metrics::clear_metrics))
        // ── Simulated agent workload ────────────────────────────
        .route(
            "/api/simulation/start",
            post(handlers::simulation::start_simulation),
        )
        .route(
            "/api/simulation/stop",
            post(handlers::simulation::stop_simulation),
        )
        .route(
            "/api/simulation/status",
            get(handlers::simulation::simulation_status),
        )
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            timing::timing_middleware,
        ))
        .layer(CorsLayer::permissive())
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
}
