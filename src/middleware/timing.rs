use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use agent_metrics::NewMetricEvent;

use crate::AppState;

/// Source label for events recorded by this middleware.
const HTTP_SOURCE: &str = "http";

/// Tower-compatible middleware that adds two response headers:
///
///   X-Response-Time-Us  — total handler wall time in microseconds
///   Server-Timing       — same value in the standard Server-Timing format
///
/// and records every `/api/` request outside the metrics routes into the
/// collector, so the host's own endpoints show up next to the agents.
pub async fn timing_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();

    // ── Inject response headers ─────────────────────────────────
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    let server_timing =
        format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    // Reading metrics must not skew them
    if !path.starts_with("/api/") || path.starts_with("/api/metrics") {
        return response;
    }

    let status = response.status();
    let operation = format!("{method} {path}");
    let duration_ms = elapsed.as_secs_f64() * 1000.0;

    tracing::debug!(%method, %path, status = status.as_u16(), us = us as u64, "request");

    let event = if status.is_client_error() || status.is_server_error() {
        NewMetricEvent::failure(HTTP_SOURCE, operation, duration_ms, status.to_string())
    } else {
        NewMetricEvent::success(HTTP_SOURCE, operation, duration_ms)
    };
    state.metrics.record(event);

    response
}
