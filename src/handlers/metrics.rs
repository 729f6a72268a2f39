use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use agent_metrics::{AggregatedSnapshot, RealtimeSnapshot};

use super::AppError;
use crate::AppState;

/// How often the SSE feed pushes a realtime snapshot.
const STREAM_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    /// Look-back in milliseconds; absent or 0 means everything buffered.
    pub window_ms: Option<u64>,
}

impl WindowQuery {
    fn window(&self) -> Option<Duration> {
        self.window_ms.map(Duration::from_millis)
    }
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// The full export document, exactly as `MetricsCollector::export` writes it.

pub async fn export_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let json = state.metrics.export()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json))
}

// ─── GET /api/metrics/aggregated?window_ms= ──────────────────────

pub async fn get_aggregated(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WindowQuery>,
) -> Json<AggregatedSnapshot> {
    Json(state.metrics.get_aggregated(query.window()))
}

// ─── GET /api/metrics/sources/:source?window_ms= ─────────────────

pub async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Json<AggregatedSnapshot> {
    Json(state.metrics.get_aggregated_for_source(&source, query.window()))
}

// ─── GET /api/metrics/realtime ───────────────────────────────────

pub async fn get_realtime(
    State(state): State<Arc<AppState>>,
) -> Json<RealtimeSnapshot> {
    Json(state.metrics.get_realtime_stats())
}

// ─── POST /api/metrics/clear ─────────────────────────────────────

pub async fn clear_metrics(State(state): State<Arc<AppState>>) -> StatusCode {
    state.metrics.clear();
    tracing::info!("metrics buffer cleared");
    StatusCode::NO_CONTENT
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a `RealtimeSnapshot` as JSON every second; the realtime view
/// skips sorting so it stays cheap at this polling rate.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(STREAM_TICK);

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.metrics.get_realtime_stats();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
