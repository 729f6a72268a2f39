pub mod metrics;
pub mod simulation;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use agent_metrics::MetricsError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
    AlreadyRunning,
}

impl From<MetricsError> for AppError {
    fn from(err: MetricsError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::AlreadyRunning => {
                (StatusCode::CONFLICT, "Simulation already running".into())
            }
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
