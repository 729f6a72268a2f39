use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::load_generator::{self, LoadProfile};
use crate::{AppState, SimulationRun};

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Number of concurrent Tokio tasks calling simulated agents
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// How long the simulation runs (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Percentage of agent calls that fail (0–100)
    #[serde(default = "default_failure_pct")]
    pub failure_pct: u8,

    /// Percentage of retriever cache lookups that hit (0–100)
    #[serde(default = "default_cache_hit_pct")]
    pub cache_hit_pct: u8,

    /// Clear the metrics buffer before starting
    #[serde(default)]
    pub reset: bool,
}

fn default_workers() -> u32 {
    4
}
fn default_duration() -> u64 {
    30
}
fn default_failure_pct() -> u8 {
    5
}
fn default_cache_hit_pct() -> u8 {
    60
}

#[derive(Debug, Serialize)]
pub struct SimulationStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub message: String,
}

impl SimulationConfig {
    fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 || self.workers > 256 {
            return Err(AppError::BadRequest(
                "workers must be between 1 and 256".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 3_600 {
            return Err(AppError::BadRequest(
                "duration_secs must be between 1 and 3600".into(),
            ));
        }
        if self.failure_pct > 100 || self.cache_hit_pct > 100 {
            return Err(AppError::BadRequest(
                "failure_pct and cache_hit_pct must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

// ─── POST /api/simulation/start ──────────────────────────────────

pub async fn start_simulation(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SimulationConfig>,
) -> Result<Json<SimulationStatus>, AppError> {
    config.validate()?;

    // Hold the slot for the whole check-and-spawn so two starts cannot race
    let mut slot = state.simulation.lock().await;
    if slot.as_ref().is_some_and(SimulationRun::is_active) {
        return Err(AppError::AlreadyRunning);
    }

    if config.reset {
        state.metrics.clear();
    }

    let run_id = Uuid::new_v4();
    let profile = LoadProfile {
        workers: config.workers,
        duration_secs: config.duration_secs,
        failure_pct: config.failure_pct,
        cache_hit_pct: config.cache_hit_pct,
    };
    tracing::info!(%run_id, ?profile, "simulation started");

    let stop = CancellationToken::new();
    let metrics = state.metrics.clone();
    let handle = tokio::spawn(load_generator::run(stop.clone(), metrics, profile));

    // A finished previous run may still sit in the slot; replacing it is fine
    *slot = Some(SimulationRun {
        id: run_id,
        stop,
        handle,
    });

    Ok(Json(SimulationStatus {
        running: true,
        run_id: Some(run_id),
        message: format!(
            "Started: {} workers × {}s, {}% failures, {}% cache hits",
            config.workers, config.duration_secs, config.failure_pct, config.cache_hit_pct,
        ),
    }))
}

// ─── POST /api/simulation/stop ───────────────────────────────────

pub async fn stop_simulation(
    State(state): State<Arc<AppState>>,
) -> Json<SimulationStatus> {
    match halt(&state).await {
        Some(run_id) => Json(SimulationStatus {
            running: false,
            run_id: Some(run_id),
            message: "Simulation stopped".into(),
        }),
        None => Json(SimulationStatus {
            running: false,
            run_id: None,
            message: "No simulation is running".into(),
        }),
    }
}

// ─── GET /api/simulation/status ──────────────────────────────────

pub async fn simulation_status(
    State(state): State<Arc<AppState>>,
) -> Json<SimulationStatus> {
    let run_id = state
        .simulation
        .lock()
        .await
        .as_ref()
        .filter(|run| run.is_active())
        .map(|run| run.id);
    let running = run_id.is_some();
    Json(SimulationStatus {
        running,
        run_id,
        message: if running {
            "Simulation in progress".into()
        } else {
            "Idle".into()
        },
    })
}

/// Cancel the current run and wait for it to wind down.
/// Returns the id of the run that was stopped, if there was one.
///
/// The slot stays locked until the workers have exited, so a `start`
/// arriving meanwhile waits instead of racing the shutdown.
pub async fn halt(state: &AppState) -> Option<Uuid> {
    let mut slot = state.simulation.lock().await;
    let run = slot.take()?;
    run.stop.cancel();
    // Ignore JoinError — the task may have already finished
    let _ = run.handle.await;
    tracing::info!(run_id = %run.id, "simulation stopped");
    Some(run.id)
}
