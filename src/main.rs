use std::sync::Arc;

use agent_metrics::{CleanupScheduler, CollectorConfig, MetricsCollector};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod handlers;
mod load_generator;
mod middleware;
mod server;

/// One spawned simulation, kept so `stop` can await clean shutdown.
pub struct SimulationRun {
    pub id: Uuid,
    /// Cancels this run's workers only.
    pub stop: CancellationToken,
    pub handle: tokio::task::JoinHandle<()>,
}

impl SimulationRun {
    pub fn is_active(&self) -> bool {
        !self.stop.is_cancelled() && !self.handle.is_finished()
    }
}

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Central metrics engine: instrumented code records, handlers query.
    pub metrics: Arc<MetricsCollector>,

    /// The current (or last) simulation run.
    pub simulation: tokio::sync::Mutex<Option<SimulationRun>>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agent_metrics=info".parse().expect("static directive")),
        )
        .init();

    // ── 1. Configuration ─────────────────────────────────────────
    let config = CollectorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid metrics configuration");
        std::process::exit(1);
    });
    tracing::info!(
        max_capacity = config.max_capacity,
        retention_secs = config.retention.as_secs(),
        recent_errors_cap = config.recent_errors_cap,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "metrics configuration loaded"
    );

    // ── 2. Collector + background cleanup ────────────────────────
    let metrics = Arc::new(MetricsCollector::with_config(config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "cannot build metrics collector");
        std::process::exit(1);
    }));
    let scheduler = CleanupScheduler::start(metrics.clone());

    // ── 3. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState {
        metrics,
        simulation: tokio::sync::Mutex::new(None),
    });

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state.clone());

    // ── 5. Bind & serve ──────────────────────────────────────────
    let port = std::env::var("METRICS_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        });

    tracing::info!("metrics export   → http://localhost:{port}/api/metrics");
    tracing::info!("realtime SSE     → http://localhost:{port}/api/metrics/stream");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server exited with error");
    }

    // ── 6. Orderly shutdown ──────────────────────────────────────
    handlers::simulation::halt(&state).await;
    scheduler.stop().await;
    tracing::info!(buffered = state.metrics.len(), "shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        // Without a signal handler, keep serving until the process is killed
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
