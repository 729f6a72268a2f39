use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use agent_metrics::metrics::Metadata;
use agent_metrics::MetricsCollector;

// ─── Simulated agents ────────────────────────────────────────────

/// (source, operations) pairs the workers pick from.
const AGENTS: &[(&str, &[&str])] = &[
    ("planner", &["plan", "replan"]),
    ("retriever", &["search", "fetch"]),
    ("analyst", &["summarize", "chart"]),
];

/// Simulated latency range (ms).
const LATENCY_MS: std::ops::RangeInclusive<u64> = 5..=250;

/// Anything slower than this is reported as a timeout.
const TIMEOUT_MS: u64 = 240;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("{0} upstream unavailable")]
    Upstream(&'static str),
}

/// Knobs for one simulation run.
#[derive(Debug, Clone, Copy)]
pub struct LoadProfile {
    pub workers: u32,
    pub duration_secs: u64,
    /// Percentage of calls that fail (0–100)
    pub failure_pct: u8,
    /// Percentage of cache lookups that hit (0–100)
    pub cache_hit_pct: u8,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `profile.workers` Tokio tasks that call simulated agents through
/// `MetricsCollector::measure` until the deadline or `stop` is cancelled.
/// Each run owns its token, so stopping one run never touches another.
pub async fn run(stop: CancellationToken, metrics: Arc<MetricsCollector>, profile: LoadProfile) {
    let deadline = Instant::now() + Duration::from_secs(profile.duration_secs);

    let mut handles = Vec::with_capacity(profile.workers as usize);

    for worker_id in 0..profile.workers {
        let stop = stop.clone();
        let metrics = metrics.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, stop, metrics, deadline, profile).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    stop: CancellationToken,
    metrics: Arc<MetricsCollector>,
    deadline: Instant,
    profile: LoadProfile,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while !stop.is_cancelled() && Instant::now() < deadline {
        let (source, operations) = AGENTS[rng.gen_range(0..AGENTS.len())];
        let operation = operations[rng.gen_range(0..operations.len())];
        let call = SimulatedCall::roll(&mut rng, source, profile);

        let metadata = Metadata {
            intent: Some(operation.to_owned()),
            data_count: Some(call.rows),
            token_usage: Some(call.tokens),
            cache_hit: call.cache_hit,
            retry_count: Some(0),
            ..Metadata::default()
        };

        if let Err(e) = metrics
            .measure(source, operation, call.execute(source), Some(metadata))
            .await
        {
            tracing::trace!(worker = id, source, operation, error = %e, "simulated call failed");
        }
    }
}

/// Pre-rolled outcome of one agent call.
struct SimulatedCall {
    latency_ms: u64,
    fails: bool,
    rows: u64,
    tokens: u64,
    /// Only the retriever consults a cache; the others report nothing.
    cache_hit: Option<bool>,
}

impl SimulatedCall {
    fn roll(rng: &mut StdRng, source: &str, profile: LoadProfile) -> Self {
        let cache_hit = (source == "retriever")
            .then(|| rng.gen_range(0u8..100) < profile.cache_hit_pct);

        // Cache hits come back fast
        let latency_ms = match cache_hit {
            Some(true) => rng.gen_range(1..=15),
            _ => rng.gen_range(LATENCY_MS),
        };

        Self {
            latency_ms,
            fails: rng.gen_range(0u8..100) < profile.failure_pct,
            rows: rng.gen_range(0..=500),
            tokens: rng.gen_range(50..=4_000),
            cache_hit,
        }
    }

    async fn execute(self, source: &'static str) -> Result<u64, AgentError> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        if self.latency_ms > TIMEOUT_MS {
            return Err(AgentError::Timeout(self.latency_ms));
        }
        if self.fails {
            return Err(AgentError::Upstream(source));
        }
        Ok(self.rows)
    }
}
