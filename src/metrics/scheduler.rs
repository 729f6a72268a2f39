use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{CleanupReport, MetricsCollector};

/// Background task that runs the retention sweep on a fixed cadence, so
/// idle periods (when `record()` rarely fires) still get trimmed.
///
/// Owned by the host: start it after building the collector, `stop()` it
/// on shutdown. Dropping the handle without `stop()` still cancels the
/// task, it just is not joined.
pub struct CleanupScheduler {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    /// Spawn the sweep loop at the collector's configured interval.
    /// Must be called from within a tokio runtime.
    pub fn start(collector: Arc<MetricsCollector>) -> Self {
        let interval = collector.config().sweep_interval;
        Self::start_with_interval(collector, interval)
    }

    pub fn start_with_interval(collector: Arc<MetricsCollector>, every: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(collector, every, token.clone()));
        tracing::debug!(interval_secs = every.as_secs(), "metrics cleanup scheduler started");

        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            // JoinError only if the loop panicked; nothing to recover
            let _ = handle.await;
        }
        tracing::debug!("metrics cleanup scheduler stopped");
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ─── Sweep loop ──────────────────────────────────────────────────

async fn run(collector: Arc<MetricsCollector>, every: Duration, token: CancellationToken) {
    // First sweep one full period after start, not immediately
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                sweep(&collector);
            }
        }
    }
}

/// One cleanup pass; logs only when something was evicted.
fn sweep(collector: &MetricsCollector) -> CleanupReport {
    let report = collector.cleanup();
    if report.removed() > 0 {
        tracing::info!(
            before = report.before,
            after = report.after,
            removed = report.removed(),
            "evicted stale metrics"
        );
    }
    report
}
