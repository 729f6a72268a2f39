use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::aggregate::{self, AggregatedSnapshot, RealtimeSnapshot, REALTIME_WINDOW_SECS};
use super::clock::{cutoff, Clock, SystemClock};
use super::export::MetricsExport;
use super::retention::{CleanupReport, RetentionPolicy};
use super::{Metadata, MetricEvent, NewMetricEvent};
use crate::config::CollectorConfig;
use crate::error::MetricsError;

/// Error text recorded when a measured future is dropped before finishing.
pub const CANCELLED_ERROR: &str = "operation cancelled";

/// Error text recorded when a measured future panics while being polled.
pub const PANICKED_ERROR: &str = "operation panicked";

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe metrics engine.
/// Instrumented code calls `record()` / `measure()`, dashboards call the
/// `get_*()` queries and `export()`.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
    config: CollectorConfig,
    clock: Arc<dyn Clock>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    // Chronological; appended at the tail, evicted from the head
    events: VecDeque<Arc<MetricEvent>>,
    retention: RetentionPolicy,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self::build(CollectorConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: CollectorConfig) -> Result<Self, MetricsError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CollectorConfig, clock: Arc<dyn Clock>) -> Result<Self, MetricsError> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: CollectorConfig, clock: Arc<dyn Clock>) -> Self {
        let retention = RetentionPolicy {
            max_capacity: config.max_capacity,
            retention: config.retention,
        };
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(config.max_capacity.min(1024) + 1),
                retention,
            }),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    // ── Ingestion ───────────────────────────────────────────────

    /// Stamp the event, append it and run the retention sweep inline.
    /// Never fails; malformed input is clamped or truncated.
    pub fn record(&self, event: NewMetricEvent) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        // Keep the buffer chronological even if the wall clock steps back
        let timestamp = match inner.events.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let event = event.into_event(timestamp);

        tracing::trace!(
            source = %event.source,
            operation = %event.operation,
            duration_ms = event.duration_ms,
            success = event.success,
            "metric recorded"
        );

        inner.events.push_back(Arc::new(event));
        let Inner { events, retention } = &mut *inner;
        retention.apply(events, now);
    }

    /// Time `work`, record exactly one event for it and hand back its
    /// result untouched.
    ///
    /// If the returned future is dropped before `work` finishes, a failure
    /// carrying [`CANCELLED_ERROR`] is recorded instead; a panic inside
    /// `work` records [`PANICKED_ERROR`] and keeps unwinding.
    pub async fn measure<T, E, F>(
        &self,
        source: impl Into<String>,
        operation: impl Into<String>,
        work: F,
        metadata: Option<Metadata>,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut guard = MeasureGuard {
            collector: self,
            source: source.into(),
            operation: operation.into(),
            metadata,
            started: Instant::now(),
            outcome: None,
        };

        let result = work.await;
        guard.outcome = Some(match &result {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        });
        // guard drops here and records the outcome
        result
    }

    // ── Retention ───────────────────────────────────────────────

    /// Run the retention sweep now. Idempotent when nothing new arrives.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Inner { events, retention } = &mut *inner;
        retention.apply(events, now)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Drop every buffered event.
    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Statistics over the last `window`, or everything buffered when
    /// `window` is `None` or zero.
    pub fn get_aggregated(&self, window: Option<Duration>) -> AggregatedSnapshot {
        let now = self.clock.now();
        let events = self.window(lookback(now, window));
        aggregate::aggregate(&events, self.config.recent_errors_cap)
    }

    /// Same as [`get_aggregated`](Self::get_aggregated), restricted to one source.
    pub fn get_aggregated_for_source(&self, source: &str, window: Option<Duration>) -> AggregatedSnapshot {
        let now = self.clock.now();
        let mut events = self.window(lookback(now, window));
        events.retain(|e| e.source == source);
        aggregate::aggregate(&events, self.config.recent_errors_cap)
    }

    /// Counters over the fixed 60 s realtime window.
    pub fn get_realtime_stats(&self) -> RealtimeSnapshot {
        let now = self.clock.now();
        let events = self.window(cutoff(now, Duration::from_secs(REALTIME_WINDOW_SECS)));
        aggregate::realtime(&events)
    }

    /// Pretty-printed JSON report: full aggregation plus realtime stats,
    /// all taken from one view of the buffer at one instant.
    pub fn export(&self) -> Result<String, MetricsError> {
        let json = serde_json::to_string_pretty(&self.export_report())?;
        Ok(json)
    }

    pub fn export_report(&self) -> MetricsExport {
        let now = self.clock.now();
        let events = self.window(None);
        let realtime_from = match cutoff(now, Duration::from_secs(REALTIME_WINDOW_SECS)) {
            Some(from) => events.partition_point(|e| e.timestamp < from),
            None => 0,
        };

        MetricsExport {
            exported_at: now,
            total_metrics: events.len() as u64,
            aggregated: aggregate::aggregate(&events, self.config.recent_errors_cap),
            realtime: aggregate::realtime(&events[realtime_from..]),
        }
    }

    /// Copy out the events stamped at or after `from`. Only `Arc`s are
    /// cloned under the lock; aggregation happens after it is released.
    fn window(&self, from: Option<DateTime<Utc>>) -> Vec<Arc<MetricEvent>> {
        let inner = self.inner.lock();
        let start = match from {
            Some(from) => inner.events.partition_point(|e| e.timestamp < from),
            None => 0,
        };
        inner.events.range(start..).cloned().collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// A zero or absent window means "everything buffered".
fn lookback(now: DateTime<Utc>, window: Option<Duration>) -> Option<DateTime<Utc>> {
    window.filter(|w| !w.is_zero()).and_then(|w| cutoff(now, w))
}

// ─── Measure guard ───────────────────────────────────────────────

/// Records the measured operation when dropped, however the wrapping
/// future ends: completion, cancellation or unwinding.
struct MeasureGuard<'a> {
    collector: &'a MetricsCollector,
    source: String,
    operation: String,
    metadata: Option<Metadata>,
    started: Instant,
    outcome: Option<Result<(), String>>,
}

impl Drop for MeasureGuard<'_> {
    fn drop(&mut self) {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let source = std::mem::take(&mut self.source);
        let operation = std::mem::take(&mut self.operation);

        let event = match self.outcome.take() {
            Some(Ok(())) => NewMetricEvent::success(source, operation, duration_ms),
            Some(Err(message)) => NewMetricEvent::failure(source, operation, duration_ms, message),
            None if std::thread::panicking() => {
                NewMetricEvent::failure(source, operation, duration_ms, PANICKED_ERROR)
            }
            None => NewMetricEvent::failure(source, operation, duration_ms, CANCELLED_ERROR),
        };

        let event = match self.metadata.take() {
            Some(metadata) => event.with_metadata(metadata),
            None => event,
        };
        self.collector.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap()
    }

    fn collector_with(config: CollectorConfig) -> (MetricsCollector, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let collector = MetricsCollector::with_clock(config, clock.clone()).unwrap();
        (collector, clock)
    }

    fn collector() -> (MetricsCollector, Arc<ManualClock>) {
        collector_with(CollectorConfig::default())
    }

    #[test]
    fn test_fresh_collector_reports_zeroes() {
        let (collector, _) = collector();
        assert!(collector.is_empty());
        assert_eq!(collector.get_aggregated(None), AggregatedSnapshot::empty());
        assert_eq!(collector.get_realtime_stats().events_per_minute, 0);
    }

    #[test]
    fn test_three_planner_successes() {
        let (collector, _) = collector();
        for d in [100.0, 200.0, 300.0] {
            collector.record(NewMetricEvent::success("planner", "plan", d));
        }

        let snapshot = collector.get_aggregated(None);
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.success_rate, 100.0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.avg_duration, 200.0);
        assert_eq!(snapshot.p50_duration, 200.0);
    }

    #[test]
    fn test_single_failure_shows_in_recent_errors() {
        let (collector, _) = collector();
        collector.record(NewMetricEvent::failure("retriever", "fetch", 5.0, "timeout"));

        let errors = collector.get_aggregated(None).recent_errors;
        assert_eq!(
            errors,
            vec![aggregate::RecentError {
                timestamp: start(),
                source: "retriever".into(),
                error: "timeout".into(),
            }]
        );
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let (collector, clock) = collector();
        collector.record(NewMetricEvent::success("a", "x", 1.0));
        clock.set(start() - chrono::Duration::seconds(30));
        collector.record(NewMetricEvent::success("a", "y", 1.0));

        let recorded = collector.window(None);
        assert_eq!(recorded[1].timestamp, start());
    }

    #[test]
    fn test_inline_cleanup_enforces_capacity() {
        let (collector, clock) = collector_with(CollectorConfig {
            max_capacity: 5,
            ..CollectorConfig::default()
        });
        for i in 0..12 {
            clock.advance(Duration::from_millis(10));
            collector.record(NewMetricEvent::success("svc", format!("op{i}"), 1.0));
        }
        assert_eq!(collector.len(), 5);
        assert_eq!(collector.window(None)[0].operation, "op7");
    }

    #[test]
    fn test_cleanup_invariants_and_idempotence() {
        let (collector, clock) = collector_with(CollectorConfig {
            max_capacity: 50,
            retention: Duration::from_secs(600),
            ..CollectorConfig::default()
        });
        for i in 0..200 {
            collector.record(NewMetricEvent::success("svc", "op", i as f64));
            clock.advance(Duration::from_secs(7));
        }

        let first = collector.cleanup();
        let after_first = collector.window(None);
        let second = collector.cleanup();
        let after_second = collector.window(None);

        assert!(first.after <= 50);
        assert_eq!(second.removed(), 0);
        assert_eq!(after_first, after_second);

        let oldest_allowed = clock.now() - chrono::Duration::seconds(600);
        assert!(after_second.iter().all(|e| e.timestamp >= oldest_allowed));
    }

    #[test]
    fn test_aggregation_window_filters_old_events() {
        let (collector, clock) = collector();
        collector.record(NewMetricEvent::success("svc", "old", 999.0));
        clock.advance(Duration::from_secs(600));
        collector.record(NewMetricEvent::success("svc", "new", 1.0));

        let recent = collector.get_aggregated(Some(Duration::from_secs(60)));
        assert_eq!(recent.total_requests, 1);
        assert!(recent.by_operation.contains_key("new"));

        assert_eq!(collector.get_aggregated(None).total_requests, 2);
        assert_eq!(collector.get_aggregated(Some(Duration::ZERO)).total_requests, 2);
    }

    #[test]
    fn test_source_aggregation_only_sees_that_source() {
        let (collector, _) = collector();
        collector.record(NewMetricEvent::success("planner", "plan", 10.0));
        collector.record(NewMetricEvent::failure("retriever", "fetch", 30.0, "down"));
        collector.record(NewMetricEvent::success("planner", "plan", 20.0));

        let planner = collector.get_aggregated_for_source("planner", None);
        assert_eq!(planner.total_requests, 2);
        assert_eq!(planner.success_rate, 100.0);
        assert!(planner.recent_errors.is_empty());
        assert_eq!(planner.by_source.keys().collect::<Vec<_>>(), ["planner"]);

        let missing = collector.get_aggregated_for_source("nobody", None);
        assert_eq!(missing, AggregatedSnapshot::empty());
    }

    #[test]
    fn test_realtime_only_looks_back_a_minute() {
        let (collector, clock) = collector();
        collector.record(NewMetricEvent::failure("svc", "op", 100.0, "stale"));
        clock.advance(Duration::from_secs(61));
        collector.record(NewMetricEvent::success("svc", "op", 10.0));
        collector.record(NewMetricEvent::failure("svc", "op", 30.0, "fresh"));

        let stats = collector.get_realtime_stats();
        assert_eq!(stats.events_per_minute, 2);
        assert_eq!(stats.avg_response_time, 20.0);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_clear_empties_buffer() {
        let (collector, _) = collector();
        collector.record(NewMetricEvent::success("svc", "op", 1.0));
        collector.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_export_shape_matches_direct_queries() {
        let (collector, _) = collector();
        collector.record(NewMetricEvent::success("planner", "plan", 100.0));
        collector.record(NewMetricEvent::failure("retriever", "fetch", 300.0, "timeout"));

        let parsed: serde_json::Value = serde_json::from_str(&collector.export().unwrap()).unwrap();
        let mut keys: Vec<_> = parsed.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["aggregated", "exportedAt", "realtime", "totalMetrics"]);

        assert_eq!(parsed["totalMetrics"], 2);
        assert_eq!(
            parsed["aggregated"],
            serde_json::to_value(collector.get_aggregated(None)).unwrap()
        );
        assert_eq!(
            parsed["realtime"],
            serde_json::to_value(collector.get_realtime_stats()).unwrap()
        );
        assert_eq!(parsed["exportedAt"], serde_json::to_value(start()).unwrap());
        assert_eq!(parsed["aggregated"]["recentErrors"][0]["source"], "retriever");
    }

    #[tokio::test]
    async fn test_measure_records_success() {
        let (collector, _) = collector();
        let metadata = Metadata::default().with_cache_hit(true);

        let value: Result<u32, String> = collector
            .measure("planner", "plan", async { Ok(7) }, Some(metadata))
            .await;

        assert_eq!(value, Ok(7));
        assert_eq!(collector.len(), 1);
        let snapshot = collector.get_aggregated(None);
        assert_eq!(snapshot.success_rate, 100.0);
        assert_eq!(snapshot.cache_hit_rate, 100.0);
    }

    #[tokio::test]
    async fn test_measure_passes_error_through() {
        #[derive(Debug, PartialEq)]
        struct Upstream(u16);
        impl Display for Upstream {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "upstream returned {}", self.0)
            }
        }

        let (collector, _) = collector();
        let result: Result<(), Upstream> = collector
            .measure("retriever", "fetch", async { Err(Upstream(503)) }, None)
            .await;

        assert_eq!(result, Err(Upstream(503)));
        let snapshot = collector.get_aggregated(None);
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.recent_errors[0].error, "upstream returned 503");
    }

    #[tokio::test]
    async fn test_measure_records_cancellation_once() {
        let (collector, _) = collector();

        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            collector.measure(
                "analyst",
                "summarize",
                std::future::pending::<Result<(), String>>(),
                None,
            ),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(collector.len(), 1);
        let snapshot = collector.get_aggregated(None);
        assert_eq!(snapshot.error_rate, 100.0);
        assert_eq!(snapshot.recent_errors[0].error, CANCELLED_ERROR);
    }

    #[test]
    fn test_measure_records_panic_and_keeps_unwinding() {
        let (collector, _) = collector();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runtime.block_on(collector.measure(
                "analyst",
                "summarize",
                async {
                    if collector.is_empty() {
                        panic!("model exploded");
                    }
                    Ok::<(), String>(())
                },
                None,
            ))
        }));

        assert!(caught.is_err());
        let errors = collector.get_aggregated(None).recent_errors;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error, PANICKED_ERROR);
    }

    /// Writers record `w{writer}-{seq}`; checks what any reader may see.
    fn assert_consistent(events: &[Arc<MetricEvent>], max_capacity: usize) {
        assert!(events.len() <= max_capacity);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let mut seen = std::collections::HashSet::new();
        let mut last_seq: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for event in events {
            assert!(seen.insert(event.operation.as_str()), "duplicate {}", event.operation);
            let (writer, seq) = event.operation.split_once('-').unwrap();
            let seq: usize = seq.parse().unwrap();
            if let Some(prev) = last_seq.insert(writer, seq) {
                assert!(seq > prev, "{writer} went from {prev} to {seq}");
            }
        }
    }

    fn hammer(max_capacity: usize, writers: usize, per_writer: usize) -> MetricsCollector {
        use std::sync::atomic::{AtomicBool, Ordering};

        let collector = MetricsCollector::with_config(CollectorConfig {
            max_capacity,
            ..CollectorConfig::default()
        })
        .unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            let mut handles = Vec::new();
            for w in 0..writers {
                let collector = &collector;
                handles.push(s.spawn(move || {
                    for i in 0..per_writer {
                        collector.record(NewMetricEvent::success("svc", format!("w{w}-{i}"), 1.0));
                    }
                }));
            }

            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    collector.cleanup();
                }
            });
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    assert_consistent(&collector.window(None), max_capacity);
                    let snapshot = collector.get_aggregated(None);
                    assert!(snapshot.total_requests as usize <= max_capacity);
                }
            });

            let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
            done.store(true, Ordering::Release);
            assert!(joined.iter().all(Result::is_ok));
        });

        collector
    }

    #[test]
    fn test_concurrent_writers_cleanup_and_readers_stay_consistent() {
        let collector = hammer(10_000, 4, 500);

        let events = collector.window(None);
        assert_consistent(&events, 10_000);
        // Nothing was old enough or over capacity, so nothing may be missing
        assert_eq!(events.len(), 2_000);
        for w in 0..4 {
            let prefix = format!("w{w}-");
            assert_eq!(events.iter().filter(|e| e.operation.starts_with(&prefix)).count(), 500);
        }
    }

    #[test]
    fn test_concurrent_writers_respect_capacity() {
        let collector = hammer(100, 4, 500);

        let events = collector.window(None);
        assert_consistent(&events, 100);
        assert_eq!(events.len(), 100);
    }
}
