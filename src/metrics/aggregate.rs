//! Read-side statistics computed from a slice of buffered events.
//!
//! Everything here is a pure function of its input; the collector hands
//! over a copy of the relevant window so none of this runs under its lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::percentiles::{mean, DurationSummary};
use super::MetricEvent;

/// Fixed lookback for [`RealtimeSnapshot`].
pub const REALTIME_WINDOW_SECS: u64 = 60;

// ─── Public types ────────────────────────────────────────────────

/// Full statistics for one window. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSnapshot {
    pub total_requests: u64,
    pub success_rate: f64,
    pub avg_duration: f64,
    pub p50_duration: f64,
    pub p95_duration: f64,
    pub p99_duration: f64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub by_source: BTreeMap<String, GroupStats>,
    pub by_operation: BTreeMap<String, GroupStats>,
    pub recent_errors: Vec<RecentError>,
}

/// Per-label breakdown inside `bySource` / `byOperation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub requests: u64,
    pub success_rate: f64,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentError {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub error: String,
}

/// Cheap last-minute view for frequent polling; no sorting involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSnapshot {
    pub events_per_minute: u64,
    pub avg_response_time: f64,
    pub error_count: u64,
}

// ─── Aggregation ─────────────────────────────────────────────────

impl AggregatedSnapshot {
    /// All-zero snapshot for an empty window.
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            success_rate: 0.0,
            avg_duration: 0.0,
            p50_duration: 0.0,
            p95_duration: 0.0,
            p99_duration: 0.0,
            error_rate: 0.0,
            cache_hit_rate: 0.0,
            by_source: BTreeMap::new(),
            by_operation: BTreeMap::new(),
            recent_errors: Vec::new(),
        }
    }
}

/// Compute the full snapshot over `events` (already filtered to the
/// window, in arrival order).
pub fn aggregate(events: &[Arc<MetricEvent>], recent_errors_cap: usize) -> AggregatedSnapshot {
    if events.is_empty() {
        return AggregatedSnapshot::empty();
    }

    let total = events.len();
    let successes = events.iter().filter(|e| e.success).count();
    let success_rate = rate(successes, total);

    let mut durations: Vec<f64> = events.iter().map(|e| e.duration_ms).collect();
    let summary = DurationSummary::from_durations(&mut durations);

    AggregatedSnapshot {
        total_requests: total as u64,
        success_rate,
        avg_duration: summary.avg,
        p50_duration: summary.p50,
        p95_duration: summary.p95,
        p99_duration: summary.p99,
        error_rate: 100.0 - success_rate,
        cache_hit_rate: cache_hit_rate(events),
        by_source: group_by(events, |e| &e.source),
        by_operation: group_by(events, |e| &e.operation),
        recent_errors: recent_errors(events, recent_errors_cap),
    }
}

/// Last-minute stats over `events` (already filtered to the realtime window).
pub fn realtime(events: &[Arc<MetricEvent>]) -> RealtimeSnapshot {
    let durations: Vec<f64> = events.iter().map(|e| e.duration_ms).collect();
    RealtimeSnapshot {
        events_per_minute: events.len() as u64,
        avg_response_time: mean(&durations),
        error_count: events.iter().filter(|e| !e.success).count() as u64,
    }
}

/// Hit ratio among events that reported a cache outcome at all.
fn cache_hit_rate(events: &[Arc<MetricEvent>]) -> f64 {
    let (reported, hits) = events
        .iter()
        .filter_map(|e| e.metadata.as_ref().and_then(|m| m.cache_hit))
        .fold((0usize, 0usize), |(reported, hits), hit| {
            (reported + 1, hits + usize::from(hit))
        });
    rate(hits, reported)
}

/// Group by a string label; key order is stable for JSON output.
pub fn group_by<F>(events: &[Arc<MetricEvent>], key: F) -> BTreeMap<String, GroupStats>
where
    F: Fn(&MetricEvent) -> &String,
{
    // (requests, successes, duration sum)
    let mut acc: BTreeMap<&String, (usize, usize, f64)> = BTreeMap::new();
    for event in events {
        let entry = acc.entry(key(event)).or_insert((0, 0, 0.0));
        entry.0 += 1;
        entry.1 += usize::from(event.success);
        entry.2 += event.duration_ms;
    }

    acc.into_iter()
        .map(|(label, (requests, successes, sum))| {
            (
                label.clone(),
                GroupStats {
                    requests: requests as u64,
                    success_rate: rate(successes, requests),
                    avg_duration: sum / requests as f64,
                },
            )
        })
        .collect()
}

/// Newest `cap` failures that carry a non-empty message, oldest first.
fn recent_errors(events: &[Arc<MetricEvent>], cap: usize) -> Vec<RecentError> {
    let mut out: Vec<RecentError> = events
        .iter()
        .rev()
        .filter(|e| !e.success)
        .filter_map(|e| {
            e.error.as_ref().filter(|error| !error.is_empty()).map(|error| RecentError {
                timestamp: e.timestamp,
                source: e.source.clone(),
                error: error.clone(),
            })
        })
        .take(cap)
        .collect();
    out.reverse();
    out
}

/// `100 * part / whole`, 0 when `whole` is 0.
fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
