use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{AggregatedSnapshot, RealtimeSnapshot};

/// The report behind [`MetricsCollector::export`](super::MetricsCollector::export).
/// Dashboards parse this exact shape; changing it is a breaking change.
///
/// ```json
/// { "exportedAt": "...", "totalMetrics": 0, "aggregated": { ... }, "realtime": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExport {
    pub exported_at: DateTime<Utc>,
    /// Everything currently buffered, regardless of window.
    pub total_metrics: u64,
    pub aggregated: AggregatedSnapshot,
    pub realtime: RealtimeSnapshot,
}
