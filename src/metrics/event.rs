use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Sanitization limits ─────────────────────────────────────────

/// Longest metadata string (query, intent, extra key/value) kept, in chars.
pub const MAX_METADATA_TEXT: usize = 256;

/// Longest error message kept, in chars.
pub const MAX_ERROR_TEXT: usize = 1024;

/// Custom metadata entries beyond this are dropped.
pub const MAX_EXTRA_FIELDS: usize = 16;

// ─── Public types ────────────────────────────────────────────────

/// One completed operation. Created once by the collector and never
/// mutated; it leaves the buffer only through eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    /// Stamped by the collector at insertion time.
    pub timestamp: DateTime<Utc>,
    /// Instrumented component, e.g. an agent or service name.
    pub source: String,
    /// The specific action performed by `source`.
    pub operation: String,
    pub duration_ms: f64,
    pub success: bool,
    /// Present only when `success == false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// The write side: everything in a [`MetricEvent`] except the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetricEvent {
    pub source: String,
    pub operation: String,
    pub duration_ms: f64,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Recognized per-event annotations plus a bounded bag of custom fields.
///
/// `cache_hit` is three-state on purpose: `None` means the operation did
/// not report a cache outcome and is left out of the hit-rate denominator,
/// while `Some(false)` counts as a miss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

// ─── NewMetricEvent impl ─────────────────────────────────────────

impl NewMetricEvent {
    pub fn success(
        source: impl Into<String>,
        operation: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            source: source.into(),
            operation: operation.into(),
            duration_ms,
            success: true,
            error: None,
            metadata: None,
        }
    }

    pub fn failure(
        source: impl Into<String>,
        operation: impl Into<String>,
        duration_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            operation: operation.into(),
            duration_ms,
            success: false,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Stamp and clean up the event. Never fails: out-of-range values are
    /// clamped and oversized text is truncated.
    pub(crate) fn into_event(self, timestamp: DateTime<Utc>) -> MetricEvent {
        let duration_ms = if self.duration_ms.is_finite() && self.duration_ms > 0.0 {
            self.duration_ms
        } else {
            0.0
        };

        let error = if self.success {
            None
        } else {
            self.error.map(|e| truncate(e, MAX_ERROR_TEXT))
        };

        MetricEvent {
            timestamp,
            source: self.source,
            operation: self.operation,
            duration_ms,
            success: self.success,
            error,
            metadata: self.metadata.map(Metadata::sanitized),
        }
    }
}

// ─── Metadata impl ───────────────────────────────────────────────

impl Metadata {
    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = Some(hit);
        self
    }

    fn sanitized(self) -> Self {
        let extra = self
            .extra
            .into_iter()
            .take(MAX_EXTRA_FIELDS)
            .map(|(k, v)| (truncate(k, MAX_METADATA_TEXT), truncate(v, MAX_METADATA_TEXT)))
            .collect();

        Self {
            query: self.query.map(|q| truncate(q, MAX_METADATA_TEXT)),
            intent: self.intent.map(|i| truncate(i, MAX_METADATA_TEXT)),
            data_count: self.data_count,
            token_usage: self.token_usage,
            cache_hit: self.cache_hit,
            retry_count: self.retry_count,
            extra,
        }
    }
}

/// Cut `s` to at most `max_chars` characters without splitting a code point.
fn truncate(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}
