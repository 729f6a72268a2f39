//! In-process telemetry for instrumented agent calls and service methods.
//!
//! Instrumented code pushes events into a [`MetricsCollector`]; dashboards
//! and health checks read percentile latencies, success rates, cache-hit
//! ratios and per-source breakdowns computed on demand from the bounded
//! in-memory buffer.

pub mod config;
pub mod error;
pub mod metrics;

pub use config::CollectorConfig;
pub use error::MetricsError;
pub use metrics::{
    AggregatedSnapshot, CleanupScheduler, MetricEvent, MetricsCollector, NewMetricEvent,
    RealtimeSnapshot,
};
