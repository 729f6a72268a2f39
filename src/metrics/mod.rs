pub mod aggregate;
pub mod clock;
pub mod collector;
pub mod event;
pub mod export;
pub mod percentiles;
pub mod retention;
pub mod scheduler;

pub use aggregate::{AggregatedSnapshot, GroupStats, RealtimeSnapshot, RecentError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::MetricsCollector;
pub use event::{Metadata, MetricEvent, NewMetricEvent};
pub use export::MetricsExport;
pub use retention::{CleanupReport, RetentionPolicy};
pub use scheduler::CleanupScheduler;
