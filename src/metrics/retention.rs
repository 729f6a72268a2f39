use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::cutoff;
use super::MetricEvent;

/// Age and size limits for the event buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_capacity: usize,
    pub retention: Duration,
}

/// Buffer length before and after one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub before: usize,
    pub after: usize,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

impl RetentionPolicy {
    /// Drop everything older than the retention window, then evict the
    /// oldest entries until the buffer fits `max_capacity`.
    ///
    /// The buffer must be chronological: the age cut is a binary search
    /// followed by a front drain, so the cost is `O(log n + k)` for `k`
    /// evicted entries.
    pub fn apply(
        &self,
        events: &mut VecDeque<Arc<MetricEvent>>,
        now: DateTime<Utc>,
    ) -> CleanupReport {
        let before = events.len();

        if let Some(oldest_allowed) = cutoff(now, self.retention) {
            let expired = events.partition_point(|e| e.timestamp < oldest_allowed);
            events.drain(..expired);
        }

        if events.len() > self.max_capacity {
            let excess = events.len() - self.max_capacity;
            events.drain(..excess);
        }

        CleanupReport {
            before,
            after: events.len(),
        }
    }
}
