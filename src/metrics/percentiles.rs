/// Latency breakdown for one set of events.
/// Flattened into the aggregated snapshot rather than shipped on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationSummary {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DurationSummary {
    /// Sorts `durations` in place and reads the percentiles off it.
    /// Returns zeroed values if the slice is empty.
    pub fn from_durations(durations: &mut [f64]) -> Self {
        if durations.is_empty() {
            return Self::empty();
        }

        durations.sort_by(f64::total_cmp);

        Self {
            avg: mean(durations),
            p50: percentile(durations, 50.0),
            p95: percentile(durations, 95.0),
            p99: percentile(durations, 99.0),
        }
    }

    pub fn empty() -> Self {
        Self {
            avg: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
        }
    }
}

/// Nearest-rank percentile over an ascending slice:
/// index `ceil(p/100 * n) - 1`, clamped to `[0, n-1]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as isize - 1;
    let idx = rank.clamp(0, sorted.len() as isize - 1) as usize;
    sorted[idx]
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
