use std::time::Duration;

use crate::error::MetricsError;

// ─── Defaults ────────────────────────────────────────────────────

/// Hard cap on buffered events; the oldest are evicted first.
pub const DEFAULT_MAX_CAPACITY: usize = 10_000;

/// Events older than this are dropped by every sweep.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// How many failures `recentErrors` carries.
pub const DEFAULT_RECENT_ERRORS_CAP: usize = 10;

/// Cadence of the background cleanup sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

const ENV_MAX_CAPACITY: &str = "METRICS_MAX_CAPACITY";
const ENV_RETENTION_SECS: &str = "METRICS_RETENTION_SECS";
const ENV_RECENT_ERRORS_CAP: &str = "METRICS_RECENT_ERRORS_CAP";
const ENV_SWEEP_INTERVAL_SECS: &str = "METRICS_SWEEP_INTERVAL_SECS";

// ─── CollectorConfig ─────────────────────────────────────────────

/// Tunables for a [`MetricsCollector`](crate::MetricsCollector).
/// The realtime window is fixed at 60 s and deliberately not listed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub max_capacity: usize,
    pub retention: Duration,
    pub recent_errors_cap: usize,
    pub sweep_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            retention: DEFAULT_RETENTION,
            recent_errors_cap: DEFAULT_RECENT_ERRORS_CAP,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CollectorConfig {
    /// Defaults overridden by whatever `METRICS_*` variables are set.
    pub fn from_env() -> Result<Self, MetricsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`,
    /// so callers (and tests) can supply their own source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MetricsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_CAPACITY) {
            config.max_capacity = parse_number(ENV_MAX_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETENTION_SECS) {
            config.retention = Duration::from_secs(parse_number(ENV_RETENTION_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_RECENT_ERRORS_CAP) {
            config.recent_errors_cap = parse_number(ENV_RECENT_ERRORS_CAP, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval =
                Duration::from_secs(parse_number(ENV_SWEEP_INTERVAL_SECS, &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.max_capacity == 0 {
            return Err(MetricsError::InvalidConfig {
                key: ENV_MAX_CAPACITY,
                value: self.max_capacity.to_string(),
                reason: "capacity must be at least 1",
            });
        }
        if self.retention.is_zero() {
            return Err(MetricsError::InvalidConfig {
                key: ENV_RETENTION_SECS,
                value: "0".into(),
                reason: "retention window must be non-zero",
            });
        }
        // tokio::time::interval panics on a zero period
        if self.sweep_interval.is_zero() {
            return Err(MetricsError::InvalidConfig {
                key: ENV_SWEEP_INTERVAL_SECS,
                value: "0".into(),
                reason: "sweep interval must be non-zero",
            });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, MetricsError> {
    raw.trim().parse().map_err(|_| MetricsError::InvalidConfig {
        key,
        value: raw.to_owned(),
        reason: "expected a non-negative integer",
    })
}
