use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("invalid config value for {key} ({value:?}): {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("failed to serialize metrics export: {0}")]
    Serialize(#[from] serde_json::Error),
}
