use thiserror::Error;

/// Errors shared across the orchestration engine that don't belong to a
/// single crate's own error type (config resolution, time-range parsing).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("invalid timezone: {0}")]
    InvalidTimeZone(String),

    #[error("configuration error: {0}")]
    Config(String),
}
