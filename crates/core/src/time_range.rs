//! Symbolic time range resolution for the active engine's `start(timeRange)`.

use chrono::{DateTime, Duration, Utc};

use crate::constants::CHUNK_DAYS;
use crate::error::CoreError;

/// A resolved `[start, end)` window plus the symbolic name it came from,
/// persisted verbatim as `timeRange` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ResolvedRange {
    /// `chunkTotal = max(1, ceil((end-start)/CHUNK))` (spec §4.2).
    pub fn chunk_total(&self) -> u32 {
        let span = self.end - self.start;
        let chunk = Duration::days(CHUNK_DAYS);
        if span <= Duration::zero() {
            return 1;
        }
        let whole = span.num_milliseconds() / chunk.num_milliseconds();
        let remainder = span.num_milliseconds() % chunk.num_milliseconds();
        let total = if remainder > 0 { whole + 1 } else { whole };
        total.max(1) as u32
    }
}

/// Resolve a symbolic range (`"1day"`, `"7days"`, `"30days"`, ...) against
/// `now`. Accepts `"<n>day"` / `"<n>days"`; any other token is an error —
/// the spec treats the exact vocabulary as host-defined, so this only
/// commits to the shape the examples use.
pub fn resolve_time_range(symbolic: &str, now: DateTime<Utc>) -> Result<ResolvedRange, CoreError> {
    let trimmed = symbolic.trim();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    let suffix = &trimmed[digits.len()..];

    if digits.is_empty() || !matches!(suffix, "day" | "days") {
        return Err(CoreError::InvalidTimeRange(symbolic.to_string()));
    }

    let days: i64 = digits
        .parse()
        .map_err(|_| CoreError::InvalidTimeRange(symbolic.to_string()))?;
    if days <= 0 {
        return Err(CoreError::InvalidTimeRange(symbolic.to_string()));
    }

    Ok(ResolvedRange {
        start: now - Duration::days(days),
        end: now,
    })
}
