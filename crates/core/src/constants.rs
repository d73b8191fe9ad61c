//! Constants that implementations MUST match for behavioural parity
//! (spec §6). These are not tunables exposed via config — they're the
//! engine's fixed cadence and budget.

use chrono::Duration;

/// Size of one active-scan chunk.
pub const CHUNK_DAYS: i64 = 2;

/// A chunk or the wait for the next one may not run longer than this
/// before the engine reaps it as `timeout`.
pub const PROCESSING_TIMEOUT_MINUTES: i64 = 10;

/// Local-time window in which the daily digest may be sent: `[21:00, 24:00)`.
pub const DIGEST_WINDOW_START_HOUR: u32 = 21;
pub const DIGEST_WINDOW_END_HOUR: u32 = 24;

/// Passive scanning never looks back further than this from `now`.
pub const PASSIVE_BACKSTOP_HOURS: i64 = 24;

/// Passive scanning never re-examines within this long of the last
/// processed message.
pub const PASSIVE_SAFETY_BUFFER_MINUTES: i64 = 30;

/// Delay before the first chunk of a freshly started active run fires.
pub const KICKOFF_DELAY_SECONDS: i64 = 60;

/// Fraction of the relevant delay added, on top of a flat 10 minutes, to
/// compute `expectedChunkStartBy`.
pub const EXPECTED_START_BUFFER_FRACTION: f64 = 0.3;
pub const EXPECTED_START_BUFFER_FLAT_MINUTES: i64 = 10;

/// Token budget per LLM batch, and the cheap char-based estimator rate.
pub const MAX_TOKENS: u64 = 200_000;
pub const TOKENS_PER_CHAR: f64 = 0.25;

/// Minimum interval between passive passes.
pub const PASSIVE_MIN_INTERVAL_HOURS: i64 = 1;

pub fn chunk_span() -> Duration {
    Duration::days(CHUNK_DAYS)
}

pub fn processing_timeout() -> Duration {
    Duration::minutes(PROCESSING_TIMEOUT_MINUTES)
}

pub fn passive_backstop() -> Duration {
    Duration::hours(PASSIVE_BACKSTOP_HOURS)
}

pub fn passive_safety_buffer() -> Duration {
    Duration::minutes(PASSIVE_SAFETY_BUFFER_MINUTES)
}

pub fn kickoff_delay() -> Duration {
    Duration::seconds(KICKOFF_DELAY_SECONDS)
}

/// `expectedChunkStartBy = now + delay + 0.3*delay + 10min`, per spec §4.2/§4.4.
pub fn expected_start_buffer(delay: Duration) -> Duration {
    let buffered = (delay.num_milliseconds() as f64) * EXPECTED_START_BUFFER_FRACTION;
    delay
        + Duration::milliseconds(buffered as i64)
        + Duration::minutes(EXPECTED_START_BUFFER_FLAT_MINUTES)
}

pub fn passive_min_interval() -> Duration {
    Duration::hours(PASSIVE_MIN_INTERVAL_HOURS)
}
