//! `now()` + IANA-timezone formatting, the `Clock + TZ` capability of spec §6.
//!
//! Kept as a trait (rather than bare `chrono::Utc::now()` calls) so tests can
//! pin time without sleeping — mirrors how the rules scheduler takes `now`
//! as an explicit parameter rather than reading the clock itself.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;

/// Supplies the current instant. Implementations must be cheap and
/// side-effect free; the engine calls this at every decision point rather
/// than caching `now`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock, backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Parse an IANA timezone name (e.g. `"America/New_York"`).
pub fn parse_tz(tz_name: &str) -> Result<Tz, CoreError> {
    tz_name
        .parse::<Tz>()
        .map_err(|_| CoreError::InvalidTimeZone(tz_name.to_string()))
}

/// Format `instant` in the given IANA timezone as `HH:mm`.
pub fn format_hhmm(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%H:%M").to_string()
}

/// Format `instant` in the given IANA timezone as `yyyy-MM-dd`.
pub fn format_ymd(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Local hour-of-day in `[0,24)`, used for digest-window checks.
pub fn local_hour(instant: DateTime<Utc>, tz: Tz) -> u32 {
    use chrono::Timelike;
    instant.with_timezone(&tz).hour()
}
