//! Trigger hygiene (spec §5, §8 property 2): at steady state exactly one
//! `dispatcher` trigger exists. `ensure_dispatcher` is idempotent and MUST be
//! called from every code path that might otherwise leave zero triggers
//! installed.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::EngineError;
use crate::trigger::{TriggerCadence, TriggerService};

pub const DISPATCHER_HANDLER: &str = "dispatcher";
pub const KICKOFF_HANDLER: &str = "active_kickoff";

/// Dispatcher tick cadence. Finer than 1 hour is not assumed available from
/// the host (spec §6), so this is the steady-state trigger interval.
pub const DISPATCHER_INTERVAL_HOURS: u32 = 1;

/// The cadence `ensure_dispatcher` installs: the hourly default, unless an
/// operator supplied `INBOXD_DISPATCHER_CRON` (spec §9 supplement 4).
///
/// Accepts a standard 5-field cron expression and normalizes it to the
/// 6-field form the `cron` crate requires, the same way the teacher's rules
/// scheduler does for user-supplied YAML cadences.
pub fn dispatcher_cadence(cron_override: Option<&str>) -> Result<TriggerCadence, EngineError> {
    match cron_override.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(TriggerCadence::EveryHours(DISPATCHER_INTERVAL_HOURS)),
        Some(expr) => {
            let schedule = Schedule::from_str(&normalize_cron(expr))
                .map_err(|e| EngineError::ConfigIncomplete(format!("invalid INBOXD_DISPATCHER_CRON: {e}")))?;
            Ok(TriggerCadence::Cron(schedule))
        }
    }
}

fn normalize_cron(cron_5field: &str) -> String {
    if cron_5field.split_whitespace().count() == 5 {
        format!("0 {cron_5field}")
    } else {
        cron_5field.to_string()
    }
}

/// Install the recurring dispatcher trigger if it is missing. Safe to call
/// unconditionally; does nothing if the dispatcher already exists.
pub async fn ensure_dispatcher(
    triggers: &dyn TriggerService,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    ensure_dispatcher_with_cadence(triggers, now, None).await
}

/// Like [`ensure_dispatcher`], but honoring an optional cron override.
pub async fn ensure_dispatcher_with_cadence(
    triggers: &dyn TriggerService,
    now: DateTime<Utc>,
    cron_override: Option<&str>,
) -> Result<(), EngineError> {
    let existing = triggers.list().await?;
    if existing.iter().any(|t| t.handler == DISPATCHER_HANDLER) {
        return Ok(());
    }
    triggers
        .create(DISPATCHER_HANDLER, dispatcher_cadence(cron_override)?, now)
        .await
}

/// Temporarily replace the recurring dispatcher with a one-off kickoff
/// trigger for an active run's first chunk (spec §5: "the engine may
/// temporarily delete the dispatcher and install a one-off; the one-off's
/// first action reinstates the dispatcher").
pub async fn install_kickoff(
    triggers: &dyn TriggerService,
    now: DateTime<Utc>,
    delay_ms: u64,
) -> Result<(), EngineError> {
    triggers.delete(DISPATCHER_HANDLER).await?;
    triggers
        .create(KICKOFF_HANDLER, TriggerCadence::AfterMs(delay_ms), now)
        .await
}

/// The kickoff trigger's first action: reinstate the dispatcher and remove
/// itself. Called before running the first chunk.
pub async fn reinstate_dispatcher_after_kickoff(
    triggers: &dyn TriggerService,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    triggers.delete(KICKOFF_HANDLER).await?;
    ensure_dispatcher(triggers, now).await
}
