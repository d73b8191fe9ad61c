//! `maybeSendDailyDigest` (spec §4.4): gates the daily digest on the
//! timezone-anchored send window and once-per-local-day semantics, then
//! renders and sends it from the durable [`AccumulatorFile`].

use chrono::{DateTime, Utc};
use tracing::warn;

use inboxd_core::clock::{format_ymd, local_hour, parse_tz};
use inboxd_core::config::PolicyConfig;
use inboxd_core::constants::{DIGEST_WINDOW_END_HOUR, DIGEST_WINDOW_START_HOUR};
use inboxd_notify::{DigestRenderer, Mailer};
use inboxd_store::{state, AccumulatorStore, KvStore};

use crate::error::EngineError;

/// Returns true iff a digest was actually sent.
pub async fn maybe_send_daily_digest(
    kv: &dyn KvStore,
    accumulator: &AccumulatorStore<'_>,
    mailer: &dyn Mailer,
    renderer: &DigestRenderer,
    policy: &PolicyConfig,
    user_email: &str,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let tz = parse_tz(&policy.time_zone)?;
    let hour = local_hour(now, tz);
    if !(DIGEST_WINDOW_START_HOUR..DIGEST_WINDOW_END_HOUR).contains(&hour) {
        return Ok(false);
    }

    let today = format_ymd(now, tz);
    if state::get_passive_last_summary_date(kv)?.as_deref() == Some(today.as_str()) {
        return Ok(false);
    }

    let (file, _handle) = accumulator.load()?;
    if file.is_empty() {
        return Ok(false);
    }

    let first_label = file
        .first_date
        .map(|d| format_ymd(d, tz))
        .unwrap_or_else(|| today.clone());
    let html = renderer.render(&file.must_do, &file.must_know, file.total_processed, &today, &first_label)?;

    match mailer.send(user_email, "Inboxd daily digest", &html, &policy.addon_name).await {
        Ok(()) => {
            accumulator.clear()?;
            state::set_passive_last_summary_date(kv, &today)?;
            Ok(true)
        }
        Err(e) => {
            warn!(error = %e, "digest send failed, accumulator retained for next pass's retry");
            Ok(false)
        }
    }
}
