//! Passive Engine (spec §4.3): the hourly background scan. Entered only
//! while holding `lock{kind=passive}`; never touches `status`/`chunk*` keys
//! (those are the active engine's alone, per spec §9's partition note).

use chrono::{DateTime, Utc};
use tracing::warn;

use inboxd_core::config::{PolicyConfig, TopicConfig};
use inboxd_core::constants;
use inboxd_llm::Classifier;
use inboxd_mail::{MailStore, MailThread};
use inboxd_notify::{DigestRenderer, Mailer};
use inboxd_store::{lock, state, AccumulatorStore, BlobStore, KvStore};

use crate::batch::{run_batches, BatchOutcome};
use crate::digest::maybe_send_daily_digest;
use crate::error::EngineError;
use crate::ignore::filter_ignored;
use inboxd_mail::MailQuery;

pub struct PassiveEngine<'a> {
    pub kv: &'a dyn KvStore,
    pub blob: &'a dyn BlobStore,
    pub mail: &'a dyn MailStore,
    pub classifier: &'a Classifier,
    pub mailer: &'a dyn Mailer,
    pub digest: &'a DigestRenderer,
    pub topics: &'a TopicConfig,
    pub policy: &'a PolicyConfig,
    pub user_email: &'a str,
}

impl<'a> PassiveEngine<'a> {
    /// Preconditions: called only by the dispatcher, which has already
    /// acquired `lock{kind=passive}`. Releases the lock in a finally-
    /// equivalent block regardless of outcome; on error sends a
    /// notification but never clears the accumulator (spec §4.3 step 7).
    pub async fn run(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let result = self.try_run(now).await;
        if let Err(e) = &result {
            warn!(error = %e, "passive pass failed");
            self.notify_error(now, &e.to_string()).await;
        }
        if let Err(e) = lock::release(self.kv) {
            warn!(error = %e, "failed to release passive lock");
        }
        result
    }

    async fn try_run(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let backstop = now - constants::passive_backstop();
        let start = match state::get_passive_last_msg_ts(self.kv)? {
            Some(last) => std::cmp::max(last + constants::passive_safety_buffer(), backstop),
            None => backstop,
        };
        let end = now;
        if start >= end {
            return Ok(());
        }

        let query = MailQuery::new()
            .after(start)
            .before(end)
            .inbox_only(self.policy.inbox_only)
            .unread_only(self.policy.unread_only);
        let threads = self.mail.search(&query, PASSIVE_SEARCH_LIMIT).await?;
        let threads = filter_ignored(threads, self.user_email, &self.policy.addon_name);
        let threads = stop_at_high_water_mark(threads, state::get_passive_last_msg_id(self.kv)?.as_deref());

        let mut out = BatchOutcome::default();
        run_batches(self.mail, self.classifier, &threads, self.topics, self.policy, &mut out).await?;

        if !out.must_do.is_empty() || !out.must_know.is_empty() {
            if let Some((ts, id)) = earliest_message(&threads) {
                state::set_passive_last_msg_ts(self.kv, ts)?;
                state::set_passive_last_msg_id(self.kv, &id)?;
            }

            let accumulator = AccumulatorStore::new(self.blob);
            let (mut file, handle) = accumulator.load()?;
            file.merge(out.must_do, out.must_know, out.processed_threads as u64, start, end);
            accumulator.save(&handle, &file)?;
        }

        state::set_passive_last_run_at(self.kv, now)?;

        let accumulator = AccumulatorStore::new(self.blob);
        maybe_send_daily_digest(self.kv, &accumulator, self.mailer, self.digest, self.policy, self.user_email, now).await?;

        Ok(())
    }

    async fn notify_error(&self, _now: DateTime<Utc>, message: &str) {
        let html = format!("<p>{}</p>", message);
        if let Err(e) = self
            .mailer
            .send(self.user_email, "Inboxd passive pass failed", &html, &self.policy.addon_name)
            .await
        {
            warn!(error = %e, "failed to send passive-pass error notification");
        }
    }
}

const PASSIVE_SEARCH_LIMIT: usize = 200;

/// Drop the boundary message itself (spec §4.3 step 3: "stop thread
/// traversal at that message, exclusive"). The date-window start already
/// carries the 30-minute safety buffer past it; this guards the same-second
/// edge case where the boundary message still falls inside the window.
fn stop_at_high_water_mark(threads: Vec<MailThread>, marker_id: Option<&str>) -> Vec<MailThread> {
    let Some(marker_id) = marker_id else {
        return threads;
    };
    threads
        .into_iter()
        .filter_map(|mut thread| {
            thread.messages.retain(|m| m.id != marker_id);
            if thread.messages.is_empty() {
                None
            } else {
                Some(thread)
            }
        })
        .collect()
}

/// Earliest message's `(date, id)` across every processed thread, used to
/// advance the high-water mark (spec §5: "only advanced from the earliest
/// message observed in the pass").
fn earliest_message(threads: &[MailThread]) -> Option<(DateTime<Utc>, String)> {
    threads
        .iter()
        .flat_map(|t| &t.messages)
        .min_by_key(|m| m.date)
        .map(|m| (m.date, m.id.clone()))
}
