//! Chunked Active Engine (spec §4.2): `start(timeRange)` kicks off a
//! user-initiated scan over an arbitrary date range; `run_chunk` advances it
//! by one chunk per dispatcher tick until it finalizes.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use inboxd_core::clock::{format_ymd, parse_tz};
use inboxd_core::config::{PolicyConfig, TopicConfig};
use inboxd_core::{constants, resolve_time_range};
use inboxd_llm::Classifier;
use inboxd_mail::{MailQuery, MailStore};
use inboxd_notify::{DigestRenderer, Mailer};
use inboxd_store::lock::WorkflowKind;
use inboxd_store::state::{self, InFlightAccumulator, RunStats, RunStatus};
use inboxd_store::{lock, KvStore, StoreError};

use crate::batch::{run_batches, BatchOutcome};
use crate::dispatcher::{self, DISPATCHER_INTERVAL_HOURS};
use crate::error::EngineError;
use crate::ignore::filter_ignored;
use crate::trigger::TriggerService;

/// Upper bound on threads fetched per chunk window; the chunk size (2 days)
/// and this limit are the de facto mail-provider rate control (spec §5).
const SEARCH_LIMIT: usize = 200;

pub struct ActiveEngine<'a> {
    pub kv: &'a dyn KvStore,
    pub mail: &'a dyn MailStore,
    pub classifier: &'a Classifier,
    pub triggers: &'a dyn TriggerService,
    pub mailer: &'a dyn Mailer,
    pub digest: &'a DigestRenderer,
    pub topics: &'a TopicConfig,
    pub policy: &'a PolicyConfig,
    pub user_email: &'a str,
}

impl<'a> ActiveEngine<'a> {
    /// Preconditions: no existing lock. On any failure the lock is released,
    /// the dispatcher is reinstated, and an error notification is sent — no
    /// partial lock may outlive this call (spec §4.2). Lock contention is
    /// the one failure that must NOT trigger that rollback: nothing was
    /// acquired, and releasing would tear down the real holder's lock.
    pub async fn start(&self, range: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        match self.try_start(range, now).await {
            Ok(()) => Ok(()),
            Err(EngineError::LockContention(msg)) => Err(EngineError::LockContention(msg)),
            Err(e) => {
                let _ = lock::release(self.kv);
                if let Err(re) = dispatcher::ensure_dispatcher(self.triggers, now).await {
                    warn!(error = %re, "failed to reinstate dispatcher after start failure");
                }
                self.notify_terminal(now, "Inboxd run failed to start", &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn try_start(&self, range: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        match lock::acquire(self.kv, WorkflowKind::Active, now) {
            Ok(()) => {}
            Err(StoreError::LockContention { held_kind, .. }) => {
                return Err(EngineError::LockContention(lock::contention_message(&held_kind)));
            }
            Err(other) => return Err(other.into()),
        }

        let resolved = resolve_time_range(range, now)?;

        state::set_time_range(self.kv, range)?;
        state::set_chunk_window_start(self.kv, resolved.start)?;
        state::set_chunk_window_end(self.kv, resolved.end)?;
        state::set_chunk_index(self.kv, 0)?;
        state::set_chunk_total(self.kv, resolved.chunk_total())?;
        state::set_accumulated_in_flight(self.kv, &InFlightAccumulator::default())?;
        state::set_started_at(self.kv, now)?;
        state::status::set(self.kv, RunStatus::Running)?;

        let delay = constants::kickoff_delay();
        state::set_expected_chunk_start_by(self.kv, now + constants::expected_start_buffer(delay))?;
        dispatcher::install_kickoff(self.triggers, now, delay.num_milliseconds() as u64).await?;

        Ok(())
    }

    /// One chunk of an active run. Any error here is a terminal run failure
    /// (spec §4.2 "Failure semantics"): it is handled in place (status,
    /// lock, notification, dispatcher) rather than propagated, so callers
    /// always see `Ok(())`.
    pub async fn run_chunk(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if let Err(e) = self.try_run_chunk(now).await {
            self.handle_chunk_failure(now, &e).await;
        }
        Ok(())
    }

    async fn try_run_chunk(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        dispatcher::reinstate_dispatcher_after_kickoff(self.triggers, now).await?;

        state::set_chunk_started_at(self.kv, now)?;
        state::clear_expected_chunk_start_by(self.kv)?;

        let window_start = state::get_chunk_window_start(self.kv)?
            .ok_or_else(|| EngineError::InvalidState("chunkWindowStart missing".into()))?;
        let window_end = state::get_chunk_window_end(self.kv)?
            .ok_or_else(|| EngineError::InvalidState("chunkWindowEnd missing".into()))?;
        let index = state::get_chunk_index(self.kv)?
            .ok_or_else(|| EngineError::InvalidState("chunkIndex missing".into()))?;
        let total = state::get_chunk_total(self.kv)?
            .ok_or_else(|| EngineError::InvalidState("chunkTotal missing".into()))?;

        let w0 = window_start + constants::chunk_span() * index as i32;
        if w0 >= window_end {
            return self.finalize_success(now, index, total).await;
        }
        let w1 = std::cmp::min(w0 + constants::chunk_span(), window_end);

        let query = MailQuery::new()
            .after(w0)
            .before(w1)
            .inbox_only(self.policy.inbox_only)
            .unread_only(self.policy.unread_only);
        let threads = self.mail.search(&query, SEARCH_LIMIT).await?;
        let threads = filter_ignored(threads, self.user_email, &self.policy.addon_name);

        let mut acc = state::get_accumulated_in_flight(self.kv)?;
        let mut out = BatchOutcome {
            must_do: std::mem::take(&mut acc.must_do),
            must_know: std::mem::take(&mut acc.must_know),
            processed_threads: 0,
        };
        run_batches(self.mail, self.classifier, &threads, self.topics, self.policy, &mut out).await?;
        state::set_accumulated_in_flight(
            self.kv,
            &InFlightAccumulator {
                must_do: out.must_do,
                must_know: out.must_know,
            },
        )?;

        let next_index = index + 1;
        state::set_chunk_index(self.kv, next_index)?;
        state::clear_chunk_started_at(self.kv)?;

        if next_index < total {
            let tick_delay = Duration::hours(DISPATCHER_INTERVAL_HOURS as i64);
            state::set_expected_chunk_start_by(self.kv, now + constants::expected_start_buffer(tick_delay))?;
            return Ok(());
        }

        self.finalize_success(now, next_index, total).await
    }

    async fn finalize_success(&self, now: DateTime<Utc>, chunks_completed: u32, chunks_total: u32) -> Result<(), EngineError> {
        let acc = state::get_accumulated_in_flight(self.kv)?;
        let started_at = state::get_started_at(self.kv)?.unwrap_or(now);
        let time_range = state::get_time_range(self.kv)?.unwrap_or_default();

        let tz = parse_tz(&self.policy.time_zone)?;
        let date_label = format_ymd(now, tz);
        let total_processed = (acc.must_do.len() + acc.must_know.len()) as u64;
        let html = self
            .digest
            .render(&acc.must_do, &acc.must_know, total_processed, &date_label, &date_label)?;

        state::set_latest_run_stats(
            self.kv,
            &RunStats {
                status: RunStatus::Completed,
                time_range,
                started_at,
                finished_at: now,
                chunks_completed,
                chunks_total,
                must_do_count: acc.must_do.len(),
                must_know_count: acc.must_know.len(),
                error: None,
            },
        )?;
        state::status::set(self.kv, RunStatus::Completed)?;
        state::clear_active_chunk_state(self.kv)?;
        lock::release(self.kv)?;

        if let Err(e) = self
            .mailer
            .send(self.user_email, "Inboxd run complete", &html, &self.policy.addon_name)
            .await
        {
            warn!(error = %e, "completion email failed to send");
        }

        dispatcher::ensure_dispatcher(self.triggers, now).await?;
        Ok(())
    }

    /// spec §4.2 "Failure semantics": sets `status=error`, clears
    /// `chunkStartedAt` only (chunk window/index and `accumulatedInFlight`
    /// survive for `latestRunStats` to report), releases the lock, notifies,
    /// reinstates the dispatcher. Every step is best-effort — a failure here
    /// must never leave the lock held or the dispatcher missing.
    async fn handle_chunk_failure(&self, now: DateTime<Utc>, error: &EngineError) {
        let message = error.to_string();

        if let Err(e) = state::status::set(self.kv, RunStatus::Error) {
            warn!(error = %e, "failed to persist error status on failure path");
        }
        if let Err(e) = state::clear_chunk_started_at(self.kv) {
            warn!(error = %e, "failed to clear chunkStartedAt on failure path");
        }

        let stats = RunStats {
            status: RunStatus::Error,
            time_range: state::get_time_range(self.kv).ok().flatten().unwrap_or_default(),
            started_at: state::get_started_at(self.kv).ok().flatten().unwrap_or(now),
            finished_at: now,
            chunks_completed: state::get_chunk_index(self.kv).ok().flatten().unwrap_or(0),
            chunks_total: state::get_chunk_total(self.kv).ok().flatten().unwrap_or(0),
            must_do_count: 0,
            must_know_count: 0,
            error: Some(message.clone()),
        };
        if let Err(e) = state::set_latest_run_stats(self.kv, &stats) {
            warn!(error = %e, "failed to persist latestRunStats on failure path");
        }

        if let Err(e) = lock::release(self.kv) {
            warn!(error = %e, "failed to release lock on failure path");
        }

        self.notify_terminal(now, "Inboxd run failed", &message).await;

        if let Err(e) = dispatcher::ensure_dispatcher(self.triggers, now).await {
            warn!(error = %e, "failed to reinstate dispatcher after run failure");
        }
    }

    async fn notify_terminal(&self, _now: DateTime<Utc>, subject: &str, message: &str) {
        let html = format!("<p>{}</p>", message);
        if let Err(e) = self
            .mailer
            .send(self.user_email, subject, &html, &self.policy.addon_name)
            .await
        {
            warn!(error = %e, subject, "failed to send terminal notification email");
        }
    }
}
