//! The triage orchestration engine (spec §4): wires the durable stores,
//! mail/LLM/notification capabilities, and trigger service into the two
//! engines and the dispatcher that decides which one runs on a given tick.
//!
//! `Engine<'a>` borrows every capability for the lifetime of one tick or one
//! `start()` call, the same convention [`ActiveEngine`]/[`PassiveEngine`]
//! use — the caller (the CLI binary) owns the concrete stores for the
//! process's lifetime and builds an `Engine` around borrows of them.

pub mod active;
pub mod batch;
pub mod digest;
pub mod dispatcher;
pub mod error;
pub mod ignore;
pub mod passive;
pub mod timeout;
pub mod trigger;

use chrono::{DateTime, Utc};
use tracing::warn;

use inboxd_core::config::{PolicyConfig, TopicConfig};
use inboxd_core::constants;
use inboxd_llm::Classifier;
use inboxd_mail::MailStore;
use inboxd_notify::{DigestRenderer, Mailer};
use inboxd_store::{lock, state, BlobStore, KvStore};

use active::ActiveEngine;
use error::EngineError;
use passive::PassiveEngine;
use trigger::TriggerService;

pub struct Engine<'a> {
    pub kv: &'a dyn KvStore,
    pub blob: &'a dyn BlobStore,
    pub mail: &'a dyn MailStore,
    pub classifier: &'a Classifier,
    pub mailer: &'a dyn Mailer,
    pub triggers: &'a dyn TriggerService,
    pub digest: &'a DigestRenderer,
    pub topics: &'a TopicConfig,
    pub policy: &'a PolicyConfig,
    pub user_email: &'a str,
    /// Mirrors `Config::is_complete()`: an LLM key and a resolvable
    /// timezone. The dispatcher refuses to start passive passes otherwise
    /// (spec §4.1).
    pub configured: bool,
}

impl<'a> Engine<'a> {
    fn active(&self) -> ActiveEngine<'a> {
        ActiveEngine {
            kv: self.kv,
            mail: self.mail,
            classifier: self.classifier,
            triggers: self.triggers,
            mailer: self.mailer,
            digest: self.digest,
            topics: self.topics,
            policy: self.policy,
            user_email: self.user_email,
        }
    }

    fn passive(&self) -> PassiveEngine<'a> {
        PassiveEngine {
            kv: self.kv,
            blob: self.blob,
            mail: self.mail,
            classifier: self.classifier,
            mailer: self.mailer,
            digest: self.digest,
            topics: self.topics,
            policy: self.policy,
            user_email: self.user_email,
        }
    }

    /// User-initiated entry point (spec §4.2 `start(timeRange)`).
    pub async fn start(&self, range: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.active().start(range, now).await
    }

    /// The dispatcher (spec §4.1): runs on every host-driven tick and
    /// decides, in order, whether to reap a timed-out run, advance an
    /// active run by one chunk, or kick off a passive pass.
    pub async fn dispatcher_tick(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if timeout::check_and_handle_timeout(self.kv, now)? {
            self.handle_timeout(now).await;
            return Ok(());
        }

        if state::status::is_running(self.kv)? {
            return self.active().run_chunk(now).await;
        }

        if self.configured && self.passive_pass_due(now)? {
            state::set_passive_last_run_at(self.kv, now)?;
            if let Err(e) = lock::acquire(self.kv, lock::WorkflowKind::Passive, now) {
                warn!(error = %e, "passive lock unavailable this tick");
                return Ok(());
            }
            return self.passive().run(now).await;
        }

        Ok(())
    }

    fn passive_pass_due(&self, now: DateTime<Utc>) -> Result<bool, EngineError> {
        Ok(match state::get_passive_last_run_at(self.kv)? {
            Some(last) => now - last >= constants::passive_min_interval(),
            None => true,
        })
    }

    /// A timed-out run is terminal (spec §4.4): release the lock, notify,
    /// and reinstate the dispatcher. `timeout::check_and_handle_timeout`
    /// already flipped `status` to `timeout` and cleared `chunkStartedAt`.
    async fn handle_timeout(&self, now: DateTime<Utc>) {
        if let Err(e) = lock::release(self.kv) {
            warn!(error = %e, "failed to release lock after timeout");
        }

        let html = "<p>An Inboxd run timed out and was abandoned.</p>";
        if let Err(e) = self
            .mailer
            .send(self.user_email, "Inboxd run timed out", html, &self.policy.addon_name)
            .await
        {
            warn!(error = %e, "failed to send timeout notification");
        }

        if let Err(e) = dispatcher::ensure_dispatcher(self.triggers, now).await {
            warn!(error = %e, "failed to reinstate dispatcher after timeout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use inboxd_llm::provider::{LlmError, LlmProvider, Message};
    use inboxd_mail::InMemoryMailStore;
    use inboxd_notify::RecordingMailer;
    use inboxd_store::{FileBlobStore, MemoryKvStore, RunStatus};

    use trigger::KvTriggerService;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn policy() -> PolicyConfig {
        PolicyConfig {
            addon_name: "Inboxd".into(),
            time_zone: "UTC".into(),
            unread_only: false,
            inbox_only: true,
            must_do_label: None,
            must_know_label: None,
            mark_processed_as_read: false,
            remove_uninteresting_from_inbox: false,
        }
    }

    fn topics() -> TopicConfig {
        TopicConfig {
            must_do_topics: vec![],
            must_know_topics: vec![],
            must_do_other: true,
            must_know_other: true,
        }
    }

    struct StubProvider(String);

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn complete(&self, _messages: Vec<Message>, _temperature: f32, _max_tokens: u32) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn tick_with_nothing_running_and_no_recent_passive_run_starts_a_pass() {
        let kv = MemoryKvStore::new();
        state::set_passive_last_msg_ts(&kv, now() - Duration::hours(2)).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let blob = FileBlobStore::new(tmp.path()).unwrap();
        let mail = InMemoryMailStore::new(vec![]);
        let classifier = Classifier::new(Box::new(StubProvider(r#"{"mustDo":[],"mustKnow":[]}"#.into())), 0.2, 4096);
        let mailer = RecordingMailer::new();
        let svc = KvTriggerService::new(&kv, vec![dispatcher::DISPATCHER_HANDLER.into(), dispatcher::KICKOFF_HANDLER.into()]);
        let digest = DigestRenderer::new();
        let policy = policy();
        let topics = topics();

        let engine = Engine {
            kv: &kv,
            blob: &blob,
            mail: &mail,
            classifier: &classifier,
            mailer: &mailer,
            triggers: &svc,
            digest: &digest,
            topics: &topics,
            policy: &policy,
            user_email: "me@example.com",
            configured: true,
        };

        engine.dispatcher_tick(now()).await.unwrap();
        assert!(state::get_passive_last_run_at(&kv).unwrap().is_some());
        assert!(lock::current(&kv).unwrap().is_none());
    }

    #[tokio::test]
    async fn tick_while_active_run_is_running_advances_the_chunk() {
        let kv = MemoryKvStore::new();
        state::status::set(&kv, RunStatus::Running).unwrap();
        state::set_chunk_window_start(&kv, now()).unwrap();
        state::set_chunk_window_end(&kv, now() + Duration::days(1)).unwrap();
        state::set_chunk_index(&kv, 0).unwrap();
        state::set_chunk_total(&kv, 1).unwrap();
        state::set_started_at(&kv, now()).unwrap();
        lock::acquire(&kv, lock::WorkflowKind::Active, now()).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let blob = FileBlobStore::new(tmp.path()).unwrap();
        let mail = InMemoryMailStore::new(vec![]);
        let classifier = Classifier::new(Box::new(StubProvider(r#"{"mustDo":[],"mustKnow":[]}"#.into())), 0.2, 4096);
        let mailer = RecordingMailer::new();
        let svc = KvTriggerService::new(&kv, vec![dispatcher::DISPATCHER_HANDLER.into(), dispatcher::KICKOFF_HANDLER.into()]);
        let digest = DigestRenderer::new();
        let policy = policy();
        let topics = topics();

        let engine = Engine {
            kv: &kv,
            blob: &blob,
            mail: &mail,
            classifier: &classifier,
            mailer: &mailer,
            triggers: &svc,
            digest: &digest,
            topics: &topics,
            policy: &policy,
            user_email: "me@example.com",
            configured: true,
        };

        engine.dispatcher_tick(now()).await.unwrap();
        assert_eq!(state::status::get(&kv).unwrap(), Some(RunStatus::Completed));
        assert!(lock::current(&kv).unwrap().is_none());
    }

    #[tokio::test]
    async fn tick_reaps_a_timed_out_run() {
        let kv = MemoryKvStore::new();
        state::status::set(&kv, RunStatus::Running).unwrap();
        state::set_chunk_started_at(&kv, now() - Duration::minutes(20)).unwrap();
        lock::acquire(&kv, lock::WorkflowKind::Active, now()).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let blob = FileBlobStore::new(tmp.path()).unwrap();
        let mail = InMemoryMailStore::new(vec![]);
        let classifier = Classifier::new(Box::new(StubProvider(r#"{"mustDo":[],"mustKnow":[]}"#.into())), 0.2, 4096);
        let mailer = RecordingMailer::new();
        let svc = KvTriggerService::new(&kv, vec![dispatcher::DISPATCHER_HANDLER.into(), dispatcher::KICKOFF_HANDLER.into()]);
        let digest = DigestRenderer::new();
        let policy = policy();
        let topics = topics();

        let engine = Engine {
            kv: &kv,
            blob: &blob,
            mail: &mail,
            classifier: &classifier,
            mailer: &mailer,
            triggers: &svc,
            digest: &digest,
            topics: &topics,
            policy: &policy,
            user_email: "me@example.com",
            configured: true,
        };

        engine.dispatcher_tick(now()).await.unwrap();

        assert_eq!(state::status::get(&kv).unwrap(), Some(RunStatus::Timeout));
        assert!(lock::current(&kv).unwrap().is_none());
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent()[0].subject, "Inboxd run timed out");
        assert_eq!(svc.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tick_with_unconfigured_llm_never_starts_a_passive_pass() {
        let kv = MemoryKvStore::new();
        let tmp = tempfile::tempdir().unwrap();
        let blob = FileBlobStore::new(tmp.path()).unwrap();
        let mail = InMemoryMailStore::new(vec![]);
        let classifier = Classifier::new(Box::new(StubProvider(r#"{"mustDo":[],"mustKnow":[]}"#.into())), 0.2, 4096);
        let mailer = RecordingMailer::new();
        let svc = KvTriggerService::new(&kv, vec![dispatcher::DISPATCHER_HANDLER.into(), dispatcher::KICKOFF_HANDLER.into()]);
        let digest = DigestRenderer::new();
        let policy = policy();
        let topics = topics();

        let engine = Engine {
            kv: &kv,
            blob: &blob,
            mail: &mail,
            classifier: &classifier,
            mailer: &mailer,
            triggers: &svc,
            digest: &digest,
            topics: &topics,
            policy: &policy,
            user_email: "me@example.com",
            configured: false,
        };

        engine.dispatcher_tick(now()).await.unwrap();
        assert!(state::get_passive_last_run_at(&kv).unwrap().is_none());
        assert!(lock::current(&kv).unwrap().is_none());
    }
}
