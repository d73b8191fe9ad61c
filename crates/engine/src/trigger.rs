//! `TriggerService` (spec §6): the host's scheduling capability. Recurring
//! cadence finer than 1 hour is not assumed available (spec §5), so
//! [`TriggerCadence::EveryHours`] is the steady-state dispatcher cadence and
//! [`TriggerCadence::AfterMs`] is used only for the active engine's one-off
//! kickoff trigger.
//!
//! Modeled here as KV-persisted records rather than an OS-level scheduler:
//! this binary has no owned event loop (spec §5 "host-driven"), so the only
//! thing a trigger *is*, from the engine's point of view, is a row that says
//! "call `handler` at or after `fire_at`". Something outside this crate (the
//! CLI's own cron-driven invocation, or a host scheduler) is responsible for
//! actually waking the process up and calling [`TriggerService::due`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use inboxd_store::KvStore;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub enum TriggerCadence {
    EveryHours(u32),
    AfterMs(u64),
    /// An operator-supplied cron expression overriding the hourly default
    /// (spec §9 supplement 4: `INBOXD_DISPATCHER_CRON`).
    Cron(Schedule),
}

impl TriggerCadence {
    fn next_fire_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TriggerCadence::EveryHours(h) => now + Duration::hours(*h as i64),
            TriggerCadence::AfterMs(ms) => now + Duration::milliseconds(*ms as i64),
            TriggerCadence::Cron(schedule) => schedule
                .after(&now)
                .next()
                .unwrap_or_else(|| now + Duration::hours(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub handler: String,
    pub fire_at: DateTime<Utc>,
    pub recurring_every_hours: Option<u32>,
}

#[async_trait]
pub trait TriggerService: Send + Sync {
    async fn list(&self) -> Result<Vec<TriggerRecord>, EngineError>;
    async fn create(&self, handler: &str, cadence: TriggerCadence, now: DateTime<Utc>) -> Result<(), EngineError>;
    async fn delete(&self, handler: &str) -> Result<(), EngineError>;

    /// Triggers whose `fire_at` has arrived. Recurring triggers are
    /// rescheduled in place by the caller via [`TriggerService::create`].
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<TriggerRecord>, EngineError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| t.fire_at <= now)
            .collect())
    }
}

const TRIGGER_KEY_PREFIX: &str = "trigger:";

/// KV-backed trigger store. `list()` scans a small fixed set of known
/// handler names rather than a directory, since `KvStore` has no listing
/// operation (spec §6 only specifies `get/set/delete/setMany`).
pub struct KvTriggerService<'a> {
    kv: &'a dyn KvStore,
    known_handlers: Vec<String>,
}

impl<'a> KvTriggerService<'a> {
    pub fn new(kv: &'a dyn KvStore, known_handlers: Vec<String>) -> Self {
        Self { kv, known_handlers }
    }

    fn key(handler: &str) -> String {
        format!("{TRIGGER_KEY_PREFIX}{handler}")
    }
}

#[async_trait]
impl<'a> TriggerService for KvTriggerService<'a> {
    async fn list(&self) -> Result<Vec<TriggerRecord>, EngineError> {
        let mut out = Vec::new();
        for handler in &self.known_handlers {
            if let Some(raw) = self.kv.get(&Self::key(handler))? {
                out.push(serde_json::from_str(&raw).map_err(inboxd_store::StoreError::from)?);
            }
        }
        Ok(out)
    }

    async fn create(&self, handler: &str, cadence: TriggerCadence, now: DateTime<Utc>) -> Result<(), EngineError> {
        let record = TriggerRecord {
            handler: handler.to_string(),
            fire_at: cadence.next_fire_at(now),
            recurring_every_hours: match cadence {
                TriggerCadence::EveryHours(h) => Some(h),
                TriggerCadence::AfterMs(_) | TriggerCadence::Cron(_) => None,
            },
        };
        self.kv
            .set(&Self::key(handler), &serde_json::to_string(&record).map_err(inboxd_store::StoreError::from)?)?;
        Ok(())
    }

    async fn delete(&self, handler: &str) -> Result<(), EngineError> {
        self.kv.delete(&Self::key(handler))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inboxd_store::MemoryKvStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let kv = MemoryKvStore::new();
        let svc = KvTriggerService::new(&kv, vec!["dispatcher".to_string()]);
        svc.create("dispatcher", TriggerCadence::EveryHours(1), now())
            .await
            .unwrap();

        let listed = svc.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].handler, "dispatcher");
        assert_eq!(listed[0].fire_at, now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn due_filters_by_fire_at() {
        let kv = MemoryKvStore::new();
        let svc = KvTriggerService::new(&kv, vec!["dispatcher".to_string()]);
        svc.create("dispatcher", TriggerCadence::AfterMs(1000), now())
            .await
            .unwrap();

        assert!(svc.due(now()).await.unwrap().is_empty());
        assert_eq!(svc.due(now() + Duration::seconds(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let kv = MemoryKvStore::new();
        let svc = KvTriggerService::new(&kv, vec!["dispatcher".to_string()]);
        svc.create("dispatcher", TriggerCadence::EveryHours(1), now())
            .await
            .unwrap();
        svc.delete("dispatcher").await.unwrap();
        assert!(svc.list().await.unwrap().is_empty());
    }
}
