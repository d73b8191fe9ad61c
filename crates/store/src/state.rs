//! Typed accessors over the persisted KV schema of spec §3. Every key in
//! that table gets one getter/setter pair here so the engine never touches
//! raw string keys directly, and defaults for absent keys are explicit
//! (spec §9: "never rely on truthiness of missing values").

use chrono::{DateTime, Utc};
use inboxd_core::Finding;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::kv::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    Timeout,
}

/// Partial classification results accumulated across chunks of one active
/// run (`accumulatedInFlight`, spec §3). Concatenation only — never
/// deduplicated (spec §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InFlightAccumulator {
    pub must_do: Vec<Finding>,
    pub must_know: Vec<Finding>,
}

impl InFlightAccumulator {
    pub fn extend(&mut self, must_do: Vec<Finding>, must_know: Vec<Finding>) {
        self.must_do.extend(must_do);
        self.must_know.extend(must_know);
    }
}

/// Snapshot of the most recently terminated active run, for UI/status
/// display (`latestRunStats`, spec §3/§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub status: RunStatus,
    pub time_range: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub chunks_completed: u32,
    pub chunks_total: u32,
    pub must_do_count: usize,
    pub must_know_count: usize,
    pub error: Option<String>,
}

macro_rules! string_field {
    ($get:ident, $set:ident, $clear:ident, $key:expr) => {
        pub fn $get(kv: &dyn KvStore) -> Result<Option<String>, StoreError> {
            kv.get($key)
        }
        pub fn $set(kv: &dyn KvStore, value: &str) -> Result<(), StoreError> {
            kv.set($key, value)
        }
        pub fn $clear(kv: &dyn KvStore) -> Result<(), StoreError> {
            kv.delete($key)
        }
    };
}

macro_rules! timestamp_field {
    ($get:ident, $set:ident, $clear:ident, $key:expr) => {
        pub fn $get(kv: &dyn KvStore) -> Result<Option<DateTime<Utc>>, StoreError> {
            match kv.get($key)? {
                Some(raw) => Ok(DateTime::parse_from_rfc3339(&raw)
                    .ok()
                    .map(|d| d.with_timezone(&Utc))),
                None => Ok(None),
            }
        }
        pub fn $set(kv: &dyn KvStore, value: DateTime<Utc>) -> Result<(), StoreError> {
            kv.set($key, &value.to_rfc3339())
        }
        pub fn $clear(kv: &dyn KvStore) -> Result<(), StoreError> {
            kv.delete($key)
        }
    };
}

macro_rules! u32_field {
    ($get:ident, $set:ident, $clear:ident, $key:expr) => {
        pub fn $get(kv: &dyn KvStore) -> Result<Option<u32>, StoreError> {
            Ok(kv.get($key)?.and_then(|v| v.parse().ok()))
        }
        pub fn $set(kv: &dyn KvStore, value: u32) -> Result<(), StoreError> {
            kv.set($key, &value.to_string())
        }
        pub fn $clear(kv: &dyn KvStore) -> Result<(), StoreError> {
            kv.delete($key)
        }
    };
}

pub mod status {
    use super::*;

    pub fn get(kv: &dyn KvStore) -> Result<Option<RunStatus>, StoreError> {
        Ok(kv.get("status")?.and_then(|v| match v.as_str() {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "error" => Some(RunStatus::Error),
            "timeout" => Some(RunStatus::Timeout),
            _ => None,
        }))
    }

    pub fn set(kv: &dyn KvStore, value: RunStatus) -> Result<(), StoreError> {
        let raw = match value {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
            RunStatus::Timeout => "timeout",
        };
        kv.set("status", raw)
    }

    pub fn clear(kv: &dyn KvStore) -> Result<(), StoreError> {
        kv.delete("status")
    }

    pub fn is_running(kv: &dyn KvStore) -> Result<bool, StoreError> {
        Ok(get(kv)? == Some(RunStatus::Running))
    }
}

string_field!(get_status_msg, set_status_msg, clear_status_msg, "statusMsg");
string_field!(get_time_range, set_time_range, clear_time_range, "timeRange");
string_field!(
    get_passive_last_msg_id,
    set_passive_last_msg_id,
    clear_passive_last_msg_id,
    "passiveLastMsgId"
);
string_field!(
    get_passive_last_summary_date,
    set_passive_last_summary_date,
    clear_passive_last_summary_date,
    "passiveLastSummaryDate"
);

timestamp_field!(get_started_at, set_started_at, clear_started_at, "startedAt");
timestamp_field!(
    get_chunk_window_start,
    set_chunk_window_start,
    clear_chunk_window_start,
    "chunkWindowStart"
);
timestamp_field!(
    get_chunk_window_end,
    set_chunk_window_end,
    clear_chunk_window_end,
    "chunkWindowEnd"
);
timestamp_field!(
    get_chunk_started_at,
    set_chunk_started_at,
    clear_chunk_started_at,
    "chunkStartedAt"
);
timestamp_field!(
    get_expected_chunk_start_by,
    set_expected_chunk_start_by,
    clear_expected_chunk_start_by,
    "expectedChunkStartBy"
);
timestamp_field!(
    get_passive_last_msg_ts,
    set_passive_last_msg_ts,
    clear_passive_last_msg_ts,
    "passiveLastMsgTs"
);
timestamp_field!(
    get_passive_last_run_at,
    set_passive_last_run_at,
    clear_passive_last_run_at,
    "passiveLastRunAt"
);

u32_field!(get_chunk_index, set_chunk_index, clear_chunk_index, "chunkIndex");
u32_field!(get_chunk_total, set_chunk_total, clear_chunk_total, "chunkTotal");

/// `accumulatedInFlight` (spec §3): the active run's partial results.
pub fn get_accumulated_in_flight(
    kv: &dyn KvStore,
) -> Result<InFlightAccumulator, StoreError> {
    match kv.get("accumulatedInFlight")? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(InFlightAccumulator::default()),
    }
}

pub fn set_accumulated_in_flight(
    kv: &dyn KvStore,
    value: &InFlightAccumulator,
) -> Result<(), StoreError> {
    kv.set("accumulatedInFlight", &serde_json::to_string(value)?)
}

pub fn clear_accumulated_in_flight(kv: &dyn KvStore) -> Result<(), StoreError> {
    kv.delete("accumulatedInFlight")
}

/// `latestRunStats` (spec §3/§9).
pub fn get_latest_run_stats(kv: &dyn KvStore) -> Result<Option<RunStats>, StoreError> {
    match kv.get("latestRunStats")? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn set_latest_run_stats(kv: &dyn KvStore, stats: &RunStats) -> Result<(), StoreError> {
    kv.set("latestRunStats", &serde_json::to_string(stats)?)
}

/// Clear every key scoped to the active engine (spec §9: passive never
/// touches `status`/`chunk*` keys, so this is only ever called from the
/// active engine's finalize/error/timeout paths).
pub fn clear_active_chunk_state(kv: &dyn KvStore) -> Result<(), StoreError> {
    clear_status_msg(kv)?;
    clear_started_at(kv)?;
    clear_time_range(kv)?;
    clear_chunk_window_start(kv)?;
    clear_chunk_window_end(kv)?;
    clear_chunk_index(kv)?;
    clear_chunk_total(kv)?;
    clear_chunk_started_at(kv)?;
    clear_expected_chunk_start_by(kv)?;
    clear_accumulated_in_flight(kv)
}
