//! `lock`: the single-writer mutex persisted in KV (spec §3/§4, component C4).
//!
//! At most one [`LockState`] exists at a time; its `kind` identifies the
//! exclusive writer (spec invariant 1). The lock has no lease of its own —
//! liveness is enforced by the engine's timeout check running on every
//! dispatcher tick (spec §4.4), not by anything in this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::kv::KvStore;

const LOCK_KEY: &str = "lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Active,
    Passive,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Active => "active",
            WorkflowKind::Passive => "passive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub kind: WorkflowKind,
    pub acquired_at: DateTime<Utc>,
}

/// Read the current lock, if any.
pub fn current(kv: &dyn KvStore) -> Result<Option<LockState>, StoreError> {
    match kv.get(LOCK_KEY)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Acquire the lock for `kind` at `now`.
///
/// Idempotent only with respect to its own kind (spec §5): re-acquiring the
/// same kind while already held by that kind succeeds and refreshes nothing
/// (the original `acquired_at` is preserved, since that timestamp anchors
/// timeout detection). Acquiring while a *different* kind holds it is
/// refused with [`StoreError::LockContention`].
pub fn acquire(kv: &dyn KvStore, kind: WorkflowKind, now: DateTime<Utc>) -> Result<(), StoreError> {
    if let Some(existing) = current(kv)? {
        if existing.kind == kind {
            return Ok(());
        }
        return Err(StoreError::LockContention {
            held_kind: existing.kind.as_str().to_string(),
            acquired_at: existing.acquired_at,
        });
    }
    let state = LockState {
        kind,
        acquired_at: now,
    };
    kv.set(LOCK_KEY, &serde_json::to_string(&state)?)
}

/// Release the lock unconditionally. Safe to call when no lock is held.
pub fn release(kv: &dyn KvStore) -> Result<(), StoreError> {
    kv.delete(LOCK_KEY)
}

/// Human-readable refusal message matching spec scenario S5's wording
/// shape ("Another passive workflow is already running").
pub fn contention_message(held_kind: &str) -> String {
    format!("Another {} workflow is already running", held_kind)
}
