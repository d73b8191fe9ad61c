//! `checkAndHandleTimeout` (spec §4.4, §8 property 4): reaps a stuck active
//! run on the next dispatcher tick. Runs before anything else on every tick
//! because liveness of the lock depends entirely on this check (spec §5:
//! "the lock has no built-in lease"). Releasing the lock and notifying the
//! user are the caller's responsibility (`lib.rs::Engine::dispatcher_tick`),
//! since both need resources (the lock, the mailer) this module doesn't own.

use chrono::{DateTime, Utc};
use inboxd_core::constants;
use inboxd_store::state::{self, RunStatus};
use inboxd_store::KvStore;

use crate::error::EngineError;

/// Returns true iff it transitioned a run into `timeout`.
pub fn check_and_handle_timeout(kv: &dyn KvStore, now: DateTime<Utc>) -> Result<bool, EngineError> {
    if state::status::get(kv)? != Some(RunStatus::Running) {
        return Ok(false);
    }

    let timed_out = match state::get_chunk_started_at(kv)? {
        Some(started) => now - started > constants::processing_timeout(),
        None => match state::get_expected_chunk_start_by(kv)? {
            Some(expected) => now > expected,
            None => false,
        },
    };

    if !timed_out {
        return Ok(false);
    }

    state::status::set(kv, RunStatus::Timeout)?;
    state::clear_chunk_started_at(kv)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use inboxd_store::MemoryKvStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn not_running_never_times_out() {
        let kv = MemoryKvStore::new();
        assert!(!check_and_handle_timeout(&kv, now()).unwrap());
    }

    #[test]
    fn chunk_running_too_long_times_out() {
        let kv = MemoryKvStore::new();
        state::status::set(&kv, RunStatus::Running).unwrap();
        state::set_chunk_started_at(&kv, now() - Duration::minutes(11)).unwrap();

        assert!(check_and_handle_timeout(&kv, now()).unwrap());
        assert_eq!(state::status::get(&kv).unwrap(), Some(RunStatus::Timeout));
        assert_eq!(state::get_chunk_started_at(&kv).unwrap(), None);
    }

    #[test]
    fn missed_expected_start_times_out() {
        let kv = MemoryKvStore::new();
        state::status::set(&kv, RunStatus::Running).unwrap();
        state::set_expected_chunk_start_by(&kv, now() - Duration::minutes(1)).unwrap();

        assert!(check_and_handle_timeout(&kv, now()).unwrap());
        assert_eq!(state::status::get(&kv).unwrap(), Some(RunStatus::Timeout));
    }

    #[test]
    fn running_within_budget_is_left_alone() {
        let kv = MemoryKvStore::new();
        state::status::set(&kv, RunStatus::Running).unwrap();
        state::set_chunk_started_at(&kv, now() - Duration::minutes(2)).unwrap();

        assert!(!check_and_handle_timeout(&kv, now()).unwrap());
        assert_eq!(state::status::get(&kv).unwrap(), Some(RunStatus::Running));
    }
}
