//! The AccumulatorFile (spec §3): the single durable JSON blob holding
//! findings pending the next daily digest. Append-only between digests;
//! only [`AccumulatorStore::clear`] resets it, and only after a
//! successful digest send (spec invariant 5).

use chrono::{DateTime, Utc};
use inboxd_core::Finding;
use serde::{Deserialize, Serialize};

use crate::blob::{BlobHandle, BlobStore};
use crate::error::StoreError;

/// Fixed blob name, cached in KV by the caller to avoid directory scans
/// (spec §6).
pub const ACCUMULATOR_BLOB_NAME: &str = "gmail-fast-read-accumulated-results.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccumulatorFile {
    pub must_do: Vec<Finding>,
    pub must_know: Vec<Finding>,
    pub total_processed: u64,
    pub first_date: Option<DateTime<Utc>>,
    pub last_date: Option<DateTime<Utc>>,
}

impl AccumulatorFile {
    pub fn is_empty(&self) -> bool {
        self.must_do.is_empty() && self.must_know.is_empty()
    }

    /// Merge a passive pass's findings into this file (spec §4.5 merge
    /// rules): concatenation, no dedup; `first_date` is set only once (the
    /// earliest window start ever merged); `last_date` always advances to
    /// the latest window end.
    pub fn merge(
        &mut self,
        must_do: Vec<Finding>,
        must_know: Vec<Finding>,
        processed: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) {
        self.must_do.extend(must_do);
        self.must_know.extend(must_know);
        self.total_processed += processed;
        if self.first_date.is_none() {
            self.first_date = Some(window_start);
        }
        self.last_date = Some(window_end);
    }
}

pub struct AccumulatorStore<'a> {
    blob: &'a dyn BlobStore,
}

impl<'a> AccumulatorStore<'a> {
    pub fn new(blob: &'a dyn BlobStore) -> Self {
        Self { blob }
    }

    /// Load the accumulator, creating an empty one if it doesn't exist yet.
    pub fn load(&self) -> Result<(AccumulatorFile, BlobHandle), StoreError> {
        let (content, handle) = self.blob.read_or_init(
            ACCUMULATOR_BLOB_NAME,
            Box::new(|| {
                serde_json::to_string(&AccumulatorFile::default()).expect("default serializes")
            }),
        )?;
        let file: AccumulatorFile = serde_json::from_str(&content)?;
        Ok((file, handle))
    }

    /// Serialize-then-atomic-replace (spec §4.5: "the file is ... never
    /// partially written").
    pub fn save(&self, handle: &BlobHandle, file: &AccumulatorFile) -> Result<(), StoreError> {
        self.blob.write(handle, &serde_json::to_string(file)?)
    }

    /// Only called after a successful digest send (spec §4.4).
    pub fn clear(&self) -> Result<(), StoreError> {
        self.blob.trash(ACCUMULATOR_BLOB_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::FileBlobStore;
    use chrono::TimeZone;
    use inboxd_core::FindingKind;

    fn finding(id: &str) -> Finding {
        Finding {
            email_id: id.to_string(),
            rfc822_id: None,
            subject: "subj".into(),
            sender: "a@b.com".into(),
            topic: "invoices".into(),
            kind: FindingKind::MustDo {
                key_action: "pay".into(),
            },
            date: None,
        }
    }

    #[test]
    fn merge_is_append_only_and_sets_first_date_once() {
        let mut acc = AccumulatorFile::default();
        let d1 = Utc.with_ymd_and_hms(2024, 1, 14, 21, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap();

        acc.merge(vec![finding("a")], vec![], 3, d1, d1);
        assert_eq!(acc.first_date, Some(d1));
        assert_eq!(acc.last_date, Some(d1));

        acc.merge(vec![finding("b")], vec![], 2, d2, d2);
        assert_eq!(acc.must_do.len(), 2);
        assert_eq!(acc.total_processed, 5);
        // first_date does not move once set.
        assert_eq!(acc.first_date, Some(d1));
        assert_eq!(acc.last_date, Some(d2));
    }

    #[test]
    fn store_round_trips_through_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = FileBlobStore::new(tmp.path()).unwrap();
        let store = AccumulatorStore::new(&blob);

        let (file, handle) = store.load().unwrap();
        assert!(file.is_empty());

        let mut file = file;
        file.merge(vec![finding("a")], vec![], 1, Utc::now(), Utc::now());
        store.save(&handle, &file).unwrap();

        let (reloaded, _) = store.load().unwrap();
        assert_eq!(reloaded.must_do.len(), 1);
    }

    #[test]
    fn clear_removes_the_blob_so_next_load_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = FileBlobStore::new(tmp.path()).unwrap();
        let store = AccumulatorStore::new(&blob);

        let (_, handle) = store.load().unwrap();
        let mut file = AccumulatorFile::default();
        file.merge(vec![finding("a")], vec![], 1, Utc::now(), Utc::now());
        store.save(&handle, &file).unwrap();

        store.clear().unwrap();
        let (reloaded, _) = store.load().unwrap();
        assert!(reloaded.is_empty());
    }
}
