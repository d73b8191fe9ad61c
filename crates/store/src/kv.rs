//! `KVStore`: a durable small-value map (spec §6). One JSON-safe string
//! value per key, persisted as one file per key under `<data_dir>/kv/`.
//!
//! Filesystem-backed the way `CatalogStore` persists `current.json` /
//! per-segment partials: plain `std::fs` calls, no database. Writes go
//! through a temp-file-then-rename so a crash mid-write can never leave a
//! torn value (spec §3 invariant on the AccumulatorFile generalizes to
//! every persisted key here).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Durable small-value map. Implementations MUST treat absent keys as
/// `None`, never as an error (spec §9 design note: "never rely on
/// truthiness of missing values").
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn set_many(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        for (k, v) in values {
            self.set(k, v)?;
        }
        Ok(())
    }
}

/// Write `content` to `path` atomically: write to a sibling temp file, then
/// rename over the destination. A reader never observes a partial write.
pub(crate) fn atomic_write(path: &Path, content: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("kv")
    ));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn key_filename(key: &str) -> String {
    format!("{}.val", key.replace('/', "__"))
}

/// Filesystem-backed `KVStore` rooted at `<data_dir>/kv/`.
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = data_dir.into().join("kv");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key_filename(key))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        atomic_write(&self.path_for(key), value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory `KVStore` for tests. Not durable across process restarts —
/// engine tests that need crash-resilience assertions use `FileKvStore`
/// against a `tempfile::tempdir()` instead.
#[derive(Default)]
pub struct MemoryKvStore {
    values: std::sync::Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kv_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(tmp.path()).unwrap();
        assert_eq!(store.get("status").unwrap(), None);
        store.set("status", "running").unwrap();
        assert_eq!(store.get("status").unwrap(), Some("running".to_string()));
        store.delete("status").unwrap();
        assert_eq!(store.get("status").unwrap(), None);
    }

    #[test]
    fn file_kv_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = FileKvStore::new(tmp.path()).unwrap();
            store.set("chunkIndex", "2").unwrap();
        }
        let reopened = FileKvStore::new(tmp.path()).unwrap();
        assert_eq!(reopened.get("chunkIndex").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn set_many_writes_every_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(tmp.path()).unwrap();
        let mut values = HashMap::new();
        values.insert("a".to_string(), "1".to_string());
        values.insert("b".to_string(), "2".to_string());
        store.set_many(&values).unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn memory_kv_round_trip() {
        let store = MemoryKvStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
