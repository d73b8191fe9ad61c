//! `BlobStore`: a single durable JSON blob (the AccumulatorFile), spec §6.
//!
//! The host's real API (`readOrInit`/`write`/`trash`) hands back an opaque
//! "handle" so repeated access doesn't need a directory scan; here the
//! handle is just the resolved path, but callers should still persist the
//! [`BlobHandle`] they're given rather than recomputing it, as the spec's
//! "file-id pointer cached in KV" phrasing implies.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::kv::atomic_write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle(PathBuf);

impl BlobHandle {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

pub trait BlobStore: Send + Sync {
    /// Read `name`, creating it with `init()`'s content if absent. Returns
    /// the content alongside a handle for a subsequent [`BlobStore::write`].
    fn read_or_init(
        &self,
        name: &str,
        init: Box<dyn FnOnce() -> String>,
    ) -> Result<(String, BlobHandle), StoreError>;

    /// Atomically replace the blob's content (spec §3 invariant 5: the
    /// AccumulatorFile is "only reset by clearAccumulated" and never
    /// partially written).
    fn write(&self, handle: &BlobHandle, content: &str) -> Result<(), StoreError>;

    /// Delete the named blob, e.g. after a successful digest send.
    fn trash(&self, name: &str) -> Result<(), StoreError>;
}

/// Filesystem-backed `BlobStore` rooted at `<data_dir>/blobs/`.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = data_dir.into().join("blobs");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl BlobStore for FileBlobStore {
    fn read_or_init(
        &self,
        name: &str,
        init: Box<dyn FnOnce() -> String>,
    ) -> Result<(String, BlobHandle), StoreError> {
        let path = self.path_for(name);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            return Ok((content, BlobHandle(path)));
        }
        let content = init();
        atomic_write(&path, &content)?;
        Ok((content, BlobHandle(path)))
    }

    fn write(&self, handle: &BlobHandle, content: &str) -> Result<(), StoreError> {
        atomic_write(handle.path(), content)
    }

    fn trash(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_or_init_creates_on_first_access() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(tmp.path()).unwrap();
        let (content, handle) = store
            .read_or_init("acc.json", Box::new(|| "{}".to_string()))
            .unwrap();
        assert_eq!(content, "{}");
        assert!(handle.path().exists());
    }

    #[test]
    fn read_or_init_does_not_overwrite_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(tmp.path()).unwrap();
        store
            .read_or_init("acc.json", Box::new(|| "{}".to_string()))
            .unwrap();
        let (_, handle) = store
            .read_or_init("acc.json", Box::new(|| "{}".to_string()))
            .unwrap();
        store.write(&handle, r#"{"mustDo":[]}"#).unwrap();

        let (content, _) = store
            .read_or_init("acc.json", Box::new(|| panic!("should not reinit")))
            .unwrap();
        assert_eq!(content, r#"{"mustDo":[]}"#);
    }

    #[test]
    fn trash_removes_the_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(tmp.path()).unwrap();
        let (_, handle) = store
            .read_or_init("acc.json", Box::new(|| "{}".to_string()))
            .unwrap();
        store.trash("acc.json").unwrap();
        assert!(!handle.path().exists());
        // A subsequent read_or_init recreates it.
        let (content, _) = store
            .read_or_init("acc.json", Box::new(|| "{}".to_string()))
            .unwrap();
        assert_eq!(content, "{}");
    }
}
