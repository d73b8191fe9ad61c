//! Durable local storage for the inbox triage engine: the KV map, the
//! accumulator blob, the single-writer lock, and typed accessors over both.
//!
//! Everything here is synchronous. These are small local filesystem
//! operations with no network round-trip, so there is nothing for `async`
//! to buy; the engine crate, which does talk to the network, wraps calls
//! into these stores behind `tokio::task::spawn_blocking` where it matters.

pub mod accumulator;
pub mod blob;
pub mod error;
pub mod kv;
pub mod lock;
pub mod state;

pub use accumulator::{AccumulatorFile, AccumulatorStore, ACCUMULATOR_BLOB_NAME};
pub use blob::{BlobHandle, BlobStore, FileBlobStore};
pub use error::StoreError;
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
pub use lock::{acquire, contention_message, current, release, LockState, WorkflowKind};
pub use state::{InFlightAccumulator, RunStats, RunStatus};
