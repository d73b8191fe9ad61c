use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lock already held by kind={held_kind}, acquired_at={acquired_at}")]
    LockContention {
        held_kind: String,
        acquired_at: chrono::DateTime<chrono::Utc>,
    },
}
