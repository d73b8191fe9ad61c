use inboxd_core::CoreError;
use inboxd_llm::{ClassifyError, LlmError};
use inboxd_mail::MailError;
use inboxd_notify::NotifyError;
use inboxd_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("lock contention: {0}")]
    LockContention(String),

    #[error("configuration incomplete: {0}")]
    ConfigIncomplete(String),

    #[error("invalid persisted state: {0}")]
    InvalidState(String),
}
