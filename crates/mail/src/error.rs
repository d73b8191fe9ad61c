#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail search failed: {0}")]
    Search(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("side effect failed: {0}")]
    SideEffect(String),
}
