use ambient_core::{CompletionError, MessagingError};
use ambient_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Two session mutations overlapped. Only a locking bug can cause this.
    #[error("concurrent session conflict: {0}")]
    ConcurrentSessionConflict(String),
}

impl EngineError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store_io",
            Self::Completion(e) => e.error_kind(),
            Self::Messaging(_) => "messaging",
            Self::ConcurrentSessionConflict(_) => "concurrent_session_conflict",
        }
    }
}
