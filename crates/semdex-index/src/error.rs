//! Error types for semdex-index.

use std::num::TryFromIntError;

/// Errors that can occur during indexing and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` store error. Any failure inside `store_file` rolls the transaction back.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Embedding or summarization provider failure.
    #[error("provider error: {0}")]
    Provider(#[from] semdex_llm::LlmError),

    /// A provider call exceeded its deadline.
    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// Workspace walk or glob error.
    #[error("workspace error: {0}")]
    Workspace(#[from] ignore::Error),

    /// Indexing was cancelled before the operation completed.
    #[error("indexing cancelled")]
    Cancelled,

    /// The orchestrator is in the error state and must be re-initialized.
    #[error("indexer requires re-initialization: {0}")]
    NeedsReinit(String),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
