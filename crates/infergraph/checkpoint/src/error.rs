//! Error types for checkpoint storage

/// Errors that can occur while saving or loading checkpoints
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("Invalid run id for this store: {0:?}")]
    InvalidRunId(String),

    #[error("Checkpoint conflict: {0}")]
    Conflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type alias for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;
