//! Error types for the blackboard

/// Errors that can occur on the blackboard
#[derive(Debug, thiserror::Error)]
pub enum BlackboardError {
    #[error("Alias cycle detected at concept: {0}")]
    AliasCycle(String),

    #[error("Corrupt blackboard snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),
}

/// Result type alias for blackboard operations
pub type BlackboardResult<T> = Result<T, BlackboardError>;
