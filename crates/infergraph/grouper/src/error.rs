//! Error types for grouping

use infergraph_reference::ReferenceError;

/// Errors that can occur while grouping References
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupingError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("Invalid by-axes: {0}")]
    InvalidByAxes(String),

    #[error("Invalid truth mask: {0}")]
    InvalidMask(String),
}

/// Result type alias for grouping operations
pub type GroupingResult<T> = Result<T, GroupingError>;
