//! Error types for the orchestrator and for executors

use infergraph_blackboard::BlackboardError;
use infergraph_checkpoint::CheckpointError;
use infergraph_concept::ConceptError;
use infergraph_grouper::GroupingError;
use infergraph_reference::ReferenceError;

/// Errors that abort an orchestrator operation
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("No executor registered for inference sequence: {0}")]
    ExecutorNotRegistered(String),

    #[error("Concept error: {0}")]
    Concept(#[from] ConceptError),

    #[error("Blackboard error: {0}")]
    Blackboard(#[from] BlackboardError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Failure reported by an executor; fails the item, not the run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutorError {
    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Grouping error: {0}")]
    Grouping(#[from] GroupingError),

    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),
}
