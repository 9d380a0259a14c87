//! Error types for concepts and repositories

use infergraph_reference::ReferenceError;

/// Errors that can occur while building or querying repositories
#[derive(Debug, thiserror::Error)]
pub enum ConceptError {
    #[error("Concept not found: {0}")]
    ConceptNotFound(String),

    #[error("Inference not found: {0}")]
    InferenceNotFound(String),

    #[error("Duplicate concept: {0}")]
    DuplicateConcept(String),

    #[error("Duplicate flow index: {0}")]
    DuplicateFlowIndex(String),

    #[error("Invalid flow index: {0}")]
    InvalidFlowIndex(String),

    #[error("Unknown concept type: {0}")]
    UnknownConceptType(String),

    #[error("Inference {inference} refers to unknown concept '{concept}'")]
    DanglingConcept { inference: String, concept: String },

    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for concept operations
pub type ConceptResult<T> = Result<T, ConceptError>;
