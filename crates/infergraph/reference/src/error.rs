//! Error types for reference construction and algebra

/// Errors raised by [`Reference`](crate::Reference) operations.
///
/// These are data-model errors: they indicate a malformed program or a
/// caller bug and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("axes/shape length mismatch: {axes} axes but {shape} dimensions")]
    AxisShapeMismatch { axes: usize, shape: usize },

    #[error("duplicate axis name: {0}")]
    DuplicateAxis(String),

    #[error("unknown axis: {0}")]
    UnknownAxis(String),

    #[error("cannot drop axis '{axis}' of size {size}: slice is ambiguous")]
    AmbiguousSlice { axis: String, size: usize },

    #[error("index {index} out of bounds for axis '{axis}' of size {size}")]
    IndexOutOfBounds {
        axis: String,
        index: usize,
        size: usize,
    },

    #[error("missing index for axis: {0}")]
    IncompleteIndex(String),

    #[error("shape mismatch: expected {expected_axes:?} {expected:?}, found {found_axes:?} {found:?}")]
    ShapeMismatch {
        expected_axes: Vec<String>,
        expected: Vec<usize>,
        found_axes: Vec<String>,
        found: Vec<usize>,
    },

    #[error("expected {expected} axis names, found {found}")]
    InvalidAxisNames { expected: usize, found: usize },

    #[error("cell count {found} does not match shape {shape:?} (expected {expected})")]
    CellCountMismatch {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("operation requires at least one reference")]
    NoReferences,
}

/// Result type alias for reference operations
pub type ReferenceResult<T> = Result<T, ReferenceError>;
