//! Run state for infergraph programs
//!
//! The [`Blackboard`] records concept and item statuses, item results,
//! identity aliases, truth masks and loop reset counters. The
//! orchestrator reads it to decide readiness and writes every outcome
//! back to it; checkpoints are serialized blackboards.

#![deny(unsafe_code)]

mod blackboard;
mod error;
mod status;

pub use blackboard::Blackboard;
pub use error::{BlackboardError, BlackboardResult};
pub use status::{CompletionDetail, ConceptStatus, ItemCounts, ItemStatus, TruthMask};
