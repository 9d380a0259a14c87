//! Concepts and inferences of an infergraph program
//!
//! A program is a graph of [`Concept`]s (typed data slots) connected by
//! [`InferenceEntry`] derivation steps. [`ConceptRepo`] and
//! [`InferenceRepo`] hold the structural part of a loaded program; the
//! run state lives on the blackboard.

#![deny(unsafe_code)]

mod concept;
mod concept_type;
mod error;
mod flow_index;
mod inference;

pub use concept::{Concept, ConceptEntry, ConceptRepo};
pub use concept_type::{Classification, ConceptType, TypeInfo};
pub use error::{ConceptError, ConceptResult};
pub use flow_index::FlowIndex;
pub use inference::{FlowInfo, InferenceEntry, InferenceRepo};
