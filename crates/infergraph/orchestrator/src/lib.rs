//! Orchestrator for infergraph programs
//!
//! Runs a program's inferences to a fixpoint:
//! - Scan: find pending items whose inputs are complete and whose
//!   support items are done
//! - Execute: hand each ready item to the executor registered for its
//!   inference sequence and apply the outcome to the blackboard
//! - Persist: write checkpoints so a run can be resumed or forked
//!
//! Executors decide what an item computes; the orchestrator only decides
//! when it runs and what happens to its result.

#![deny(unsafe_code)]

mod config;
mod control;
mod error;
mod executor;
mod orchestrator;
mod provenance;
mod telemetry;

pub use config::{CheckpointPolicy, OrchestratorConfig};
pub use control::RunControl;
pub use error::{ExecutorError, OrchestratorError, OrchestratorResult};
pub use executor::{
    BoundConcept, ConceptBindings, ExecutorOutcome, ExecutorRegistry, ExecutorResult,
    FnExecutor, InferenceExecutor,
};
pub use orchestrator::{Orchestrator, Progress, RunState};
pub use provenance::{ProvenanceEventType, ProvenanceRecord, ProvenanceTracker};
pub use telemetry::init_tracing;

pub use infergraph_blackboard::{Blackboard, ConceptStatus, ItemCounts, ItemStatus, TruthMask};
pub use infergraph_checkpoint::{
    Checkpoint, CheckpointKey, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    RunId, RunMetadata, RunStatus,
};
