//! Checkpoints for infergraph runs
//!
//! A [`Checkpoint`] captures a serialized blackboard together with the
//! run position `(run_id, cycle, inference_count)` and the run's
//! [`RunMetadata`]. [`CheckpointStore`] is the persistence contract; two
//! implementations are provided:
//!
//! - [`InMemoryCheckpointStore`] for tests and embedded use
//! - [`FileCheckpointStore`] writing one JSON document per checkpoint

#![deny(unsafe_code)]

mod error;
mod file;
mod memory;
mod model;
mod traits;

pub use error::{CheckpointError, CheckpointResult};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use model::{Checkpoint, CheckpointKey, RunId, RunMetadata, RunStatus};
pub use traits::CheckpointStore;
