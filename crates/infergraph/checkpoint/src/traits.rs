//! Storage contract for checkpoints

use crate::{Checkpoint, CheckpointKey, CheckpointResult, RunId, RunMetadata};
use async_trait::async_trait;

/// Persistence for checkpoints and run metadata.
///
/// Checkpoints are write-once: saving a second checkpoint under an
/// existing key is a conflict. Run metadata is overwritten on every save.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()>;

    async fn load(&self, key: &CheckpointKey) -> CheckpointResult<Checkpoint>;

    /// Highest `(cycle, inference_count)` checkpoint of a run
    async fn latest(&self, run_id: &RunId) -> CheckpointResult<Checkpoint>;

    /// Keys of a run, oldest first
    async fn list(&self, run_id: &RunId) -> CheckpointResult<Vec<CheckpointKey>>;

    async fn save_run(&self, metadata: &RunMetadata) -> CheckpointResult<()>;

    async fn load_run(&self, run_id: &RunId) -> CheckpointResult<RunMetadata>;

    async fn list_runs(&self) -> CheckpointResult<Vec<RunMetadata>>;

    /// Remove a run and all its checkpoints; returns the number of
    /// checkpoints removed.
    async fn delete_run(&self, run_id: &RunId) -> CheckpointResult<usize>;
}
