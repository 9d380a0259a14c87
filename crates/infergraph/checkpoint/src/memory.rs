//! In-memory checkpoint store for tests and embedded use

use crate::traits::CheckpointStore;
use crate::{Checkpoint, CheckpointError, CheckpointKey, CheckpointResult, RunId, RunMetadata};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Checkpoint store kept entirely in process memory
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<BTreeMap<CheckpointKey, Checkpoint>>,
    runs: RwLock<HashMap<RunId, RunMetadata>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total checkpoints across all runs
    pub fn total_count(&self) -> CheckpointResult<usize> {
        Ok(self.read_checkpoints()?.len())
    }

    fn read_checkpoints(
        &self,
    ) -> CheckpointResult<std::sync::RwLockReadGuard<'_, BTreeMap<CheckpointKey, Checkpoint>>> {
        self.checkpoints
            .read()
            .map_err(|_| CheckpointError::Backend("checkpoints lock poisoned".to_string()))
    }

    fn write_checkpoints(
        &self,
    ) -> CheckpointResult<std::sync::RwLockWriteGuard<'_, BTreeMap<CheckpointKey, Checkpoint>>> {
        self.checkpoints
            .write()
            .map_err(|_| CheckpointError::Backend("checkpoints lock poisoned".to_string()))
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let key = checkpoint.key();
        let mut guard = self.write_checkpoints()?;
        if guard.contains_key(&key) {
            return Err(CheckpointError::Conflict(format!(
                "checkpoint {key} already exists"
            )));
        }
        guard.insert(key, checkpoint.clone());
        Ok(())
    }

    async fn load(&self, key: &CheckpointKey) -> CheckpointResult<Checkpoint> {
        self.read_checkpoints()?
            .get(key)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(key.to_string()))
    }

    async fn latest(&self, run_id: &RunId) -> CheckpointResult<Checkpoint> {
        self.read_checkpoints()?
            .values()
            .filter(|cp| &cp.run_id == run_id)
            .max_by_key(|cp| (cp.cycle, cp.inference_count))
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(format!("no checkpoints for run {run_id}")))
    }

    async fn list(&self, run_id: &RunId) -> CheckpointResult<Vec<CheckpointKey>> {
        Ok(self
            .read_checkpoints()?
            .keys()
            .filter(|k| &k.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn save_run(&self, metadata: &RunMetadata) -> CheckpointResult<()> {
        let mut guard = self
            .runs
            .write()
            .map_err(|_| CheckpointError::Backend("runs lock poisoned".to_string()))?;
        guard.insert(metadata.run_id.clone(), metadata.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &RunId) -> CheckpointResult<RunMetadata> {
        let guard = self
            .runs
            .read()
            .map_err(|_| CheckpointError::Backend("runs lock poisoned".to_string()))?;
        guard
            .get(run_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(format!("run {run_id}")))
    }

    async fn list_runs(&self) -> CheckpointResult<Vec<RunMetadata>> {
        let guard = self
            .runs
            .read()
            .map_err(|_| CheckpointError::Backend("runs lock poisoned".to_string()))?;
        let mut runs: Vec<RunMetadata> = guard.values().cloned().collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(runs)
    }

    async fn delete_run(&self, run_id: &RunId) -> CheckpointResult<usize> {
        let removed = {
            let mut guard = self.write_checkpoints()?;
            let before = guard.len();
            guard.retain(|k, _| &k.run_id != run_id);
            before - guard.len()
        };
        self.runs
            .write()
            .map_err(|_| CheckpointError::Backend("runs lock poisoned".to_string()))?
            .remove(run_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checkpoint(run: &str, cycle: u64, count: u64) -> Checkpoint {
        Checkpoint::new(
            RunMetadata::new(RunId::new(run), "plan"),
            cycle,
            count,
            json!({"cycle": cycle}),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryCheckpointStore::new();
        let cp = checkpoint("r1", 1, 2);
        store.save(&cp).await.unwrap();
        assert_eq!(store.load(&cp.key()).await.unwrap(), cp);
        assert_eq!(store.total_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_conflicts() {
        let store = InMemoryCheckpointStore::new();
        let cp = checkpoint("r1", 1, 2);
        store.save(&cp).await.unwrap();
        assert!(matches!(
            store.save(&cp).await,
            Err(CheckpointError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_and_list() {
        let store = InMemoryCheckpointStore::new();
        store.save(&checkpoint("r1", 2, 1)).await.unwrap();
        store.save(&checkpoint("r1", 1, 9)).await.unwrap();
        store.save(&checkpoint("r2", 5, 5)).await.unwrap();

        let latest = store.latest(&RunId::new("r1")).await.unwrap();
        assert_eq!((latest.cycle, latest.inference_count), (2, 1));

        let keys = store.list(&RunId::new("r1")).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].cycle, 1);
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let store = InMemoryCheckpointStore::new();
        assert!(matches!(
            store.latest(&RunId::new("nope")).await,
            Err(CheckpointError::NotFound(_))
        ));
        assert!(matches!(
            store.load_run(&RunId::new("nope")).await,
            Err(CheckpointError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_runs_and_delete() {
        let store = InMemoryCheckpointStore::new();
        let meta = RunMetadata::new(RunId::new("r1"), "plan");
        store.save_run(&meta).await.unwrap();
        store.save(&checkpoint("r1", 1, 1)).await.unwrap();
        store.save(&checkpoint("r1", 2, 2)).await.unwrap();

        assert_eq!(store.list_runs().await.unwrap().len(), 1);
        assert_eq!(store.delete_run(&RunId::new("r1")).await.unwrap(), 2);
        assert!(store.list_runs().await.unwrap().is_empty());
        assert_eq!(store.total_count().unwrap(), 0);
    }
}
