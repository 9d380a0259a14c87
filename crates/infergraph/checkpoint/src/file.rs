//! JSON file checkpoint store
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<run_id>/run.json
//! <root>/<run_id>/checkpoint-<cycle>-<inference_count>.json
//! ```

use crate::traits::CheckpointStore;
use crate::{Checkpoint, CheckpointError, CheckpointKey, CheckpointResult, RunId, RunMetadata};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const RUN_FILE: &str = "run.json";
const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Checkpoint store writing one JSON document per checkpoint
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> CheckpointResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one run. The id must name a single entry directly
    /// under the root.
    fn run_dir(&self, run_id: &RunId) -> CheckpointResult<PathBuf> {
        let id = run_id.0.as_str();
        let mut components = Path::new(id).components();
        let single = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !single || id.contains(['/', '\\']) {
            return Err(CheckpointError::InvalidRunId(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    fn checkpoint_path(&self, key: &CheckpointKey) -> CheckpointResult<PathBuf> {
        Ok(self.run_dir(&key.run_id)?.join(format!(
            "{CHECKPOINT_PREFIX}{}-{}.json",
            key.cycle, key.inference_count
        )))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path, what: String) -> CheckpointResult<T> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(what));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", path.display())))
    }
}

/// Parse `checkpoint-<cycle>-<count>.json`
fn parse_checkpoint_name(run_id: &RunId, name: &str) -> Option<CheckpointKey> {
    let stem = name.strip_prefix(CHECKPOINT_PREFIX)?.strip_suffix(".json")?;
    let (cycle, count) = stem.split_once('-')?;
    Some(CheckpointKey {
        run_id: run_id.clone(),
        cycle: cycle.parse().ok()?,
        inference_count: count.parse().ok()?,
    })
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let key = checkpoint.key();
        fs::create_dir_all(self.run_dir(&key.run_id)?).await?;
        let json = serde_json::to_vec_pretty(checkpoint)?;

        let path = self.checkpoint_path(&key)?;
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CheckpointError::Conflict(format!(
                    "checkpoint {key} already exists"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&json).await?;
        file.flush().await?;

        tracing::debug!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, key: &CheckpointKey) -> CheckpointResult<Checkpoint> {
        let checkpoint: Checkpoint =
            Self::read_json(&self.checkpoint_path(key)?, key.to_string()).await?;
        if checkpoint.key() != *key {
            return Err(CheckpointError::Corrupt(format!(
                "file for {key} holds checkpoint {}",
                checkpoint.key()
            )));
        }
        Ok(checkpoint)
    }

    async fn latest(&self, run_id: &RunId) -> CheckpointResult<Checkpoint> {
        let keys = self.list(run_id).await?;
        match keys.last() {
            Some(key) => self.load(key).await,
            None => Err(CheckpointError::NotFound(format!(
                "no checkpoints for run {run_id}"
            ))),
        }
    }

    async fn list(&self, run_id: &RunId) -> CheckpointResult<Vec<CheckpointKey>> {
        let mut entries = match fs::read_dir(self.run_dir(run_id)?).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_checkpoint_name(run_id, name))
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn save_run(&self, metadata: &RunMetadata) -> CheckpointResult<()> {
        let dir = self.run_dir(&metadata.run_id)?;
        fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(metadata)?;
        fs::write(dir.join(RUN_FILE), json).await?;
        Ok(())
    }

    async fn load_run(&self, run_id: &RunId) -> CheckpointResult<RunMetadata> {
        Self::read_json(&self.run_dir(run_id)?.join(RUN_FILE), format!("run {run_id}")).await
    }

    async fn list_runs(&self) -> CheckpointResult<Vec<RunMetadata>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(RUN_FILE);
            if fs::try_exists(&path).await? {
                runs.push(Self::read_json::<RunMetadata>(&path, path.display().to_string()).await?);
            }
        }
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(runs)
    }

    async fn delete_run(&self, run_id: &RunId) -> CheckpointResult<usize> {
        let removed = self.list(run_id).await?.len();
        match fs::remove_dir_all(self.run_dir(run_id)?).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
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

    #[test]
    fn test_parse_checkpoint_name() {
        let run = RunId::new("r");
        let key = parse_checkpoint_name(&run, "checkpoint-12-40.json").unwrap();
        assert_eq!((key.cycle, key.inference_count), (12, 40));
        assert!(parse_checkpoint_name(&run, "run.json").is_none());
        assert!(parse_checkpoint_name(&run, "checkpoint-x-1.json").is_none());
    }

    #[tokio::test]
    async fn test_save_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("cps")).await.unwrap();

        store.save(&checkpoint("r1", 1, 1)).await.unwrap();
        store.save(&checkpoint("r1", 10, 3)).await.unwrap();
        store.save(&checkpoint("r1", 2, 2)).await.unwrap();

        let keys = store.list(&RunId::new("r1")).await.unwrap();
        let cycles: Vec<u64> = keys.iter().map(|k| k.cycle).collect();
        assert_eq!(cycles, vec![1, 2, 10]);

        let latest = store.latest(&RunId::new("r1")).await.unwrap();
        assert_eq!(latest.cycle, 10);
        assert_eq!(latest.blackboard, json!({"cycle": 10}));
    }

    #[tokio::test]
    async fn test_conflict_on_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).await.unwrap();
        let cp = checkpoint("r1", 1, 1);
        store.save(&cp).await.unwrap();
        assert!(matches!(
            store.save(&cp).await,
            Err(CheckpointError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).await.unwrap();
        let run = RunId::new("r1");
        assert!(matches!(
            store.latest(&run).await,
            Err(CheckpointError::NotFound(_))
        ));

        let cp = checkpoint("r1", 1, 1);
        store.save(&cp).await.unwrap();
        std::fs::write(store.checkpoint_path(&cp.key()).unwrap(), b"{not json").unwrap();
        assert!(matches!(
            store.load(&cp.key()).await,
            Err(CheckpointError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_runs_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileCheckpointStore::new(dir.path()).await.unwrap();
            let mut meta = RunMetadata::new(RunId::new("r1"), "plan");
            store.save_run(&meta).await.unwrap();
            meta.status = crate::RunStatus::Completed;
            store.save_run(&meta).await.unwrap();
            store.save(&checkpoint("r1", 1, 1)).await.unwrap();
        }

        let store = FileCheckpointStore::new(dir.path()).await.unwrap();
        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, crate::RunStatus::Completed);

        assert_eq!(store.delete_run(&RunId::new("r1")).await.unwrap(), 1);
        assert!(store.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_ids_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("cps")).await.unwrap();

        for id in ["../escape", "..", ".", "", "a/b", "/abs", "trailing/", "back\\slash"] {
            assert!(
                matches!(
                    store.save(&checkpoint(id, 1, 1)).await,
                    Err(CheckpointError::InvalidRunId(_))
                ),
                "{id:?} accepted by save"
            );
            assert!(matches!(
                store.save_run(&RunMetadata::new(RunId::new(id), "plan")).await,
                Err(CheckpointError::InvalidRunId(_))
            ));
            assert!(matches!(
                store.list(&RunId::new(id)).await,
                Err(CheckpointError::InvalidRunId(_))
            ));
        }
        assert!(!dir.path().join("escape").exists());

        store.save(&checkpoint("run.v2-ok", 1, 1)).await.unwrap();
        assert_eq!(store.list(&RunId::new("run.v2-ok")).await.unwrap().len(), 1);
    }
}
