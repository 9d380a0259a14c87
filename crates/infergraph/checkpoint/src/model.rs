//! Checkpoint and run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Run Identifier ───────────────────────────────────────────────────

/// Unique identifier for one run of a program
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Run Status ───────────────────────────────────────────────────────

/// Lifecycle of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    /// No further cycles will execute
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Stopped | RunStatus::Failed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ── Records ──────────────────────────────────────────────────────────

/// Metadata describing a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: RunId,
    pub plan_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Run this one was forked from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunMetadata {
    pub fn new(run_id: RunId, plan_id: impl Into<String>) -> Self {
        Self {
            run_id,
            plan_id: plan_id.into(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            forked_from: None,
            error: None,
        }
    }
}

/// Position of a checkpoint within its run
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub run_id: RunId,
    pub cycle: u64,
    pub inference_count: u64,
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.run_id, self.cycle, self.inference_count
        )
    }
}

/// Persisted snapshot of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub cycle: u64,
    pub inference_count: u64,
    pub metadata: RunMetadata,
    /// Serialized blackboard
    pub blackboard: Value,
    /// Concept values at this position, keyed by concept name. `null` in
    /// checkpoints written without them.
    #[serde(default)]
    pub references: Value,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(metadata: RunMetadata, cycle: u64, inference_count: u64, blackboard: Value) -> Self {
        Self {
            run_id: metadata.run_id.clone(),
            cycle,
            inference_count,
            metadata,
            blackboard,
            references: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_references(mut self, references: Value) -> Self {
        self.references = references;
        self
    }

    pub fn key(&self) -> CheckpointKey {
        CheckpointKey {
            run_id: self.run_id.clone(),
            cycle: self.cycle,
            inference_count: self.inference_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id() {
        let id = RunId::generate();
        assert_eq!(id.short().len(), 8);
        assert_eq!(RunId::new("abc").short(), "abc");
        assert_eq!(RunId::new("run-1").to_string(), "run-1");
    }

    #[test]
    fn test_status_finished() {
        assert!(RunStatus::Completed.is_finished());
        assert!(RunStatus::Stopped.is_finished());
        assert!(!RunStatus::Paused.is_finished());
        assert_eq!(RunStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_key_ordering() {
        let key = |cycle, count| CheckpointKey {
            run_id: RunId::new("r"),
            cycle,
            inference_count: count,
        };
        assert!(key(1, 5) < key(2, 0));
        assert!(key(2, 1) < key(2, 3));
    }

    #[test]
    fn test_checkpoint_serde() {
        let meta = RunMetadata::new(RunId::new("r"), "plan");
        let cp = Checkpoint::new(meta, 3, 7, serde_json::json!({"k": 1}));
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
        assert_eq!(back.key().to_string(), "r@3/7");

        let cp = cp.with_references(serde_json::json!({"a": {"axes": ["_none_axis"], "shape": [1], "values": [1]}}));
        let back: Checkpoint = serde_json::from_str(&serde_json::to_string(&cp).unwrap()).unwrap();
        assert_eq!(back.references, cp.references);
    }

    #[test]
    fn test_checkpoint_without_references() {
        let meta = RunMetadata::new(RunId::new("r"), "plan");
        let mut json = serde_json::to_value(Checkpoint::new(meta, 1, 1, serde_json::json!({}))).unwrap();
        json.as_object_mut().unwrap().remove("references");
        let back: Checkpoint = serde_json::from_value(json).unwrap();
        assert!(back.references.is_null());
    }
}
