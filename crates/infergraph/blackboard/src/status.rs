//! Status enums and small records stored on the blackboard

use infergraph_reference::Reference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a concept holds its final value for the current iteration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    #[default]
    Empty,
    Complete,
}

/// Lifecycle of one inference item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl ItemStatus {
    /// Completed or skipped: downstream items may rely on it
    pub fn is_done(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Skipped)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Skipped | ItemStatus::Failed
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a finished item finished
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionDetail {
    Success,
    Skipped,
}

/// Boolean Reference produced by a judgement, filtering along `filter_axis`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthMask {
    pub tensor: Reference,
    pub filter_axis: String,
}

impl TruthMask {
    pub fn new(tensor: Reference, filter_axis: impl Into<String>) -> Self {
        Self {
            tensor,
            filter_axis: filter_axis.into(),
        }
    }

    pub fn axes(&self) -> &[String] {
        self.tensor.axes()
    }
}

/// Item tallies by status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ItemCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.skipped + self.failed
    }

    pub fn done(&self) -> usize {
        self.completed + self.skipped
    }

    pub(crate) fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::InProgress => self.in_progress += 1,
            ItemStatus::Completed => self.completed += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_status_classes() {
        assert!(ItemStatus::Completed.is_done());
        assert!(ItemStatus::Skipped.is_done());
        assert!(!ItemStatus::Failed.is_done());
        assert!(ItemStatus::Failed.is_terminal());
        assert!(!ItemStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(ItemStatus::InProgress.to_string(), "in_progress");
        let s: ConceptStatus = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(s, ConceptStatus::Complete);
    }

    #[test]
    fn test_item_counts() {
        let mut counts = ItemCounts::default();
        for s in [ItemStatus::Completed, ItemStatus::Skipped, ItemStatus::Pending] {
            counts.record(s);
        }
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.done(), 2);
    }
}
