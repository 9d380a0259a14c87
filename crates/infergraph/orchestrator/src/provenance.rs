//! Provenance tracker: records what happened during each run
//!
//! Every item execution, status change, identity merge, loop reset and
//! checkpoint is appended to the run's ordered event chain.

use chrono::{DateTime, Utc};
use infergraph_checkpoint::{RunId, RunStatus};
use infergraph_concept::FlowIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tracks provenance events per run
#[derive(Clone, Debug, Default)]
pub struct ProvenanceTracker {
    events: HashMap<RunId, Vec<ProvenanceRecord>>,
}

impl ProvenanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, run_id: &RunId, record: ProvenanceRecord) {
        tracing::trace!(
            run = %run_id,
            event = %record.event_type,
            "Provenance recorded"
        );
        self.events.entry(run_id.clone()).or_default().push(record);
    }

    pub fn record_run_started(&mut self, run_id: &RunId, plan_id: &str) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::RunStarted,
                format!("Run started for plan '{plan_id}'"),
            ),
        );
    }

    pub fn record_item_executed(&mut self, run_id: &RunId, index: &FlowIndex, execution: u32) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::ItemExecuted {
                    flow_index: index.clone(),
                },
                format!("Item {index} executed (execution {execution})"),
            ),
        );
    }

    pub fn record_item_completed(&mut self, run_id: &RunId, index: &FlowIndex, concept: &str) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::ItemCompleted {
                    flow_index: index.clone(),
                },
                format!("Item {index} completed concept '{concept}'"),
            ),
        );
    }

    pub fn record_item_skipped(&mut self, run_id: &RunId, index: &FlowIndex, reason: &str) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::ItemSkipped {
                    flow_index: index.clone(),
                    reason: reason.to_string(),
                },
                format!("Item {index} skipped: {reason}"),
            ),
        );
    }

    pub fn record_item_failed(&mut self, run_id: &RunId, index: &FlowIndex, reason: &str) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::ItemFailed {
                    flow_index: index.clone(),
                    reason: reason.to_string(),
                },
                format!("Item {index} failed: {reason}"),
            ),
        );
    }

    pub fn record_identity_merged(&mut self, run_id: &RunId, canonical: &str, absorbed: &str) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::IdentityMerged {
                    canonical: canonical.to_string(),
                    absorbed: absorbed.to_string(),
                },
                format!("'{absorbed}' merged into '{canonical}'"),
            ),
        );
    }

    pub fn record_concept_reset(&mut self, run_id: &RunId, concept: &str, count: u32) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::ConceptReset {
                    concept: concept.to_string(),
                    count,
                },
                format!("Concept '{concept}' reset (reset {count})"),
            ),
        );
    }

    pub fn record_checkpoint_saved(&mut self, run_id: &RunId, cycle: u64, inference_count: u64) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::CheckpointSaved {
                    cycle,
                    inference_count,
                },
                format!("Checkpoint saved at cycle {cycle}"),
            ),
        );
    }

    pub fn record_run_finished(&mut self, run_id: &RunId, status: RunStatus) {
        self.record(
            run_id,
            ProvenanceRecord::new(
                ProvenanceEventType::RunFinished { status },
                format!("Run finished: {status}"),
            ),
        );
    }

    // ── Query methods ────────────────────────────────────────────────

    pub fn events_for(&self, run_id: &RunId) -> Vec<&ProvenanceRecord> {
        self.events
            .get(run_id)
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    pub fn event_count(&self, run_id: &RunId) -> usize {
        self.events.get(run_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Events involving one item
    pub fn events_for_item(&self, run_id: &RunId, index: &FlowIndex) -> Vec<&ProvenanceRecord> {
        self.events_for(run_id)
            .into_iter()
            .filter(|r| r.involves_item(index))
            .collect()
    }

    pub fn clear(&mut self, run_id: &RunId) {
        self.events.remove(run_id);
    }

    pub fn total_events(&self) -> usize {
        self.events.values().map(|v| v.len()).sum()
    }
}

/// One event in a run's provenance chain
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub event_type: ProvenanceEventType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl ProvenanceRecord {
    pub fn new(event_type: ProvenanceEventType, description: impl Into<String>) -> Self {
        Self {
            event_type,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn involves_item(&self, index: &FlowIndex) -> bool {
        match &self.event_type {
            ProvenanceEventType::ItemExecuted { flow_index }
            | ProvenanceEventType::ItemCompleted { flow_index }
            | ProvenanceEventType::ItemSkipped { flow_index, .. }
            | ProvenanceEventType::ItemFailed { flow_index, .. } => flow_index == index,
            _ => false,
        }
    }
}

/// Types of provenance events
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ProvenanceEventType {
    RunStarted,
    ItemExecuted { flow_index: FlowIndex },
    ItemCompleted { flow_index: FlowIndex },
    ItemSkipped { flow_index: FlowIndex, reason: String },
    ItemFailed { flow_index: FlowIndex, reason: String },
    IdentityMerged { canonical: String, absorbed: String },
    ConceptReset { concept: String, count: u32 },
    CheckpointSaved { cycle: u64, inference_count: u64 },
    RunFinished { status: RunStatus },
}

impl std::fmt::Display for ProvenanceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunStarted => write!(f, "run_started"),
            Self::ItemExecuted { flow_index } => write!(f, "item_executed:{flow_index}"),
            Self::ItemCompleted { flow_index } => write!(f, "item_completed:{flow_index}"),
            Self::ItemSkipped { flow_index, .. } => write!(f, "item_skipped:{flow_index}"),
            Self::ItemFailed { flow_index, .. } => write!(f, "item_failed:{flow_index}"),
            Self::IdentityMerged { canonical, absorbed } => {
                write!(f, "identity_merged:{absorbed}->{canonical}")
            }
            Self::ConceptReset { concept, .. } => write!(f, "concept_reset:{concept}"),
            Self::CheckpointSaved { cycle, .. } => write!(f, "checkpoint_saved:{cycle}"),
            Self::RunFinished { status } => write!(f, "run_finished:{status}"),
        }
    }
}
