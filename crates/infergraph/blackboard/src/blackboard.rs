//! The blackboard: single source of truth for a run's mutable state
//!
//! Concept names pass through the alias table before every lookup, so
//! once two concepts are merged by an identity assignment all reads and
//! writes land on the canonical name. Items are keyed by flow index.
//!
//! All maps are ordered so that two blackboards built by the same
//! sequence of operations serialize identically.

use crate::{
    BlackboardError, BlackboardResult, CompletionDetail, ConceptStatus, ItemCounts, ItemStatus,
    TruthMask,
};
use infergraph_concept::{ConceptRepo, FlowIndex, InferenceRepo};
use infergraph_reference::Reference;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Mutable run state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Blackboard {
    concept_statuses: BTreeMap<String, ConceptStatus>,
    item_statuses: BTreeMap<FlowIndex, ItemStatus>,
    item_results: BTreeMap<FlowIndex, Reference>,
    item_execution_counts: BTreeMap<FlowIndex, u32>,
    item_completion_details: BTreeMap<FlowIndex, CompletionDetail>,
    #[serde(default)]
    item_errors: BTreeMap<FlowIndex, String>,
    /// Logical completion order, not wall-clock time
    completed_concept_timestamps: BTreeMap<String, u64>,
    concept_to_flow_index: BTreeMap<String, FlowIndex>,
    concept_truth_masks: BTreeMap<String, TruthMask>,
    concept_aliases: BTreeMap<String, String>,
    concept_reset_counts: BTreeMap<String, u32>,
    clock: u64,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state for a loaded program.
    ///
    /// Every concept starts empty except ground concepts, concepts that
    /// already hold a Reference, and function concepts nothing produces.
    /// Every item starts pending. Each inferred concept is mapped to the
    /// flow index of its (last) producing item.
    pub fn initialize_states(concepts: &ConceptRepo, inferences: &InferenceRepo) -> Self {
        let mut board = Self::new();

        for entry in inferences.iterate() {
            let index = entry.flow_index().clone();
            board.item_statuses.insert(index.clone(), ItemStatus::Pending);
            board.item_execution_counts.insert(index.clone(), 0);
            board
                .concept_to_flow_index
                .insert(entry.concept_to_infer.clone(), index);
        }

        for entry in concepts.entries() {
            let name = entry.concept_name.as_str();
            let produced = board.concept_to_flow_index.contains_key(name);
            let has_value = concepts
                .reference(name)
                .map(|r| r.is_some())
                .unwrap_or(false);
            let complete = entry.is_ground_concept
                || has_value
                || (entry.concept_type.is_function() && !produced);
            board
                .concept_statuses
                .insert(name.to_string(), ConceptStatus::Empty);
            if complete {
                board.set_concept_status(name, ConceptStatus::Complete);
            }
        }

        tracing::debug!(
            concepts = board.concept_statuses.len(),
            items = board.item_statuses.len(),
            "Blackboard initialized"
        );
        board
    }

    // ── Aliases ──────────────────────────────────────────────────────

    /// Follow aliases to the canonical name. Unaliased names resolve to
    /// themselves, and a cyclic chain stops at the last unvisited name.
    pub fn resolve_concept_name(&self, name: &str) -> String {
        let mut current = name;
        let mut visited = BTreeSet::new();
        while let Some(next) = self.concept_aliases.get(current) {
            visited.insert(current);
            if visited.contains(next.as_str()) {
                break;
            }
            current = next.as_str();
        }
        current.to_string()
    }

    fn resolve_checked(&self, name: &str) -> BlackboardResult<String> {
        let mut current = name;
        let mut visited = BTreeSet::new();
        while let Some(next) = self.concept_aliases.get(current) {
            if !visited.insert(current) {
                return Err(BlackboardError::AliasCycle(current.to_string()));
            }
            current = next.as_str();
        }
        Ok(current.to_string())
    }

    /// Merge two concepts into one identity and return the canonical name.
    ///
    /// The already-complete side becomes canonical (ties go to `a`).
    /// Status, completion time, producing flow index and truth mask of the
    /// absorbed side are carried over where the canonical side lacks them.
    /// Merging names that already share a root is a no-op.
    pub fn register_identity(&mut self, a: &str, b: &str) -> BlackboardResult<String> {
        let root_a = self.resolve_checked(a)?;
        let root_b = self.resolve_checked(b)?;
        if root_a == root_b {
            return Ok(root_a);
        }

        let (canonical, absorbed) = if !self.is_root_complete(&root_a)
            && self.is_root_complete(&root_b)
        {
            (root_b, root_a)
        } else {
            (root_a, root_b)
        };

        // Compress every chain through the absorbed root
        for target in self.concept_aliases.values_mut() {
            if *target == absorbed {
                *target = canonical.clone();
            }
        }
        self.concept_aliases
            .insert(absorbed.clone(), canonical.clone());
        for name in [a, b] {
            if name != canonical {
                self.concept_aliases
                    .insert(name.to_string(), canonical.clone());
            }
        }

        if let Some(status) = self.concept_statuses.get(&absorbed).copied() {
            let merged = if status == ConceptStatus::Complete {
                ConceptStatus::Complete
            } else {
                self.concept_statuses
                    .get(&canonical)
                    .copied()
                    .unwrap_or_default()
            };
            self.concept_statuses.insert(canonical.clone(), merged);
        }
        if let Some(ts) = self.completed_concept_timestamps.get(&absorbed).copied() {
            self.completed_concept_timestamps
                .entry(canonical.clone())
                .or_insert(ts);
        }
        if let Some(index) = self.concept_to_flow_index.get(&absorbed).cloned() {
            self.concept_to_flow_index
                .entry(canonical.clone())
                .or_insert(index);
        }
        if let Some(mask) = self.concept_truth_masks.remove(&absorbed) {
            self.concept_truth_masks
                .entry(canonical.clone())
                .or_insert(mask);
        }

        tracing::debug!(
            canonical = %canonical,
            absorbed = %absorbed,
            "Identity registered"
        );
        Ok(canonical)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.concept_aliases
    }

    fn is_root_complete(&self, root: &str) -> bool {
        self.concept_statuses.get(root) == Some(&ConceptStatus::Complete)
    }

    // ── Concepts ─────────────────────────────────────────────────────

    pub fn get_concept_status(&self, name: &str) -> ConceptStatus {
        let canonical = self.resolve_concept_name(name);
        self.concept_statuses
            .get(&canonical)
            .copied()
            .unwrap_or_default()
    }

    /// Marking a concept complete stamps it with the next logical tick.
    pub fn set_concept_status(&mut self, name: &str, status: ConceptStatus) {
        let canonical = self.resolve_concept_name(name);
        if status == ConceptStatus::Complete {
            self.clock += 1;
            self.completed_concept_timestamps
                .insert(canonical.clone(), self.clock);
        } else {
            self.completed_concept_timestamps.remove(&canonical);
        }
        self.concept_statuses.insert(canonical, status);
    }

    pub fn is_concept_complete(&self, name: &str) -> bool {
        self.get_concept_status(name) == ConceptStatus::Complete
    }

    /// Whether an inference depending on `name` may progress
    pub fn check_progress_condition(&self, name: &str) -> bool {
        self.is_concept_complete(name)
    }

    pub fn completion_tick(&self, name: &str) -> Option<u64> {
        let canonical = self.resolve_concept_name(name);
        self.completed_concept_timestamps.get(&canonical).copied()
    }

    /// Send a concept back to `empty` for another loop iteration and
    /// return its new reset count.
    pub fn reset_concept(&mut self, name: &str) -> u32 {
        let canonical = self.resolve_concept_name(name);
        self.set_concept_status(&canonical, ConceptStatus::Empty);
        self.concept_truth_masks.remove(&canonical);
        let count = self.concept_reset_counts.entry(canonical).or_insert(0);
        *count += 1;
        *count
    }

    pub fn concept_reset_count(&self, name: &str) -> u32 {
        let canonical = self.resolve_concept_name(name);
        self.concept_reset_counts
            .get(&canonical)
            .copied()
            .unwrap_or(0)
    }

    pub fn concept_statuses(&self) -> &BTreeMap<String, ConceptStatus> {
        &self.concept_statuses
    }

    pub fn register_concept_flow_index(&mut self, name: &str, index: FlowIndex) {
        let canonical = self.resolve_concept_name(name);
        self.concept_to_flow_index.insert(canonical, index);
    }

    pub fn flow_index_of(&self, name: &str) -> Option<&FlowIndex> {
        let canonical = self.resolve_concept_name(name);
        self.concept_to_flow_index
            .get(&canonical)
            .or_else(|| self.concept_to_flow_index.get(name))
    }

    pub fn concept_to_flow_index(&self) -> &BTreeMap<String, FlowIndex> {
        &self.concept_to_flow_index
    }

    // ── Truth masks ──────────────────────────────────────────────────

    pub fn set_truth_mask(&mut self, name: &str, mask: TruthMask) {
        let canonical = self.resolve_concept_name(name);
        self.concept_truth_masks.insert(canonical, mask);
    }

    pub fn truth_mask(&self, name: &str) -> Option<&TruthMask> {
        let canonical = self.resolve_concept_name(name);
        self.concept_truth_masks.get(&canonical)
    }

    pub fn clear_truth_mask(&mut self, name: &str) -> Option<TruthMask> {
        let canonical = self.resolve_concept_name(name);
        self.concept_truth_masks.remove(&canonical)
    }

    // ── Items ────────────────────────────────────────────────────────

    pub fn get_item_status(&self, index: &FlowIndex) -> ItemStatus {
        self.item_statuses.get(index).copied().unwrap_or_default()
    }

    /// `Completed` records a `Success` detail unless a detail is already
    /// set; `Skipped` always records `Skipped`. Returning to `Pending`
    /// clears the detail.
    pub fn set_item_status(&mut self, index: &FlowIndex, status: ItemStatus) {
        match status {
            ItemStatus::Completed => {
                self.item_completion_details
                    .entry(index.clone())
                    .or_insert(CompletionDetail::Success);
            }
            ItemStatus::Skipped => {
                self.item_completion_details
                    .insert(index.clone(), CompletionDetail::Skipped);
            }
            ItemStatus::Pending => {
                self.item_completion_details.remove(index);
                self.item_errors.remove(index);
            }
            ItemStatus::InProgress | ItemStatus::Failed => {}
        }
        self.item_statuses.insert(index.clone(), status);
    }

    pub fn item_completion_detail(&self, index: &FlowIndex) -> Option<CompletionDetail> {
        self.item_completion_details.get(index).copied()
    }

    pub fn set_item_completion_detail(&mut self, index: &FlowIndex, detail: CompletionDetail) {
        self.item_completion_details.insert(index.clone(), detail);
    }

    pub fn increment_execution_count(&mut self, index: &FlowIndex) -> u32 {
        let count = self.item_execution_counts.entry(index.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn execution_count(&self, index: &FlowIndex) -> u32 {
        self.item_execution_counts.get(index).copied().unwrap_or(0)
    }

    pub fn reset_execution_count(&mut self, index: &FlowIndex) {
        self.item_execution_counts.insert(index.clone(), 0);
    }

    pub fn set_item_result(&mut self, index: &FlowIndex, result: Reference) {
        self.item_results.insert(index.clone(), result);
    }

    pub fn item_result(&self, index: &FlowIndex) -> Option<&Reference> {
        self.item_results.get(index)
    }

    pub fn clear_item_result(&mut self, index: &FlowIndex) -> Option<Reference> {
        self.item_results.remove(index)
    }

    pub fn item_results(&self) -> &BTreeMap<FlowIndex, Reference> {
        &self.item_results
    }

    pub fn set_item_error(&mut self, index: &FlowIndex, message: impl Into<String>) {
        self.item_errors.insert(index.clone(), message.into());
    }

    pub fn item_error(&self, index: &FlowIndex) -> Option<&str> {
        self.item_errors.get(index).map(String::as_str)
    }

    pub fn item_statuses(&self) -> &BTreeMap<FlowIndex, ItemStatus> {
        &self.item_statuses
    }

    pub fn item_counts(&self) -> ItemCounts {
        let mut counts = ItemCounts::default();
        for status in self.item_statuses.values() {
            counts.record(*status);
        }
        counts
    }

    /// True when every item is completed or skipped
    pub fn all_items_done(&self) -> bool {
        self.item_statuses.values().all(ItemStatus::is_done)
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Full state as a JSON document
    pub fn to_dict(&self) -> BlackboardResult<Value> {
        serde_json::to_value(self).map_err(|e| BlackboardError::CorruptSnapshot(e.to_string()))
    }

    /// Rebuild from [`Blackboard::to_dict`] output, rejecting malformed
    /// documents and cyclic alias tables.
    pub fn load_from_dict(dict: &Value) -> BlackboardResult<Self> {
        let board: Blackboard = serde_json::from_value(dict.clone())
            .map_err(|e| BlackboardError::CorruptSnapshot(e.to_string()))?;
        for name in board.concept_aliases.keys() {
            board.resolve_checked(name)?;
        }
        Ok(board)
    }
}
