//! The scan-execute loop
//!
//! Each cycle scans the pending items in flow-index order, collects the
//! ones whose inputs are complete and whose support items are done, and
//! executes that ready set. Items that become ready during a cycle wait
//! for the next one, so results depend only on the dependency graph. The
//! loop ends at a fixpoint (nothing ready), on a stop or pause request, or
//! when `max_cycles` is exhausted.

use crate::{
    BoundConcept, ConceptBindings, ExecutorOutcome, ExecutorRegistry, OrchestratorConfig,
    OrchestratorError, OrchestratorResult, ProvenanceTracker, RunControl,
};
use chrono::Utc;
use infergraph_blackboard::{Blackboard, ConceptStatus, ItemCounts, ItemStatus, TruthMask};
use infergraph_checkpoint::{
    Checkpoint, CheckpointError, CheckpointKey, CheckpointStore, RunId, RunMetadata, RunStatus,
};
use infergraph_concept::{ConceptRepo, FlowIndex, InferenceEntry, InferenceRepo};
use infergraph_reference::Reference;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Progress counters of a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub cycle: u64,
    pub inference_count: u64,
    pub items: ItemCounts,
    pub complete_concepts: usize,
    pub total_concepts: usize,
}

/// Externally visible state of a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub run_id: RunId,
    pub status: RunStatus,
    pub progress: Progress,
    pub error: Option<String>,
}

/// Drives one run of a program to its fixpoint
pub struct Orchestrator {
    config: OrchestratorConfig,
    concepts: ConceptRepo,
    inferences: InferenceRepo,
    executors: ExecutorRegistry,
    blackboard: Blackboard,
    store: Option<Arc<dyn CheckpointStore>>,
    metadata: RunMetadata,
    cycle: u64,
    inference_count: u64,
    control: RunControl,
    provenance: ProvenanceTracker,
    last_checkpoint: Option<CheckpointKey>,
}

impl Orchestrator {
    /// Prepare a run of `plan_id`.
    ///
    /// Fails fast when the configuration is invalid or an inference names
    /// a sequence with no registered executor.
    pub fn new(
        plan_id: impl Into<String>,
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        executors: ExecutorRegistry,
        config: OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        if let Some(missing) = inferences
            .iterate()
            .find(|e| !executors.contains(&e.inference_sequence))
        {
            return Err(OrchestratorError::ExecutorNotRegistered(
                missing.inference_sequence.clone(),
            ));
        }

        let blackboard = Blackboard::initialize_states(&concepts, &inferences);
        Ok(Self {
            config,
            concepts,
            inferences,
            executors,
            blackboard,
            store: None,
            metadata: RunMetadata::new(RunId::generate(), plan_id),
            cycle: 0,
            inference_count: 0,
            control: RunControl::new(),
            provenance: ProvenanceTracker::new(),
            last_checkpoint: None,
        })
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.metadata.run_id = run_id;
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn run_id(&self) -> &RunId {
        &self.metadata.run_id
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn concepts(&self) -> &ConceptRepo {
        &self.concepts
    }

    pub fn inferences(&self) -> &InferenceRepo {
        &self.inferences
    }

    pub fn provenance(&self) -> &ProvenanceTracker {
        &self.provenance
    }

    /// Handle for stop/pause requests from other tasks
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Current value of a concept, following aliases
    pub fn reference(&self, concept: &str) -> OrchestratorResult<Option<&Reference>> {
        let canonical = self.blackboard.resolve_concept_name(concept);
        Ok(self.concepts.reference(&canonical)?)
    }

    pub fn get_state(&self) -> RunState {
        let complete_concepts = self
            .blackboard
            .concept_statuses()
            .values()
            .filter(|s| **s == ConceptStatus::Complete)
            .count();
        RunState {
            run_id: self.metadata.run_id.clone(),
            status: self.metadata.status,
            progress: Progress {
                cycle: self.cycle,
                inference_count: self.inference_count,
                items: self.blackboard.item_counts(),
                complete_concepts,
                total_concepts: self.concepts.len(),
            },
            error: self.metadata.error.clone(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the run and drive it until it finishes or is paused
    #[tracing::instrument(skip(self), fields(run_id = %self.metadata.run_id))]
    pub async fn start(&mut self) -> OrchestratorResult<RunState> {
        if self.metadata.status != RunStatus::Pending {
            return Err(OrchestratorError::InvalidState(format!(
                "cannot start a run that is {}",
                self.metadata.status
            )));
        }
        self.begin().await?;
        self.run_loop(None).await
    }

    /// Continue a paused run
    #[tracing::instrument(skip(self), fields(run_id = %self.metadata.run_id))]
    pub async fn resume(&mut self) -> OrchestratorResult<RunState> {
        if self.metadata.status != RunStatus::Paused {
            return Err(OrchestratorError::InvalidState(format!(
                "cannot resume a run that is {}",
                self.metadata.status
            )));
        }
        self.control.clear_pause();
        self.metadata.status = RunStatus::Running;
        tracing::info!(run_id = %self.metadata.run_id, cycle = self.cycle, "Run resumed");
        self.persist_run().await?;
        self.run_loop(None).await
    }

    /// Run a single cycle, then pause unless the run finished
    #[tracing::instrument(skip(self), fields(run_id = %self.metadata.run_id))]
    pub async fn step(&mut self) -> OrchestratorResult<RunState> {
        match self.metadata.status {
            RunStatus::Pending => self.begin().await?,
            RunStatus::Paused => {
                self.control.clear_pause();
                self.metadata.status = RunStatus::Running;
            }
            other => {
                return Err(OrchestratorError::InvalidState(format!(
                    "cannot step a run that is {other}"
                )))
            }
        }
        self.run_loop(Some(1)).await
    }

    /// Ask a running loop to pause at the next cycle boundary
    pub fn pause(&self) {
        self.control.request_pause();
    }

    /// Stop a run that is not currently looping (pending or paused).
    /// A looping run is stopped through [`RunControl::request_stop`].
    pub async fn stop(&mut self) -> OrchestratorResult<RunState> {
        if self.metadata.status.is_finished() {
            return Err(OrchestratorError::InvalidState(format!(
                "run already {}",
                self.metadata.status
            )));
        }
        self.control.request_stop();
        self.finish(RunStatus::Stopped, None).await?;
        Ok(self.get_state())
    }

    async fn begin(&mut self) -> OrchestratorResult<()> {
        self.metadata.status = RunStatus::Running;
        self.metadata.started_at = Utc::now();
        self.provenance
            .record_run_started(&self.metadata.run_id, &self.metadata.plan_id);
        tracing::info!(
            run_id = %self.metadata.run_id,
            plan_id = %self.metadata.plan_id,
            items = self.inferences.len(),
            "Run started"
        );
        self.persist_run().await
    }

    async fn run_loop(&mut self, max_steps: Option<u64>) -> OrchestratorResult<RunState> {
        let mut steps = 0u64;
        loop {
            if self.control.is_stop_requested() {
                self.finish(RunStatus::Stopped, None).await?;
                break;
            }
            if self.control.is_pause_requested() {
                self.suspend().await?;
                break;
            }

            let ready = self.ready_items();
            if ready.is_empty() {
                self.finish_at_fixpoint().await?;
                break;
            }
            if max_steps.is_some_and(|max| steps >= max) {
                self.suspend().await?;
                break;
            }
            if self.cycle >= self.config.max_cycles {
                let message = format!("max_cycles ({}) exhausted", self.config.max_cycles);
                tracing::warn!(run_id = %self.metadata.run_id, cycle = self.cycle, "{message}");
                self.finish(RunStatus::Failed, Some(message)).await?;
                break;
            }

            self.cycle += 1;
            steps += 1;
            let failure = self.run_cycle(&ready).await?;
            tracing::debug!(
                run_id = %self.metadata.run_id,
                cycle = self.cycle,
                ready = ready.len(),
                inference_count = self.inference_count,
                "Cycle finished"
            );
            if let Some(message) = failure {
                self.finish(RunStatus::Failed, Some(message)).await?;
                break;
            }
            if let Some(every) = self.config.checkpoint.every_cycles {
                if self.cycle % every == 0 {
                    self.save_checkpoint().await?;
                }
            }
        }
        Ok(self.get_state())
    }

    /// Execute one ready set. Returns the failure message when the run
    /// must abort.
    async fn run_cycle(&mut self, ready: &[FlowIndex]) -> OrchestratorResult<Option<String>> {
        for index in ready {
            // An earlier item in this cycle may have reopened the inputs
            let still_ready = self.blackboard.get_item_status(index) == ItemStatus::Pending
                && self.is_ready(self.inferences.get(index)?);
            if !still_ready {
                continue;
            }
            if let Some(message) = self.execute_item(index).await? {
                if self.config.abort_on_item_failure {
                    return Ok(Some(format!("item {index} failed: {message}")));
                }
            }
        }
        Ok(None)
    }

    async fn suspend(&mut self) -> OrchestratorResult<()> {
        self.metadata.status = RunStatus::Paused;
        tracing::info!(run_id = %self.metadata.run_id, cycle = self.cycle, "Run paused");
        self.persist_run().await
    }

    async fn finish_at_fixpoint(&mut self) -> OrchestratorResult<()> {
        if self.blackboard.all_items_done() {
            return self.finish(RunStatus::Completed, None).await;
        }
        let counts = self.blackboard.item_counts();
        let message = format!(
            "fixpoint reached with {} pending and {} failed items",
            counts.pending + counts.in_progress,
            counts.failed
        );
        self.finish(RunStatus::Failed, Some(message)).await
    }

    async fn finish(&mut self, status: RunStatus, error: Option<String>) -> OrchestratorResult<()> {
        self.metadata.status = status;
        self.metadata.error = error;
        self.metadata.completed_at = Some(Utc::now());
        self.provenance
            .record_run_finished(&self.metadata.run_id, status);
        tracing::info!(
            run_id = %self.metadata.run_id,
            status = %status,
            cycles = self.cycle,
            inference_count = self.inference_count,
            error = self.metadata.error.as_deref().unwrap_or(""),
            "Run finished"
        );
        if self.config.checkpoint.on_finish {
            self.save_checkpoint().await?;
        }
        self.persist_run().await
    }

    // ── Scheduling ───────────────────────────────────────────────────

    fn is_ready(&self, entry: &InferenceEntry) -> bool {
        entry
            .input_concepts()
            .all(|c| self.blackboard.check_progress_condition(c))
            && entry
                .flow_info
                .support
                .iter()
                .all(|s| self.blackboard.get_item_status(s).is_done())
    }

    fn ready_items(&self) -> Vec<FlowIndex> {
        let ready: Vec<FlowIndex> = self
            .inferences
            .iterate()
            .filter(|e| self.blackboard.get_item_status(e.flow_index()) == ItemStatus::Pending)
            .filter(|e| self.is_ready(e))
            .map(|e| e.flow_index().clone())
            .collect();
        tracing::trace!(
            run_id = %self.metadata.run_id,
            ready = ?ready.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Readiness evaluated"
        );
        ready
    }

    /// Run one item. Returns the failure message if the item failed.
    async fn execute_item(&mut self, index: &FlowIndex) -> OrchestratorResult<Option<String>> {
        let entry = self.inferences.get(index)?.clone();

        if let Some(max) = self.config.max_item_executions {
            if self.blackboard.execution_count(index) >= max {
                let message = format!("execution limit of {max} reached");
                self.fail_item(index, &message);
                return Ok(Some(message));
            }
        }

        let executor = self
            .executors
            .get(&entry.inference_sequence)
            .ok_or_else(|| OrchestratorError::ExecutorNotRegistered(entry.inference_sequence.clone()))?;

        self.blackboard.set_item_status(index, ItemStatus::InProgress);
        let execution = self.blackboard.increment_execution_count(index);
        self.inference_count += 1;
        let bindings = self.bind(&entry, execution)?;
        self.provenance
            .record_item_executed(&self.metadata.run_id, index, execution);
        tracing::debug!(
            run_id = %self.metadata.run_id,
            flow_index = %index,
            sequence = %entry.inference_sequence,
            execution,
            "Executing item"
        );

        let result = match executor.execute(&bindings).await {
            Ok(outcome) => self.apply_outcome(&entry, outcome).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(()) => Ok(None),
            Err(message) => {
                self.fail_item(index, &message);
                Ok(Some(message))
            }
        }
    }

    fn bind(&self, entry: &InferenceEntry, execution: u32) -> OrchestratorResult<ConceptBindings> {
        let function = entry
            .function_concept
            .as_deref()
            .map(|name| self.bind_concept(name))
            .transpose()?;
        let values = entry
            .value_concepts
            .iter()
            .map(|name| self.bind_concept(name))
            .collect::<OrchestratorResult<Vec<_>>>()?;
        let target = self
            .blackboard
            .resolve_concept_name(&entry.concept_to_infer);

        Ok(ConceptBindings {
            flow_index: entry.flow_index().clone(),
            inference_sequence: entry.inference_sequence.clone(),
            concept_to_infer: entry.concept_to_infer.clone(),
            function,
            values,
            working_interpretation: entry.working_interpretation.clone(),
            execution,
            current: self.concepts.reference(&target)?.cloned(),
        })
    }

    fn bind_concept(&self, name: &str) -> OrchestratorResult<BoundConcept> {
        let entry = self.concepts.get_concept(name)?;
        let canonical = self.blackboard.resolve_concept_name(name);
        let reference = match self.concepts.reference(&canonical)? {
            Some(reference) => Some(reference.clone()),
            None => self.concepts.reference(name)?.cloned(),
        };
        Ok(BoundConcept {
            name: name.to_string(),
            canonical,
            concept_type: entry.concept_type,
            axis_name: entry.axis_name().to_string(),
            reference,
            truth_mask: self.blackboard.truth_mask(name).cloned(),
        })
    }

    fn apply_outcome(
        &mut self,
        entry: &InferenceEntry,
        outcome: ExecutorOutcome,
    ) -> OrchestratorResult<()> {
        let index = entry.flow_index();
        match outcome {
            ExecutorOutcome::Value(reference) => self.complete_target(entry, reference),
            ExecutorOutcome::Judgement {
                reference,
                mask,
                filter_axis,
            } => {
                self.blackboard
                    .set_truth_mask(&entry.concept_to_infer, TruthMask::new(mask, filter_axis));
                self.complete_target(entry, reference)
            }
            ExecutorOutcome::Skip { reason } => {
                let target = self
                    .blackboard
                    .resolve_concept_name(&entry.concept_to_infer);
                let existing = self.concepts.reference(&target)?.cloned();
                let reference = match existing {
                    Some(reference) => reference,
                    None => {
                        let skip = Reference::skip();
                        self.concepts.set_reference(&target, skip.clone())?;
                        skip
                    }
                };
                self.blackboard.set_item_result(index, reference);
                self.blackboard
                    .set_concept_status(&target, ConceptStatus::Complete);
                self.blackboard.set_item_status(index, ItemStatus::Skipped);
                self.provenance
                    .record_item_skipped(&self.metadata.run_id, index, &reason);
                tracing::debug!(flow_index = %index, reason = %reason, "Item skipped");
                Ok(())
            }
            ExecutorOutcome::IdentityAssignment { left, right } => {
                self.concepts.get_concept(&left)?;
                self.concepts.get_concept(&right)?;
                let root_left = self.blackboard.resolve_concept_name(&left);
                let root_right = self.blackboard.resolve_concept_name(&right);
                let canonical = self.blackboard.register_identity(&left, &right)?;
                let absorbed = if root_left == canonical {
                    root_right
                } else {
                    root_left
                };

                if absorbed != canonical {
                    self.absorb_reference(&canonical, &absorbed)?;
                }

                // A target outside the merge names the merged concept
                let own_target = self
                    .blackboard
                    .resolve_concept_name(&entry.concept_to_infer);
                if own_target != canonical && !self.blackboard.is_concept_complete(&own_target) {
                    let merged = self
                        .blackboard
                        .register_identity(&canonical, &entry.concept_to_infer)?;
                    self.absorb_reference(&merged, &own_target)?;
                }

                let target = self
                    .blackboard
                    .resolve_concept_name(&entry.concept_to_infer);
                if let Some(reference) = self.concepts.reference(&target)?.cloned() {
                    self.blackboard.set_item_result(index, reference);
                }
                self.blackboard.set_item_status(index, ItemStatus::Completed);
                self.provenance
                    .record_item_completed(&self.metadata.run_id, index, &target);
                Ok(())
            }
            ExecutorOutcome::Loop { partial, reopen } => {
                let target = self
                    .blackboard
                    .resolve_concept_name(&entry.concept_to_infer);
                if let Some(partial) = partial {
                    self.concepts.set_reference(&target, partial.clone())?;
                    self.blackboard.set_item_result(index, partial);
                }
                for name in &reopen {
                    self.reopen_concept(name)?;
                }
                self.blackboard.set_item_status(index, ItemStatus::Pending);
                tracing::debug!(
                    flow_index = %index,
                    reopened = reopen.len(),
                    "Item continues looping"
                );
                Ok(())
            }
        }
    }

    /// Give `canonical` the absorbed side's value when it has none
    fn absorb_reference(&mut self, canonical: &str, absorbed: &str) -> OrchestratorResult<()> {
        if self.concepts.reference(canonical)?.is_none() {
            if let Some(reference) = self.concepts.reference(absorbed)?.cloned() {
                self.concepts.set_reference(canonical, reference)?;
            }
        }
        self.provenance
            .record_identity_merged(&self.metadata.run_id, canonical, absorbed);
        Ok(())
    }

    fn complete_target(&mut self, entry: &InferenceEntry, reference: Reference) -> OrchestratorResult<()> {
        let index = entry.flow_index();
        let target = self
            .blackboard
            .resolve_concept_name(&entry.concept_to_infer);
        self.concepts.set_reference(&target, reference.clone())?;
        self.blackboard.set_item_result(index, reference);
        self.blackboard
            .set_concept_status(&target, ConceptStatus::Complete);
        self.blackboard.set_item_status(index, ItemStatus::Completed);
        self.provenance
            .record_item_completed(&self.metadata.run_id, index, &target);
        tracing::debug!(flow_index = %index, concept = %target, "Item completed");
        Ok(())
    }

    /// Send a concept back to empty and its producing items back to pending.
    /// Invariant concepts keep their value.
    fn reopen_concept(&mut self, name: &str) -> OrchestratorResult<()> {
        if self.concepts.get_concept(name)?.is_invariant {
            tracing::debug!(concept = %name, "Invariant concept kept across loop reset");
            return Ok(());
        }
        let canonical = self.blackboard.resolve_concept_name(name);
        let count = self.blackboard.reset_concept(&canonical);
        self.concepts.clear_reference(&canonical)?;

        let producers: Vec<FlowIndex> = self
            .inferences
            .iterate()
            .filter(|e| self.blackboard.resolve_concept_name(&e.concept_to_infer) == canonical)
            .map(|e| e.flow_index().clone())
            .collect();
        for producer in &producers {
            self.blackboard.set_item_status(producer, ItemStatus::Pending);
            self.blackboard.clear_item_result(producer);
        }

        self.provenance
            .record_concept_reset(&self.metadata.run_id, &canonical, count);
        tracing::debug!(
            concept = %canonical,
            reset_count = count,
            producers = producers.len(),
            "Concept reset"
        );
        Ok(())
    }

    fn fail_item(&mut self, index: &FlowIndex, message: &str) {
        self.blackboard.set_item_status(index, ItemStatus::Failed);
        self.blackboard.set_item_error(index, message);
        self.provenance
            .record_item_failed(&self.metadata.run_id, index, message);
        tracing::warn!(
            run_id = %self.metadata.run_id,
            flow_index = %index,
            error = %message,
            "Item failed"
        );
    }

    // ── Checkpoints ──────────────────────────────────────────────────

    /// Export the current position, blackboard and concept values
    pub fn snapshot(&self) -> OrchestratorResult<Checkpoint> {
        let mut references = BTreeMap::new();
        for name in self.concepts.names() {
            if let Some(reference) = self.concepts.reference(name)? {
                references.insert(name, reference);
            }
        }
        Ok(Checkpoint::new(
            self.metadata.clone(),
            self.cycle,
            self.inference_count,
            self.blackboard.to_dict()?,
        )
        .with_references(serde_json::to_value(&references)?))
    }

    /// Save a checkpoint now. Returns `None` when no store is attached or
    /// the current position was already saved.
    pub async fn checkpoint(&mut self) -> OrchestratorResult<Option<CheckpointKey>> {
        self.save_checkpoint().await
    }

    async fn save_checkpoint(&mut self) -> OrchestratorResult<Option<CheckpointKey>> {
        let Some(store) = self.store.clone() else {
            return Ok(None);
        };
        let checkpoint = self.snapshot()?;
        let key = checkpoint.key();
        if self.last_checkpoint.as_ref() == Some(&key) {
            tracing::warn!(checkpoint = %key, "Checkpoint position already saved, skipping");
            return Ok(None);
        }
        store.save(&checkpoint).await?;
        self.provenance.record_checkpoint_saved(
            &self.metadata.run_id,
            self.cycle,
            self.inference_count,
        );
        tracing::info!(checkpoint = %key, "Checkpoint saved");
        self.last_checkpoint = Some(key.clone());
        Ok(Some(key))
    }

    async fn persist_run(&self) -> OrchestratorResult<()> {
        if let Some(store) = &self.store {
            store.save_run(&self.metadata).await?;
        }
        Ok(())
    }

    /// Rebuild a run from a checkpoint (snapshot import).
    ///
    /// Unfinished runs come back paused. Concept values are restored from
    /// the checkpoint, or rebuilt from its item results when it carries
    /// none.
    pub fn from_checkpoint(
        checkpoint: Checkpoint,
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        executors: ExecutorRegistry,
        config: OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        let mut orchestrator = Self::new(
            checkpoint.metadata.plan_id.clone(),
            concepts,
            inferences,
            executors,
            config,
        )?;

        let blackboard = Blackboard::load_from_dict(&checkpoint.blackboard)?;
        let references = checkpoint.references.clone();
        if let Some(missing) = orchestrator
            .inferences
            .flow_indices()
            .find(|i| !blackboard.item_statuses().contains_key(*i))
        {
            return Err(OrchestratorError::InvalidState(format!(
                "checkpoint {} has no state for item {missing}",
                checkpoint.key()
            )));
        }

        orchestrator.blackboard = blackboard;
        orchestrator.cycle = checkpoint.cycle;
        orchestrator.inference_count = checkpoint.inference_count;
        orchestrator.last_checkpoint = Some(checkpoint.key());
        orchestrator.metadata = checkpoint.metadata;
        if !orchestrator.metadata.status.is_finished() {
            orchestrator.metadata.status = RunStatus::Paused;
        }
        if references.is_null() {
            orchestrator.rehydrate()?;
        } else {
            orchestrator.restore_references(references)?;
        }
        Ok(orchestrator)
    }

    /// Load the latest checkpoint of `run_id` from `store`, ready to
    /// [`Orchestrator::resume`].
    pub async fn resume_from_store(
        store: Arc<dyn CheckpointStore>,
        run_id: &RunId,
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        executors: ExecutorRegistry,
        config: OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        let checkpoint = store.latest(run_id).await?;
        let key = checkpoint.key();
        let mut orchestrator =
            Self::from_checkpoint(checkpoint, concepts, inferences, executors, config)?;

        // The run record outlives the last checkpoint when the run finished
        // at an already saved position
        match store.load_run(run_id).await {
            Ok(run) if run.status.is_finished() => {
                orchestrator.metadata.status = run.status;
                orchestrator.metadata.completed_at = run.completed_at;
                orchestrator.metadata.error = run.error;
            }
            Ok(_) | Err(CheckpointError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            checkpoint = %key,
            status = %orchestrator.metadata.status,
            "Run restored from checkpoint"
        );
        Ok(orchestrator.with_checkpoint_store(store))
    }

    /// Duplicate the current run under a new run id
    pub fn fork(&self, new_run_id: Option<RunId>) -> OrchestratorResult<Self> {
        let mut forked = Self::from_checkpoint(
            self.snapshot()?,
            self.concepts.clone(),
            self.inferences.clone(),
            self.executors.clone(),
            self.config.clone(),
        )?
        .into_fork(new_run_id);
        forked.store = self.store.clone();
        tracing::info!(
            run_id = %forked.metadata.run_id,
            forked_from = %self.metadata.run_id,
            "Run forked"
        );
        Ok(forked)
    }

    /// Fork the latest checkpoint of `run_id` in `store` under a new run
    /// id and record the fork's starting checkpoint.
    pub async fn fork_from_store(
        store: Arc<dyn CheckpointStore>,
        run_id: &RunId,
        new_run_id: Option<RunId>,
        concepts: ConceptRepo,
        inferences: InferenceRepo,
        executors: ExecutorRegistry,
        config: OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        let checkpoint = store.latest(run_id).await?;
        let mut forked =
            Self::from_checkpoint(checkpoint, concepts, inferences, executors, config)?
                .into_fork(new_run_id)
                .with_checkpoint_store(store);
        forked.persist_run().await?;
        forked.save_checkpoint().await?;
        tracing::info!(
            run_id = %forked.metadata.run_id,
            forked_from = %run_id,
            "Run forked from checkpoint"
        );
        Ok(forked)
    }

    fn into_fork(mut self, new_run_id: Option<RunId>) -> Self {
        let parent = self.metadata.run_id.clone();
        self.metadata.run_id = new_run_id.unwrap_or_else(RunId::generate);
        self.metadata.forked_from = Some(parent);
        self.metadata.started_at = Utc::now();
        self.last_checkpoint = None;
        self.control = RunControl::new();
        self
    }

    fn restore_references(&mut self, references: serde_json::Value) -> OrchestratorResult<()> {
        let mut references: BTreeMap<String, Reference> = serde_json::from_value(references)?;
        if let Some(unknown) = references.keys().find(|name| !self.concepts.contains(name)) {
            return Err(OrchestratorError::InvalidState(format!(
                "checkpoint holds a value for unknown concept {unknown}"
            )));
        }
        let names: Vec<String> = self.concepts.names().map(str::to_string).collect();
        for name in &names {
            match references.remove(name) {
                Some(reference) => self.concepts.set_reference(name, reference)?,
                None => {
                    self.concepts.clear_reference(name)?;
                }
            }
        }
        tracing::debug!(concepts = names.len(), "References restored from checkpoint");
        Ok(())
    }

    /// Rebuild values from item results: each result goes back to the
    /// item's own target, then every merged group's canonical concept
    /// takes an absorbed value only when it has none.
    fn rehydrate(&mut self) -> OrchestratorResult<()> {
        let mut restored = 0usize;
        for entry in self.inferences.iterate() {
            if let Some(result) = self.blackboard.item_result(entry.flow_index()) {
                self.concepts
                    .set_reference(&entry.concept_to_infer, result.clone())?;
                restored += 1;
            }
        }
        let aliases: Vec<String> = self.blackboard.aliases().keys().cloned().collect();
        for alias in &aliases {
            let canonical = self.blackboard.resolve_concept_name(alias);
            if self.concepts.reference(&canonical)?.is_none() {
                if let Some(reference) = self.concepts.reference(alias)?.cloned() {
                    self.concepts.set_reference(&canonical, reference)?;
                }
            }
        }
        tracing::debug!(restored, "References restored from item results");
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("run_id", &self.metadata.run_id)
            .field("status", &self.metadata.status)
            .field("cycle", &self.cycle)
            .field("inference_count", &self.inference_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutorError;
    use infergraph_concept::{ConceptEntry, ConceptType};
    use serde_json::json;

    fn fi(s: &str) -> FlowIndex {
        FlowIndex::parse(s).unwrap()
    }

    fn sum_program() -> (ConceptRepo, InferenceRepo) {
        let concepts = ConceptRepo::from_entries([
            ConceptEntry::new("A", ConceptType::Object),
            ConceptEntry::new("B", ConceptType::Object)
                .ground(json!([2, 3]), Some(vec!["b".into()])),
            ConceptEntry::new("sum", ConceptType::Imperative),
        ])
        .unwrap();
        let inferences = InferenceRepo::new(
            [InferenceEntry::new("imperative", "A", fi("1"))
                .with_function("sum")
                .with_values(["B"])],
            &concepts,
        )
        .unwrap();
        (concepts, inferences)
    }

    fn sum_executors() -> ExecutorRegistry {
        let mut executors = ExecutorRegistry::new();
        executors.register_fn("imperative", |b| {
            let total: i64 = b.values[0]
                .reference
                .as_ref()
                .map(|r| r.present_values().filter_map(|v| v.as_i64()).sum::<i64>())
                .unwrap_or(0);
            Ok(ExecutorOutcome::Value(Reference::scalar(json!(total))))
        });
        executors
    }

    #[test]
    fn test_new_requires_registered_executors() {
        let (concepts, inferences) = sum_program();
        let err = Orchestrator::new(
            "plan",
            concepts,
            inferences,
            ExecutorRegistry::new(),
            OrchestratorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::ExecutorNotRegistered(s) if s == "imperative"));
    }

    #[tokio::test]
    async fn test_single_cycle_completes_sum() {
        let (concepts, inferences) = sum_program();
        let mut orch = Orchestrator::new(
            "plan",
            concepts,
            inferences,
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();

        let state = orch.step().await.unwrap();
        assert_eq!(state.progress.cycle, 1);
        assert!(orch.blackboard().is_concept_complete("A"));
        assert_eq!(
            orch.blackboard().get_item_status(&fi("1")),
            ItemStatus::Completed
        );
        assert_eq!(
            orch.reference("A").unwrap().unwrap().get_tensor(true),
            json!([5])
        );
        // Nothing left to run, so the step ends at the fixpoint
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.progress.inference_count, 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let (concepts, inferences) = sum_program();
        let mut orch = Orchestrator::new(
            "plan",
            concepts,
            inferences,
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        orch.start().await.unwrap();
        assert!(matches!(
            orch.start().await,
            Err(OrchestratorError::InvalidState(_))
        ));
        assert!(matches!(
            orch.stop().await,
            Err(OrchestratorError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_executor_error_fails_item_and_run() {
        let (concepts, inferences) = sum_program();
        let mut executors = ExecutorRegistry::new();
        executors.register_fn("imperative", |_| Err(ExecutorError::Failed("boom".into())));
        let mut orch =
            Orchestrator::new("plan", concepts, inferences, executors, OrchestratorConfig::default())
                .unwrap();

        let state = orch.start().await.unwrap();
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.progress.items.failed, 1);
        assert!(orch
            .blackboard()
            .item_error(&fi("1"))
            .unwrap()
            .contains("boom"));
    }

    #[tokio::test]
    async fn test_pause_request_suspends_before_next_cycle() {
        let (concepts, inferences) = sum_program();
        let mut orch = Orchestrator::new(
            "plan",
            concepts,
            inferences,
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        orch.pause();
        let state = orch.start().await.unwrap();
        assert_eq!(state.status, RunStatus::Paused);
        assert_eq!(state.progress.cycle, 0);

        let state = orch.stop().await.unwrap();
        assert_eq!(state.status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_snapshot_and_import() {
        let (concepts, inferences) = sum_program();
        let mut orch = Orchestrator::new(
            "plan",
            concepts.clone(),
            inferences.clone(),
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        orch.pause();
        orch.step().await.unwrap();
        let snapshot = orch.snapshot().unwrap();
        let restored = Orchestrator::from_checkpoint(
            snapshot,
            concepts.clone(),
            inferences.clone(),
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        assert_eq!(restored.metadata().status, RunStatus::Paused);
        assert_eq!(restored.get_state().progress.cycle, 0);

        orch.resume().await.unwrap();
        let snapshot = orch.snapshot().unwrap();
        let restored = Orchestrator::from_checkpoint(
            snapshot,
            concepts,
            inferences,
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        assert_eq!(restored.metadata().status, RunStatus::Completed);
        assert_eq!(restored.blackboard(), orch.blackboard());
        assert_eq!(
            restored.reference("A").unwrap(),
            orch.reference("A").unwrap()
        );
    }

    #[tokio::test]
    async fn test_import_without_values_rebuilds_from_item_results() {
        let (concepts, inferences) = sum_program();
        let mut orch = Orchestrator::new(
            "plan",
            concepts.clone(),
            inferences.clone(),
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        orch.start().await.unwrap();

        let snapshot = orch.snapshot().unwrap();
        assert!(snapshot.references.get("A").is_some());
        let mut bare = snapshot.clone();
        bare.references = serde_json::Value::Null;
        let restored = Orchestrator::from_checkpoint(
            bare,
            concepts.clone(),
            inferences.clone(),
            sum_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();
        assert_eq!(
            restored.reference("A").unwrap(),
            orch.reference("A").unwrap()
        );

        let mut unknown = snapshot;
        unknown.references["ghost"] = json!({"axes": ["_none_axis"], "shape": [1], "values": [1]});
        assert!(matches!(
            Orchestrator::from_checkpoint(
                unknown,
                concepts,
                inferences,
                sum_executors(),
                OrchestratorConfig::default(),
            ),
            Err(OrchestratorError::InvalidState(_))
        ));
    }
}
