//! Inference entries and the inference repository

use crate::{ConceptError, ConceptRepo, ConceptResult, FlowIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Position of an inference in the program graph plus its DAG edges
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInfo {
    pub flow_index: FlowIndex,
    /// Items that must finish before this one may run
    #[serde(default)]
    pub support: Vec<FlowIndex>,
    /// Items fed by this one
    #[serde(default)]
    pub target: Vec<FlowIndex>,
}

impl FlowInfo {
    pub fn new(flow_index: FlowIndex) -> Self {
        Self {
            flow_index,
            support: Vec::new(),
            target: Vec::new(),
        }
    }
}

/// One derivation step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceEntry {
    #[serde(default)]
    pub id: String,
    /// Name of the executor that runs this step
    pub inference_sequence: String,
    pub concept_to_infer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_concept: Option<String>,
    #[serde(default)]
    pub value_concepts: Vec<String>,
    pub flow_info: FlowInfo,
    /// Free-form parameters handed to the executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_interpretation: Option<Value>,
}

impl InferenceEntry {
    pub fn new(
        inference_sequence: impl Into<String>,
        concept_to_infer: impl Into<String>,
        flow_index: FlowIndex,
    ) -> Self {
        Self {
            id: format!("inf-{flow_index}"),
            inference_sequence: inference_sequence.into(),
            concept_to_infer: concept_to_infer.into(),
            function_concept: None,
            value_concepts: Vec::new(),
            flow_info: FlowInfo::new(flow_index),
            working_interpretation: None,
        }
    }

    pub fn with_function(mut self, concept: impl Into<String>) -> Self {
        self.function_concept = Some(concept.into());
        self
    }

    pub fn with_values<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value_concepts = concepts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_support(mut self, support: impl IntoIterator<Item = FlowIndex>) -> Self {
        self.flow_info.support = support.into_iter().collect();
        self
    }

    pub fn with_interpretation(mut self, interpretation: Value) -> Self {
        self.working_interpretation = Some(interpretation);
        self
    }

    pub fn flow_index(&self) -> &FlowIndex {
        &self.flow_info.flow_index
    }

    /// Function concept followed by value concepts
    pub fn input_concepts(&self) -> impl Iterator<Item = &str> {
        self.function_concept
            .as_deref()
            .into_iter()
            .chain(self.value_concepts.iter().map(String::as_str))
    }
}

/// Inferences of a program, iterated in flow-index order
#[derive(Clone, Debug, Default)]
pub struct InferenceRepo {
    entries: BTreeMap<FlowIndex, InferenceEntry>,
}

impl InferenceRepo {
    /// Build and validate against `concepts`.
    ///
    /// Flow indices must be unique, every named concept must exist, and
    /// support edges must point at known items.
    pub fn new(
        entries: impl IntoIterator<Item = InferenceEntry>,
        concepts: &ConceptRepo,
    ) -> ConceptResult<Self> {
        let mut map = BTreeMap::new();
        for mut entry in entries {
            if entry.id.is_empty() {
                entry.id = format!("inf-{}", entry.flow_index());
            }
            for name in std::iter::once(entry.concept_to_infer.as_str()).chain(entry.input_concepts()) {
                if !concepts.contains(name) {
                    return Err(ConceptError::DanglingConcept {
                        inference: entry.id.clone(),
                        concept: name.to_string(),
                    });
                }
            }
            let index = entry.flow_index().clone();
            if map.contains_key(&index) {
                return Err(ConceptError::DuplicateFlowIndex(index.to_string()));
            }
            map.insert(index, entry);
        }

        for entry in map.values() {
            if let Some(missing) = entry
                .flow_info
                .support
                .iter()
                .find(|s| !map.contains_key(*s))
            {
                return Err(ConceptError::InvalidFlowIndex(format!(
                    "{} supports unknown item {}",
                    entry.flow_index(),
                    missing
                )));
            }
        }

        Ok(Self { entries: map })
    }

    /// Parse a JSON array of inference entries
    pub fn from_json(json: &str, concepts: &ConceptRepo) -> ConceptResult<Self> {
        let entries: Vec<InferenceEntry> = serde_json::from_str(json)?;
        let repo = Self::new(entries, concepts)?;
        tracing::debug!(inferences = repo.len(), "Inference repository loaded");
        Ok(repo)
    }

    pub fn iterate(&self) -> impl Iterator<Item = &InferenceEntry> {
        self.entries.values()
    }

    pub fn get(&self, flow_index: &FlowIndex) -> ConceptResult<&InferenceEntry> {
        self.entries
            .get(flow_index)
            .ok_or_else(|| ConceptError::InferenceNotFound(flow_index.to_string()))
    }

    /// Items whose target is `concept`
    pub fn producers_of<'a>(&'a self, concept: &'a str) -> impl Iterator<Item = &'a InferenceEntry> {
        self.entries
            .values()
            .filter(move |e| e.concept_to_infer == concept)
    }

    pub fn flow_indices(&self) -> impl Iterator<Item = &FlowIndex> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
