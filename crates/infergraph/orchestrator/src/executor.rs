//! Executor contract and registry
//!
//! Concrete inference sequences live outside this crate. They are
//! registered by name and invoked with the [`ConceptBindings`] of a ready
//! item; what they return decides how the orchestrator updates the run.

use crate::ExecutorError;
use async_trait::async_trait;
use infergraph_blackboard::TruthMask;
use infergraph_concept::{ConceptType, FlowIndex};
use infergraph_grouper::{Grouper, GroupingResult};
use infergraph_reference::Reference;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What an executor produced for one item
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutorOutcome {
    /// The target concept's value
    Value(Reference),
    /// A value plus the truth mask it induces along `filter_axis`
    Judgement {
        reference: Reference,
        mask: Reference,
        filter_axis: String,
    },
    /// Nothing to compute; the target becomes a skip unless it already has a value
    Skip { reason: String },
    /// Merge two concepts into one identity
    IdentityAssignment { left: String, right: String },
    /// Keep iterating: store `partial` on the target, send `reopen`
    /// concepts back to empty and leave this item pending
    Loop {
        partial: Option<Reference>,
        reopen: Vec<String>,
    },
}

pub type ExecutorResult = Result<ExecutorOutcome, ExecutorError>;

/// One input concept as seen by an executor
#[derive(Clone, Debug, PartialEq)]
pub struct BoundConcept {
    pub name: String,
    /// Name after alias resolution
    pub canonical: String,
    pub concept_type: ConceptType,
    pub axis_name: String,
    pub reference: Option<Reference>,
    pub truth_mask: Option<TruthMask>,
}

/// Inputs handed to an executor for one execution of an item
#[derive(Clone, Debug, PartialEq)]
pub struct ConceptBindings {
    pub flow_index: FlowIndex,
    pub inference_sequence: String,
    pub concept_to_infer: String,
    pub function: Option<BoundConcept>,
    pub values: Vec<BoundConcept>,
    pub working_interpretation: Option<Value>,
    /// 1 on the first execution of the item
    pub execution: u32,
    /// Current value of the target (a loop's partial result)
    pub current: Option<Reference>,
}

impl ConceptBindings {
    pub fn value(&self, name: &str) -> Option<&BoundConcept> {
        self.values
            .iter()
            .find(|v| v.name == name || v.canonical == name)
    }

    /// References of the value concepts, in order; fails on any unset one
    pub fn value_references(&self) -> Result<Vec<Reference>, ExecutorError> {
        self.values
            .iter()
            .map(|v| {
                v.reference.clone().ok_or_else(|| {
                    ExecutorError::InvalidInput(format!("concept '{}' has no value", v.name))
                })
            })
            .collect()
    }

    /// Filter `reference` by every truth mask carried by the bound concepts
    pub fn apply_truth_masks(&self, reference: &Reference) -> GroupingResult<Reference> {
        let grouper = Grouper::new();
        let mut filtered = reference.clone();
        for mask in self
            .function
            .iter()
            .chain(&self.values)
            .filter_map(|c| c.truth_mask.as_ref())
        {
            filtered = grouper.filter_by_mask(&filtered, &mask.tensor, &mask.filter_axis)?;
        }
        Ok(filtered)
    }
}

/// A named inference sequence
#[async_trait]
pub trait InferenceExecutor: Send + Sync {
    async fn execute(&self, bindings: &ConceptBindings) -> ExecutorResult;
}

/// Adapter running a synchronous closure as an executor
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&ConceptBindings) -> ExecutorResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> InferenceExecutor for FnExecutor<F>
where
    F: Fn(&ConceptBindings) -> ExecutorResult + Send + Sync,
{
    async fn execute(&self, bindings: &ConceptBindings) -> ExecutorResult {
        (self.f)(bindings)
    }
}

/// Executors by inference-sequence name
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<String, Arc<dyn InferenceExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one under `name`
    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn InferenceExecutor>) {
        let name = name.into();
        tracing::debug!(sequence = %name, "Executor registered");
        self.executors.insert(name, executor);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&ConceptBindings) -> ExecutorResult + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnExecutor::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InferenceExecutor>> {
        self.executors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("sequences", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bound(name: &str, reference: Option<Reference>, mask: Option<TruthMask>) -> BoundConcept {
        BoundConcept {
            name: name.to_string(),
            canonical: name.to_string(),
            concept_type: ConceptType::Object,
            axis_name: name.to_string(),
            reference,
            truth_mask: mask,
        }
    }

    fn bindings(values: Vec<BoundConcept>) -> ConceptBindings {
        ConceptBindings {
            flow_index: FlowIndex::parse("1").unwrap(),
            inference_sequence: "test".into(),
            concept_to_infer: "out".into(),
            function: None,
            values,
            working_interpretation: None,
            execution: 1,
            current: None,
        }
    }

    #[tokio::test]
    async fn test_registry_runs_closure() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn("const", |_| Ok(ExecutorOutcome::Value(Reference::scalar(json!(7)))));
        assert!(registry.contains("const"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["const"]);

        let executor = registry.get("const").unwrap();
        let outcome = executor.execute(&bindings(vec![])).await.unwrap();
        assert_eq!(outcome, ExecutorOutcome::Value(Reference::scalar(json!(7))));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_value_references_requires_values() {
        let b = bindings(vec![
            bound("a", Some(Reference::scalar(json!(1))), None),
            bound("b", None, None),
        ]);
        assert!(b.value("a").is_some());
        assert!(matches!(
            b.value_references(),
            Err(ExecutorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_apply_truth_masks() {
        let axis = ["item".to_string()];
        let items = Reference::from_data(&json!(["x", "y"]), Some(&axis[..])).unwrap();
        let mask = Reference::from_data(&json!([false, true]), Some(&axis[..])).unwrap();
        let b = bindings(vec![bound("flags", None, Some(TruthMask::new(mask, "item")))]);
        let filtered = b.apply_truth_masks(&items).unwrap();
        assert_eq!(filtered.cells(), &[None, Some(json!("y"))]);
    }
}
