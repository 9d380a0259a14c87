//! Concepts and the concept repository

use crate::{ConceptError, ConceptResult, ConceptType};
use infergraph_reference::Reference;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A typed data slot holding zero or one Reference
#[derive(Clone, Debug, PartialEq)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub context: String,
    pub axis_name: String,
    pub concept_type: ConceptType,
    reference: Option<Reference>,
}

impl Concept {
    pub fn new(name: impl Into<String>, concept_type: ConceptType) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            axis_name: name.clone(),
            name,
            context: String::new(),
            concept_type,
            reference: None,
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn set_reference(&mut self, reference: Reference) {
        self.reference = Some(reference);
    }

    pub fn clear_reference(&mut self) -> Option<Reference> {
        self.reference.take()
    }
}

/// Repository record for a concept, as produced by the program parser
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConceptEntry {
    #[serde(default)]
    pub id: String,
    pub concept_name: String,
    #[serde(rename = "type")]
    pub concept_type: ConceptType,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nested data for ground concepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_axis_names: Option<Vec<String>>,
    #[serde(default)]
    pub is_ground_concept: bool,
    /// Invariant concepts keep their value across loop resets
    #[serde(default)]
    pub is_invariant: bool,
}

impl ConceptEntry {
    pub fn new(name: impl Into<String>, concept_type: ConceptType) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            concept_name: name,
            concept_type,
            context: String::new(),
            axis_name: None,
            description: None,
            reference_data: None,
            reference_axis_names: None,
            is_ground_concept: false,
            is_invariant: false,
        }
    }

    /// Mark as a ground concept carrying `data`
    pub fn ground(mut self, data: Value, axis_names: Option<Vec<String>>) -> Self {
        self.is_ground_concept = true;
        self.reference_data = Some(data);
        self.reference_axis_names = axis_names;
        self
    }

    pub fn invariant(mut self) -> Self {
        self.is_invariant = true;
        self
    }

    pub fn axis_name(&self) -> &str {
        self.axis_name.as_deref().unwrap_or(&self.concept_name)
    }

    /// Build the runtime concept, converting any `reference_data`.
    pub fn to_concept(&self) -> ConceptResult<Concept> {
        let reference = match &self.reference_data {
            Some(data) => Some(Reference::from_data(
                data,
                self.reference_axis_names.as_deref(),
            )?),
            None => None,
        };
        Ok(Concept {
            id: if self.id.is_empty() {
                self.concept_name.clone()
            } else {
                self.id.clone()
            },
            name: self.concept_name.clone(),
            context: self.context.clone(),
            axis_name: self.axis_name().to_string(),
            concept_type: self.concept_type,
            reference,
        })
    }
}

/// Concepts of a program, keyed by name
#[derive(Clone, Debug, Default)]
pub struct ConceptRepo {
    entries: BTreeMap<String, ConceptEntry>,
    concepts: BTreeMap<String, Concept>,
}

impl ConceptRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ConceptEntry>) -> ConceptResult<Self> {
        let mut repo = Self::new();
        for entry in entries {
            repo.add(entry)?;
        }
        Ok(repo)
    }

    /// Parse a JSON array of concept entries
    pub fn from_json(json: &str) -> ConceptResult<Self> {
        let entries: Vec<ConceptEntry> = serde_json::from_str(json)?;
        let repo = Self::from_entries(entries)?;
        tracing::debug!(concepts = repo.len(), "Concept repository loaded");
        Ok(repo)
    }

    pub fn add(&mut self, entry: ConceptEntry) -> ConceptResult<()> {
        if self.entries.contains_key(&entry.concept_name) {
            return Err(ConceptError::DuplicateConcept(entry.concept_name));
        }
        let concept = entry.to_concept()?;
        self.concepts.insert(entry.concept_name.clone(), concept);
        self.entries.insert(entry.concept_name.clone(), entry);
        Ok(())
    }

    pub fn get_concept(&self, name: &str) -> ConceptResult<&ConceptEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| ConceptError::ConceptNotFound(name.to_string()))
    }

    pub fn concept(&self, name: &str) -> ConceptResult<&Concept> {
        self.concepts
            .get(name)
            .ok_or_else(|| ConceptError::ConceptNotFound(name.to_string()))
    }

    pub fn reference(&self, name: &str) -> ConceptResult<Option<&Reference>> {
        Ok(self.concept(name)?.reference())
    }

    pub fn set_reference(&mut self, name: &str, reference: Reference) -> ConceptResult<()> {
        self.concepts
            .get_mut(name)
            .ok_or_else(|| ConceptError::ConceptNotFound(name.to_string()))?
            .set_reference(reference);
        Ok(())
    }

    pub fn clear_reference(&mut self, name: &str) -> ConceptResult<Option<Reference>> {
        Ok(self
            .concepts
            .get_mut(name)
            .ok_or_else(|| ConceptError::ConceptNotFound(name.to_string()))?
            .clear_reference())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in name order
    pub fn entries(&self) -> impl Iterator<Item = &ConceptEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_defaults_axis_to_name() {
        let entry = ConceptEntry::new("total", ConceptType::Object);
        assert_eq!(entry.axis_name(), "total");
        let concept = entry.to_concept().unwrap();
        assert_eq!(concept.axis_name, "total");
        assert!(!concept.has_reference());
    }

    #[test]
    fn test_ground_entry_builds_reference() {
        let entry = ConceptEntry::new("B", ConceptType::Object)
            .ground(json!([2, 3]), Some(vec!["b".into()]));
        let concept = entry.to_concept().unwrap();
        let reference = concept.reference().unwrap();
        assert_eq!(reference.axes(), &["b".to_string()]);
        assert_eq!(reference.get_tensor(true), json!([2, 3]));
    }

    #[test]
    fn test_get_concept_not_found() {
        let repo = ConceptRepo::new();
        assert!(matches!(
            repo.get_concept("missing"),
            Err(ConceptError::ConceptNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_concept_rejected() {
        let mut repo = ConceptRepo::new();
        repo.add(ConceptEntry::new("a", ConceptType::Object)).unwrap();
        let err = repo.add(ConceptEntry::new("a", ConceptType::Statement)).unwrap_err();
        assert!(matches!(err, ConceptError::DuplicateConcept(name) if name == "a"));
    }

    #[test]
    fn test_set_and_clear_reference() {
        let mut repo = ConceptRepo::new();
        repo.add(ConceptEntry::new("a", ConceptType::Object)).unwrap();
        repo.set_reference("a", Reference::scalar(json!(1))).unwrap();
        assert!(repo.reference("a").unwrap().is_some());
        assert!(repo.clear_reference("a").unwrap().is_some());
        assert!(repo.reference("a").unwrap().is_none());
        assert!(repo.set_reference("b", Reference::skip()).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"concept_name": "B", "type": "{}", "reference_data": [[1, 2], [3]],
             "reference_axis_names": ["row", "col"], "is_ground_concept": true},
            {"id": "c-sum", "concept_name": "sum", "type": "::()", "is_invariant": true}
        ]"#;
        let repo = ConceptRepo::from_json(json).unwrap();
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.names().collect::<Vec<_>>(), vec!["B", "sum"]);

        let b = repo.concept("B").unwrap();
        assert_eq!(b.id, "B");
        assert_eq!(b.reference().unwrap().shape(), &[2, 2]);

        let sum = repo.get_concept("sum").unwrap();
        assert!(sum.is_invariant);
        assert_eq!(sum.concept_type, ConceptType::Imperative);
        assert_eq!(repo.concept("sum").unwrap().id, "c-sum");
    }

    #[test]
    fn test_from_json_unknown_type() {
        let json = r#"[{"concept_name": "x", "type": "??"}]"#;
        assert!(matches!(
            ConceptRepo::from_json(json),
            Err(ConceptError::Serialization(_))
        ));
    }

    #[test]
    fn test_from_json_bad_axis_names() {
        let json = r#"[{"concept_name": "x", "type": "{}", "reference_data": [[1]],
                        "reference_axis_names": ["only_one"]}]"#;
        assert!(matches!(
            ConceptRepo::from_json(json),
            Err(ConceptError::Reference(_))
        ));
    }
}
