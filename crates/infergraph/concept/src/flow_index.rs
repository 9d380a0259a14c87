//! Dotted hierarchical positions of inferences ("1.2.3")

use crate::{ConceptError, ConceptResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of an inference in the program graph.
///
/// Ordering is numeric per segment, so `1.2 < 1.10`, and a parent sorts
/// before its children.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowIndex(Vec<u32>);

impl FlowIndex {
    pub fn parse(text: &str) -> ConceptResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ConceptError::InvalidFlowIndex(text.to_string()));
        }
        trimmed
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u32>()
                    .map_err(|_| ConceptError::InvalidFlowIndex(text.to_string()))
            })
            .collect::<ConceptResult<Vec<u32>>>()
            .map(Self)
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    /// Number of segments; a top-level index has depth 1
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The enclosing index, `None` at the top level
    pub fn parent(&self) -> Option<FlowIndex> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Strict ancestry: an index is not its own ancestor.
    pub fn is_ancestor_of(&self, other: &FlowIndex) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Append one segment
    pub fn child(&self, segment: u32) -> FlowIndex {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }
}

impl fmt::Display for FlowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for FlowIndex {
    type Err = ConceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FlowIndex {
    type Error = ConceptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FlowIndex> for String {
    fn from(index: FlowIndex) -> Self {
        index.to_string()
    }
}
