//! The closed taxonomy of concept types
//!
//! Every concept in a program is tagged with one of these types by its
//! surface marker (`{}`, `<>`, `$=`, ...). Each type carries a static
//! description and a classification.

use crate::{ConceptError, ConceptResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad role of a concept type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Structural operators that rearrange or combine other concepts
    Syntactical,
    /// Concepts that carry meaning (objects, statements, functions)
    Semantical,
    /// Links between an inference and its function or value concepts
    Inferential,
}

/// Static record describing a concept type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub symbol: &'static str,
    pub description: &'static str,
    pub classification: Classification,
}

/// Concept type, identified on the wire by its surface symbol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConceptType {
    Object,
    Statement,
    Relation,
    Subject,
    Imperative,
    Judgement,
    Assigning,
    Specifying,
    Abstracting,
    Continuing,
    Selecting,
    GroupingIn,
    GroupingAcross,
    Quantifying,
    Conditional,
    NegatedConditional,
    Sequencing,
    FunctionLink,
    ValueLink,
}

impl ConceptType {
    pub const ALL: [ConceptType; 19] = [
        ConceptType::Object,
        ConceptType::Statement,
        ConceptType::Relation,
        ConceptType::Subject,
        ConceptType::Imperative,
        ConceptType::Judgement,
        ConceptType::Assigning,
        ConceptType::Specifying,
        ConceptType::Abstracting,
        ConceptType::Continuing,
        ConceptType::Selecting,
        ConceptType::GroupingIn,
        ConceptType::GroupingAcross,
        ConceptType::Quantifying,
        ConceptType::Conditional,
        ConceptType::NegatedConditional,
        ConceptType::Sequencing,
        ConceptType::FunctionLink,
        ConceptType::ValueLink,
    ];

    pub fn info(&self) -> TypeInfo {
        use Classification::*;
        let (symbol, description, classification) = match self {
            ConceptType::Object => ("{}", "an object or entity", Semantical),
            ConceptType::Statement => ("<>", "a statement that can be true or false", Semantical),
            ConceptType::Relation => ("[]", "a relation or collection of objects", Semantical),
            ConceptType::Subject => (":S:", "the subject an inference acts for", Semantical),
            ConceptType::Imperative => ("::()", "an imperative function producing a value", Semantical),
            ConceptType::Judgement => ("::<>", "a judgement function producing truth values", Semantical),
            ConceptType::Assigning => ("$=", "identity assignment between two concepts", Syntactical),
            ConceptType::Specifying => ("$.", "specification of one concept from candidates", Syntactical),
            ConceptType::Abstracting => ("$::", "abstraction over a concept's value", Syntactical),
            ConceptType::Continuing => ("$+", "continuation appending to an existing value", Syntactical),
            ConceptType::Selecting => ("$%", "selection of part of a value", Syntactical),
            ConceptType::GroupingIn => ("&in", "conjunctive grouping of concepts", Syntactical),
            ConceptType::GroupingAcross => ("&across", "disjunctive grouping of concepts", Syntactical),
            ConceptType::Quantifying => ("*every", "iteration over every element of a concept", Syntactical),
            ConceptType::Conditional => ("@if", "execution gated on a true condition", Syntactical),
            ConceptType::NegatedConditional => ("@if!", "execution gated on a false condition", Syntactical),
            ConceptType::Sequencing => ("@after", "execution ordered after another concept", Syntactical),
            ConceptType::FunctionLink => ("<=", "the function concept of an inference", Inferential),
            ConceptType::ValueLink => ("<-", "a value concept of an inference", Inferential),
        };
        TypeInfo {
            symbol,
            description,
            classification,
        }
    }

    pub fn symbol(&self) -> &'static str {
        self.info().symbol
    }

    pub fn classification(&self) -> Classification {
        self.info().classification
    }

    pub fn from_symbol(symbol: &str) -> ConceptResult<Self> {
        let symbol = symbol.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.symbol() == symbol)
            .ok_or_else(|| ConceptError::UnknownConceptType(symbol.to_string()))
    }

    /// Function concepts are evaluated by executors rather than holding data
    pub fn is_function(&self) -> bool {
        matches!(self, ConceptType::Imperative | ConceptType::Judgement)
    }
}

impl fmt::Display for ConceptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl TryFrom<String> for ConceptType {
    type Error = ConceptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_symbol(&value)
    }
}

impl From<ConceptType> for String {
    fn from(t: ConceptType) -> Self {
        t.symbol().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_symbols_round_trip() {
        for t in ConceptType::ALL {
            assert_eq!(ConceptType::from_symbol(t.symbol()).unwrap(), t);
        }
    }

    #[test]
    fn test_symbols_unique() {
        let symbols: HashSet<&str> = ConceptType::ALL.iter().map(|t| t.symbol()).collect();
        assert_eq!(symbols.len(), ConceptType::ALL.len());
    }

    #[test]
    fn test_unknown_symbol() {
        assert!(matches!(
            ConceptType::from_symbol("%%"),
            Err(ConceptError::UnknownConceptType(_))
        ));
    }

    #[test]
    fn test_classification() {
        assert_eq!(ConceptType::Object.classification(), Classification::Semantical);
        assert_eq!(ConceptType::GroupingIn.classification(), Classification::Syntactical);
        assert_eq!(ConceptType::ValueLink.classification(), Classification::Inferential);
        assert!(ConceptType::Judgement.is_function());
        assert!(!ConceptType::Object.is_function());
    }

    #[test]
    fn test_serde_uses_symbol() {
        assert_eq!(serde_json::to_string(&ConceptType::Quantifying).unwrap(), "\"*every\"");
        let t: ConceptType = serde_json::from_str("\"@if!\"").unwrap();
        assert_eq!(t, ConceptType::NegatedConditional);
    }
}
