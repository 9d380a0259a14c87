//! Grouping combinators for infergraph References
//!
//! [`Grouper`] builds the conjunctive (`and_in`) and disjunctive
//! (`or_across`) joins used by inference sequences to combine the values
//! of several concepts, plus truth-mask filtering of grouped results.

#![deny(unsafe_code)]

mod error;
mod grouper;

pub use error::{GroupingError, GroupingResult};
pub use grouper::Grouper;
