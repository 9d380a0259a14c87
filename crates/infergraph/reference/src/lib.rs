//! Named-axis tensor values for infergraph
//!
//! Every concept value in an infergraph program is a [`Reference`]: an
//! ordered list of named axes, a rectangular shape aligned with those
//! axes, and one cell per position. Source data is frequently ragged, so
//! a cell may be a *skip* (`None`) rather than a value; the shape itself
//! never becomes irregular.
//!
//! # Operations
//!
//! - Construction: [`Reference::new`], [`Reference::from_data`],
//!   [`Reference::scalar`]
//! - Access: [`Reference::set`], [`Reference::value`], [`Reference::get`]
//! - Projection: [`Reference::slice`], [`Reference::shape_view`],
//!   [`Reference::fold`]
//! - Combination: [`cross_product`], [`element_action`]
//! - Display: [`Reference::get_tensor`]
//!
//! # Example
//!
//! ```rust
//! use infergraph_reference::{cross_product, Reference};
//! use serde_json::json;
//!
//! let people = Reference::from_data(&json!(["ann", "bo"]), Some(&["person".to_string()][..])).unwrap();
//! let ages = Reference::from_data(&json!([31, 27]), Some(&["person".to_string()][..])).unwrap();
//!
//! let pairs = cross_product(&[people, ages]).unwrap();
//! assert_eq!(pairs.shape(), &[2]);
//! assert_eq!(pairs.get_tensor(true), json!([["ann", 31], ["bo", 27]]));
//! ```

#![deny(unsafe_code)]

mod algebra;
mod data;
mod error;
mod iter;
mod reference;

pub use algebra::{cross_product, element_action};
pub use error::{ReferenceError, ReferenceResult};
pub use iter::Positions;
pub use reference::{Cell, Reference, Selector, NONE_AXIS};
