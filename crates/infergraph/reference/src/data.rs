//! Conversion between nested JSON data and References
//!
//! `from_data` accepts ragged nesting: the shape is the element-wise
//! maximum length observed at each depth, and short branches are padded
//! with skip cells. `get_tensor` goes the other way for display and
//! serialization.

use crate::iter::volume;
use crate::reference::NONE_AXIS;
use crate::{Reference, ReferenceError, ReferenceResult};
use serde_json::Value;

impl Reference {
    /// Build a Reference from nested data.
    ///
    /// Axes are named `axis_0`, `axis_1`, ... unless `axis_names` is given,
    /// in which case it must name every inferred depth. A non-array value
    /// becomes a one-cell Reference on the placeholder axis (or on the
    /// single provided axis name).
    pub fn from_data(data: &Value, axis_names: Option<&[String]>) -> ReferenceResult<Reference> {
        let mut shape = Vec::new();
        measure(data, 0, &mut shape);

        if shape.is_empty() {
            let axis = match axis_names {
                None | Some([]) => NONE_AXIS.to_string(),
                Some([name]) => name.clone(),
                Some(names) => {
                    return Err(ReferenceError::InvalidAxisNames {
                        expected: 1,
                        found: names.len(),
                    })
                }
            };
            return Reference::from_cells(vec![axis], vec![1], vec![Some(data.clone())]);
        }

        let axes = match axis_names {
            Some(names) if names.len() != shape.len() => {
                return Err(ReferenceError::InvalidAxisNames {
                    expected: shape.len(),
                    found: names.len(),
                })
            }
            Some(names) => names.to_vec(),
            None => (0..shape.len()).map(|i| format!("axis_{i}")).collect(),
        };

        let mut reference = Reference::from_cells(axes, shape.clone(), vec![None; volume(&shape)])?;
        let mut prefix = Vec::with_capacity(shape.len());
        fill(&mut reference, data, &mut prefix);
        Ok(reference)
    }

    /// Nested view of the cells.
    ///
    /// With `ignore_skip`, skip cells are removed and any sub-list left
    /// without a present value is dropped, so only data that was actually
    /// supplied is returned. Without it, skips render as `null`.
    ///
    /// Cells do not remember where the data ended, so an empty sub-list in
    /// the input is indistinguishable from padding and is dropped as well:
    /// `[[], [1]]` comes back as `[[1]]`. A scalar stored above leaf depth
    /// comes back wrapped (`[1, [2, 3]]` gives `[[1], [2, 3]]`).
    pub fn get_tensor(&self, ignore_skip: bool) -> Value {
        let mut index = Vec::with_capacity(self.rank());
        self.nest(&mut index, ignore_skip).unwrap_or(Value::Array(Vec::new()))
    }

    fn nest(&self, index: &mut Vec<usize>, ignore_skip: bool) -> Option<Value> {
        let depth = index.len();
        if depth == self.rank() {
            return match &self.cells()[self.offset(index)] {
                Some(v) => Some(v.clone()),
                None if ignore_skip => None,
                None => Some(Value::Null),
            };
        }

        let mut items = Vec::with_capacity(self.shape()[depth]);
        for i in 0..self.shape()[depth] {
            index.push(i);
            if let Some(v) = self.nest(index, ignore_skip) {
                items.push(v);
            }
            index.pop();
        }

        if ignore_skip && depth > 0 && items.is_empty() {
            return None;
        }
        Some(Value::Array(items))
    }
}

/// Record the maximum array length at every depth.
fn measure(value: &Value, depth: usize, shape: &mut Vec<usize>) {
    if let Value::Array(items) = value {
        if shape.len() <= depth {
            shape.push(0);
        }
        shape[depth] = shape[depth].max(items.len());
        for item in items {
            measure(item, depth + 1, shape);
        }
    }
}

/// Write leaves into position. A scalar found above leaf depth is stored
/// at index 0 of the remaining axes.
fn fill(reference: &mut Reference, value: &Value, prefix: &mut Vec<usize>) {
    let rank = reference.rank();
    match value {
        Value::Array(items) if prefix.len() < rank => {
            for (i, item) in items.iter().enumerate() {
                prefix.push(i);
                fill(reference, item, prefix);
                prefix.pop();
            }
        }
        // An empty list at leaf depth contributes nothing
        Value::Array(_) => {}
        leaf => {
            let mut index = prefix.clone();
            index.resize(rank, 0);
            reference.set_at(&index, Some(leaf.clone()));
        }
    }
}
