//! Combining References: Cartesian products and positional maps

use crate::iter::{volume, Positions};
use crate::reference::{Cell, NONE_AXIS};
use crate::{Reference, ReferenceError, ReferenceResult};
use serde_json::Value;

/// Cartesian combination of References.
///
/// Axes with the same name are unified; axes unique to one input are
/// appended in input order. Each result cell is a list holding one value
/// per input (in input order). If any contributing cell is a skip, or an
/// input is shorter than the unified axis, the result cell is a skip.
///
/// The placeholder axis is dropped from inputs as soon as any input has a
/// real axis, and kept when it is the only axis present.
pub fn cross_product(references: &[Reference]) -> ReferenceResult<Reference> {
    if references.is_empty() {
        return Err(ReferenceError::NoReferences);
    }

    let any_real = references
        .iter()
        .any(|r| r.axes().iter().any(|a| a != NONE_AXIS));

    let mut axes: Vec<String> = Vec::new();
    let mut shape: Vec<usize> = Vec::new();
    // For each input, where each of its axes lands in the result
    let mut mappings: Vec<Vec<Option<usize>>> = Vec::with_capacity(references.len());

    for reference in references {
        let mut mapping = Vec::with_capacity(reference.rank());
        for (axis, size) in reference.axes().iter().zip(reference.shape()) {
            if any_real && axis == NONE_AXIS && *size <= 1 {
                mapping.push(None);
                continue;
            }
            match axes.iter().position(|a| a == axis) {
                Some(pos) => {
                    shape[pos] = shape[pos].max(*size);
                    mapping.push(Some(pos));
                }
                None => {
                    axes.push(axis.clone());
                    shape.push(*size);
                    mapping.push(Some(axes.len() - 1));
                }
            }
        }
        mappings.push(mapping);
    }

    let mut cells = Vec::with_capacity(volume(&shape));
    let mut scratch: Vec<Vec<usize>> = references.iter().map(|r| vec![0; r.rank()]).collect();

    for pos in Positions::new(&shape) {
        let mut combined = Vec::with_capacity(references.len());
        for (i, reference) in references.iter().enumerate() {
            let index = &mut scratch[i];
            for (k, target) in mappings[i].iter().enumerate() {
                index[k] = target.map(|t| pos[t]).unwrap_or(0);
            }
            match reference.cell(index) {
                Some(Some(value)) => combined.push(value.clone()),
                _ => break,
            }
        }
        cells.push(if combined.len() == references.len() {
            Some(Value::Array(combined))
        } else {
            None
        });
    }

    Reference::from_cells(axes, shape, cells)
}

/// Apply `f` position by position across References of identical axes and
/// shape. A position where any input is a skip stays a skip and `f` is not
/// called for it.
pub fn element_action<F>(mut f: F, references: &[Reference]) -> ReferenceResult<Reference>
where
    F: FnMut(&[&Value]) -> Cell,
{
    let first = references.first().ok_or(ReferenceError::NoReferences)?;
    for other in &references[1..] {
        if other.axes() != first.axes() || other.shape() != first.shape() {
            return Err(ReferenceError::ShapeMismatch {
                expected_axes: first.axes().to_vec(),
                expected: first.shape().to_vec(),
                found_axes: other.axes().to_vec(),
                found: other.shape().to_vec(),
            });
        }
    }

    let mut args: Vec<&Value> = Vec::with_capacity(references.len());
    let cells = (0..first.len())
        .map(|offset| {
            args.clear();
            for reference in references {
                match &reference.cells()[offset] {
                    Some(value) => args.push(value),
                    None => return None,
                }
            }
            f(&args)
        })
        .collect();

    Reference::from_cells(first.axes().to_vec(), first.shape().to_vec(), cells)
}
