//! The [`Reference`] container: named axes over a rectangular cell grid
//!
//! A Reference stores its cells densely in row-major order. Raggedness in
//! the source data is represented by *skip* cells (`None`), so every
//! position addressed by the shape exists. All public operations return
//! new References; `set` is the only mutating operation and is meant for
//! construction.

use crate::iter::{strides, volume, Positions};
use crate::{ReferenceError, ReferenceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Placeholder axis carried by References that have no real dimension.
pub const NONE_AXIS: &str = "_none_axis";

/// One tensor cell. `None` is a skip marker: the position exists in the
/// shape but holds no value.
pub type Cell = Option<Value>;

/// Selects along one axis in [`Reference::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Resolve the axis to a single index (the axis is removed)
    Index(usize),
    /// Keep the whole axis
    All,
}

/// Named-axis, internally rectangular value container
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReference", into = "RawReference")]
pub struct Reference {
    axes: Vec<String>,
    shape: Vec<usize>,
    cells: Vec<Cell>,
}

impl Reference {
    /// Construct a Reference filled with `initial`.
    ///
    /// An empty axis list produces the placeholder form (`[NONE_AXIS]`, shape `[1]`).
    pub fn new<A, S>(axes: A, shape: Vec<usize>, initial: Cell) -> ReferenceResult<Self>
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let axes: Vec<String> = axes.into_iter().map(Into::into).collect();
        let cells = vec![initial; volume(&shape)];
        Self::from_cells(axes, shape, cells)
    }

    /// Construct a Reference from cells laid out in row-major order.
    pub fn from_cells(
        axes: Vec<String>,
        shape: Vec<usize>,
        cells: Vec<Cell>,
    ) -> ReferenceResult<Self> {
        if axes.len() != shape.len() {
            return Err(ReferenceError::AxisShapeMismatch {
                axes: axes.len(),
                shape: shape.len(),
            });
        }
        let mut seen = HashSet::new();
        for axis in &axes {
            if !seen.insert(axis.as_str()) {
                return Err(ReferenceError::DuplicateAxis(axis.clone()));
            }
        }
        let expected = volume(&shape);
        if cells.len() != expected {
            return Err(ReferenceError::CellCountMismatch {
                shape,
                expected,
                found: cells.len(),
            });
        }

        if axes.is_empty() {
            return Ok(Self {
                axes: vec![NONE_AXIS.to_string()],
                shape: vec![1],
                cells,
            });
        }

        Ok(Self { axes, shape, cells })
    }

    /// A single present value on the placeholder axis
    pub fn scalar(value: Value) -> Self {
        Self {
            axes: vec![NONE_AXIS.to_string()],
            shape: vec![1],
            cells: vec![Some(value)],
        }
    }

    /// A single skip cell on the placeholder axis
    pub fn skip() -> Self {
        Self {
            axes: vec![NONE_AXIS.to_string()],
            shape: vec![1],
            cells: vec![None],
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn axes(&self) -> &[String] {
        &self.axes
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Cells in row-major order
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn rank(&self) -> usize {
        self.axes.len()
    }

    /// Total number of positions, present or skipped
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the shape addresses no positions at all
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn has_axis(&self, axis: &str) -> bool {
        self.axes.iter().any(|a| a == axis)
    }

    /// True when the only axis is the placeholder axis
    pub fn is_placeholder(&self) -> bool {
        self.axes.len() == 1 && self.axes[0] == NONE_AXIS
    }

    /// Position of an axis in [`axes`](Self::axes)
    pub fn position_of(&self, axis: &str) -> ReferenceResult<usize> {
        self.axes
            .iter()
            .position(|a| a == axis)
            .ok_or_else(|| ReferenceError::UnknownAxis(axis.to_string()))
    }

    pub fn size_of(&self, axis: &str) -> ReferenceResult<usize> {
        Ok(self.shape[self.position_of(axis)?])
    }

    /// Number of present (non-skip) cells
    pub fn count_present(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Present values in row-major order
    pub fn present_values(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().filter_map(Option::as_ref)
    }

    /// Every index tuple of this Reference in row-major order
    pub fn positions(&self) -> Positions {
        Positions::new(&self.shape)
    }

    /// Cell at a full positional index
    pub fn cell(&self, index: &[usize]) -> Option<&Cell> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, s)| i >= s) {
            return None;
        }
        self.cells.get(self.offset(index))
    }

    // ── Positional access ────────────────────────────────────────────

    /// Write one cell. Axes of size 1 may be omitted from `index`.
    pub fn set(&mut self, value: Cell, index: &[(&str, usize)]) -> ReferenceResult<()> {
        let full = self.full_index(index)?;
        let offset = self.offset(&full);
        self.cells[offset] = value;
        Ok(())
    }

    /// Read one cell. Axes of size 1 may be omitted from `index`.
    pub fn value(&self, index: &[(&str, usize)]) -> ReferenceResult<&Cell> {
        let full = self.full_index(index)?;
        Ok(&self.cells[self.offset(&full)])
    }

    /// Sub-tensor selection.
    ///
    /// Axes given [`Selector::Index`] are resolved and removed; every other
    /// axis (named with [`Selector::All`] or not named at all) is kept in
    /// its original order.
    pub fn get(&self, selectors: &[(&str, Selector)]) -> ReferenceResult<Reference> {
        let mut fixed: Vec<Option<usize>> = vec![None; self.rank()];
        for (axis, selector) in selectors {
            let pos = self.position_of(axis)?;
            if let Selector::Index(i) = selector {
                self.check_bounds(pos, *i)?;
                fixed[pos] = Some(*i);
            }
        }

        let keep: Vec<usize> = (0..self.rank()).filter(|p| fixed[*p].is_none()).collect();
        let axes: Vec<String> = keep.iter().map(|p| self.axes[*p].clone()).collect();
        let shape: Vec<usize> = keep.iter().map(|p| self.shape[*p]).collect();

        let mut full = vec![0; self.rank()];
        for (p, f) in fixed.iter().enumerate() {
            if let Some(i) = f {
                full[p] = *i;
            }
        }

        let mut cells = Vec::with_capacity(volume(&shape));
        for pos in Positions::new(&shape) {
            for (k, p) in keep.iter().enumerate() {
                full[*p] = pos[k];
            }
            cells.push(self.cells[self.offset(&full)].clone());
        }

        Reference::from_cells(axes, shape, cells)
    }

    // ── Projection ───────────────────────────────────────────────────

    /// Project onto exactly the named axes, in argument order.
    ///
    /// Dropped axes must already be resolved (size 1, read at index 0) or
    /// empty (size 0, every result cell is a skip). Dropping a larger axis
    /// is ambiguous and fails.
    pub fn slice(&self, axes: &[&str]) -> ReferenceResult<Reference> {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(axes.len());
        for axis in axes {
            if !seen.insert(*axis) {
                return Err(ReferenceError::DuplicateAxis(axis.to_string()));
            }
            order.push(self.position_of(axis)?);
        }

        let mut dropped_empty = false;
        for (p, axis) in self.axes.iter().enumerate() {
            if order.contains(&p) {
                continue;
            }
            match self.shape[p] {
                0 => dropped_empty = true,
                1 => {}
                size => {
                    return Err(ReferenceError::AmbiguousSlice {
                        axis: axis.clone(),
                        size,
                    })
                }
            }
        }

        let new_axes: Vec<String> = order.iter().map(|p| self.axes[*p].clone()).collect();
        let shape: Vec<usize> = order.iter().map(|p| self.shape[*p]).collect();

        let mut full = vec![0; self.rank()];
        let mut cells = Vec::with_capacity(volume(&shape));
        for pos in Positions::new(&shape) {
            if dropped_empty {
                cells.push(None);
                continue;
            }
            for (k, p) in order.iter().enumerate() {
                full[*p] = pos[k];
            }
            cells.push(self.cells[self.offset(&full)].clone());
        }

        Reference::from_cells(new_axes, shape, cells)
    }

    /// Read-only view of the shape, reordered or restricted to `axis_list`.
    /// `None` returns the full shape unchanged.
    pub fn shape_view(&self, axis_list: Option<&[&str]>) -> ReferenceResult<Vec<usize>> {
        match axis_list {
            None => Ok(self.shape.clone()),
            Some(list) => list.iter().map(|axis| self.size_of(axis)).collect(),
        }
    }

    /// Collapse the named axes into list-valued cells.
    ///
    /// Each remaining position collects the present values found along the
    /// folded axes (row-major). A position with nothing present becomes a
    /// skip. Folding every axis leaves the placeholder axis.
    pub fn fold(&self, axes: &[&str]) -> ReferenceResult<Reference> {
        if axes.is_empty() {
            return Ok(self.clone());
        }

        let mut folded = vec![false; self.rank()];
        for axis in axes {
            let pos = self.position_of(axis)?;
            if folded[pos] {
                return Err(ReferenceError::DuplicateAxis(axis.to_string()));
            }
            folded[pos] = true;
        }

        let keep: Vec<usize> = (0..self.rank()).filter(|p| !folded[*p]).collect();
        let inner: Vec<usize> = (0..self.rank()).filter(|p| folded[*p]).collect();
        let inner_shape: Vec<usize> = inner.iter().map(|p| self.shape[*p]).collect();

        let new_axes: Vec<String> = keep.iter().map(|p| self.axes[*p].clone()).collect();
        let shape: Vec<usize> = keep.iter().map(|p| self.shape[*p]).collect();

        let mut full = vec![0; self.rank()];
        let mut cells = Vec::with_capacity(volume(&shape));
        for pos in Positions::new(&shape) {
            for (k, p) in keep.iter().enumerate() {
                full[*p] = pos[k];
            }
            let mut collected = Vec::new();
            for inner_pos in Positions::new(&inner_shape) {
                for (k, p) in inner.iter().enumerate() {
                    full[*p] = inner_pos[k];
                }
                if let Some(value) = &self.cells[self.offset(&full)] {
                    collected.push(value.clone());
                }
            }
            cells.push(if collected.is_empty() {
                None
            } else {
                Some(Value::Array(collected))
            });
        }

        Reference::from_cells(new_axes, shape, cells)
    }

    /// Transform every present cell; skips stay skips.
    pub fn map<F>(&self, mut f: F) -> Reference
    where
        F: FnMut(&Value) -> Cell,
    {
        Self {
            axes: self.axes.clone(),
            shape: self.shape.clone(),
            cells: self
                .cells
                .iter()
                .map(|c| c.as_ref().and_then(&mut f))
                .collect(),
        }
    }

    /// Turn cells into skips wherever `keep` returns false for the position.
    pub fn retain<F>(&self, mut keep: F) -> Reference
    where
        F: FnMut(&[usize]) -> bool,
    {
        let cells = self
            .positions()
            .zip(&self.cells)
            .map(|(pos, cell)| if keep(&pos) { cell.clone() } else { None })
            .collect();
        Self {
            axes: self.axes.clone(),
            shape: self.shape.clone(),
            cells,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Positional write; `index` must be in bounds.
    pub(crate) fn set_at(&mut self, index: &[usize], cell: Cell) {
        let offset = self.offset(index);
        self.cells[offset] = cell;
    }

    pub(crate) fn offset(&self, index: &[usize]) -> usize {
        strides(&self.shape)
            .iter()
            .zip(index)
            .map(|(s, i)| s * i)
            .sum()
    }

    fn check_bounds(&self, pos: usize, index: usize) -> ReferenceResult<()> {
        if index >= self.shape[pos] {
            return Err(ReferenceError::IndexOutOfBounds {
                axis: self.axes[pos].clone(),
                index,
                size: self.shape[pos],
            });
        }
        Ok(())
    }

    fn full_index(&self, index: &[(&str, usize)]) -> ReferenceResult<Vec<usize>> {
        let mut full: Vec<Option<usize>> = vec![None; self.rank()];
        for (axis, i) in index {
            let pos = self.position_of(axis)?;
            self.check_bounds(pos, *i)?;
            full[pos] = Some(*i);
        }
        full.iter()
            .enumerate()
            .map(|(p, i)| match i {
                Some(i) => Ok(*i),
                None if self.shape[p] == 1 => Ok(0),
                None => Err(ReferenceError::IncompleteIndex(self.axes[p].clone())),
            })
            .collect()
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self
            .axes
            .iter()
            .zip(&self.shape)
            .map(|(a, s)| format!("{a}={s}"))
            .collect();
        write!(
            f,
            "Reference[{}] ({}/{} present)",
            dims.join(", "),
            self.count_present(),
            self.len()
        )
    }
}

// ── Serialization ────────────────────────────────────────────────────

/// Wire form: dense values plus the offsets of skip cells, so a present
/// JSON `null` is never confused with a skip.
#[derive(Serialize, Deserialize)]
struct RawReference {
    axes: Vec<String>,
    shape: Vec<usize>,
    values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<usize>,
}

impl From<Reference> for RawReference {
    fn from(reference: Reference) -> Self {
        let mut skipped = Vec::new();
        let values = reference
            .cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                cell.unwrap_or_else(|| {
                    skipped.push(i);
                    Value::Null
                })
            })
            .collect();
        Self {
            axes: reference.axes,
            shape: reference.shape,
            values,
            skipped,
        }
    }
}

impl TryFrom<RawReference> for Reference {
    type Error = ReferenceError;

    fn try_from(raw: RawReference) -> ReferenceResult<Self> {
        let mut cells: Vec<Cell> = raw.values.into_iter().map(Some).collect();
        for i in raw.skipped {
            if let Some(cell) = cells.get_mut(i) {
                *cell = None;
            }
        }
        Reference::from_cells(raw.axes, raw.shape, cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid() -> Reference {
        // a=2, b=3 with values 0..6
        let cells = (0..6).map(|i| Some(json!(i))).collect();
        Reference::from_cells(vec!["a".into(), "b".into()], vec![2, 3], cells).unwrap()
    }

    #[test]
    fn test_construct_validates_axes() {
        let err = Reference::new(["a", "b"], vec![2], None).unwrap_err();
        assert_eq!(err, ReferenceError::AxisShapeMismatch { axes: 2, shape: 1 });

        let err = Reference::new(["a", "a"], vec![2, 2], None).unwrap_err();
        assert_eq!(err, ReferenceError::DuplicateAxis("a".into()));
    }

    #[test]
    fn test_construct_prefilled() {
        let r = Reference::new(["x"], vec![3], Some(json!("hi"))).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.count_present(), 3);

        let empty = Reference::new(["x"], vec![3], None).unwrap();
        assert_eq!(empty.count_present(), 0);
    }

    #[test]
    fn test_empty_axes_become_placeholder() {
        let r = Reference::new(Vec::<String>::new(), vec![], Some(json!(1))).unwrap();
        assert!(r.is_placeholder());
        assert_eq!(r.shape(), &[1]);
    }

    #[test]
    fn test_set_and_value() {
        let mut r = Reference::new(["a", "b"], vec![2, 2], None).unwrap();
        r.set(Some(json!("x")), &[("a", 1), ("b", 0)]).unwrap();
        assert_eq!(r.value(&[("a", 1), ("b", 0)]).unwrap(), &Some(json!("x")));
        assert_eq!(r.value(&[("a", 0), ("b", 0)]).unwrap(), &None);

        let err = r.set(None, &[("a", 0)]).unwrap_err();
        assert_eq!(err, ReferenceError::IncompleteIndex("b".into()));

        let err = r.set(None, &[("a", 5), ("b", 0)]).unwrap_err();
        assert!(matches!(err, ReferenceError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_scalar_set_without_index() {
        let mut r = Reference::skip();
        r.set(Some(json!(7)), &[]).unwrap();
        assert_eq!(r, Reference::scalar(json!(7)));
    }

    #[test]
    fn test_get_index_removes_axis() {
        let r = grid();
        let row = r.get(&[("a", Selector::Index(1))]).unwrap();
        assert_eq!(row.axes(), &["b".to_string()]);
        assert_eq!(
            row.cells(),
            &[Some(json!(3)), Some(json!(4)), Some(json!(5))]
        );

        let col = r
            .get(&[("a", Selector::All), ("b", Selector::Index(2))])
            .unwrap();
        assert_eq!(col.axes(), &["a".to_string()]);
        assert_eq!(col.cells(), &[Some(json!(2)), Some(json!(5))]);
    }

    #[test]
    fn test_get_all_resolved_is_placeholder() {
        let r = grid();
        let one = r
            .get(&[("a", Selector::Index(0)), ("b", Selector::Index(1))])
            .unwrap();
        assert!(one.is_placeholder());
        assert_eq!(one.cells(), &[Some(json!(1))]);
    }

    #[test]
    fn test_slice_reorders() {
        let r = grid();
        let t = r.slice(&["b", "a"]).unwrap();
        assert_eq!(t.axes(), &["b".to_string(), "a".to_string()]);
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.value(&[("b", 2), ("a", 1)]).unwrap(), &Some(json!(5)));
    }

    #[test]
    fn test_slice_drops_resolved_axis() {
        let r = Reference::from_cells(
            vec!["a".into(), "b".into()],
            vec![1, 2],
            vec![Some(json!(1)), Some(json!(2))],
        )
        .unwrap();
        let s = r.slice(&["b"]).unwrap();
        assert_eq!(s.axes(), &["b".to_string()]);
        assert_eq!(s.cells(), &[Some(json!(1)), Some(json!(2))]);
    }

    #[test]
    fn test_slice_ambiguous_fails() {
        let err = grid().slice(&["a"]).unwrap_err();
        assert_eq!(
            err,
            ReferenceError::AmbiguousSlice {
                axis: "b".into(),
                size: 3
            }
        );
    }

    #[test]
    fn test_slice_idempotent() {
        let r = grid();
        let once = r.slice(&["b", "a"]).unwrap();
        assert_eq!(once.slice(&["b", "a"]).unwrap(), once);
    }

    #[test]
    fn test_shape_view() {
        let r = grid();
        assert_eq!(r.shape_view(None).unwrap(), vec![2, 3]);
        assert_eq!(r.shape_view(Some(&["b", "a"][..])).unwrap(), vec![3, 2]);
        assert_eq!(r.shape_view(Some(&["b"][..])).unwrap(), vec![3]);
        assert!(r.shape_view(Some(&["z"][..])).is_err());
    }

    #[test]
    fn test_fold_collects_along_axis() {
        let mut r = grid();
        r.set(None, &[("a", 1), ("b", 1)]).unwrap();
        let folded = r.fold(&["b"]).unwrap();
        assert_eq!(folded.axes(), &["a".to_string()]);
        assert_eq!(
            folded.cells(),
            &[Some(json!([0, 1, 2])), Some(json!([3, 5]))]
        );

        let all = r.fold(&["a", "b"]).unwrap();
        assert!(all.is_placeholder());
        assert_eq!(all.cells(), &[Some(json!([0, 1, 2, 3, 5]))]);
    }

    #[test]
    fn test_fold_all_skips_is_skip() {
        let r = Reference::new(["a", "b"], vec![2, 2], None).unwrap();
        let folded = r.fold(&["b"]).unwrap();
        assert_eq!(folded.cells(), &[None, None]);
    }

    #[test]
    fn test_map_and_retain() {
        let r = grid();
        let doubled = r.map(|v| v.as_i64().map(|n| json!(n * 2)));
        assert_eq!(doubled.value(&[("a", 1), ("b", 2)]).unwrap(), &Some(json!(10)));

        let evens = r.retain(|pos| pos[1] % 2 == 0);
        assert_eq!(evens.count_present(), 4);
        assert_eq!(evens.value(&[("a", 0), ("b", 1)]).unwrap(), &None);
    }

    #[test]
    fn test_serde_distinguishes_null_from_skip() {
        let r = Reference::from_cells(
            vec!["x".into()],
            vec![3],
            vec![Some(Value::Null), None, Some(json!("v"))],
        )
        .unwrap();
        let text = serde_json::to_string(&r).unwrap();
        let back: Reference = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_deserialize_rejects_bad_shape() {
        let bad = json!({"axes": ["x"], "shape": [3], "values": [1, 2]});
        assert!(serde_json::from_value::<Reference>(bad).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(grid().to_string(), "Reference[a=2, b=3] (6/6 present)");
    }
}
