//! Conjunctive and disjunctive grouping over References
//!
//! Both joins start from the Cartesian combination of their inputs. The
//! conjunctive join ([`Grouper::and_in`]) labels every combined tuple; the
//! disjunctive join ([`Grouper::or_across`]) flattens it into one list.
//! Optional `by_axes` groups then fold the axes shared by every group so
//! that values along those axes end up collected in a single cell.

use crate::{GroupingError, GroupingResult};
use infergraph_reference::{cross_product, Reference};
use serde_json::{Map, Value};

/// Pure grouping evaluator
#[derive(Debug, Default, Clone, Copy)]
pub struct Grouper;

impl Grouper {
    pub fn new() -> Self {
        Self
    }

    /// Axis names present in every input, in the order of the first input.
    pub fn find_share_axes(&self, references: &[Reference]) -> Vec<String> {
        let Some((first, rest)) = references.split_first() else {
            return Vec::new();
        };
        first
            .axes()
            .iter()
            .filter(|axis| rest.iter().all(|r| r.has_axis(axis)))
            .cloned()
            .collect()
    }

    /// Replace every present cell with the flat list of its leaves.
    ///
    /// A non-list cell becomes a one-element list.
    pub fn flatten_element(&self, reference: &Reference) -> Reference {
        reference.map(|value| {
            let mut leaves = Vec::new();
            flatten_into(value, &mut leaves);
            Some(Value::Array(leaves))
        })
    }

    /// Turn every list cell into a `label -> value` map.
    ///
    /// Cells whose length differs from `labels` (or that are not lists)
    /// become skips.
    pub fn annotate_element(&self, reference: &Reference, labels: &[String]) -> Reference {
        reference.map(|value| annotate(value, labels))
    }

    /// Conjunctive join.
    ///
    /// Computes the cross product of `references`, labels each tuple with
    /// `labels`, optionally renders `template` against the labelled map,
    /// and finally folds the axes common to every `by_axes` group. With
    /// `pop` set, the last axis of each group is excluded from that group
    /// before intersecting. Axes not named by every group are preserved.
    pub fn and_in(
        &self,
        references: &[Reference],
        labels: &[String],
        by_axes: Option<&[Vec<String>]>,
        template: Option<&str>,
        pop: bool,
    ) -> GroupingResult<Reference> {
        let combined = cross_product(references)?;
        let mut annotated = self.annotate_element(&combined, labels);
        if let Some(template) = template {
            annotated = annotated.map(|value| match value {
                Value::Object(map) => Some(Value::String(render_labelled(template, map))),
                _ => None,
            });
        }

        let fold_axes = self.fold_axes(references, &annotated, by_axes, pop)?;
        tracing::trace!(
            inputs = references.len(),
            fold = ?fold_axes,
            "and_in grouping"
        );
        let axes: Vec<&str> = fold_axes.iter().map(String::as_str).collect();
        Ok(annotated.fold(&axes)?)
    }

    /// Disjunctive join.
    ///
    /// Like [`Grouper::and_in`], but each combined tuple is flattened into
    /// a plain list instead of being labelled. A `template` is rendered
    /// once per element, substituting `{}`. Folded cells are flattened
    /// again so every cell stays a flat list.
    pub fn or_across(
        &self,
        references: &[Reference],
        by_axes: Option<&[Vec<String>]>,
        template: Option<&str>,
        pop: bool,
    ) -> GroupingResult<Reference> {
        let combined = cross_product(references)?;
        let mut flattened = self.flatten_element(&combined);
        if let Some(template) = template {
            flattened = flattened.map(|value| {
                let items = value.as_array()?;
                Some(Value::Array(
                    items
                        .iter()
                        .map(|item| Value::String(template.replace("{}", &value_text(item))))
                        .collect(),
                ))
            });
        }

        let fold_axes = self.fold_axes(references, &flattened, by_axes, pop)?;
        tracing::trace!(
            inputs = references.len(),
            fold = ?fold_axes,
            "or_across grouping"
        );
        if fold_axes.is_empty() {
            return Ok(flattened);
        }
        let axes: Vec<&str> = fold_axes.iter().map(String::as_str).collect();
        Ok(self.flatten_element(&flattened.fold(&axes)?))
    }

    /// Keep only the cells whose truth mask entry is truthy.
    ///
    /// `mask` must carry `filter_axis`. A `reference` without that axis is
    /// not filtered. Mask axes the reference lacks are reduced with
    /// "any", and positions the mask does not cover are filtered out.
    /// `null`, `false` and skip cells count as false.
    pub fn filter_by_mask(
        &self,
        reference: &Reference,
        mask: &Reference,
        filter_axis: &str,
    ) -> GroupingResult<Reference> {
        if !mask.has_axis(filter_axis) {
            return Err(GroupingError::InvalidMask(format!(
                "mask has no filter axis '{filter_axis}'"
            )));
        }
        if !reference.has_axis(filter_axis) {
            return Ok(reference.clone());
        }

        // For each mask axis, the matching axis position in the reference
        let mut links: Vec<Option<usize>> = Vec::with_capacity(mask.rank());
        for axis in mask.axes() {
            links.push(reference.position_of(axis).ok());
        }

        let truthy: Vec<(Vec<usize>, bool)> = mask
            .positions()
            .zip(mask.cells())
            .map(|(pos, cell)| (pos, is_truthy(cell.as_ref())))
            .collect();

        let filtered = reference.retain(|pos| {
            truthy.iter().any(|(mask_pos, keep)| {
                *keep
                    && links
                        .iter()
                        .zip(mask_pos)
                        .all(|(link, idx)| link.map_or(true, |p| pos[p] == *idx))
            })
        });
        tracing::trace!(
            filter_axis,
            kept = filtered.count_present(),
            total = reference.count_present(),
            "filtered by truth mask"
        );
        Ok(filtered)
    }

    fn fold_axes(
        &self,
        references: &[Reference],
        grouped: &Reference,
        by_axes: Option<&[Vec<String>]>,
        pop: bool,
    ) -> GroupingResult<Vec<String>> {
        let Some(groups) = by_axes else {
            return Ok(Vec::new());
        };
        if groups.len() != references.len() {
            return Err(GroupingError::InvalidByAxes(format!(
                "expected {} groups, found {}",
                references.len(),
                groups.len()
            )));
        }
        for (i, (group, reference)) in groups.iter().zip(references).enumerate() {
            if let Some(axis) = group.iter().find(|a| !reference.has_axis(a)) {
                return Err(GroupingError::InvalidByAxes(format!(
                    "group {i} names unknown axis '{axis}'"
                )));
            }
        }

        let trimmed: Vec<&[String]> = groups
            .iter()
            .map(|group| match (pop, group.split_last()) {
                (true, Some((_, head))) => head,
                _ => group.as_slice(),
            })
            .collect();
        let Some((first, rest)) = trimmed.split_first() else {
            return Ok(Vec::new());
        };
        Ok(first
            .iter()
            .filter(|axis| rest.iter().all(|g| g.contains(axis)))
            .filter(|axis| grouped.has_axis(axis))
            .cloned()
            .collect())
    }
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_into(item, out)),
        other => out.push(other.clone()),
    }
}

fn annotate(value: &Value, labels: &[String]) -> Option<Value> {
    let items = value.as_array()?;
    if items.len() != labels.len() {
        return None;
    }
    let map: Map<String, Value> = labels.iter().cloned().zip(items.iter().cloned()).collect();
    Some(Value::Object(map))
}

fn render_labelled(template: &str, map: &Map<String, Value>) -> String {
    map.iter().fold(template.to_string(), |text, (label, value)| {
        text.replace(&format!("{{{label}}}"), &value_text(value))
    })
}

/// Strings render raw; everything else renders as JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(cell: Option<&Value>) -> bool {
    match cell {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}
