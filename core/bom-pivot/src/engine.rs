//! FILENAME: core/bom-pivot/src/engine.rs
//! Pivot Engine - turns a request, the hierarchies and the facts into a result.
//!
//! Algorithm:
//! 1. Route the field counts to a layout; Degenerate stops here
//! 2. Filter the fact table
//! 3. Per axis: resolve visible nodes of each dimension, then combine them
//! 4. Locate every filtered record on both axes and add its measures to the
//!    cells, row totals, column totals and grand totals in a single pass
//! 5. Collect the anomalies of every stage into the result
//!
//! Step 4 gives the same numbers as calling `aggregate` once per cell, down to
//! the last bit: cells and axis totals are folded through `LeafSums` in leaf
//! pre-order. It only avoids re-scanning the facts for every intersection.

use std::mem;
use std::sync::Arc;

use bom_facts::{FactRecord, FactTable};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};

use crate::aggregate::{combination_matches, leaf_tuple, AxisSlice, LeafSums, LeafTuple, MeasureColumn};
use crate::combination::{assign_spans, generate_combinations, NodeCombination, KEY_SEPARATOR};
use crate::definition::{EngineConfig, PivotRequest};
use crate::error::PivotAnomaly;
use crate::expand::{Axis, ExpandState};
use crate::filter::{apply_filters, compile_filters, FilteredFacts};
use crate::hierarchy::{DimensionNode, Dimensions, FactKeyId, Hierarchy};
use crate::layout::{route_layout, AxisShape, LayoutKind};
use crate::logging::{log_debug, log_enter, log_exit, log_info, CAT_PIVOT};
use crate::result::{DrillDownResult, PivotResult};
use crate::visibility::resolve_visible_with_anomalies;

// ============================================================================
// AXIS PLAN
// ============================================================================

/// One axis, ready for locating records.
#[derive(Debug, Clone)]
struct AxisPlan {
    hierarchies: Vec<Arc<Hierarchy>>,

    combinations: Vec<NodeCombination>,

    truncated: bool,

    /// Per dimension: fact key -> positions of the visible nodes covering it.
    key_lookup: Vec<FxHashMap<FactKeyId, SmallVec<[u32; 2]>>>,

    /// Visible-node positions per dimension -> combination index.
    tuple_index: FxHashMap<SmallVec<[u32; 4]>, usize>,
}

impl AxisPlan {
    fn build(
        hierarchies: Vec<Arc<Hierarchy>>,
        visible: &[Vec<Arc<DimensionNode>>],
        combinations: Vec<NodeCombination>,
        truncated: bool,
    ) -> Self {
        let mut key_lookup = Vec::with_capacity(hierarchies.len());
        let mut positions: Vec<FxHashMap<&str, u32>> = Vec::with_capacity(hierarchies.len());

        for (hierarchy, nodes) in hierarchies.iter().zip(visible) {
            let mut lookup: FxHashMap<FactKeyId, SmallVec<[u32; 2]>> = FxHashMap::default();
            let mut by_id = FxHashMap::default();
            for (pos, node) in nodes.iter().enumerate() {
                let pos = pos as u32;
                by_id.entry(node.id.as_str()).or_insert(pos);
                for key in hierarchy.leaf_fact_keys(&node.id) {
                    if let Some(key_id) = hierarchy.key_id(key) {
                        let slots = lookup.entry(key_id).or_default();
                        if !slots.contains(&pos) {
                            slots.push(pos);
                        }
                    }
                }
            }
            key_lookup.push(lookup);
            positions.push(by_id);
        }

        let mut tuple_index = FxHashMap::default();
        for (ix, combination) in combinations.iter().enumerate() {
            let tuple: Option<SmallVec<[u32; 4]>> = combination
                .nodes
                .iter()
                .zip(&positions)
                .map(|(node, by_id)| by_id.get(node.id.as_str()).copied())
                .collect();
            if let Some(tuple) = tuple {
                tuple_index.entry(tuple).or_insert(ix);
            }
        }

        AxisPlan {
            hierarchies,
            combinations,
            truncated,
            key_lookup,
            tuple_index,
        }
    }

    fn len(&self) -> usize {
        self.combinations.len()
    }

    /// Keeps the first `keep` combinations.
    fn truncate(&mut self, keep: usize) {
        self.combinations.truncate(keep);
        self.truncated = true;
        assign_spans(&mut self.combinations);
    }

    /// Indices of the combinations `record` falls under. At most one on a
    /// well-formed hierarchy, since visible nodes never overlap.
    fn locate(&self, record: &FactRecord) -> SmallVec<[usize; 2]> {
        if self.hierarchies.is_empty() {
            return if self.combinations.is_empty() {
                SmallVec::new()
            } else {
                smallvec![0]
            };
        }

        let mut choices: SmallVec<[&[u32]; 4]> = SmallVec::new();
        for (hierarchy, lookup) in self.hierarchies.iter().zip(&self.key_lookup) {
            let key = match record.key_of(hierarchy.fact_field()) {
                Some(key) => key,
                None => return SmallVec::new(),
            };
            match hierarchy.key_id(&key).and_then(|id| lookup.get(&id)) {
                Some(slots) => choices.push(slots.as_slice()),
                None => return SmallVec::new(),
            }
        }

        let mut found = SmallVec::new();
        let mut cursor: SmallVec<[usize; 4]> = smallvec![0; choices.len()];
        loop {
            let tuple: SmallVec<[u32; 4]> = choices
                .iter()
                .zip(&cursor)
                .map(|(slots, &i)| slots[i])
                .collect();
            if let Some(&ix) = self.tuple_index.get(&tuple) {
                if ix < self.combinations.len() {
                    found.push(ix);
                }
            }

            let mut dim = choices.len();
            loop {
                if dim == 0 {
                    return found;
                }
                dim -= 1;
                cursor[dim] += 1;
                if cursor[dim] < choices[dim].len() {
                    break;
                }
                cursor[dim] = 0;
            }
        }
    }
}

/// Hierarchies an axis draws from under `shape`.
///
/// A `Total` axis uses none of its fields and a `Single` axis only the first.
/// Fields that name no hierarchy are skipped with a structural anomaly.
pub(crate) fn axis_hierarchies(
    fields: &[String],
    shape: AxisShape,
    dims: &Dimensions,
) -> (Vec<Arc<Hierarchy>>, Vec<PivotAnomaly>) {
    let take = match shape {
        AxisShape::Total => 0,
        AxisShape::Single => 1,
        AxisShape::Multi => fields.len(),
    };

    let mut hierarchies = Vec::with_capacity(take);
    let mut anomalies = Vec::new();
    for field in fields.iter().take(take) {
        match dims.get(field) {
            Some(hierarchy) => hierarchies.push(Arc::clone(hierarchy)),
            None => anomalies.push(
                PivotAnomaly::structural(field, "no hierarchy for dimension field; skipped").logged(),
            ),
        }
    }
    (hierarchies, anomalies)
}

fn axis_fields(request: &PivotRequest, axis: Axis) -> &[String] {
    match axis {
        Axis::Row => &request.row_fields,
        Axis::Column => &request.column_fields,
    }
}

// ============================================================================
// PIVOT CALCULATOR
// ============================================================================

/// One recomputation over borrowed inputs.
pub struct PivotCalculator<'a> {
    request: &'a PivotRequest,
    dims: &'a Dimensions,
    facts: &'a FactTable,
    expand: &'a ExpandState,
    config: &'a EngineConfig,

    /// Anomalies collected so far.
    anomalies: Vec<PivotAnomaly>,

    /// Hierarchies whose build anomalies were already reported.
    reported: FxHashSet<String>,
}

impl<'a> PivotCalculator<'a> {
    pub fn new(
        request: &'a PivotRequest,
        dims: &'a Dimensions,
        facts: &'a FactTable,
        expand: &'a ExpandState,
        config: &'a EngineConfig,
    ) -> Self {
        PivotCalculator {
            request,
            dims,
            facts,
            expand,
            config,
            anomalies: Vec::new(),
            reported: FxHashSet::default(),
        }
    }

    /// Executes the full calculation.
    pub fn calculate(&mut self) -> PivotResult {
        let (rows, columns, values) = self.request.field_counts();
        log_enter!(CAT_PIVOT, "calculate", "rows={} columns={} values={}", rows, columns, values);

        // Step 1: Route
        let (layout, anomaly) = route_layout(rows, columns, values);
        self.anomalies.extend(anomaly);
        let (row_shape, column_shape) = match (layout.row_shape(), layout.column_shape()) {
            (Some(row_shape), Some(column_shape)) => (row_shape, column_shape),
            _ => {
                log_exit!(CAT_PIVOT, "calculate", "layout={} nothing to render", layout.name());
                return PivotResult {
                    anomalies: mem::take(&mut self.anomalies),
                    ..PivotResult::empty(layout)
                };
            }
        };

        // Step 2: Filter
        let facts = self.filter();

        // Step 3: Axes
        let mut row_plan = self.plan_axis(Axis::Row, row_shape);
        let column_plan = self.plan_axis(Axis::Column, column_shape);
        self.enforce_cell_limit(&mut row_plan, column_plan.len());

        // Step 4: Aggregate
        let measures: Vec<MeasureColumn> = self
            .request
            .value_fields
            .iter()
            .map(|field| MeasureColumn::read(&facts, field))
            .collect();
        let mut result = self.accumulate(layout, &facts, &row_plan, &column_plan, &measures);
        result.truncated = row_plan.truncated || column_plan.truncated;
        result.row_combinations = row_plan.combinations;
        result.column_combinations = column_plan.combinations;

        // Step 5: Anomalies
        for measure in measures {
            self.anomalies.extend(measure.into_anomalies());
        }
        result.anomalies = mem::take(&mut self.anomalies);

        log_info!(
            CAT_PIVOT,
            "{}: {} row(s) x {} column(s) x {} measure(s) over {} record(s), {} anomal(ies)",
            layout.name(),
            result.row_count(),
            result.column_count(),
            result.measure_count(),
            result.filtered_record_count,
            result.anomalies.len()
        );
        log_exit!(CAT_PIVOT, "calculate");
        result
    }

    fn filter(&mut self) -> FilteredFacts<'a> {
        let (filters, anomalies) = compile_filters(&self.request.active_filters, self.dims);
        self.anomalies.extend(anomalies);
        apply_filters(self.facts, &filters)
    }

    fn plan_axis(&mut self, axis: Axis, shape: AxisShape) -> AxisPlan {
        let (hierarchies, anomalies) = axis_hierarchies(axis_fields(self.request, axis), shape, self.dims);
        self.anomalies.extend(anomalies);

        let mut visible = Vec::with_capacity(hierarchies.len());
        for hierarchy in &hierarchies {
            if self.reported.insert(hierarchy.name().to_string()) {
                self.anomalies.extend(hierarchy.anomalies().iter().cloned());
            }
            let (nodes, anomalies) = resolve_visible_with_anomalies(hierarchy, axis, self.expand);
            self.anomalies.extend(anomalies);
            visible.push(nodes);
        }

        let set = generate_combinations(axis, &visible, &self.config.fan_out);
        self.anomalies.extend(set.anomalies);

        log_debug!(
            CAT_PIVOT,
            "{} axis: {:?} over {} dimension(s) -> {} combination(s)",
            axis.as_str(),
            shape,
            hierarchies.len(),
            set.combinations.len()
        );
        AxisPlan::build(hierarchies, &visible, set.combinations, set.truncated)
    }

    /// Cuts rows so that rows x columns x measures stays within `max_cells`.
    fn enforce_cell_limit(&mut self, row_plan: &mut AxisPlan, column_count: usize) {
        let per_row = column_count.saturating_mul(self.request.value_fields.len());
        if per_row == 0 {
            return;
        }
        let max_cells = self.config.fan_out.max_cells;
        if row_plan.len().saturating_mul(per_row) <= max_cells {
            return;
        }
        let keep = max_cells / per_row;
        self.anomalies.push(
            PivotAnomaly::capacity(format!(
                "{} row(s) x {} cell(s) per row exceeds {} cells; keeping {} row(s)",
                row_plan.len(),
                per_row,
                max_cells,
                keep
            ))
            .logged(),
        );
        row_plan.truncate(keep);
    }

    fn accumulate(
        &self,
        layout: LayoutKind,
        facts: &FilteredFacts<'_>,
        row_plan: &AxisPlan,
        column_plan: &AxisPlan,
        measures: &[MeasureColumn],
    ) -> PivotResult {
        let row_count = row_plan.len();
        let column_count = column_plan.len();
        let measure_count = measures.len();
        let totals = self.config.compute_totals;

        let mut values = vec![0.0; row_count * column_count * measure_count];
        let mut row_totals = vec![0.0; if totals { row_count * measure_count } else { 0 }];
        let mut column_totals = vec![0.0; if totals { column_count * measure_count } else { 0 }];
        let mut grand_totals = vec![0.0; if totals { measure_count } else { 0 }];

        let mut cell_sums = LeafSums::default();
        let mut row_sums = LeafSums::default();
        let mut column_sums = LeafSums::default();

        for (ix, record) in facts.iter() {
            let rows = row_plan.locate(record);
            let columns = column_plan.locate(record);
            let row_leaves = leaf_tuple(record, &row_plan.hierarchies).unwrap_or_default();
            let column_leaves = leaf_tuple(record, &column_plan.hierarchies).unwrap_or_default();
            let cell_leaves: LeafTuple = row_leaves.iter().chain(&column_leaves).copied().collect();

            for (m, measure) in measures.iter().enumerate() {
                let value = measure.get(ix);
                if value == 0.0 {
                    continue;
                }
                for &r in &rows {
                    for &c in &columns {
                        cell_sums.add((r * column_count + c) * measure_count + m, cell_leaves.clone(), value);
                    }
                }
                if totals {
                    grand_totals[m] += value;
                    for &r in &rows {
                        row_sums.add(r * measure_count + m, row_leaves.clone(), value);
                    }
                    for &c in &columns {
                        column_sums.add(c * measure_count + m, column_leaves.clone(), value);
                    }
                }
            }
        }

        cell_sums.fold_into(&mut values);
        row_sums.fold_into(&mut row_totals);
        column_sums.fold_into(&mut column_totals);

        PivotResult {
            layout,
            measures: self.request.value_fields.clone(),
            values,
            row_totals,
            column_totals,
            grand_totals,
            filtered_record_count: facts.len(),
            ..PivotResult::default()
        }
    }
}

/// Computes the pivot for one snapshot of the inputs.
pub fn compute_pivot(
    request: &PivotRequest,
    dims: &Dimensions,
    facts: &FactTable,
    expand: &ExpandState,
    config: &EngineConfig,
) -> PivotResult {
    PivotCalculator::new(request, dims, facts, expand, config).calculate()
}

// ============================================================================
// DRILL-DOWN
// ============================================================================

/// Rebuilds the combination behind `key` on `axis`, if every node in it is
/// currently visible.
pub(crate) fn combination_for_key(
    key: &str,
    hierarchies: &[Arc<Hierarchy>],
    axis: Axis,
    expand: &ExpandState,
) -> Option<NodeCombination> {
    if hierarchies.is_empty() {
        return key.is_empty().then(NodeCombination::total);
    }

    let ids: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    if ids.len() != hierarchies.len() {
        return None;
    }

    let mut nodes: SmallVec<[Arc<DimensionNode>; 4]> = SmallVec::new();
    for (id, hierarchy) in ids.into_iter().zip(hierarchies) {
        let (visible, _) = resolve_visible_with_anomalies(hierarchy, axis, expand);
        let node = visible.into_iter().find(|n| n.id == id)?;
        nodes.push(node);
    }
    Some(NodeCombination::new(nodes))
}

/// The filtered fact records behind the cell at (`row_key`, `column_key`).
///
/// Keys that do not name a currently visible combination yield an empty
/// result.
pub fn drill_down(
    request: &PivotRequest,
    dims: &Dimensions,
    facts: &FactTable,
    expand: &ExpandState,
    row_key: &str,
    column_key: &str,
    max_records: usize,
) -> DrillDownResult {
    let mut result = DrillDownResult::new(row_key, column_key, max_records);

    let (rows, columns, values) = request.field_counts();
    let (layout, _) = route_layout(rows, columns, values);
    let (row_shape, column_shape) = match (layout.row_shape(), layout.column_shape()) {
        (Some(row_shape), Some(column_shape)) => (row_shape, column_shape),
        _ => return result,
    };

    let (row_hierarchies, _) = axis_hierarchies(&request.row_fields, row_shape, dims);
    let (column_hierarchies, _) = axis_hierarchies(&request.column_fields, column_shape, dims);
    let row = combination_for_key(row_key, &row_hierarchies, Axis::Row, expand);
    let column = combination_for_key(column_key, &column_hierarchies, Axis::Column, expand);
    let (row, column) = match (row, column) {
        (Some(row), Some(column)) => (row, column),
        _ => {
            log_debug!(CAT_PIVOT, "drill-down on unknown cell ({}, {})", row_key, column_key);
            return result;
        }
    };

    let (filters, _) = compile_filters(&request.active_filters, dims);
    let filtered = apply_filters(facts, &filters);
    let row_slice = AxisSlice::new(&row, &row_hierarchies);
    let column_slice = AxisSlice::new(&column, &column_hierarchies);

    for (ix, record) in filtered.iter() {
        if combination_matches(record, &row_slice) && combination_matches(record, &column_slice) {
            result.total_count += 1;
            if result.record_indices.len() < max_records {
                result.record_indices.push(ix);
            }
        }
    }
    result.is_truncated = result.total_count > max_records;
    result
}
