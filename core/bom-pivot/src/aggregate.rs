//! FILENAME: core/bom-pivot/src/aggregate.rs
//! Aggregation Engine - sums a measure over the records behind a cell.
//!
//! A record belongs to a combination when, for every node in it, the record's
//! key in that node's dimension is one of the node's descendant leaf keys. A
//! cell is the intersection of a row and a column combination. The only
//! reducer is sum, so a collapsed node always shows exactly the total of
//! every leaf below it, visible or not.
//!
//! Two paths compute the same number:
//! - `aggregate` tests membership against the precomputed leaf-key sets;
//! - `aggregate_by_leaf_rollup` walks the tree live and sums leaf by leaf.
//!
//! Both, and the engine's single pass, fold a cell in one fixed order: the
//! records of one leaf tuple in table order, then the leaf tuples in
//! pre-order. The results are therefore bit-identical, and a collapsed node
//! equals the sum of its leaves exactly.

use std::collections::BTreeMap;
use std::sync::Arc;

use bom_facts::{FactRecord, FactValue};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::combination::NodeCombination;
use crate::error::PivotAnomaly;
use crate::filter::FilteredFacts;
use crate::hierarchy::{DimensionNode, Hierarchy};
use crate::logging::{log_debug, CAT_AGGREGATE};

// ============================================================================
// MEASURE PARSING
// ============================================================================

/// Outcome of reading one measure value.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureReading {
    Value(f64),
    /// Absent or empty; counts as 0 without complaint.
    Missing,
    /// Present but not a number; counts as 0 and is reported.
    Malformed(String),
}

impl MeasureReading {
    pub fn value(&self) -> f64 {
        match self {
            MeasureReading::Value(v) => *v,
            MeasureReading::Missing | MeasureReading::Malformed(_) => 0.0,
        }
    }
}

/// Reads `field` of `record` as a number.
///
/// Text is accepted when it parses after trimming and dropping thousands
/// separators. Booleans, unparsable text and non-finite numbers are malformed.
pub fn read_measure(record: &FactRecord, field: &str) -> MeasureReading {
    match record.get(field) {
        None | Some(FactValue::Empty) => MeasureReading::Missing,
        Some(FactValue::Number(n)) if n.is_finite() => MeasureReading::Value(*n),
        Some(FactValue::Number(n)) => MeasureReading::Malformed(format!("non-finite number {}", n)),
        Some(FactValue::Boolean(b)) => {
            MeasureReading::Malformed(format!("boolean {} is not a measure", b))
        }
        Some(FactValue::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return MeasureReading::Missing;
            }
            let cleaned: String = trimmed.chars().filter(|&c| c != ',').collect();
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => MeasureReading::Value(n),
                _ => MeasureReading::Malformed(format!("'{}' is not a number", text)),
            }
        }
    }
}

/// One measure read once for every filtered record.
#[derive(Debug, Clone)]
pub struct MeasureColumn {
    field: String,
    /// Indexed by record position in the fact table.
    values: Vec<f64>,
    anomalies: Vec<PivotAnomaly>,
}

impl MeasureColumn {
    pub fn read(facts: &FilteredFacts<'_>, field: &str) -> Self {
        let mut values = vec![0.0; facts.table().len()];
        let mut anomalies = Vec::new();

        for (ix, record) in facts.iter() {
            match read_measure(record, field) {
                MeasureReading::Value(v) => values[ix] = v,
                MeasureReading::Missing => {}
                MeasureReading::Malformed(detail) => {
                    anomalies.push(PivotAnomaly::data(field, ix, detail).logged());
                }
            }
        }

        MeasureColumn {
            field: field.to_string(),
            values,
            anomalies,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Value of the record at table position `ix`.
    pub fn get(&self, ix: usize) -> f64 {
        self.values.get(ix).copied().unwrap_or(0.0)
    }

    pub fn anomalies(&self) -> &[PivotAnomaly] {
        &self.anomalies
    }

    pub fn into_anomalies(self) -> Vec<PivotAnomaly> {
        self.anomalies
    }
}

// ============================================================================
// MEMBERSHIP
// ============================================================================

/// A combination together with the hierarchies of its dimensions.
#[derive(Debug, Clone, Copy)]
pub struct AxisSlice<'a> {
    pub combination: &'a NodeCombination,
    /// One hierarchy per node of `combination`, in the same order.
    pub hierarchies: &'a [Arc<Hierarchy>],
}

impl<'a> AxisSlice<'a> {
    pub fn new(combination: &'a NodeCombination, hierarchies: &'a [Arc<Hierarchy>]) -> Self {
        AxisSlice {
            combination,
            hierarchies,
        }
    }

    fn pairs(&self) -> impl Iterator<Item = (&'a Arc<DimensionNode>, &'a Arc<Hierarchy>)> {
        self.combination.nodes.iter().zip(self.hierarchies.iter())
    }
}

/// Whether `record` falls under every node of `slice`. The total matches all.
pub fn combination_matches(record: &FactRecord, slice: &AxisSlice<'_>) -> bool {
    slice.pairs().all(|(node, hierarchy)| {
        let key = match record.key_of(hierarchy.fact_field()) {
            Some(key) => key,
            None => return false,
        };
        match (hierarchy.node_index(&node.id), hierarchy.key_id(&key)) {
            (Some(node_ix), Some(key_id)) => hierarchy.subtree_contains_key_id(node_ix, key_id),
            _ => false,
        }
    })
}

// ============================================================================
// SUMMATION ORDER
// ============================================================================

/// Pre-order leaf ranks of one record, one per dimension.
pub(crate) type LeafTuple = SmallVec<[u32; 4]>;

/// Ranks of the leaves `record` falls under, or None if its key in any of
/// `hierarchies` names no leaf.
pub(crate) fn leaf_tuple<'h>(
    record: &FactRecord,
    hierarchies: impl IntoIterator<Item = &'h Arc<Hierarchy>>,
) -> Option<LeafTuple> {
    hierarchies
        .into_iter()
        .map(|hierarchy| {
            let key = record.key_of(hierarchy.fact_field())?;
            hierarchy.key_id(&key).map(|id| hierarchy.key_rank(id))
        })
        .collect()
}

/// Partial sums grouped by output slot and leaf tuple.
#[derive(Debug, Default)]
pub(crate) struct LeafSums {
    groups: BTreeMap<(usize, LeafTuple), f64>,
}

impl LeafSums {
    pub(crate) fn add(&mut self, slot: usize, leaves: LeafTuple, value: f64) {
        *self.groups.entry((slot, leaves)).or_insert(0.0) += value;
    }

    /// Adds every group into `out[slot]`, leaf tuples in pre-order.
    pub(crate) fn fold_into(self, out: &mut [f64]) {
        for ((slot, _), partial) in self.groups {
            if let Some(cell) = out.get_mut(slot) {
                *cell += partial;
            }
        }
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Sum of `measure` over the filtered records matching both `row` and `column`.
pub fn aggregate(
    row: &AxisSlice<'_>,
    column: &AxisSlice<'_>,
    measure: &str,
    facts: &FilteredFacts<'_>,
) -> f64 {
    let hierarchies: Vec<&Arc<Hierarchy>> =
        row.pairs().chain(column.pairs()).map(|(_, hierarchy)| hierarchy).collect();

    let mut sums = LeafSums::default();
    for (_, record) in facts.iter() {
        if !(combination_matches(record, row) && combination_matches(record, column)) {
            continue;
        }
        if let Some(leaves) = leaf_tuple(record, hierarchies.iter().copied()) {
            sums.add(0, leaves, read_measure(record, measure).value());
        }
    }

    let mut total = [0.0];
    sums.fold_into(&mut total);
    total[0]
}

/// Same sum as `aggregate`, computed by walking each node down to its leaves
/// and adding up the records of every leaf combination.
pub fn aggregate_by_leaf_rollup(
    row: &AxisSlice<'_>,
    column: &AxisSlice<'_>,
    measure: &str,
    facts: &FilteredFacts<'_>,
) -> f64 {
    let slots: Vec<(&Arc<DimensionNode>, &Arc<Hierarchy>)> = row.pairs().chain(column.pairs()).collect();
    let records: Vec<&FactRecord> = facts.iter().map(|(_, record)| record).collect();
    let mut fixed: Vec<(&str, &str)> = Vec::with_capacity(slots.len());
    let mut total = 0.0;
    rollup(&slots, 0, &mut fixed, &records, measure, &mut total);
    total
}

/// Adds the sum of every leaf tuple below `slots` into `total`, in pre-order.
fn rollup<'a>(
    slots: &[(&'a Arc<DimensionNode>, &'a Arc<Hierarchy>)],
    depth: usize,
    fixed: &mut Vec<(&'a str, &'a str)>,
    records: &[&FactRecord],
    measure: &str,
    total: &mut f64,
) {
    let (node, hierarchy) = match slots.first() {
        Some(&slot) => slot,
        None => {
            *total += sum_exact(fixed, records, measure);
            return;
        }
    };

    // A deeper walk than the tree has nodes can only be a cycle.
    if depth > hierarchy.len() {
        return;
    }

    if node.is_leaf {
        if let Some(key) = node.fact_key.as_deref() {
            fixed.push((hierarchy.fact_field(), key));
            rollup(&slots[1..], 0, fixed, records, measure, total);
            fixed.pop();
        }
        return;
    }

    for child_id in &node.child_ids {
        if let Some(child) = hierarchy.node(child_id) {
            let mut narrowed = slots.to_vec();
            narrowed[0] = (child, hierarchy);
            rollup(&narrowed, depth + 1, fixed, records, measure, total);
        }
    }
}

/// Table-order sum over the records of one leaf tuple.
fn sum_exact(fixed: &[(&str, &str)], records: &[&FactRecord], measure: &str) -> f64 {
    records
        .iter()
        .filter(|record| {
            fixed
                .iter()
                .all(|(field, key)| record.key_of(field).is_some_and(|k| k == *key))
        })
        .fold(0.0, |sum, record| sum + read_measure(record, measure).value())
}

// ============================================================================
// MEMO
// ============================================================================

/// Identifies one cell of one measure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row_key: String,
    pub column_key: String,
    pub measure: String,
}

impl CellKey {
    pub fn new(
        row_key: impl Into<String>,
        column_key: impl Into<String>,
        measure: impl Into<String>,
    ) -> Self {
        CellKey {
            row_key: row_key.into(),
            column_key: column_key.into(),
            measure: measure.into(),
        }
    }
}

/// Cell values computed since the last invalidation.
///
/// Only valid for one (request, expand state, filters, facts) snapshot; the
/// owner must `clear` it whenever any of them changes.
#[derive(Debug, Clone, Default)]
pub struct AggregateMemo {
    values: FxHashMap<CellKey, f64>,
    hits: u64,
    misses: u64,
}

impl AggregateMemo {
    pub fn new() -> Self {
        AggregateMemo::default()
    }

    pub fn get(&self, key: &CellKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn insert(&mut self, key: CellKey, value: f64) {
        self.values.insert(key, value);
    }

    /// Like `get`, but counts the hit or miss.
    pub fn lookup(&mut self, key: &CellKey) -> Option<f64> {
        let found = self.values.get(key).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Returns the memoized value, computing and storing it on a miss.
    pub fn get_or_compute(&mut self, key: CellKey, compute: impl FnOnce() -> f64) -> f64 {
        if let Some(value) = self.lookup(&key) {
            return value;
        }
        let value = compute();
        self.values.insert(key, value);
        value
    }

    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            log_debug!(CAT_AGGREGATE, "memo cleared ({} cell(s))", self.values.len());
        }
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
