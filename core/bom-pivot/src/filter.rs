//! FILENAME: core/bom-pivot/src/filter.rs
//! Filter Resolver - hierarchical selections to a filtered view of the facts.
//!
//! A selection on a hierarchy field expands to the fact keys of every leaf
//! under the selected nodes; a selection on any other field matches raw
//! record values. Filters on different fields are combined with AND, and an
//! empty selection does not filter at all.

use std::collections::{BTreeMap, BTreeSet};

use bom_facts::{FactRecord, FactTable};
use rustc_hash::FxHashSet;

use crate::error::PivotAnomaly;
use crate::hierarchy::{Dimensions, Hierarchy};
use crate::logging::{log_debug, CAT_FILTER};

// ============================================================================
// SELECTION RESOLUTION
// ============================================================================

/// Leaf fact keys covered by `selected_ids`.
///
/// A selected leaf contributes its own key; a selected inner node contributes
/// the keys of all its descendant leaves. Unknown ids are skipped.
pub fn resolve_filter<'a>(
    selected_ids: impl IntoIterator<Item = &'a str>,
    hierarchy: &Hierarchy,
) -> FxHashSet<String> {
    resolve_filter_with_anomalies(selected_ids, hierarchy).0
}

/// Same as `resolve_filter`, also returning one structural anomaly per unknown
/// selected id.
pub fn resolve_filter_with_anomalies<'a>(
    selected_ids: impl IntoIterator<Item = &'a str>,
    hierarchy: &Hierarchy,
) -> (FxHashSet<String>, Vec<PivotAnomaly>) {
    let mut keys = FxHashSet::default();
    let mut anomalies = Vec::new();

    for id in selected_ids {
        if hierarchy.node(id).is_none() {
            anomalies.push(
                PivotAnomaly::structural(
                    hierarchy.name(),
                    format!("filter selects unknown node '{}'; skipped", id),
                )
                .logged(),
            );
            continue;
        }
        keys.extend(hierarchy.leaf_fact_keys(id).into_iter().map(str::to_string));
    }

    (keys, anomalies)
}

// ============================================================================
// COMPILED FILTERS
// ============================================================================

/// One field's filter, ready to test records against.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Selection on a hierarchy, resolved to leaf fact keys.
    Hierarchy {
        hierarchy: String,
        fact_field: String,
        keys: FxHashSet<String>,
    },
    /// Selection of raw values on a plain fact field.
    Values {
        field: String,
        values: FxHashSet<String>,
    },
}

impl FieldFilter {
    /// Column of the fact table this filter reads.
    pub fn field(&self) -> &str {
        match self {
            FieldFilter::Hierarchy { fact_field, .. } => fact_field,
            FieldFilter::Values { field, .. } => field,
        }
    }

    pub fn matches(&self, record: &FactRecord) -> bool {
        match self {
            FieldFilter::Hierarchy { fact_field, keys, .. } => record
                .key_of(fact_field)
                .is_some_and(|key| keys.contains(key.as_ref())),
            FieldFilter::Values { field, values } => {
                let value = record.key_of(field).unwrap_or_default();
                values.contains(value.as_ref())
            }
        }
    }
}

/// Turns the request's active filters into `FieldFilter`s.
///
/// Empty selections are dropped. A field naming a hierarchy in `dims` is
/// resolved through the tree; any other field matches raw values.
pub fn compile_filters(
    active_filters: &BTreeMap<String, BTreeSet<String>>,
    dims: &Dimensions,
) -> (Vec<FieldFilter>, Vec<PivotAnomaly>) {
    let mut filters = Vec::new();
    let mut anomalies = Vec::new();

    for (field, selection) in active_filters {
        if selection.is_empty() {
            continue;
        }
        match dims.get(field) {
            Some(hierarchy) => {
                let (keys, mut found) =
                    resolve_filter_with_anomalies(selection.iter().map(String::as_str), hierarchy);
                anomalies.append(&mut found);
                filters.push(FieldFilter::Hierarchy {
                    hierarchy: hierarchy.name().to_string(),
                    fact_field: hierarchy.fact_field().to_string(),
                    keys,
                });
            }
            None => filters.push(FieldFilter::Values {
                field: field.clone(),
                values: selection.iter().cloned().collect(),
            }),
        }
    }

    (filters, anomalies)
}

// ============================================================================
// FILTERED VIEW
// ============================================================================

/// The records of a fact table that pass every filter.
///
/// Borrows the table and keeps only the surviving positions, so filtering
/// never copies a record.
#[derive(Debug, Clone)]
pub struct FilteredFacts<'a> {
    table: &'a FactTable,
    indices: Vec<usize>,
}

impl<'a> FilteredFacts<'a> {
    /// Every record of `table`.
    pub fn all(table: &'a FactTable) -> Self {
        FilteredFacts {
            table,
            indices: (0..table.len()).collect(),
        }
    }

    pub fn table(&self) -> &'a FactTable {
        self.table
    }

    /// Positions of the surviving records in the original table.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// (position in the table, record) pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a FactRecord)> + '_ {
        let table = self.table;
        self.indices
            .iter()
            .filter_map(move |&ix| table.get(ix).map(|record| (ix, record)))
    }
}

/// Applies `filters` to `table`.
pub fn apply_filters<'a>(table: &'a FactTable, filters: &[FieldFilter]) -> FilteredFacts<'a> {
    let indices: Vec<usize> = table
        .iter()
        .enumerate()
        .filter(|(_, record)| filters.iter().all(|f| f.matches(record)))
        .map(|(ix, _)| ix)
        .collect();

    log_debug!(
        CAT_FILTER,
        "{} filter(s): {} of {} record(s) kept",
        filters.len(),
        indices.len(),
        table.len()
    );
    FilteredFacts { table, indices }
}
