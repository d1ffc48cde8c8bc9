//! FILENAME: core/bom-pivot/src/session.rs
//! Pivot Session - owns the inputs of one pivot view and keeps its result current.
//!
//! Every mutation bumps the version, clears the aggregate memo and recomputes
//! synchronously, so `result()` always reflects the latest request, expand
//! state and facts. Request and expand state can be snapshotted and restored
//! as plain serializable values.

use std::collections::BTreeSet;

use bom_facts::FactTable;

use crate::aggregate::{aggregate, AggregateMemo, AxisSlice, CellKey};
use crate::definition::{EngineConfig, PivotRequest};
use crate::engine::{axis_hierarchies, combination_for_key, compute_pivot, drill_down};
use crate::expand::{Axis, ExpandState};
use crate::filter::{apply_filters, compile_filters};
use crate::hierarchy::Dimensions;
use crate::layout::select_layout;
use crate::logging::{log_debug, CAT_SESSION};
use crate::result::{DrillDownResult, PivotResult};

/// Interactive state of one pivot view.
#[derive(Debug, Clone)]
pub struct PivotSession {
    dims: Dimensions,
    facts: FactTable,
    request: PivotRequest,
    expand: ExpandState,
    config: EngineConfig,
    version: u64,
    memo: AggregateMemo,
    result: PivotResult,
}

impl PivotSession {
    pub fn new(dims: Dimensions, facts: FactTable) -> Self {
        PivotSession::with_config(dims, facts, EngineConfig::default())
    }

    pub fn with_config(dims: Dimensions, facts: FactTable, config: EngineConfig) -> Self {
        let mut session = PivotSession {
            dims,
            facts,
            request: PivotRequest::default(),
            expand: ExpandState::default(),
            config,
            version: 0,
            memo: AggregateMemo::new(),
            result: PivotResult::default(),
        };
        session.recompute();
        session
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// The result for the current version.
    pub fn result(&self) -> &PivotResult {
        &self.result
    }

    pub fn request(&self) -> &PivotRequest {
        &self.request
    }

    pub fn expand_state(&self) -> &ExpandState {
        &self.expand
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    pub fn facts(&self) -> &FactTable {
        &self.facts
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn memo(&self) -> &AggregateMemo {
        &self.memo
    }

    // ========================================================================
    // REQUEST MUTATIONS
    // ========================================================================

    pub fn set_request(&mut self, request: PivotRequest) -> &PivotResult {
        self.request = request;
        self.changed("set_request")
    }

    /// Appends `field` to the row axis unless it is already there.
    pub fn add_row_field(&mut self, field: impl Into<String>) -> &PivotResult {
        push_unique(&mut self.request.row_fields, field.into());
        self.changed("add_row_field")
    }

    pub fn add_column_field(&mut self, field: impl Into<String>) -> &PivotResult {
        push_unique(&mut self.request.column_fields, field.into());
        self.changed("add_column_field")
    }

    pub fn add_value_field(&mut self, field: impl Into<String>) -> &PivotResult {
        push_unique(&mut self.request.value_fields, field.into());
        self.changed("add_value_field")
    }

    /// Removes `field` from rows, columns and values.
    pub fn remove_field(&mut self, field: &str) -> &PivotResult {
        self.request.row_fields.retain(|f| f != field);
        self.request.column_fields.retain(|f| f != field);
        self.request.value_fields.retain(|f| f != field);
        self.changed("remove_field")
    }

    /// Replaces the selection on `field`. An empty selection removes the filter.
    pub fn set_filter<S: Into<String>>(
        &mut self,
        field: impl Into<String>,
        selection: impl IntoIterator<Item = S>,
    ) -> &PivotResult {
        let field = field.into();
        let selection: BTreeSet<String> = selection.into_iter().map(Into::into).collect();
        if selection.is_empty() {
            self.request.active_filters.remove(&field);
        } else {
            self.request.active_filters.insert(field, selection);
        }
        self.changed("set_filter")
    }

    pub fn clear_filter(&mut self, field: &str) -> &PivotResult {
        self.request.active_filters.remove(field);
        self.changed("clear_filter")
    }

    pub fn set_config(&mut self, config: EngineConfig) -> &PivotResult {
        self.config = config;
        self.changed("set_config")
    }

    pub fn set_facts(&mut self, facts: FactTable) -> &PivotResult {
        self.facts = facts;
        self.changed("set_facts")
    }

    // ========================================================================
    // EXPAND STATE MUTATIONS
    // ========================================================================

    /// Flips one node. Unknown hierarchies, unknown nodes and leaves leave the
    /// session untouched and return `None`.
    pub fn toggle(&mut self, hierarchy: &str, axis: Axis, node_id: &str) -> Option<bool> {
        let tree = self.dims.get(hierarchy)?;
        let expanded = self.expand.toggle(tree, axis, node_id)?;
        self.changed("toggle");
        Some(expanded)
    }

    /// Expands every non-leaf node of `hierarchy` on both axes.
    pub fn expand_all(&mut self, hierarchy: &str) -> bool {
        match self.dims.get(hierarchy) {
            Some(tree) => {
                self.expand.expand_all(tree);
                self.changed("expand_all");
                true
            }
            None => false,
        }
    }

    pub fn collapse_all(&mut self, hierarchy: &str) -> bool {
        match self.dims.get(hierarchy) {
            Some(tree) => {
                self.expand.collapse_all(tree);
                self.changed("collapse_all");
                true
            }
            None => false,
        }
    }

    /// Puts back a snapshot taken with `expand_state()` and `request()`.
    pub fn restore(&mut self, expand: ExpandState, request: PivotRequest) -> &PivotResult {
        self.expand = expand;
        self.request = request;
        self.changed("restore")
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// One cell of the current result, computed from the facts on demand and
    /// memoized until the next mutation.
    ///
    /// Returns `None` when the keys or the measure are not in the result.
    pub fn cell_value(&mut self, row_key: &str, column_key: &str, measure: &str) -> Option<f64> {
        self.result.measure_index(measure)?;
        self.result.row_index(row_key)?;
        self.result.column_index(column_key)?;

        if !self.config.memoize_aggregates {
            return self.compute_cell(row_key, column_key, measure);
        }

        let key = CellKey::new(row_key, column_key, measure);
        if let Some(value) = self.memo.lookup(&key) {
            return Some(value);
        }
        let value = self.compute_cell(row_key, column_key, measure)?;
        self.memo.insert(key, value);
        Some(value)
    }

    /// Source records of one cell, capped at the configured drill-down limit.
    pub fn drill_down(&self, row_key: &str, column_key: &str) -> DrillDownResult {
        drill_down(
            &self.request,
            &self.dims,
            &self.facts,
            &self.expand,
            row_key,
            column_key,
            self.config.drill_down_limit,
        )
    }

    fn compute_cell(&self, row_key: &str, column_key: &str, measure: &str) -> Option<f64> {
        let (rows, columns, values) = self.request.field_counts();
        let layout = select_layout(rows, columns, values);
        let (row_hierarchies, _) = axis_hierarchies(&self.request.row_fields, layout.row_shape()?, &self.dims);
        let (column_hierarchies, _) =
            axis_hierarchies(&self.request.column_fields, layout.column_shape()?, &self.dims);

        let row = combination_for_key(row_key, &row_hierarchies, Axis::Row, &self.expand)?;
        let column = combination_for_key(column_key, &column_hierarchies, Axis::Column, &self.expand)?;

        let (filters, _) = compile_filters(&self.request.active_filters, &self.dims);
        let filtered = apply_filters(&self.facts, &filters);
        Some(aggregate(
            &AxisSlice::new(&row, &row_hierarchies),
            &AxisSlice::new(&column, &column_hierarchies),
            measure,
            &filtered,
        ))
    }

    // ========================================================================
    // RECOMPUTATION
    // ========================================================================

    fn changed(&mut self, operation: &str) -> &PivotResult {
        self.version += 1;
        self.memo.clear();
        log_debug!(CAT_SESSION, "{} -> version {}", operation, self.version);
        self.recompute();
        &self.result
    }

    fn recompute(&mut self) {
        let mut result = compute_pivot(&self.request, &self.dims, &self.facts, &self.expand, &self.config);
        result.version = self.version;
        self.result = result;
    }
}

fn push_unique(fields: &mut Vec<String>, field: String) {
    if !fields.contains(&field) {
        fields.push(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{DimensionNode, Hierarchy, ROOT_ID};
    use bom_facts::FactRecord;

    fn session() -> PivotSession {
        let dims: Dimensions = vec![Hierarchy::new(
            "LE",
            vec![
                DimensionNode::root(["NA", "EU"]),
                DimensionNode::branch("NA", "North America", 1, ROOT_ID, ["US", "CA"]),
                DimensionNode::leaf("US", "United States", 2, "NA", "US"),
                DimensionNode::leaf("CA", "Canada", 2, "NA", "CA"),
                DimensionNode::leaf("EU", "Europe", 1, ROOT_ID, "EU"),
            ],
        )]
        .into_iter()
        .collect();
        let facts = FactTable::from_records(vec![
            FactRecord::new().with("LE", "US").with("COST", 10.0),
            FactRecord::new().with("LE", "CA").with("COST", 5.0),
            FactRecord::new().with("LE", "EU").with("COST", 7.0),
        ]);
        PivotSession::new(dims, facts)
    }

    #[test]
    fn test_new_session_is_degenerate() {
        let s = session();
        assert!(s.result().is_empty());
        assert_eq!(s.version(), 0);
    }

    #[test]
    fn test_mutations_bump_version_and_recompute() {
        let mut s = session();
        s.add_row_field("LE");
        s.add_value_field("COST");
        assert_eq!(s.version(), 2);
        assert_eq!(s.result().version, 2);
        assert_eq!(s.result().row_keys(), vec!["NA", "EU"]);

        assert_eq!(s.toggle("LE", Axis::Row, "NA"), Some(true));
        assert_eq!(s.version(), 3);
        assert_eq!(s.result().row_keys(), vec!["US", "CA", "EU"]);
    }

    #[test]
    fn test_noop_toggle_keeps_version() {
        let mut s = session();
        assert_eq!(s.toggle("LE", Axis::Row, "US"), None);
        assert_eq!(s.toggle("XX", Axis::Row, "NA"), None);
        assert!(!s.expand_all("XX"));
        assert_eq!(s.version(), 0);
    }

    #[test]
    fn test_add_field_is_idempotent() {
        let mut s = session();
        s.add_row_field("LE");
        s.add_row_field("LE");
        assert_eq!(s.request().row_fields, vec!["LE".to_string()]);
        s.remove_field("LE");
        assert!(s.request().row_fields.is_empty());
    }

    #[test]
    fn test_filters() {
        let mut s = session();
        s.set_request(PivotRequest::new().with_rows(["LE"]).with_values(["COST"]));
        s.set_filter("LE", ["NA"]);
        assert_eq!(s.result().grand_total("COST"), Some(15.0));
        assert_eq!(s.result().value("EU", "", "COST"), Some(0.0));

        s.clear_filter("LE");
        assert_eq!(s.result().grand_total("COST"), Some(22.0));

        s.set_filter("LE", Vec::<String>::new());
        assert!(s.request().active_filters.is_empty());
    }

    #[test]
    fn test_cell_value_is_memoized_until_change() {
        let mut s = session();
        s.set_request(PivotRequest::new().with_rows(["LE"]).with_values(["COST"]));

        assert_eq!(s.cell_value("NA", "", "COST"), Some(15.0));
        assert_eq!(s.cell_value("NA", "", "COST"), Some(15.0));
        assert_eq!(s.memo().len(), 1);
        assert!(s.memo().hits() >= 1);
        assert_eq!(s.cell_value("US", "", "COST"), None);

        s.toggle("LE", Axis::Row, "NA");
        assert!(s.memo().is_empty());
        assert_eq!(s.cell_value("US", "", "COST"), Some(10.0));
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut s = session();
        s.set_request(PivotRequest::new().with_rows(["LE"]).with_values(["COST"]));
        s.toggle("LE", Axis::Row, "NA");
        let expand = s.expand_state().clone();
        let request = s.request().clone();

        s.collapse_all("LE");
        s.remove_field("LE");
        assert!(s.result().row_keys() != vec!["US", "CA", "EU"]);

        s.restore(expand, request);
        assert_eq!(s.result().row_keys(), vec!["US", "CA", "EU"]);
    }

    #[test]
    fn test_drill_down_uses_configured_limit() {
        let mut s = session();
        let config = EngineConfig {
            drill_down_limit: 1,
            ..EngineConfig::default()
        };
        s.set_config(config);
        s.set_request(PivotRequest::new().with_rows(["LE"]).with_values(["COST"]));
        let drill = s.drill_down("NA", "");
        assert_eq!(drill.total_count, 2);
        assert_eq!(drill.record_indices, vec![0]);
        assert!(drill.is_truncated);
    }
}
