//! FILENAME: core/bom-pivot/src/definition.rs
//! Pivot Request and Engine Configuration - the serializable inputs.
//!
//! These structures are designed to be:
//! - Serializable (so an external cache can snapshot the session)
//! - Built fresh for every recomputation
//! - Immutable snapshots of user intent

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::combination::FanOutLimits;

/// Default number of record positions a drill-down returns.
pub const DEFAULT_DRILL_DOWN_LIMIT: usize = 1000;

// ============================================================================
// REQUEST
// ============================================================================

/// What the user asked to see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotRequest {
    /// Dimension field ids on the row axis (outer to inner).
    #[serde(default)]
    pub row_fields: Vec<String>,

    /// Dimension field ids on the column axis (outer to inner).
    #[serde(default)]
    pub column_fields: Vec<String>,

    /// Measure field ids to aggregate.
    #[serde(default)]
    pub value_fields: Vec<String>,

    /// Field id -> selected node ids (hierarchy fields) or raw values (any
    /// other field). An empty selection means no filter on that field.
    #[serde(default)]
    pub active_filters: BTreeMap<String, BTreeSet<String>>,
}

impl PivotRequest {
    pub fn new() -> Self {
        PivotRequest::default()
    }

    pub fn with_rows<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.row_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_columns<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.column_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_values<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.value_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter<S: Into<String>>(
        mut self,
        field: impl Into<String>,
        selection: impl IntoIterator<Item = S>,
    ) -> Self {
        self.active_filters
            .insert(field.into(), selection.into_iter().map(Into::into).collect());
        self
    }

    /// (rows, columns, values) as the layout router wants them.
    pub fn field_counts(&self) -> (usize, usize, usize) {
        (self.row_fields.len(), self.column_fields.len(), self.value_fields.len())
    }

    /// Whether `field` is placed on any axis or among the values.
    pub fn uses_field(&self, field: &str) -> bool {
        self.row_fields.iter().any(|f| f == field)
            || self.column_fields.iter().any(|f| f == field)
            || self.value_fields.iter().any(|f| f == field)
    }

    /// Filters with an actual selection.
    pub fn effective_filters(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.active_filters
            .iter()
            .filter(|(_, selection)| !selection.is_empty())
            .map(|(field, selection)| (field.as_str(), selection))
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunables of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bounds on combination fan-out.
    pub fan_out: FanOutLimits,

    /// Keep single-cell aggregates in a memo between recomputations.
    pub memoize_aggregates: bool,

    /// Compute row, column and grand totals.
    pub compute_totals: bool,

    /// Record positions returned by a drill-down.
    pub drill_down_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            fan_out: FanOutLimits::default(),
            memoize_aggregates: true,
            compute_totals: true,
            drill_down_limit: DEFAULT_DRILL_DOWN_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = PivotRequest::new()
            .with_rows(["LE", "CE"])
            .with_columns(["PLANT"])
            .with_values(["COST"])
            .with_filter("LE", ["NA"])
            .with_filter("CE", Vec::<String>::new());

        assert_eq!(request.field_counts(), (2, 1, 1));
        assert!(request.uses_field("PLANT"));
        assert!(!request.uses_field("QTY"));

        let filters: Vec<&str> = request.effective_filters().map(|(f, _)| f).collect();
        assert_eq!(filters, vec!["LE"]);
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"fan_out": {"max_combinations": 10}, "compute_totals": false}"#)
                .unwrap();
        assert_eq!(config.fan_out.max_combinations, 10);
        assert_eq!(config.fan_out.secondary_dimension_cap, FanOutLimits::default().secondary_dimension_cap);
        assert!(!config.compute_totals);
        assert!(config.memoize_aggregates);
        assert_eq!(config.drill_down_limit, DEFAULT_DRILL_DOWN_LIMIT);
    }

    #[test]
    fn test_request_snapshot_round_trip() {
        let request = PivotRequest::new()
            .with_rows(["LE"])
            .with_values(["COST"])
            .with_filter("LE", ["NA", "EU"]);
        let json = serde_json::to_string(&request).unwrap();
        let restored: PivotRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, request);

        let sparse: PivotRequest = serde_json::from_str(r#"{"row_fields": ["LE"]}"#).unwrap();
        assert!(sparse.value_fields.is_empty());
    }
}
