//! FILENAME: core/bom-pivot/src/result.rs
//! Pivot Result - the computed grid handed to the renderer.
//!
//! Cell values are stored densely as `values[row][column][measure]`, flattened
//! into one vector; totals use the same layout with the other axis dropped.
//! Lookups by combination key go through a key index built on demand.

use serde::{Deserialize, Serialize};

use crate::combination::NodeCombination;
use crate::error::{AnomalyKind, PivotAnomaly};
use crate::layout::LayoutKind;

// ============================================================================
// PIVOT RESULT
// ============================================================================

/// Everything one recomputation produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotResult {
    pub layout: LayoutKind,

    /// Row combinations in display order.
    pub row_combinations: Vec<NodeCombination>,

    /// Column combinations in display order. A single total combination when
    /// the layout has no column dimensions.
    pub column_combinations: Vec<NodeCombination>,

    /// Measure field ids, in request order.
    pub measures: Vec<String>,

    /// Flattened `[row][column][measure]`.
    pub values: Vec<f64>,

    /// Flattened `[row][measure]`: each row over all columns.
    pub row_totals: Vec<f64>,

    /// Flattened `[column][measure]`: each column over all rows.
    pub column_totals: Vec<f64>,

    /// One per measure: every filtered record.
    pub grand_totals: Vec<f64>,

    /// Records left after filtering.
    pub filtered_record_count: usize,

    /// Whether a fan-out limit cut rows or columns.
    pub truncated: bool,

    pub anomalies: Vec<PivotAnomaly>,

    /// Session version this result was computed for.
    pub version: u64,
}

impl PivotResult {
    /// An empty result carrying only the layout.
    pub fn empty(layout: LayoutKind) -> Self {
        PivotResult {
            layout,
            ..PivotResult::default()
        }
    }

    /// True when there is nothing to render.
    pub fn is_empty(&self) -> bool {
        self.layout == LayoutKind::Degenerate
            || self.measures.is_empty()
            || self.row_combinations.is_empty()
            || self.column_combinations.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.row_combinations.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_combinations.len()
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    pub fn measure_index(&self, measure: &str) -> Option<usize> {
        self.measures.iter().position(|m| m == measure)
    }

    pub fn row_index(&self, row_key: &str) -> Option<usize> {
        self.row_combinations.iter().position(|c| c.key == row_key)
    }

    pub fn column_index(&self, column_key: &str) -> Option<usize> {
        self.column_combinations.iter().position(|c| c.key == column_key)
    }

    /// Value by position.
    pub fn value_at(&self, row: usize, column: usize, measure: usize) -> Option<f64> {
        if row >= self.row_count() || column >= self.column_count() || measure >= self.measure_count() {
            return None;
        }
        let ix = (row * self.column_count() + column) * self.measure_count() + measure;
        self.values.get(ix).copied()
    }

    /// Value by combination keys and measure id.
    pub fn value(&self, row_key: &str, column_key: &str, measure: &str) -> Option<f64> {
        self.value_at(
            self.row_index(row_key)?,
            self.column_index(column_key)?,
            self.measure_index(measure)?,
        )
    }

    pub fn row_total(&self, row_key: &str, measure: &str) -> Option<f64> {
        let row = self.row_index(row_key)?;
        let measure = self.measure_index(measure)?;
        self.row_totals.get(row * self.measure_count() + measure).copied()
    }

    pub fn column_total(&self, column_key: &str, measure: &str) -> Option<f64> {
        let column = self.column_index(column_key)?;
        let measure = self.measure_index(measure)?;
        self.column_totals
            .get(column * self.measure_count() + measure)
            .copied()
    }

    pub fn grand_total(&self, measure: &str) -> Option<f64> {
        self.grand_totals.get(self.measure_index(measure)?).copied()
    }

    /// Row keys in display order.
    pub fn row_keys(&self) -> Vec<&str> {
        self.row_combinations.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn column_keys(&self) -> Vec<&str> {
        self.column_combinations.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn anomalies_of(&self, kind: AnomalyKind) -> impl Iterator<Item = &PivotAnomaly> {
        self.anomalies.iter().filter(move |a| a.kind() == kind)
    }
}

// ============================================================================
// DRILL-DOWN RESULT
// ============================================================================

/// The fact records behind one cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrillDownResult {
    pub row_key: String,

    pub column_key: String,

    /// Positions of the matching records in the fact table.
    pub record_indices: Vec<usize>,

    /// Total count of matching records.
    pub total_count: usize,

    /// Whether more records matched than were returned.
    pub is_truncated: bool,

    /// Maximum records that were fetched.
    pub max_records: usize,
}

impl DrillDownResult {
    pub fn new(row_key: impl Into<String>, column_key: impl Into<String>, max_records: usize) -> Self {
        DrillDownResult {
            row_key: row_key.into(),
            column_key: column_key.into(),
            max_records,
            ..DrillDownResult::default()
        }
    }
}
