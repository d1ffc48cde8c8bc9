//! FILENAME: core/bom-pivot/src/lib.rs
//! Hierarchical pivot engine for bill-of-materials fact tables.
//!
//! Aggregates a flat fact table along dimension hierarchies (legal entity,
//! cost element, plant, ...) that the user expands and collapses on either
//! axis. A collapsed node always shows the exact sum of every leaf below it.
//!
//! Layers:
//! - `hierarchy`: Immutable dimension trees with precomputed rollup sets
//! - `expand`: Per-axis expand/collapse state, kept outside the trees
//! - `visibility`: Which nodes are on screen for a given expand state
//! - `layout`: Routes field counts to a layout strategy
//! - `combination`: Row and column tuples for an axis
//! - `filter`: Hierarchical selections to a filtered view of the facts
//! - `aggregate`: Sum of a measure over the records behind a cell
//! - `engine`: The full recomputation and drill-down
//! - `session`: Mutable state of one pivot view, kept current
//! - `definition`: Serializable request and configuration
//! - `result`: Renderable output

mod logging;

pub mod error;
pub mod hierarchy;
pub mod expand;
pub mod visibility;
pub mod layout;
pub mod combination;
pub mod filter;
pub mod aggregate;
pub mod definition;
pub mod result;
pub mod engine;
pub mod session;

pub use error::{AnomalyKind, HierarchyError, PivotAnomaly};
pub use hierarchy::{DimensionNode, Dimensions, FactKeyId, Hierarchy, NodeLink, ROOT_ID};
pub use expand::{toggle_node, Axis, ExpandState};
pub use visibility::{resolve_visible, resolve_visible_with_anomalies};
pub use layout::{route_layout, select_layout, AxisShape, LayoutKind};
pub use combination::{
    combination_key, generate_combinations, CombinationSet, FanOutLimits, NodeCombination,
    DEFAULT_MAX_CELLS, DEFAULT_MAX_COMBINATIONS, DEFAULT_SECONDARY_DIMENSION_CAP, KEY_SEPARATOR,
};
pub use filter::{
    apply_filters, compile_filters, resolve_filter, resolve_filter_with_anomalies, FieldFilter,
    FilteredFacts,
};
pub use aggregate::{
    aggregate, aggregate_by_leaf_rollup, combination_matches, read_measure, AggregateMemo,
    AxisSlice, CellKey, MeasureColumn, MeasureReading,
};
pub use definition::{EngineConfig, PivotRequest, DEFAULT_DRILL_DOWN_LIMIT};
pub use result::{DrillDownResult, PivotResult};
pub use engine::{compute_pivot, drill_down, PivotCalculator};
pub use session::PivotSession;

pub use bom_facts::{FactRecord, FactTable, FactValue};
