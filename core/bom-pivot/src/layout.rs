//! FILENAME: core/bom-pivot/src/layout.rs
//! Layout Router - picks the axis-combination strategy from field counts.
//!
//! Every layout shares the same visibility, combination and aggregation
//! primitives; the kind only decides how each axis is enumerated (a single
//! total, one dimension, or a product of several) and tells the renderer
//! which template to draw.

use serde::{Deserialize, Serialize};

use crate::error::PivotAnomaly;
use crate::logging::{log_debug, CAT_LAYOUT};

/// Named layout strategy for a pivot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutKind {
    /// No value fields: nothing to render.
    Degenerate,
    /// One row dimension, no columns.
    SingleRow,
    /// Two or more row dimensions, no columns.
    MultiRow,
    /// One row dimension crossed with one column dimension.
    SimpleCrossTab,
    /// Several row dimensions crossed with one column dimension.
    MultiRowCrossTab,
    /// Several row dimensions crossed with several column dimensions.
    FullCrossTab,
    /// One row dimension crossed with several column dimensions.
    MultiColumnCrossTab,
}

/// How one axis is enumerated under a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisShape {
    /// The axis collapses to a single total combination.
    Total,
    /// One dimension: each visible node is a combination.
    Single,
    /// Several dimensions: Cartesian product of the visible lists.
    Multi,
}

impl LayoutKind {
    pub fn row_shape(&self) -> Option<AxisShape> {
        match self {
            LayoutKind::Degenerate => None,
            LayoutKind::SingleRow | LayoutKind::SimpleCrossTab | LayoutKind::MultiColumnCrossTab => {
                Some(AxisShape::Single)
            }
            LayoutKind::MultiRow | LayoutKind::MultiRowCrossTab | LayoutKind::FullCrossTab => {
                Some(AxisShape::Multi)
            }
        }
    }

    pub fn column_shape(&self) -> Option<AxisShape> {
        match self {
            LayoutKind::Degenerate => None,
            LayoutKind::SingleRow | LayoutKind::MultiRow => Some(AxisShape::Total),
            LayoutKind::SimpleCrossTab | LayoutKind::MultiRowCrossTab => Some(AxisShape::Single),
            LayoutKind::FullCrossTab | LayoutKind::MultiColumnCrossTab => Some(AxisShape::Multi),
        }
    }

    pub fn is_cross_tab(&self) -> bool {
        matches!(self.column_shape(), Some(AxisShape::Single | AxisShape::Multi))
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayoutKind::Degenerate => "Degenerate",
            LayoutKind::SingleRow => "SingleRow",
            LayoutKind::MultiRow => "MultiRow",
            LayoutKind::SimpleCrossTab => "SimpleCrossTab",
            LayoutKind::MultiRowCrossTab => "MultiRowCrossTab",
            LayoutKind::FullCrossTab => "FullCrossTab",
            LayoutKind::MultiColumnCrossTab => "MultiColumnCrossTab",
        }
    }
}

impl Default for LayoutKind {
    fn default() -> Self {
        LayoutKind::SingleRow
    }
}

/// Selects the layout for the given field counts.
pub fn select_layout(row_count: usize, column_count: usize, value_count: usize) -> LayoutKind {
    route_layout(row_count, column_count, value_count).0
}

/// Same as `select_layout`, also returning the configuration anomaly when the
/// counts fall outside the routing table and the default layout is used.
pub fn route_layout(
    row_count: usize,
    column_count: usize,
    value_count: usize,
) -> (LayoutKind, Option<PivotAnomaly>) {
    let kind = match (row_count, column_count) {
        _ if value_count == 0 => Some(LayoutKind::Degenerate),
        (1, 0) => Some(LayoutKind::SingleRow),
        (r, 0) if r >= 2 => Some(LayoutKind::MultiRow),
        (1, 1) => Some(LayoutKind::SimpleCrossTab),
        (r, 1) if r >= 2 => Some(LayoutKind::MultiRowCrossTab),
        (r, c) if r >= 2 && c >= 2 => Some(LayoutKind::FullCrossTab),
        (1, c) if c >= 2 => Some(LayoutKind::MultiColumnCrossTab),
        _ => None,
    };

    match kind {
        Some(kind) => {
            log_debug!(
                CAT_LAYOUT,
                "rows={} columns={} values={} -> {}",
                row_count,
                column_count,
                value_count,
                kind.name()
            );
            (kind, None)
        }
        None => {
            let anomaly = PivotAnomaly::configuration(format!(
                "no layout for rows={} columns={} values={}; using {}",
                row_count,
                column_count,
                value_count,
                LayoutKind::default().name()
            ))
            .logged();
            (LayoutKind::default(), Some(anomaly))
        }
    }
}
