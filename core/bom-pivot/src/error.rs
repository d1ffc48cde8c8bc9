//! FILENAME: core/bom-pivot/src/error.rs
//! Anomalies and construction errors.
//!
//! The pivot computation itself never fails: every recognized problem is
//! recorded as a `PivotAnomaly`, logged, and the result degrades to something
//! smaller that is still correct for what it shows. Only loader-side
//! construction (`Hierarchy::from_parent_links`, `Hierarchy::validate`)
//! returns a hard `HierarchyError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{
    log_warn, CAT_AGGREGATE, CAT_COMBINE, CAT_HIERARCHY, CAT_LAYOUT,
};

/// Broad class of an anomaly, used for filtering and log routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Broken hierarchy reference, missing ROOT, cycle.
    Structural,
    /// Unroutable field-count combination.
    Configuration,
    /// Measure value that does not parse as a number.
    Data,
    /// Combination fan-out exceeding a configured bound.
    Capacity,
}

/// A recovered problem encountered while computing a pivot.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PivotAnomaly {
    #[error("structural anomaly in hierarchy '{hierarchy}': {detail}")]
    Structural { hierarchy: String, detail: String },

    #[error("configuration anomaly: {detail}")]
    Configuration { detail: String },

    #[error("data anomaly in field '{field}' of record {record}: {detail}")]
    Data {
        field: String,
        record: usize,
        detail: String,
    },

    #[error("capacity anomaly: {detail}")]
    Capacity { detail: String },
}

impl PivotAnomaly {
    pub fn structural(hierarchy: &str, detail: impl Into<String>) -> Self {
        PivotAnomaly::Structural {
            hierarchy: hierarchy.to_string(),
            detail: detail.into(),
        }
    }

    pub fn configuration(detail: impl Into<String>) -> Self {
        PivotAnomaly::Configuration {
            detail: detail.into(),
        }
    }

    pub fn data(field: &str, record: usize, detail: impl Into<String>) -> Self {
        PivotAnomaly::Data {
            field: field.to_string(),
            record,
            detail: detail.into(),
        }
    }

    pub fn capacity(detail: impl Into<String>) -> Self {
        PivotAnomaly::Capacity {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> AnomalyKind {
        match self {
            PivotAnomaly::Structural { .. } => AnomalyKind::Structural,
            PivotAnomaly::Configuration { .. } => AnomalyKind::Configuration,
            PivotAnomaly::Data { .. } => AnomalyKind::Data,
            PivotAnomaly::Capacity { .. } => AnomalyKind::Capacity,
        }
    }

    /// Writes the anomaly to the log under its category.
    pub(crate) fn log(&self) {
        let category = match self.kind() {
            AnomalyKind::Structural => CAT_HIERARCHY,
            AnomalyKind::Configuration => CAT_LAYOUT,
            AnomalyKind::Data => CAT_AGGREGATE,
            AnomalyKind::Capacity => CAT_COMBINE,
        };
        log_warn!(category, "{}", self);
    }

    /// Logs the anomaly and hands it back, for `anomalies.push(a.logged())`.
    pub(crate) fn logged(self) -> Self {
        self.log();
        self
    }
}

/// Hard errors in hierarchy input, reported to the loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("hierarchy '{0}' has no ROOT node")]
    MissingRoot(String),

    #[error("hierarchy '{hierarchy}' has more than one parentless node: {ids:?}")]
    MultipleRoots { hierarchy: String, ids: Vec<String> },

    #[error("hierarchy '{0}' contains a node with an empty id")]
    EmptyId(String),

    #[error("duplicate node id '{id}' in hierarchy '{hierarchy}'")]
    DuplicateId { hierarchy: String, id: String },

    #[error("node id '{id}' in hierarchy '{hierarchy}' contains the reserved separator '{separator}'")]
    ReservedSeparator {
        hierarchy: String,
        id: String,
        separator: char,
    },

    #[error("node '{node}' in hierarchy '{hierarchy}' references unknown {relation} '{target}'")]
    DanglingReference {
        hierarchy: String,
        node: String,
        relation: &'static str,
        target: String,
    },

    #[error("cycle detected at node '{node}' in hierarchy '{hierarchy}'")]
    Cycle { hierarchy: String, node: String },

    #[error("leaf '{node}' in hierarchy '{hierarchy}' has no fact key")]
    LeafWithoutFactKey { hierarchy: String, node: String },
}
