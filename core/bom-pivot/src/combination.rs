//! FILENAME: core/bom-pivot/src/combination.rs
//! Combination Generator - row and column tuples for one axis.
//!
//! Given one visible-node list per dimension assigned to an axis, produces the
//! Cartesian product in assignment order: the first dimension varies slowest,
//! so consecutive combinations share leading nodes and the renderer can merge
//! their headers. Each combination carries a span per level for that merge.
//!
//! Fan-out is bounded. Dimensions after the first contribute at most
//! `FanOutLimits::secondary_dimension_cap` nodes and an axis holds at most
//! `FanOutLimits::max_combinations` combinations; anything beyond is cut off
//! and reported as a capacity anomaly.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::PivotAnomaly;
use crate::expand::Axis;
use crate::hierarchy::DimensionNode;
use crate::logging::{log_debug, CAT_COMBINE};

/// Joins node ids into a combination key. Never valid inside a node id.
pub const KEY_SEPARATOR: char = '|';

/// Default ceiling on nodes taken from every dimension after the first.
pub const DEFAULT_SECONDARY_DIMENSION_CAP: usize = 500;

/// Default ceiling on combinations per axis.
pub const DEFAULT_MAX_COMBINATIONS: usize = 100_000;

/// Default ceiling on row x column x measure cells in one result.
pub const DEFAULT_MAX_CELLS: usize = 5_000_000;

/// Bounds on combinatorial growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanOutLimits {
    /// Nodes taken from each dimension k > 0 on an axis.
    pub secondary_dimension_cap: usize,

    /// Combinations kept per axis.
    pub max_combinations: usize,

    /// Cells kept per result; rows are cut to fit.
    pub max_cells: usize,
}

impl Default for FanOutLimits {
    fn default() -> Self {
        FanOutLimits {
            secondary_dimension_cap: DEFAULT_SECONDARY_DIMENSION_CAP,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            max_cells: DEFAULT_MAX_CELLS,
        }
    }
}

/// One row or column of the pivot: one node per assigned dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCombination {
    /// One node per dimension, in assignment order. Empty for the total.
    pub nodes: SmallVec<[Arc<DimensionNode>; 4]>,

    /// Node ids joined with `KEY_SEPARATOR`.
    pub key: String,

    /// Header span per level: how many consecutive combinations share this
    /// combination's nodes up to that level, when this one opens the run;
    /// 0 when it continues a run started above.
    pub spans: SmallVec<[u32; 4]>,
}

impl NodeCombination {
    pub fn new(nodes: SmallVec<[Arc<DimensionNode>; 4]>) -> Self {
        let key = combination_key(nodes.iter().map(|n| n.id.as_str()));
        let spans = SmallVec::from_elem(1, nodes.len());
        NodeCombination { nodes, key, spans }
    }

    /// The empty combination standing for "all records" on an axis.
    pub fn total() -> Self {
        NodeCombination {
            nodes: SmallVec::new(),
            key: String::new(),
            spans: SmallVec::new(),
        }
    }

    pub fn is_total(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of dimensions in the combination.
    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.label.as_str()).collect()
    }
}

/// Joins ids with `KEY_SEPARATOR`.
pub fn combination_key<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let mut key = String::new();
    for (i, id) in ids.into_iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(id);
    }
    key
}

/// Output of the generator.
#[derive(Debug, Clone, Default)]
pub struct CombinationSet {
    pub combinations: Vec<NodeCombination>,

    /// Whether any limit cut the product short.
    pub truncated: bool,

    pub anomalies: Vec<PivotAnomaly>,
}

/// Builds the combinations for one axis.
///
/// No dimensions yields the single total combination; a dimension with no
/// visible nodes yields nothing. Anomalies name `axis`.
pub fn generate_combinations(
    axis: Axis,
    visible_per_dimension: &[Vec<Arc<DimensionNode>>],
    limits: &FanOutLimits,
) -> CombinationSet {
    let mut set = CombinationSet::default();

    if visible_per_dimension.is_empty() {
        set.combinations.push(NodeCombination::total());
        return set;
    }
    if visible_per_dimension.iter().any(|nodes| nodes.is_empty()) {
        return set;
    }

    let lists: Vec<&[Arc<DimensionNode>]> = visible_per_dimension
        .iter()
        .enumerate()
        .map(|(dim, nodes)| {
            if dim > 0 && nodes.len() > limits.secondary_dimension_cap {
                set.truncated = true;
                set.anomalies.push(
                    PivotAnomaly::capacity(format!(
                        "dimension {} has {} visible nodes; only the first {} are combined",
                        dim,
                        nodes.len(),
                        limits.secondary_dimension_cap
                    ))
                    .logged(),
                );
                &nodes[..limits.secondary_dimension_cap]
            } else {
                &nodes[..]
            }
        })
        .collect();

    let axis_name = format!("{} axis", axis.as_str());
    let mut seen = FxHashSet::default();
    let mut prefix: SmallVec<[Arc<DimensionNode>; 4]> = SmallVec::new();
    let complete = extend_product(
        &axis_name,
        &lists,
        &mut prefix,
        &mut seen,
        &mut set,
        limits.max_combinations,
    );
    if !complete {
        set.truncated = true;
        set.anomalies.push(
            PivotAnomaly::capacity(format!(
                "axis product exceeds {} combinations; truncated",
                limits.max_combinations
            ))
            .logged(),
        );
    }

    assign_spans(&mut set.combinations);

    log_debug!(
        CAT_COMBINE,
        "{} dimension(s) -> {} combination(s){}",
        lists.len(),
        set.combinations.len(),
        if set.truncated { " (truncated)" } else { "" }
    );
    set
}

/// Depth-first, left-to-right product. Returns false once `max` is reached
/// with work still pending.
fn extend_product(
    axis_name: &str,
    lists: &[&[Arc<DimensionNode>]],
    prefix: &mut SmallVec<[Arc<DimensionNode>; 4]>,
    seen: &mut FxHashSet<String>,
    set: &mut CombinationSet,
    max: usize,
) -> bool {
    let depth = prefix.len();
    if depth == lists.len() {
        if set.combinations.len() >= max {
            return false;
        }
        let combination = NodeCombination::new(prefix.clone());
        if seen.insert(combination.key.clone()) {
            set.combinations.push(combination);
        } else {
            set.anomalies.push(
                PivotAnomaly::structural(
                    axis_name,
                    format!("combination '{}' generated twice; duplicate dropped", combination.key),
                )
                .logged(),
            );
        }
        return true;
    }

    for node in lists[depth] {
        prefix.push(Arc::clone(node));
        let complete = extend_product(axis_name, lists, prefix, seen, set, max);
        prefix.pop();
        if !complete {
            return false;
        }
    }
    true
}

/// Fills `spans` for header merging.
pub(crate) fn assign_spans(combinations: &mut [NodeCombination]) {
    let levels = combinations.first().map_or(0, |c| c.nodes.len());
    for level in 0..levels {
        let mut start = 0;
        while start < combinations.len() {
            let mut end = start + 1;
            while end < combinations.len() && same_prefix(&combinations[start], &combinations[end], level) {
                end += 1;
            }
            combinations[start].spans[level] = (end - start) as u32;
            for combination in &mut combinations[start + 1..end] {
                combination.spans[level] = 0;
            }
            start = end;
        }
    }
}

fn same_prefix(a: &NodeCombination, b: &NodeCombination, level: usize) -> bool {
    a.nodes
        .iter()
        .zip(b.nodes.iter())
        .take(level + 1)
        .all(|(x, y)| x.id == y.id)
}
