//! FILENAME: core/bom-pivot/src/visibility.rs
//! Visibility Resolver - which nodes of a hierarchy are on screen.
//!
//! Pre-order walk from ROOT:
//! - a leaf is emitted;
//! - a collapsed inner node is emitted and stands for its whole subtree;
//! - an expanded inner node is replaced by its children, in order.
//!
//! The emitted nodes are mutually exclusive and jointly cover every leaf
//! reachable from ROOT, so aggregating over them never double counts or drops
//! a record.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::error::PivotAnomaly;
use crate::expand::{Axis, ExpandState};
use crate::hierarchy::{DimensionNode, Hierarchy, ROOT_ID};
use crate::logging::{log_debug, CAT_VISIBILITY};

/// Ordered visible nodes of `hierarchy` on `axis`.
///
/// An empty hierarchy or one without ROOT yields an empty list.
pub fn resolve_visible(
    hierarchy: &Hierarchy,
    axis: Axis,
    expand_state: &ExpandState,
) -> Vec<Arc<DimensionNode>> {
    resolve_visible_with_anomalies(hierarchy, axis, expand_state).0
}

/// Same as `resolve_visible`, also returning the structural anomalies met on
/// the way (unknown child ids, nodes reached twice, missing ROOT).
pub fn resolve_visible_with_anomalies(
    hierarchy: &Hierarchy,
    axis: Axis,
    expand_state: &ExpandState,
) -> (Vec<Arc<DimensionNode>>, Vec<PivotAnomaly>) {
    let mut visible = Vec::new();
    let mut anomalies = Vec::new();

    let root = match hierarchy.root() {
        Some(root) => root,
        None => {
            if !hierarchy.is_empty() {
                anomalies.push(
                    PivotAnomaly::structural(hierarchy.name(), "no ROOT node; nothing is visible")
                        .logged(),
                );
            }
            return (visible, anomalies);
        }
    };

    let name = hierarchy.name();
    let mut visited: FxHashSet<&str> = FxHashSet::default();
    let mut stack: Vec<&Arc<DimensionNode>> = vec![root];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id.as_str()) {
            anomalies.push(
                PivotAnomaly::structural(name, format!("node '{}' reached twice; skipped", node.id))
                    .logged(),
            );
            continue;
        }

        if node.is_leaf || !expand_state.is_expanded(name, axis, &node.id) {
            visible.push(Arc::clone(node));
            continue;
        }

        // Push in reverse so children pop in display order.
        for child_id in node.child_ids.iter().rev() {
            match hierarchy.node(child_id) {
                Some(child) => stack.push(child),
                None => anomalies.push(
                    PivotAnomaly::structural(
                        name,
                        format!("node '{}' references unknown child '{}'; skipped", node.id, child_id),
                    )
                    .logged(),
                ),
            }
        }
    }

    log_debug!(
        CAT_VISIBILITY,
        "{} {} axis: {} visible node(s) from {}",
        name,
        axis.as_str(),
        visible.len(),
        ROOT_ID
    );
    (visible, anomalies)
}
