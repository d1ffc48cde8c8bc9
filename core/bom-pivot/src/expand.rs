//! FILENAME: core/bom-pivot/src/expand.rs
//! Expand State - the only mutable piece of hierarchy-related state.
//!
//! Expansion is tracked per (hierarchy, axis, node id), outside the tree, so
//! expanding a node on the row axis never affects the column view of the same
//! dimension. A node that is not in the set is collapsed; ROOT counts as
//! expanded until an explicit set exists for that hierarchy and axis.
//!
//! Plain serializable data so an external cache can snapshot and restore it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::hierarchy::{Hierarchy, ROOT_ID};

/// One of the two pivot axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Row,
    Column,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::Row, Axis::Column];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Row => "row",
            Axis::Column => "column",
        }
    }
}

/// Expanded node ids per hierarchy and axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandState {
    hierarchies: BTreeMap<String, BTreeMap<Axis, BTreeSet<String>>>,
}

impl ExpandState {
    pub fn new() -> Self {
        ExpandState::default()
    }

    /// Whether `node_id` is expanded on `axis` of `hierarchy`.
    pub fn is_expanded(&self, hierarchy: &str, axis: Axis, node_id: &str) -> bool {
        match self.hierarchies.get(hierarchy).and_then(|axes| axes.get(&axis)) {
            Some(set) => set.contains(node_id),
            None => node_id == ROOT_ID,
        }
    }

    /// Expanded ids on one axis, including the implicit ROOT default.
    pub fn expanded_ids(&self, hierarchy: &str, axis: Axis) -> BTreeSet<String> {
        match self.hierarchies.get(hierarchy).and_then(|axes| axes.get(&axis)) {
            Some(set) => set.clone(),
            None => default_set(),
        }
    }

    /// Flips `node_id` on `axis`.
    ///
    /// Leaves and unknown ids are a no-op and return `None`; otherwise returns
    /// the node's new expanded state.
    pub fn toggle(&mut self, hierarchy: &Hierarchy, axis: Axis, node_id: &str) -> Option<bool> {
        let node = hierarchy.node(node_id)?;
        if node.is_leaf {
            return None;
        }
        let set = self.axis_set_mut(hierarchy.name(), axis);
        if set.remove(node_id) {
            Some(false)
        } else {
            set.insert(node_id.to_string());
            Some(true)
        }
    }

    /// Expands one node. Same no-op rules as `toggle`.
    pub fn expand(&mut self, hierarchy: &Hierarchy, axis: Axis, node_id: &str) -> bool {
        match hierarchy.node(node_id) {
            Some(node) if !node.is_leaf => {
                self.axis_set_mut(hierarchy.name(), axis)
                    .insert(node_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Collapses one node. Same no-op rules as `toggle`.
    pub fn collapse(&mut self, hierarchy: &Hierarchy, axis: Axis, node_id: &str) -> bool {
        match hierarchy.node(node_id) {
            Some(node) if !node.is_leaf => {
                self.axis_set_mut(hierarchy.name(), axis).remove(node_id);
                true
            }
            _ => false,
        }
    }

    /// Every non-leaf node of `hierarchy` expanded, on both axes.
    pub fn expand_all(&mut self, hierarchy: &Hierarchy) {
        let all: BTreeSet<String> = hierarchy.non_leaf_ids().map(str::to_string).collect();
        let axes = self.hierarchies.entry(hierarchy.name().to_string()).or_default();
        for axis in Axis::BOTH {
            axes.insert(axis, all.clone());
        }
    }

    /// Back to `{ROOT}` on both axes.
    pub fn collapse_all(&mut self, hierarchy: &Hierarchy) {
        let axes = self.hierarchies.entry(hierarchy.name().to_string()).or_default();
        for axis in Axis::BOTH {
            axes.insert(axis, default_set());
        }
    }

    /// Drops all state for one hierarchy, restoring the defaults.
    pub fn reset(&mut self, hierarchy: &str) {
        self.hierarchies.remove(hierarchy);
    }

    fn axis_set_mut(&mut self, hierarchy: &str, axis: Axis) -> &mut BTreeSet<String> {
        self.hierarchies
            .entry(hierarchy.to_string())
            .or_default()
            .entry(axis)
            .or_insert_with(default_set)
    }
}

fn default_set() -> BTreeSet<String> {
    BTreeSet::from([ROOT_ID.to_string()])
}

/// Value-style wrapper around `ExpandState::toggle`.
pub fn toggle_node(
    mut state: ExpandState,
    hierarchy: &Hierarchy,
    axis: Axis,
    node_id: &str,
) -> ExpandState {
    state.toggle(hierarchy, axis, node_id);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::DimensionNode;

    fn legal_entities() -> Hierarchy {
        Hierarchy::new(
            "LE",
            vec![
                DimensionNode::root(["NA", "EU"]),
                DimensionNode::branch("NA", "North America", 1, ROOT_ID, ["US", "CA"]),
                DimensionNode::leaf("US", "United States", 2, "NA", "US"),
                DimensionNode::leaf("CA", "Canada", 2, "NA", "CA"),
                DimensionNode::leaf("EU", "Europe", 1, ROOT_ID, "EU"),
            ],
        )
    }

    #[test]
    fn test_root_defaults_to_expanded() {
        let state = ExpandState::new();
        assert!(state.is_expanded("LE", Axis::Row, ROOT_ID));
        assert!(state.is_expanded("LE", Axis::Column, ROOT_ID));
        assert!(!state.is_expanded("LE", Axis::Row, "NA"));
    }

    #[test]
    fn test_toggle_flips_membership() {
        let h = legal_entities();
        let mut state = ExpandState::new();

        assert_eq!(state.toggle(&h, Axis::Row, "NA"), Some(true));
        assert!(state.is_expanded("LE", Axis::Row, "NA"));
        assert!(state.is_expanded("LE", Axis::Row, ROOT_ID));

        assert_eq!(state.toggle(&h, Axis::Row, "NA"), Some(false));
        assert!(!state.is_expanded("LE", Axis::Row, "NA"));
    }

    #[test]
    fn test_toggle_root_materializes_default() {
        let h = legal_entities();
        let mut state = ExpandState::new();
        assert_eq!(state.toggle(&h, Axis::Row, ROOT_ID), Some(false));
        assert!(!state.is_expanded("LE", Axis::Row, ROOT_ID));
        assert!(state.is_expanded("LE", Axis::Column, ROOT_ID));
    }

    #[test]
    fn test_axes_are_independent() {
        let h = legal_entities();
        let state = toggle_node(ExpandState::new(), &h, Axis::Row, "NA");
        assert!(state.is_expanded("LE", Axis::Row, "NA"));
        assert!(!state.is_expanded("LE", Axis::Column, "NA"));
    }

    #[test]
    fn test_leaf_and_unknown_are_noops() {
        let h = legal_entities();
        let mut state = ExpandState::new();
        assert_eq!(state.toggle(&h, Axis::Row, "US"), None);
        assert_eq!(state.toggle(&h, Axis::Row, "XX"), None);
        assert!(!state.expand(&h, Axis::Row, "US"));
        assert_eq!(state, ExpandState::new());
    }

    #[test]
    fn test_expand_all_and_collapse_all() {
        let h = legal_entities();
        let mut state = ExpandState::new();

        state.expand_all(&h);
        for axis in Axis::BOTH {
            assert!(state.is_expanded("LE", axis, ROOT_ID));
            assert!(state.is_expanded("LE", axis, "NA"));
            assert!(!state.is_expanded("LE", axis, "US"));
        }

        state.collapse_all(&h);
        for axis in Axis::BOTH {
            assert_eq!(state.expanded_ids("LE", axis), default_set());
        }
    }

    #[test]
    fn test_explicit_expand_and_collapse() {
        let h = legal_entities();
        let mut state = ExpandState::new();
        assert!(state.expand(&h, Axis::Column, "NA"));
        assert!(state.is_expanded("LE", Axis::Column, "NA"));
        assert!(state.collapse(&h, Axis::Column, "NA"));
        assert!(!state.is_expanded("LE", Axis::Column, "NA"));

        state.reset("LE");
        assert_eq!(state, ExpandState::new());
    }
}
