//! FILENAME: core/bom-pivot/src/hierarchy.rs
//! Hierarchy Model - immutable dimension trees.
//!
//! A `Hierarchy` is an arena of `DimensionNode`s addressed by id. It is built
//! once when dimension metadata loads and never mutated afterwards; expand and
//! collapse state lives in `ExpandState`, outside the tree, so one hierarchy
//! can be shared by both axes and by any number of concurrent computations.
//!
//! At build time every node gets its descendant leaves (in pre-order) and the
//! set of fact keys below it precomputed. Aggregation and filtering use those
//! sets instead of re-walking the tree for every cell.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::combination::KEY_SEPARATOR;
use crate::error::{HierarchyError, PivotAnomaly};
use crate::logging::{log_debug, CAT_HIERARCHY};

/// Id of the single parentless node of every hierarchy.
pub const ROOT_ID: &str = "ROOT";

/// Interned fact key, local to one hierarchy.
pub type FactKeyId = u32;

// ============================================================================
// NODES
// ============================================================================

/// One node of a dimension tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionNode {
    /// Unique within its hierarchy.
    pub id: String,

    /// Display label.
    pub label: String,

    /// Depth below ROOT (ROOT = 0).
    pub level: u32,

    /// None only for ROOT.
    pub parent_id: Option<String>,

    /// Children in display order.
    pub child_ids: Vec<String>,

    pub is_leaf: bool,

    /// Fact-table foreign key this leaf stands for. Leaves only.
    pub fact_key: Option<String>,
}

impl DimensionNode {
    /// The ROOT node with the given top-level children.
    pub fn root<S: Into<String>>(child_ids: impl IntoIterator<Item = S>) -> Self {
        DimensionNode {
            id: ROOT_ID.to_string(),
            label: "All".to_string(),
            level: 0,
            parent_id: None,
            child_ids: child_ids.into_iter().map(Into::into).collect(),
            is_leaf: false,
            fact_key: None,
        }
    }

    /// An inner node.
    pub fn branch<S: Into<String>>(
        id: impl Into<String>,
        label: impl Into<String>,
        level: u32,
        parent_id: impl Into<String>,
        child_ids: impl IntoIterator<Item = S>,
    ) -> Self {
        DimensionNode {
            id: id.into(),
            label: label.into(),
            level,
            parent_id: Some(parent_id.into()),
            child_ids: child_ids.into_iter().map(Into::into).collect(),
            is_leaf: false,
            fact_key: None,
        }
    }

    /// A leaf linked to the fact-table key `fact_key`.
    pub fn leaf(
        id: impl Into<String>,
        label: impl Into<String>,
        level: u32,
        parent_id: impl Into<String>,
        fact_key: impl Into<String>,
    ) -> Self {
        DimensionNode {
            id: id.into(),
            label: label.into(),
            level,
            parent_id: Some(parent_id.into()),
            child_ids: Vec::new(),
            is_leaf: true,
            fact_key: Some(fact_key.into()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.id == ROOT_ID
    }
}

/// A flat parent-link row, the shape dimension metadata usually arrives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLink {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub fact_key: Option<String>,
}

impl NodeLink {
    pub fn new(id: impl Into<String>, label: impl Into<String>, parent_id: Option<&str>) -> Self {
        NodeLink {
            id: id.into(),
            label: label.into(),
            parent_id: parent_id.map(str::to_string),
            fact_key: None,
        }
    }

    pub fn with_fact_key(mut self, fact_key: impl Into<String>) -> Self {
        self.fact_key = Some(fact_key.into());
        self
    }
}

// ============================================================================
// HIERARCHY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// An immutable dimension tree with precomputed rollup sets.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    name: String,

    /// Fact-table column holding this dimension's foreign key.
    fact_field: String,

    nodes: Vec<Arc<DimensionNode>>,

    index: FxHashMap<String, usize>,

    /// Descendant leaf indices per node, in pre-order. A leaf lists itself.
    descendant_leaves: Vec<Vec<u32>>,

    /// Interned fact keys of the descendant leaves, per node.
    leaf_key_sets: Vec<FxHashSet<FactKeyId>>,

    key_ids: FxHashMap<String, FactKeyId>,

    /// Pre-order position of the first leaf standing for each fact key.
    key_ranks: Vec<u32>,

    /// Ids dropped at build time because they contain `KEY_SEPARATOR`.
    reserved_ids: Vec<String>,

    /// Structural problems found while building.
    anomalies: Vec<PivotAnomaly>,
}

impl Hierarchy {
    /// Builds a hierarchy from already-linked nodes.
    ///
    /// Never fails: duplicate ids, ids containing `KEY_SEPARATOR`, dangling
    /// child ids and cycles are recorded as structural anomalies and the
    /// offending nodes or links are ignored.
    pub fn new(name: impl Into<String>, nodes: Vec<DimensionNode>) -> Self {
        let name = name.into();
        let mut anomalies = Vec::new();
        let mut reserved_ids = Vec::new();
        let mut index = FxHashMap::default();
        let mut kept = Vec::with_capacity(nodes.len());

        for node in nodes {
            if node.id.contains(KEY_SEPARATOR) {
                anomalies.push(
                    PivotAnomaly::structural(
                        &name,
                        format!("node id '{}' contains '{}'; node ignored", node.id, KEY_SEPARATOR),
                    )
                    .logged(),
                );
                reserved_ids.push(node.id);
                continue;
            }
            if index.contains_key(&node.id) {
                anomalies.push(
                    PivotAnomaly::structural(&name, format!("duplicate node id '{}' ignored", node.id))
                        .logged(),
                );
                continue;
            }
            index.insert(node.id.clone(), kept.len());
            kept.push(Arc::new(node));
        }

        let mut hierarchy = Hierarchy {
            fact_field: name.clone(),
            name,
            nodes: kept,
            index,
            descendant_leaves: Vec::new(),
            leaf_key_sets: Vec::new(),
            key_ids: FxHashMap::default(),
            key_ranks: Vec::new(),
            reserved_ids,
            anomalies,
        };
        hierarchy.precompute_rollups();

        log_debug!(
            CAT_HIERARCHY,
            "built hierarchy '{}' nodes={} leaf_keys={} anomalies={}",
            hierarchy.name,
            hierarchy.nodes.len(),
            hierarchy.key_ids.len(),
            hierarchy.anomalies.len()
        );
        hierarchy
    }

    /// Builds a hierarchy from flat parent-link rows.
    ///
    /// Children keep the order their rows appear in. Nodes without children
    /// become leaves; a leaf without an explicit fact key uses its id.
    pub fn from_parent_links(
        name: impl Into<String>,
        links: Vec<NodeLink>,
    ) -> Result<Self, HierarchyError> {
        let name = name.into();
        let mut index: FxHashMap<&str, usize> = FxHashMap::default();

        for (i, link) in links.iter().enumerate() {
            if link.id.is_empty() {
                return Err(HierarchyError::EmptyId(name));
            }
            if link.id.contains(KEY_SEPARATOR) {
                return Err(HierarchyError::ReservedSeparator {
                    hierarchy: name,
                    id: link.id.clone(),
                    separator: KEY_SEPARATOR,
                });
            }
            if index.insert(link.id.as_str(), i).is_some() {
                return Err(HierarchyError::DuplicateId {
                    hierarchy: name,
                    id: link.id.clone(),
                });
            }
        }

        let roots: Vec<&str> = links
            .iter()
            .filter(|l| l.parent_id.is_none())
            .map(|l| l.id.as_str())
            .collect();
        if !roots.contains(&ROOT_ID) {
            return Err(HierarchyError::MissingRoot(name));
        }
        if roots.len() > 1 {
            return Err(HierarchyError::MultipleRoots {
                hierarchy: name,
                ids: roots.iter().map(|s| s.to_string()).collect(),
            });
        }

        let mut children: Vec<Vec<String>> = vec![Vec::new(); links.len()];
        for link in &links {
            if let Some(parent) = &link.parent_id {
                match index.get(parent.as_str()) {
                    Some(&p) => children[p].push(link.id.clone()),
                    None => {
                        return Err(HierarchyError::DanglingReference {
                            hierarchy: name,
                            node: link.id.clone(),
                            relation: "parent",
                            target: parent.clone(),
                        })
                    }
                }
            }
        }

        let levels = compute_levels(&name, &links, &index)?;

        let nodes = links
            .iter()
            .zip(children)
            .zip(levels)
            .map(|((link, child_ids), level)| {
                let is_leaf = child_ids.is_empty() && link.parent_id.is_some();
                DimensionNode {
                    id: link.id.clone(),
                    label: link.label.clone(),
                    level,
                    parent_id: link.parent_id.clone(),
                    fact_key: if is_leaf {
                        Some(link.fact_key.clone().unwrap_or_else(|| link.id.clone()))
                    } else {
                        None
                    },
                    child_ids,
                    is_leaf,
                }
            })
            .collect();

        Ok(Hierarchy::new(name, nodes))
    }

    /// Joins this dimension on `field` instead of its own name.
    pub fn with_fact_field(mut self, field: impl Into<String>) -> Self {
        self.fact_field = field.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fact_field(&self) -> &str {
        &self.fact_field
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Arc<DimensionNode>> {
        self.index.get(id).map(|&ix| &self.nodes[ix])
    }

    pub fn root(&self) -> Option<&Arc<DimensionNode>> {
        self.node(ROOT_ID).filter(|n| n.parent_id.is_none())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<DimensionNode>> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Arc<DimensionNode>> {
        self.nodes.iter().filter(|n| n.is_leaf)
    }

    pub fn non_leaf_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter(|n| !n.is_leaf).map(|n| n.id.as_str())
    }

    /// Structural anomalies recorded while building.
    pub fn anomalies(&self) -> &[PivotAnomaly] {
        &self.anomalies
    }

    pub(crate) fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All leaves below `id` (the node itself if it is a leaf), in pre-order.
    pub fn descendant_leaves(&self, id: &str) -> Vec<&Arc<DimensionNode>> {
        match self.node_index(id) {
            Some(ix) => self.descendant_leaves[ix]
                .iter()
                .map(|&leaf| &self.nodes[leaf as usize])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Fact keys of all leaves below `id`, in pre-order.
    pub fn leaf_fact_keys(&self, id: &str) -> Vec<&str> {
        self.descendant_leaves(id)
            .into_iter()
            .filter_map(|leaf| leaf.fact_key.as_deref())
            .collect()
    }

    /// Every fact key any leaf of this hierarchy stands for.
    pub fn all_leaf_fact_keys(&self) -> FxHashSet<&str> {
        self.key_ids.keys().map(String::as_str).collect()
    }

    pub(crate) fn key_id(&self, key: &str) -> Option<FactKeyId> {
        self.key_ids.get(key).copied()
    }

    /// Pre-order rank of the leaf for `key`. Sorting leaf tuples by rank
    /// visits them in the order a walk from ROOT reaches them.
    pub(crate) fn key_rank(&self, key: FactKeyId) -> u32 {
        self.key_ranks.get(key as usize).copied().unwrap_or(u32::MAX)
    }

    pub(crate) fn subtree_contains_key_id(&self, node_ix: usize, key: FactKeyId) -> bool {
        self.leaf_key_sets
            .get(node_ix)
            .is_some_and(|set| set.contains(&key))
    }

    /// Whether the fact key `key` belongs to a leaf in the subtree of `node_id`.
    pub fn contains_fact_key(&self, node_id: &str, key: &str) -> bool {
        match (self.node_index(node_id), self.key_id(key)) {
            (Some(ix), Some(key)) => self.subtree_contains_key_id(ix, key),
            _ => false,
        }
    }

    /// Strict structural check for loaders that want to reject bad input.
    pub fn validate(&self) -> Result<(), HierarchyError> {
        if let Some(id) = self.reserved_ids.first() {
            return Err(HierarchyError::ReservedSeparator {
                hierarchy: self.name.clone(),
                id: id.clone(),
                separator: KEY_SEPARATOR,
            });
        }

        let roots: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| n.parent_id.is_none())
            .map(|n| n.id.as_str())
            .collect();
        if self.root().is_none() {
            return Err(HierarchyError::MissingRoot(self.name.clone()));
        }
        if roots.len() > 1 {
            return Err(HierarchyError::MultipleRoots {
                hierarchy: self.name.clone(),
                ids: roots.iter().map(|s| s.to_string()).collect(),
            });
        }

        for node in &self.nodes {
            if let Some(parent) = &node.parent_id {
                if !self.index.contains_key(parent) {
                    return Err(HierarchyError::DanglingReference {
                        hierarchy: self.name.clone(),
                        node: node.id.clone(),
                        relation: "parent",
                        target: parent.clone(),
                    });
                }
            }
            for child in &node.child_ids {
                if !self.index.contains_key(child) {
                    return Err(HierarchyError::DanglingReference {
                        hierarchy: self.name.clone(),
                        node: node.id.clone(),
                        relation: "child",
                        target: child.clone(),
                    });
                }
            }
            if node.is_leaf && node.fact_key.is_none() {
                return Err(HierarchyError::LeafWithoutFactKey {
                    hierarchy: self.name.clone(),
                    node: node.id.clone(),
                });
            }
        }

        // Walk from ROOT; reaching a node twice means a cycle or a shared child.
        let mut seen = FxHashSet::default();
        let mut stack = vec![ROOT_ID];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(HierarchyError::Cycle {
                    hierarchy: self.name.clone(),
                    node: id.to_string(),
                });
            }
            if let Some(node) = self.node(id) {
                stack.extend(node.child_ids.iter().map(String::as_str));
            }
        }
        Ok(())
    }

    /// Fills `descendant_leaves`, `leaf_key_sets`, `key_ids` and `key_ranks`.
    ///
    /// Iterative post-order walk with an explicit visit state per node, so a
    /// corrupted (cyclic) input is reported instead of overflowing the stack.
    fn precompute_rollups(&mut self) {
        let count = self.nodes.len();
        let mut state = vec![Visit::Unvisited; count];
        let mut leaves: Vec<Vec<u32>> = vec![Vec::new(); count];

        for start in 0..count {
            if state[start] != Visit::Unvisited {
                continue;
            }
            state[start] = Visit::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(&(ix, cursor)) = stack.last() {
                let node = &self.nodes[ix];
                if node.is_leaf {
                    if !node.child_ids.is_empty() {
                        self.anomalies.push(
                            PivotAnomaly::structural(
                                &self.name,
                                format!("leaf '{}' lists children; they are ignored", node.id),
                            )
                            .logged(),
                        );
                    }
                    leaves[ix] = vec![ix as u32];
                    state[ix] = Visit::Done;
                    stack.pop();
                    continue;
                }

                if let Some(child_id) = node.child_ids.get(cursor) {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match self.index.get(child_id) {
                        None => self.anomalies.push(
                            PivotAnomaly::structural(
                                &self.name,
                                format!("node '{}' references unknown child '{}'", node.id, child_id),
                            )
                            .logged(),
                        ),
                        Some(&child) => match state[child] {
                            Visit::Unvisited => {
                                state[child] = Visit::InProgress;
                                stack.push((child, 0));
                            }
                            Visit::InProgress => self.anomalies.push(
                                PivotAnomaly::structural(
                                    &self.name,
                                    format!("cycle through '{}' -> '{}' broken", node.id, child_id),
                                )
                                .logged(),
                            ),
                            Visit::Done => {}
                        },
                    }
                } else {
                    let mut collected = Vec::new();
                    for child_id in &node.child_ids {
                        if let Some(&child) = self.index.get(child_id) {
                            if state[child] == Visit::Done {
                                collected.extend_from_slice(&leaves[child]);
                            }
                        }
                    }
                    leaves[ix] = collected;
                    state[ix] = Visit::Done;
                    stack.pop();
                }
            }
        }

        let mut key_ids: FxHashMap<String, FactKeyId> = FxHashMap::default();
        let mut leaf_key: Vec<Option<FactKeyId>> = vec![None; count];
        for (ix, node) in self.nodes.iter().enumerate() {
            if !node.is_leaf {
                continue;
            }
            match &node.fact_key {
                Some(key) => {
                    let next = key_ids.len() as FactKeyId;
                    leaf_key[ix] = Some(*key_ids.entry(key.clone()).or_insert(next));
                }
                None => self.anomalies.push(
                    PivotAnomaly::structural(
                        &self.name,
                        format!("leaf '{}' has no fact key and matches no records", node.id),
                    )
                    .logged(),
                ),
            }
        }

        // Leaves reachable from ROOT first, in pre-order; stragglers after.
        let mut key_ranks = vec![u32::MAX; key_ids.len()];
        let mut next = 0u32;
        let from_root = self
            .index
            .get(ROOT_ID)
            .map(|&root| leaves[root].clone())
            .unwrap_or_default();
        for leaf in from_root.into_iter().chain(0..count as u32) {
            if let Some(key) = leaf_key[leaf as usize] {
                let rank = &mut key_ranks[key as usize];
                if *rank == u32::MAX {
                    *rank = next;
                    next += 1;
                }
            }
        }

        self.leaf_key_sets = leaves
            .iter()
            .map(|below| below.iter().filter_map(|&leaf| leaf_key[leaf as usize]).collect())
            .collect();
        self.descendant_leaves = leaves;
        self.key_ids = key_ids;
        self.key_ranks = key_ranks;
    }
}

/// Depth of every link below ROOT, following parent pointers.
fn compute_levels(
    name: &str,
    links: &[NodeLink],
    index: &FxHashMap<&str, usize>,
) -> Result<Vec<u32>, HierarchyError> {
    let mut levels: Vec<Option<u32>> = vec![None; links.len()];

    for start in 0..links.len() {
        let mut path = Vec::new();
        let mut on_path = FxHashSet::default();
        let mut current = start;

        let base = loop {
            if let Some(level) = levels[current] {
                break level;
            }
            if !on_path.insert(current) {
                return Err(HierarchyError::Cycle {
                    hierarchy: name.to_string(),
                    node: links[current].id.clone(),
                });
            }
            path.push(current);
            match links[current].parent_id.as_deref().and_then(|p| index.get(p)) {
                Some(&parent) => current = parent,
                None => {
                    levels[current] = Some(0);
                    path.pop();
                    break 0;
                }
            }
        };

        let mut level = base;
        for &ix in path.iter().rev() {
            level += 1;
            levels[ix] = Some(level);
        }
    }

    Ok(levels.into_iter().map(|l| l.unwrap_or(0)).collect())
}

// ============================================================================
// DIMENSIONS
// ============================================================================

/// All hierarchies of a session, keyed by dimension field id.
#[derive(Debug, Clone, Default)]
pub struct Dimensions {
    by_name: FxHashMap<String, Arc<Hierarchy>>,
}

impl Dimensions {
    pub fn new() -> Self {
        Dimensions::default()
    }

    /// Registers a hierarchy under its name, returning any it replaced.
    pub fn insert(&mut self, hierarchy: Hierarchy) -> Option<Arc<Hierarchy>> {
        self.insert_shared(Arc::new(hierarchy))
    }

    pub fn insert_shared(&mut self, hierarchy: Arc<Hierarchy>) -> Option<Arc<Hierarchy>> {
        self.by_name.insert(hierarchy.name().to_string(), hierarchy)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Hierarchy>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Hierarchy>> {
        self.by_name.values()
    }
}

impl FromIterator<Hierarchy> for Dimensions {
    fn from_iter<I: IntoIterator<Item = Hierarchy>>(iter: I) -> Self {
        let mut dimensions = Dimensions::new();
        for hierarchy in iter {
            dimensions.insert(hierarchy);
        }
        dimensions
    }
}
