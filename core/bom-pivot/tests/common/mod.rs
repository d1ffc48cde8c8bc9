//! FILENAME: tests/common/mod.rs
//! Fixtures for bom-pivot integration tests.
//!
//! The reference bill of materials:
//!
//! ```text
//! LE: ROOT -> NA -> US, CA        CE: ROOT -> MAT, LAB
//!          -> EU
//!
//! LE  CE   COST  QTY  PL
//! US  MAT     6    1  P1
//! US  LAB     4    2  P2
//! CA  MAT     5    3  P1
//! EU  LAB     7    4  P2
//! ```
//!
//! PL (plant, flat: ROOT -> P1, P2) is only present in the `*_with_plants`
//! fixtures.

#![allow(dead_code)]

use bom_pivot::{
    Dimensions, DimensionNode, FactRecord, FactTable, Hierarchy, NodeLink, PivotSession, ROOT_ID,
};

pub fn legal_entities() -> Hierarchy {
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

/// Same tree as `legal_entities`, loaded from parent links.
pub fn legal_entities_from_links() -> Hierarchy {
    Hierarchy::from_parent_links(
        "LE",
        vec![
            NodeLink::new(ROOT_ID, "All", None),
            NodeLink::new("NA", "North America", Some(ROOT_ID)),
            NodeLink::new("US", "United States", Some("NA")),
            NodeLink::new("CA", "Canada", Some("NA")),
            NodeLink::new("EU", "Europe", Some(ROOT_ID)),
        ],
    )
    .unwrap()
}

pub fn cost_elements() -> Hierarchy {
    Hierarchy::new(
        "CE",
        vec![
            DimensionNode::root(["MAT", "LAB"]),
            DimensionNode::leaf("MAT", "Material", 1, ROOT_ID, "MAT"),
            DimensionNode::leaf("LAB", "Labour", 1, ROOT_ID, "LAB"),
        ],
    )
}

pub fn plants() -> Hierarchy {
    Hierarchy::new(
        "PL",
        vec![
            DimensionNode::root(["P1", "P2"]),
            DimensionNode::leaf("P1", "Plant 1", 1, ROOT_ID, "P1"),
            DimensionNode::leaf("P2", "Plant 2", 1, ROOT_ID, "P2"),
        ],
    )
}

pub fn dimensions() -> Dimensions {
    vec![legal_entities(), cost_elements()].into_iter().collect()
}

pub fn dimensions_with_plants() -> Dimensions {
    vec![legal_entities(), cost_elements(), plants()].into_iter().collect()
}

pub fn fact_table() -> FactTable {
    FactTable::from_records(vec![
        record("US", "MAT", 6.0, 1.0),
        record("US", "LAB", 4.0, 2.0),
        record("CA", "MAT", 5.0, 3.0),
        record("EU", "LAB", 7.0, 4.0),
    ])
}

pub fn fact_table_with_plants() -> FactTable {
    fact_table()
        .iter()
        .cloned()
        .zip(["P1", "P2", "P1", "P2"])
        .map(|(record, plant)| record.with("PL", plant))
        .collect()
}

pub fn record(le: &str, ce: &str, cost: f64, qty: f64) -> FactRecord {
    FactRecord::new()
        .with("LE", le)
        .with("CE", ce)
        .with("COST", cost)
        .with("QTY", qty)
}

pub fn session() -> PivotSession {
    PivotSession::new(dimensions(), fact_table())
}

/// Sum of COST over every record, ignoring hierarchies.
pub fn unfiltered_cost(facts: &FactTable) -> f64 {
    facts
        .iter()
        .filter_map(|r| r.get("COST").and_then(|v| v.as_number()))
        .sum()
}
