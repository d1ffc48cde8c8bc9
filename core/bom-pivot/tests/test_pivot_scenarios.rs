//! FILENAME: tests/test_pivot_scenarios.rs
//! End-to-end pivot scenarios over the reference bill of materials.

mod common;

use bom_pivot::{
    compute_pivot, drill_down, AnomalyKind, Axis, Dimensions, EngineConfig, ExpandState,
    FactRecord, FactTable, LayoutKind, PivotRequest, PivotResult,
};
use common::*;

fn cost_by_le() -> PivotRequest {
    PivotRequest::new().with_rows(["LE"]).with_values(["COST"])
}

/// Sum of every cell of `measure`.
fn cell_sum(result: &PivotResult, measure: &str) -> f64 {
    let mut sum = 0.0;
    for row in result.row_keys() {
        for column in result.column_keys() {
            sum += result.value(row, column, measure).unwrap_or_default();
        }
    }
    sum
}

fn spans(combinations: &[bom_pivot::NodeCombination], level: usize) -> Vec<u32> {
    combinations.iter().map(|c| c.spans[level]).collect()
}

// ============================================================================
// EXPAND / COLLAPSE
// ============================================================================

#[test]
fn test_le_collapsed_then_expanded() {
    let dims = dimensions();
    let facts = fact_table();
    let config = EngineConfig::default();
    let request = cost_by_le();

    let mut expand = ExpandState::new();
    let collapsed = compute_pivot(&request, &dims, &facts, &expand, &config);
    assert_eq!(collapsed.row_keys(), vec!["NA", "EU"]);
    assert_eq!(collapsed.value("NA", "", "COST"), Some(15.0));
    assert_eq!(collapsed.value("EU", "", "COST"), Some(7.0));
    assert_eq!(collapsed.grand_total("COST"), Some(22.0));

    expand.toggle(dims.get("LE").unwrap(), Axis::Row, "NA");
    let expanded = compute_pivot(&request, &dims, &facts, &expand, &config);
    assert_eq!(expanded.row_keys(), vec!["US", "CA", "EU"]);
    assert_eq!(expanded.value("US", "", "COST"), Some(10.0));
    assert_eq!(expanded.value("CA", "", "COST"), Some(5.0));
    assert_eq!(expanded.value("EU", "", "COST"), Some(7.0));
    assert_eq!(expanded.grand_total("COST"), Some(22.0));
}

#[test]
fn test_parent_link_hierarchy_gives_same_result() {
    let dims: Dimensions = vec![legal_entities_from_links(), cost_elements()]
        .into_iter()
        .collect();
    let facts = fact_table();
    let result = compute_pivot(
        &cost_by_le(),
        &dims,
        &facts,
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.row_keys(), vec!["NA", "EU"]);
    assert_eq!(result.value("NA", "", "COST"), Some(15.0));
}

#[test]
fn test_collapse_invariance_of_parent_value() {
    let mut session = session();
    session.set_request(cost_by_le());
    let before = session.result().value("NA", "", "COST");

    session.toggle("LE", Axis::Row, "NA");
    session.toggle("LE", Axis::Row, "NA");
    assert_eq!(session.result().value("NA", "", "COST"), before);
}

// ============================================================================
// MULTI-DIMENSION LAYOUTS
// ============================================================================

#[test]
fn test_two_row_dimensions_four_combinations() {
    let request = PivotRequest::new()
        .with_rows(["LE", "CE"])
        .with_values(["COST"]);
    let facts = fact_table();
    let result = compute_pivot(
        &request,
        &dimensions(),
        &facts,
        &ExpandState::new(),
        &EngineConfig::default(),
    );

    assert_eq!(result.layout, LayoutKind::MultiRow);
    assert_eq!(result.row_keys(), vec!["NA|MAT", "NA|LAB", "EU|MAT", "EU|LAB"]);

    let sum: f64 = result
        .row_keys()
        .iter()
        .map(|key| result.value(key, "", "COST").unwrap())
        .sum();
    assert_eq!(sum, unfiltered_cost(&facts));

    // Header spans: NA and EU each open a run of two.
    let outer: Vec<u32> = result.row_combinations.iter().map(|c| c.spans[0]).collect();
    assert_eq!(outer, vec![2, 0, 2, 0]);
}

#[test]
fn test_cross_tab_with_two_measures() {
    let request = PivotRequest::new()
        .with_rows(["LE"])
        .with_columns(["CE"])
        .with_values(["COST", "QTY"]);
    let result = compute_pivot(
        &request,
        &dimensions(),
        &fact_table(),
        &ExpandState::new(),
        &EngineConfig::default(),
    );

    assert_eq!(result.layout, LayoutKind::SimpleCrossTab);
    assert_eq!(result.column_keys(), vec!["MAT", "LAB"]);
    assert_eq!(result.value("NA", "MAT", "COST"), Some(11.0));
    assert_eq!(result.value("NA", "MAT", "QTY"), Some(4.0));
    assert_eq!(result.value("EU", "LAB", "QTY"), Some(4.0));
    assert_eq!(result.row_total("NA", "QTY"), Some(6.0));
    assert_eq!(result.column_total("MAT", "COST"), Some(11.0));
    assert_eq!(result.grand_total("QTY"), Some(10.0));
}

#[test]
fn test_multi_row_cross_tab() {
    let request = PivotRequest::new()
        .with_rows(["LE", "CE"])
        .with_columns(["PL"])
        .with_values(["COST"]);
    let result = compute_pivot(
        &request,
        &dimensions_with_plants(),
        &fact_table_with_plants(),
        &ExpandState::new(),
        &EngineConfig::default(),
    );

    assert_eq!(result.layout, LayoutKind::MultiRowCrossTab);
    assert_eq!(result.row_keys(), vec!["NA|MAT", "NA|LAB", "EU|MAT", "EU|LAB"]);
    assert_eq!(result.column_keys(), vec!["P1", "P2"]);
    assert_eq!(spans(&result.row_combinations, 0), vec![2, 0, 2, 0]);
    assert_eq!(spans(&result.row_combinations, 1), vec![1, 1, 1, 1]);

    assert_eq!(result.value("NA|MAT", "P1", "COST"), Some(11.0));
    assert_eq!(result.value("NA|LAB", "P2", "COST"), Some(4.0));
    assert_eq!(result.value("EU|LAB", "P2", "COST"), Some(7.0));
    assert_eq!(result.value("EU|MAT", "P1", "COST"), Some(0.0));
    assert_eq!(result.row_total("NA|MAT", "COST"), Some(11.0));
    assert_eq!(result.column_total("P2", "COST"), Some(11.0));
    assert_eq!(cell_sum(&result, "COST"), 22.0);
    assert_eq!(result.grand_total("COST"), Some(22.0));
}

#[test]
fn test_full_cross_tab() {
    let dims = dimensions_with_plants();
    let request = PivotRequest::new()
        .with_rows(["LE", "CE"])
        .with_columns(["PL", "LE"])
        .with_values(["COST", "QTY"]);
    let mut expand = ExpandState::new();
    expand.toggle(dims.get("LE").unwrap(), Axis::Column, "NA");

    let result = compute_pivot(&request, &dims, &fact_table_with_plants(), &expand, &EngineConfig::default());

    assert_eq!(result.layout, LayoutKind::FullCrossTab);
    assert_eq!(result.row_keys(), vec!["NA|MAT", "NA|LAB", "EU|MAT", "EU|LAB"]);
    assert_eq!(
        result.column_keys(),
        vec!["P1|US", "P1|CA", "P1|EU", "P2|US", "P2|CA", "P2|EU"]
    );
    assert_eq!(spans(&result.column_combinations, 0), vec![3, 0, 0, 3, 0, 0]);

    assert_eq!(result.value("NA|MAT", "P1|US", "COST"), Some(6.0));
    assert_eq!(result.value("NA|MAT", "P1|CA", "COST"), Some(5.0));
    assert_eq!(result.value("NA|MAT", "P1|CA", "QTY"), Some(3.0));
    assert_eq!(result.value("EU|LAB", "P2|EU", "COST"), Some(7.0));
    assert_eq!(result.value("EU|LAB", "P2|US", "COST"), Some(0.0));
    assert_eq!(result.column_total("P1|US", "COST"), Some(6.0));
    assert_eq!(result.column_total("P2|US", "QTY"), Some(2.0));
    assert_eq!(result.row_total("NA|LAB", "COST"), Some(4.0));
    assert_eq!(cell_sum(&result, "COST"), 22.0);
    assert_eq!(cell_sum(&result, "QTY"), 10.0);
    assert_eq!(result.grand_total("COST"), Some(22.0));
}

#[test]
fn test_multi_column_cross_tab() {
    let dims = dimensions_with_plants();
    let facts = fact_table_with_plants();
    let request = PivotRequest::new()
        .with_rows(["LE"])
        .with_columns(["CE", "PL"])
        .with_values(["COST"]);
    let result = compute_pivot(&request, &dims, &facts, &ExpandState::new(), &EngineConfig::default());

    assert_eq!(result.layout, LayoutKind::MultiColumnCrossTab);
    assert_eq!(result.row_keys(), vec!["NA", "EU"]);
    assert_eq!(result.column_keys(), vec!["MAT|P1", "MAT|P2", "LAB|P1", "LAB|P2"]);
    assert_eq!(spans(&result.column_combinations, 0), vec![2, 0, 2, 0]);

    assert_eq!(result.value("NA", "MAT|P1", "COST"), Some(11.0));
    assert_eq!(result.value("NA", "MAT|P2", "COST"), Some(0.0));
    assert_eq!(result.value("NA", "LAB|P2", "COST"), Some(4.0));
    assert_eq!(result.value("EU", "LAB|P2", "COST"), Some(7.0));
    assert_eq!(result.column_total("LAB|P2", "COST"), Some(11.0));
    assert_eq!(result.row_total("NA", "COST"), Some(15.0));
    assert_eq!(cell_sum(&result, "COST"), 22.0);
    assert_eq!(result.grand_total("COST"), Some(22.0));

    let cell = drill_down(&request, &dims, &facts, &ExpandState::new(), "NA", "MAT|P1", 10);
    assert_eq!(cell.record_indices, vec![0, 2]);
}

#[test]
fn test_same_dimension_on_both_axes_is_independent() {
    let dims = dimensions();
    let request = PivotRequest::new()
        .with_rows(["LE"])
        .with_columns(["LE"])
        .with_values(["COST"]);
    let mut expand = ExpandState::new();
    expand.toggle(dims.get("LE").unwrap(), Axis::Column, "NA");

    let result = compute_pivot(&request, &dims, &fact_table(), &expand, &EngineConfig::default());
    assert_eq!(result.row_keys(), vec!["NA", "EU"]);
    assert_eq!(result.column_keys(), vec!["US", "CA", "EU"]);
    assert_eq!(result.value("NA", "US", "COST"), Some(10.0));
    assert_eq!(result.value("EU", "US", "COST"), Some(0.0));
    assert_eq!(result.value("EU", "EU", "COST"), Some(7.0));
}

#[test]
fn test_no_value_fields_is_degenerate() {
    let request = PivotRequest::new().with_rows(["LE"]).with_columns(["CE"]);
    let result = compute_pivot(
        &request,
        &dimensions(),
        &fact_table(),
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.layout, LayoutKind::Degenerate);
    assert!(result.is_empty());
    assert!(result.values.is_empty());
}

// ============================================================================
// FILTERS
// ============================================================================

#[test]
fn test_filter_on_inner_node() {
    let request = cost_by_le().with_filter("LE", ["NA"]);
    let result = compute_pivot(
        &request,
        &dimensions(),
        &fact_table(),
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.filtered_record_count, 3);
    assert_eq!(result.value("NA", "", "COST"), Some(15.0));
    assert_eq!(result.value("EU", "", "COST"), Some(0.0));
    assert_eq!(result.grand_total("COST"), Some(15.0));
}

#[test]
fn test_filter_on_other_dimension() {
    let request = cost_by_le().with_filter("CE", ["LAB"]);
    let result = compute_pivot(
        &request,
        &dimensions(),
        &fact_table(),
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.value("NA", "", "COST"), Some(4.0));
    assert_eq!(result.value("EU", "", "COST"), Some(7.0));
}

#[test]
fn test_unknown_filter_id_is_reported() {
    let request = cost_by_le().with_filter("LE", ["NA", "MARS"]);
    let result = compute_pivot(
        &request,
        &dimensions(),
        &fact_table(),
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.grand_total("COST"), Some(15.0));
    assert_eq!(result.anomalies_of(AnomalyKind::Structural).count(), 1);
}

// ============================================================================
// DATA ANOMALIES
// ============================================================================

#[test]
fn test_malformed_measures_count_as_zero() {
    let mut facts: FactTable = fact_table().iter().cloned().collect();
    facts.push(FactRecord::new().with("LE", "EU").with("COST", "twelve"));
    facts.push(FactRecord::new().with("LE", "EU").with("COST", " 1,000 "));
    facts.push(FactRecord::new().with("LE", "EU"));

    let result = compute_pivot(
        &cost_by_le(),
        &dimensions(),
        &facts,
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.value("EU", "", "COST"), Some(1007.0));
    let data: Vec<_> = result.anomalies_of(AnomalyKind::Data).collect();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].to_string(), "data anomaly in field 'COST' of record 4: 'twelve' is not a number");
}

#[test]
fn test_record_with_unknown_key_only_in_grand_total() {
    let mut facts: FactTable = fact_table().iter().cloned().collect();
    facts.push(FactRecord::new().with("LE", "MX").with("COST", 100.0));

    let result = compute_pivot(
        &cost_by_le(),
        &dimensions(),
        &facts,
        &ExpandState::new(),
        &EngineConfig::default(),
    );
    assert_eq!(result.value("NA", "", "COST"), Some(15.0));
    assert_eq!(result.value("EU", "", "COST"), Some(7.0));
    assert_eq!(result.grand_total("COST"), Some(122.0));
}

// ============================================================================
// CAPACITY
// ============================================================================

#[test]
fn test_max_combinations_truncates_axis() {
    let request = PivotRequest::new()
        .with_rows(["LE", "CE"])
        .with_values(["COST"]);
    let mut config = EngineConfig::default();
    config.fan_out.max_combinations = 3;

    let result = compute_pivot(&request, &dimensions(), &fact_table(), &ExpandState::new(), &config);
    assert_eq!(result.row_count(), 3);
    assert!(result.truncated);
    assert_eq!(result.anomalies_of(AnomalyKind::Capacity).count(), 1);
}

// ============================================================================
// DRILL-DOWN AND SESSION
// ============================================================================

#[test]
fn test_drill_down_respects_filters() {
    let request = PivotRequest::new()
        .with_rows(["LE"])
        .with_columns(["CE"])
        .with_values(["COST"])
        .with_filter("LE", ["US"]);
    let result = drill_down(
        &request,
        &dimensions(),
        &fact_table(),
        &ExpandState::new(),
        "NA",
        "MAT",
        100,
    );
    assert_eq!(result.record_indices, vec![0]);
    assert_eq!(result.total_count, 1);
    assert!(!result.is_truncated);
}

#[test]
fn test_session_round_trip_through_json() {
    let mut session = session();
    session.set_request(cost_by_le().with_filter("CE", ["MAT"]));
    session.toggle("LE", Axis::Row, "NA");

    let expand_json = serde_json::to_string(session.expand_state()).unwrap();
    let request_json = serde_json::to_string(session.request()).unwrap();
    let expected = session.result().clone();

    let mut restored = common::session();
    restored.restore(
        serde_json::from_str(&expand_json).unwrap(),
        serde_json::from_str(&request_json).unwrap(),
    );
    assert_eq!(restored.result().row_keys(), expected.row_keys());
    assert_eq!(restored.result().values, expected.values);
    assert_eq!(restored.result().value("US", "", "COST"), Some(6.0));
}

#[test]
fn test_session_field_operations() {
    let mut session = session();
    session.add_row_field("LE");
    session.add_column_field("CE");
    session.add_value_field("COST");
    assert_eq!(session.result().layout, LayoutKind::SimpleCrossTab);

    session.remove_field("CE");
    assert_eq!(session.result().layout, LayoutKind::SingleRow);

    session.expand_all("LE");
    assert_eq!(session.result().row_keys(), vec!["US", "CA", "EU"]);

    session.collapse_all("LE");
    assert_eq!(session.result().row_keys(), vec!["NA", "EU"]);
    assert_eq!(session.version(), 6);
}
