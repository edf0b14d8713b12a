//! End-to-end coverage of the result comparator: matching backends compare
//! equal, diverging backends report precise differences, and statements
//! flagged as non-deterministic are skipped rather than falsely flagged.

use rqg::comparator::{compare_query, ComparatorConfig};
use rqg::runner::mock::MockRunner;
use rqg::value::Value;

#[test]
fn identical_multi_row_result_sets_match() {
    let rows = vec![
        vec![Value::from(1i64), Value::from("alice".to_owned())],
        vec![Value::from(2i64), Value::from("bob".to_owned())],
    ];
    let mut left = MockRunner::with_select_rows(rows.clone());
    let mut right = MockRunner::with_select_rows(rows);
    let result = compare_query(&mut left, &mut right, "SELECT id, name FROM users ORDER BY id", &ComparatorConfig::default());
    assert!(result.matches);
    assert!(result.differences.is_empty());
}

#[test]
fn a_single_diverging_cell_is_reported_with_its_exact_coordinates() {
    let mut left = MockRunner::with_select_rows(vec![vec![Value::from(1i64), Value::from("alice".to_owned())]]);
    let mut right = MockRunner::with_select_rows(vec![vec![Value::from(1i64), Value::from("alicia".to_owned())]]);
    let result = compare_query(&mut left, &mut right, "SELECT id, name FROM users", &ComparatorConfig::default());
    assert!(!result.matches);
    assert_eq!(result.differences.len(), 1);
    assert_eq!(result.differences[0].row, 1);
    assert_eq!(result.differences[0].column, 2);
}

#[test]
fn a_statement_that_fails_on_only_one_side_is_a_mismatch() {
    let mut left = MockRunner::always_success();
    let mut right = MockRunner::with_failure("DROP", "SyntaxError");
    let result = compare_query(&mut left, &mut right, "DROP TABLE missing", &ComparatorConfig::default());
    assert!(!result.matches);
}

#[test]
fn matching_vendor_errors_after_synonym_normalization_count_as_equivalent() {
    let mut left = MockRunner::with_failure("users", "relation \"users\" does not exist");
    let mut right = MockRunner::with_failure("users", "table \"users\" does not exist");
    let result = compare_query(&mut left, &mut right, "SELECT * FROM users", &ComparatorConfig::default());
    assert!(result.matches);
}

#[test]
fn statements_containing_now_are_skipped_rather_than_compared() {
    let mut left = MockRunner::with_select_rows(vec![vec![Value::from(1i64)]]);
    let mut right = MockRunner::with_select_rows(vec![vec![Value::from(2i64)]]);
    let result = compare_query(&mut left, &mut right, "SELECT NOW()", &ComparatorConfig::default());
    assert!(result.matches);
    assert!(result.skipped_reason.is_some());
}
