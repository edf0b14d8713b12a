//! Result Comparison Subsystem: runs one statement
//! against two runners and decides equivalence under normalization rules.

use crate::{
    runner::{ExecutionResult, Outcome, Runner},
    value::Value,
};

/// Configuration for [`compare_query`].
#[derive(Clone, Debug, Default)]
pub struct ComparatorConfig {
    /// Capture `EXPLAIN (ANALYZE, ...)` around each side of the comparison
    /// for `SELECT` statements.
    pub capture_explain: bool,
    /// Options appended to `EXPLAIN (...)`, e.g. `"ANALYZE, BUFFERS"`.
    pub explain_options: String,
}

/// A single mismatching row/column, reported for debugging.
#[derive(Clone, Debug, PartialEq)]
pub struct Difference {
    /// 1-based row index within the (possibly sorted) result sets.
    pub row: usize,
    /// 1-based column index.
    pub column: usize,
    /// The left side's rendered value.
    pub left: String,
    /// The right side's rendered value.
    pub right: String,
}

/// The outcome of comparing one statement across two runners.
#[derive(Clone, Debug)]
pub struct ComparisonResult {
    /// Whether the two sides were judged equivalent.
    pub matches: bool,
    /// Populated when the statement was skipped as non-deterministic
    /// rather than actually compared.
    pub skipped_reason: Option<String>,
    /// Concrete differences found, if `matches` is false.
    pub differences: Vec<Difference>,
    /// `EXPLAIN` plan text captured from the left runner, if requested.
    pub left_plan: Option<String>,
    /// `EXPLAIN` plan text captured from the right runner, if requested.
    pub right_plan: Option<String>,
}

impl ComparisonResult {
    fn matched() -> Self {
        ComparisonResult {
            matches: true,
            skipped_reason: None,
            differences: Vec::new(),
            left_plan: None,
            right_plan: None,
        }
    }

    fn mismatched(differences: Vec<Difference>) -> Self {
        ComparisonResult {
            matches: false,
            skipped_reason: None,
            differences,
            left_plan: None,
            right_plan: None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        ComparisonResult {
            matches: true,
            skipped_reason: Some(reason.into()),
            differences: Vec::new(),
            left_plan: None,
            right_plan: None,
        }
    }
}

/// Substring markers that flag a statement as non-deterministic and
/// therefore skipped for row-level comparison. A conservative,
/// case-insensitive set, chosen to err toward over-skipping rather than
/// flagging a flaky query as a real mismatch.
const NONDETERMINISTIC_MARKERS: &[&str] = &["RANDOM(", "NOW(", "CURRENT_", "UUID("];

/// Whether `sql` looks non-deterministic: it contains
/// one of the known volatile markers, or it is a `SELECT` with no
/// `ORDER BY` whose `row_count` (if known) exceeds 1.
pub fn is_nondeterministic(sql: &str, row_count: Option<usize>) -> bool {
    let upper = sql.to_uppercase();
    if NONDETERMINISTIC_MARKERS.iter().any(|m| upper.contains(m)) {
        return true;
    }
    if upper.trim_start().starts_with("SELECT") && !upper.contains("ORDER BY") {
        if let Some(n) = row_count {
            return n > 1;
        }
    }
    false
}

/// Runs `sql` against both `left` and `right`, deciding equivalence:
/// 1. statuses must match; if both failed, normalized error strings are
///    compared;
/// 2. for DML success, `affected_rows` must match;
/// 3. for `SELECT` success, row counts then (when both sort identically)
///    sorted rows, else as-is rows, are compared after per-row
///    normalization;
/// 4. non-deterministic statements are skipped for data comparison.
pub fn compare_query(left: &mut dyn Runner, right: &mut dyn Runner, sql: &str, config: &ComparatorConfig) -> ComparisonResult {
    let left_result = left.execute_one(sql);
    let right_result = right.execute_one(sql);

    if (left_result.outcome == Outcome::Success) != (right_result.outcome == Outcome::Success) {
        return ComparisonResult::mismatched(vec![Difference {
            row: 0,
            column: 0,
            left: format!("{:?}", left_result.outcome),
            right: format!("{:?}", right_result.outcome),
        }]);
    }

    if left_result.outcome != Outcome::Success {
        let left_err = normalize_error(left_result.error_class.as_deref().unwrap_or(""));
        let right_err = normalize_error(right_result.error_class.as_deref().unwrap_or(""));
        return if left_err == right_err {
            ComparisonResult::matched()
        } else {
            ComparisonResult::mismatched(vec![Difference {
                row: 0,
                column: 0,
                left: left_err,
                right: right_err,
            }])
        };
    }

    let row_count = left_result.rows.as_ref().map(Vec::len).max(right_result.rows.as_ref().map(Vec::len));
    if is_nondeterministic(sql, row_count) {
        return ComparisonResult::skipped("non-deterministic statement");
    }

    let mut result = match (&left_result.rows, &right_result.rows) {
        (None, None) => compare_affected_rows(&left_result, &right_result),
        (Some(l), Some(r)) => compare_rows(l, r),
        _ => ComparisonResult::mismatched(vec![Difference {
            row: 0,
            column: 0,
            left: "rows".to_owned(),
            right: "no rows".to_owned(),
        }]),
    };

    if config.capture_explain && sql.to_uppercase().trim_start().starts_with("SELECT") {
        result.left_plan = Some(explain(left, sql, config));
        result.right_plan = Some(explain(right, sql, config));
    }
    result
}

fn compare_affected_rows(left: &ExecutionResult, right: &ExecutionResult) -> ComparisonResult {
    if left.affected_rows == right.affected_rows {
        ComparisonResult::matched()
    } else {
        ComparisonResult::mismatched(vec![Difference {
            row: 0,
            column: 0,
            left: format!("{:?}", left.affected_rows),
            right: format!("{:?}", right.affected_rows),
        }])
    }
}

fn compare_rows(left: &[Vec<Value>], right: &[Vec<Value>]) -> ComparisonResult {
    if left.len() != right.len() {
        return ComparisonResult::mismatched(vec![Difference {
            row: 0,
            column: 0,
            left: format!("{} rows", left.len()),
            right: format!("{} rows", right.len()),
        }]);
    }

    let mut left_norm: Vec<Vec<String>> = left.iter().map(|row| row.iter().map(normalize_cell).collect()).collect();
    let mut right_norm: Vec<Vec<String>> = right.iter().map(|row| row.iter().map(normalize_cell).collect()).collect();

    let left_sorted = is_sorted(&left_norm);
    let right_sorted = is_sorted(&right_norm);
    if left_sorted && right_sorted {
        left_norm.sort();
        right_norm.sort();
    }

    let mut differences = Vec::new();
    for (row_idx, (l_row, r_row)) in left_norm.iter().zip(right_norm.iter()).enumerate() {
        for (col_idx, (l, r)) in l_row.iter().zip(r_row.iter()).enumerate() {
            if l != r {
                differences.push(Difference {
                    row: row_idx + 1,
                    column: col_idx + 1,
                    left: l.clone(),
                    right: r.clone(),
                });
            }
        }
    }

    if differences.is_empty() {
        ComparisonResult::matched()
    } else {
        ComparisonResult::mismatched(differences)
    }
}

fn is_sorted(rows: &[Vec<String>]) -> bool {
    rows.windows(2).all(|w| w[0] <= w[1])
}

/// Normalizes one cell for comparison: floats rounded to 6 fractional
/// digits, strings whitespace-trimmed, `NULL` preserved as a sentinel.
fn normalize_cell(value: &Value) -> String {
    match value {
        Value::Null => "\u{0}NULL".to_owned(),
        Value::Number(_) => {
            let rendered = value.to_string();
            match rendered.parse::<f64>() {
                Ok(f) => format!("{:.6}", f),
                Err(_) => rendered,
            }
        }
        Value::Bytes(_) => value.to_string().trim().to_owned(),
        other => other.to_string(),
    }
}

/// Lowercases a vendor error message, strips common vendor prefixes like
/// `ERROR:`, and applies a synonym table (`table` ↔ `relation`,
/// `column` ↔ `attribute`) so semantically
/// identical vendor errors from different back-ends compare equal.
fn normalize_error(message: &str) -> String {
    let mut s = message.to_lowercase();
    for prefix in ["error:", "fatal:", "warning:"] {
        if let Some(stripped) = s.trim_start().strip_prefix(prefix) {
            s = stripped.trim_start().to_owned();
        }
    }
    const SYNONYMS: &[(&str, &str)] = &[("relation", "table"), ("column", "attribute")];
    for (from, to) in SYNONYMS {
        s = s.replace(from, to);
    }
    s.trim().to_owned()
}

fn explain(runner: &mut dyn Runner, sql: &str, config: &ComparatorConfig) -> String {
    let options = if config.explain_options.is_empty() {
        "ANALYZE".to_owned()
    } else {
        config.explain_options.clone()
    };
    let explain_sql = format!("EXPLAIN ({}) {}", options, sql);
    let result = runner.execute_one(&explain_sql);
    result
        .rows
        .map(|rows| {
            rows.into_iter()
                .map(|row| row.into_iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::mock::MockRunner;

    fn runner_with_rows(rows: Vec<Vec<Value>>) -> MockRunner {
        MockRunner::with_select_rows(rows)
    }

    #[test]
    fn s7_identical_single_row_selects_match() {
        let mut left = runner_with_rows(vec![vec![Value::from(1i64)]]);
        let mut right = runner_with_rows(vec![vec![Value::from(1i64)]]);
        let result = compare_query(&mut left, &mut right, "SELECT 1", &ComparatorConfig::default());
        assert!(result.matches);
    }

    #[test]
    fn s7_differing_single_row_selects_report_one_difference() {
        let mut left = runner_with_rows(vec![vec![Value::from(1i64)]]);
        let mut right = runner_with_rows(vec![vec![Value::from(2i64)]]);
        let result = compare_query(&mut left, &mut right, "SELECT 1", &ComparatorConfig::default());
        assert!(!result.matches);
        assert_eq!(result.differences.len(), 1);
        assert_eq!(result.differences[0].row, 1);
        assert_eq!(result.differences[0].column, 1);
    }

    #[test]
    fn nondeterministic_statement_is_skipped() {
        let mut left = runner_with_rows(vec![vec![Value::from(1i64)], vec![Value::from(2i64)]]);
        let mut right = runner_with_rows(vec![vec![Value::from(9i64)], vec![Value::from(9i64)]]);
        let result = compare_query(&mut left, &mut right, "SELECT random_val FROM t", &ComparatorConfig::default());
        assert!(result.matches);
        assert!(result.skipped_reason.is_some());
    }

    #[test]
    fn error_messages_normalize_through_synonyms() {
        assert_eq!(normalize_error("ERROR: relation \"t\" does not exist"), "table \"t\" does not exist");
        assert_eq!(normalize_error("ERROR: column \"c\" unknown"), "attribute \"c\" unknown");
    }

    #[test]
    fn out_of_order_rows_match_when_sortable() {
        // Carries an `ORDER BY` so the non-determinism heuristic doesn't
        // skip it outright (a multi-row `SELECT` with no `ORDER BY` is
        // always treated as non-deterministic); the two backends still
        // return tied rows in different physical order, which the
        // sort-before-compare rule must reconcile.
        let mut left = runner_with_rows(vec![vec![Value::from(2i64)], vec![Value::from(1i64)]]);
        let mut right = runner_with_rows(vec![vec![Value::from(1i64)], vec![Value::from(2i64)]]);
        let result = compare_query(&mut left, &mut right, "SELECT v FROM t ORDER BY v", &ComparatorConfig::default());
        assert!(result.matches);
    }
}
