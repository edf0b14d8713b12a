//! An in-process `Runner` with no live database connection, used by tests
//! and by `rqg exec --dsn mock://` for dry runs of the execution pipeline.

use super::{classify_vendor_error, is_ddl_default, ExecutionResult, Outcome, Runner};
use std::time::Instant;

/// A scripted or programmatic outcome for one statement, keyed by substring
/// match against the incoming SQL.
#[derive(Clone)]
pub struct Rule {
    needle: String,
    outcome: Outcome,
    error_class: Option<String>,
}

/// A `Runner` that never touches a real database: every statement is
/// classified by a small rule list (first match wins), defaulting to
/// success. Connection state is tracked so `connect`/`close` behave like a
/// real runner's for tests that exercise reconnection.
#[derive(Clone)]
pub struct MockRunner {
    rules: Vec<Rule>,
    connected: bool,
    connect_failures_remaining: u32,
    select_rows: Option<Vec<Vec<crate::value::Value>>>,
}

impl MockRunner {
    /// A runner where every statement succeeds.
    pub fn always_success() -> Self {
        MockRunner {
            rules: Vec::new(),
            connected: false,
            connect_failures_remaining: 0,
            select_rows: None,
        }
    }

    /// A runner that answers every statement with a fixed, successful row
    /// set, used by the comparator's tests without needing a live database
    /// to run `SELECT` against.
    pub fn with_select_rows(rows: Vec<Vec<crate::value::Value>>) -> Self {
        MockRunner {
            rules: Vec::new(),
            connected: false,
            connect_failures_remaining: 0,
            select_rows: Some(rows),
        }
    }

    /// A runner that fails every statement containing `needle` with the
    /// given vendor error class (classified via [`classify_vendor_error`]).
    pub fn with_failure(needle: impl Into<String>, error_class: impl Into<String>) -> Self {
        let class = error_class.into();
        let outcome = classify_vendor_error(&class);
        MockRunner {
            rules: vec![Rule {
                needle: needle.into(),
                outcome,
                error_class: Some(class),
            }],
            connected: false,
            connect_failures_remaining: 0,
            select_rows: None,
        }
    }

    /// Adds a rule: statements containing `needle` are classified as
    /// `outcome` with the given `error_class`.
    pub fn add_rule(&mut self, needle: impl Into<String>, outcome: Outcome, error_class: Option<String>) {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome,
            error_class,
        });
    }

    /// Makes the next `n` calls to `connect` fail before succeeding,
    /// simulating a flaky connection for reconnect-path tests.
    pub fn fail_connect_times(mut self, n: u32) -> Self {
        self.connect_failures_remaining = n;
        self
    }
}

impl Runner for MockRunner {
    fn connect(&mut self) -> crate::Result<()> {
        if self.connect_failures_remaining > 0 {
            self.connect_failures_remaining -= 1;
            return Err(crate::Error::Vendor {
                class: "ConnectionError".to_owned(),
                message: "mock connect failure".to_owned(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn execute_one(&mut self, sql: &str) -> ExecutionResult {
        let start = Instant::now();
        for rule in &self.rules {
            if sql.contains(&rule.needle) {
                return ExecutionResult {
                    outcome: rule.outcome,
                    error_class: rule.error_class.clone(),
                    elapsed_ns: start.elapsed().as_nanos() as u64,
                    affected_rows: None,
                    rows: None,
                };
            }
        }
        if let Some(rows) = &self.select_rows {
            return ExecutionResult {
                outcome: Outcome::Success,
                error_class: None,
                elapsed_ns: start.elapsed().as_nanos() as u64,
                affected_rows: Some(rows.len() as u64),
                rows: Some(rows.clone()),
            };
        }
        ExecutionResult::success(start.elapsed().as_nanos() as u64)
    }

    fn is_ddl(&self, sql: &str) -> bool {
        is_ddl_default(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rule_overrides_default_success() {
        let mut runner = MockRunner::with_failure("DROP", "SyntaxError");
        let ok = runner.execute_one("SELECT 1");
        assert_eq!(ok.outcome, Outcome::Success);
        let bad = runner.execute_one("DROP TABLE t");
        assert_eq!(bad.outcome, Outcome::Syntax);
    }

    #[test]
    fn connect_can_be_made_to_fail_first() {
        let mut runner = MockRunner::always_success().fail_connect_times(2);
        assert!(runner.connect().is_err());
        assert!(runner.connect().is_err());
        assert!(runner.connect().is_ok());
    }
}
