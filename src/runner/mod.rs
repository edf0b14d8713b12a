//! Runner Layer: connection management, DDL
//! serialization barriers, multi-threaded execution, and error/shape
//! accounting.

pub mod mock;
#[cfg(feature = "postgres-runner")]
pub mod postgres;

use crate::{filter::Filter, hash::NormalizeConfig, watchdog::Watchdog};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

/// Single-character classification of one statement's execution result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// `.` success.
    Success,
    /// `S` syntax error.
    Syntax,
    /// `t` timeout / cancelled.
    Timeout,
    /// `C` connection lost.
    Connection,
    /// `e` other error.
    Other,
    /// `skip` filter-suppressed.
    Skip,
}

impl Outcome {
    /// The single-character symbol used in the console reporter.
    pub fn symbol(self) -> char {
        match self {
            Outcome::Success => '.',
            Outcome::Syntax => 'S',
            Outcome::Timeout => 't',
            Outcome::Connection => 'C',
            Outcome::Other => 'e',
            Outcome::Skip => '_',
        }
    }
}

/// The result of executing (or skipping) one statement.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// Outcome symbol.
    pub outcome: Outcome,
    /// Vendor-agnostic error class, present for non-success outcomes.
    pub error_class: Option<String>,
    /// Elapsed wall time, in nanoseconds.
    pub elapsed_ns: u64,
    /// Rows affected, for DML statements.
    pub affected_rows: Option<u64>,
    /// Result rows, for SELECT statements (used by the comparator).
    pub rows: Option<Vec<Vec<crate::value::Value>>>,
}

impl ExecutionResult {
    /// A bare success result with no row data, used by runners that only
    /// report pass/fail (DDL setup, most production-mode executions).
    pub fn success(elapsed_ns: u64) -> Self {
        ExecutionResult {
            outcome: Outcome::Success,
            error_class: None,
            elapsed_ns,
            affected_rows: None,
            rows: None,
        }
    }
}

/// Anything that can connect to a database, execute statements, and report
/// a classified outcome per statement.
pub trait Runner: Send {
    /// Opens (or re-opens) the connection this runner owns.
    fn connect(&mut self) -> crate::Result<()>;

    /// Closes the connection.
    fn close(&mut self);

    /// Executes one statement and classifies the result.
    fn execute_one(&mut self, sql: &str) -> ExecutionResult;

    /// Whether `sql` is a DDL statement for this runner's dialect
    /// (`CREATE`/`ALTER`/`DROP`/`TRUNCATE`, extended per-vendor).
    fn is_ddl(&self, sql: &str) -> bool {
        is_ddl_default(sql)
    }

    /// Runs a list of DDL statements to prepare a schema, sequentially.
    fn setup_schema(&mut self, ddl: &[String]) -> crate::Result<()> {
        for stmt in ddl {
            let result = self.execute_one(stmt);
            if result.outcome != Outcome::Success {
                return Err(crate::Error::Vendor {
                    class: result.error_class.unwrap_or_else(|| "Unknown".to_owned()),
                    message: format!("failed to execute DDL: {}", stmt),
                });
            }
        }
        Ok(())
    }
}

/// The default DDL-prefix test, shared by every SQL-ish runner.
pub fn is_ddl_default(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let upper_prefix: String = trimmed.chars().take(16).collect::<String>().to_uppercase();
    ["CREATE", "ALTER", "DROP", "TRUNCATE"]
        .iter()
        .any(|kw| upper_prefix.starts_with(kw))
}

/// Configuration for [`execute_queries`].
#[derive(Clone)]
pub struct RunnerConfig {
    /// Number of worker threads executing non-DDL statements.
    pub threads: usize,
    /// How often (in statements) to print a progress summary.
    pub progress_interval: u64,
    /// Number of retries for a DDL statement hitting a transient error.
    pub ddl_retries: u32,
    /// Backoff between DDL retries.
    pub ddl_retry_backoff: Duration,
    /// Optional attached filter.
    pub filter: Option<Arc<dyn Filter>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            threads: 4,
            progress_interval: 10_000,
            ddl_retries: 5,
            ddl_retry_backoff: Duration::from_secs(1),
            filter: None,
        }
    }
}

/// Aggregate execution statistics, plus the distinct query-shape set seen
/// over the run.
#[derive(Default)]
pub struct ExecutionStats {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    syntax: AtomicU64,
    timeout: AtomicU64,
    connection: AtomicU64,
    skipped: AtomicU64,
    shapes: Mutex<std::collections::HashSet<String>>,
    error_classes: Mutex<BTreeMap<String, u64>>,
}

impl ExecutionStats {
    fn record(&self, sql: &str, result: &ExecutionResult) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match result.outcome {
            Outcome::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Syntax => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.syntax.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Timeout => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.timeout.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Connection => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.connection.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Other => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Skip => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(class) = &result.error_class {
            let mut classes = self.error_classes.lock().unwrap_or_else(|e| e.into_inner());
            *classes.entry(class.clone()).or_insert(0) += 1;
        }
        let shape = crate::hash::normalize(sql, &NormalizeConfig {
            collapse_whitespace: true,
            upcase: false,
            mask_literals: true,
        });
        self.shapes.lock().unwrap_or_else(|e| e.into_inner()).insert(shape);
    }

    /// Renders the end-of-run summary: total, success, failed, syntax
    /// errors, timeouts, connection errors, distinct query shapes, and top
    /// error classes.
    pub fn summary(&self) -> String {
        let classes = self.error_classes.lock().unwrap_or_else(|e| e.into_inner());
        let mut top: Vec<(&String, &u64)> = classes.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1));
        let top_classes: Vec<String> = top.iter().take(5).map(|(k, v)| format!("{}={}", k, v)).collect();
        format!(
            "total={} success={} failed={} syntax={} timeout={} connection={} shapes={} top_errors=[{}]",
            self.total.load(Ordering::Relaxed),
            self.success.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.syntax.load(Ordering::Relaxed),
            self.timeout.load(Ordering::Relaxed),
            self.connection.load(Ordering::Relaxed),
            self.shapes.lock().unwrap_or_else(|e| e.into_inner()).len(),
            top_classes.join(", "),
        )
    }

    /// Raw totals, for checkpoints and the production orchestrator.
    pub fn totals(&self) -> (u64, u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.success.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

/// Executes `statements` against `runner`, enforcing the DDL barrier:
/// non-DDL statements fan out across `config.threads` worker threads (each
/// holding its own clone of `runner`, independently connected), with at most
/// `threads * 10` statements outstanding at a time. A DDL statement drains
/// every outstanding statement first, then runs synchronously on `runner`
/// itself (with bounded retries on transient failure), and dispatch resumes
/// only once it has finished.
pub fn execute_queries<R: Runner + Clone>(
    runner: &mut R,
    statements: impl Iterator<Item = String>,
    config: &RunnerConfig,
    watchdog: Option<&Watchdog>,
) -> ExecutionStats {
    let stats = ExecutionStats::default();
    let num_threads = config.threads.max(1);
    let max_outstanding = (num_threads as u64).saturating_mul(10);
    let outstanding = Arc::new(AtomicU64::new(0));
    let mut seen: u64 = 0;

    thread::scope(|scope| {
        let (job_tx, job_rx) = mpsc::channel::<String>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for _ in 0..num_threads {
            let job_rx = Arc::clone(&job_rx);
            let outstanding = Arc::clone(&outstanding);
            let mut worker_runner = runner.clone();
            let stats = &stats;
            scope.spawn(move || {
                let _ = worker_runner.connect();
                loop {
                    let received = {
                        let rx = job_rx.lock().unwrap_or_else(|e| e.into_inner());
                        rx.recv_timeout(Duration::from_millis(100))
                    };
                    let sql = match received {
                        Ok(sql) => sql,
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    };
                    let token = watchdog.map(|w| w.register(&sql));
                    let result = worker_runner.execute_one(&sql);
                    if let (Some(w), Some(token)) = (watchdog, token) {
                        w.unregister(token);
                    }
                    if result.outcome == Outcome::Connection {
                        let _ = worker_runner.connect();
                    }
                    stats.record(&sql, &result);
                    outstanding.fetch_sub(1, Ordering::AcqRel);
                }
            });
        }

        for sql in statements {
            let sql = match apply_filter(&config.filter, &sql) {
                FilterOutcome::Pass(sql) => sql,
                FilterOutcome::Skip => {
                    stats.record(&sql, &ExecutionResult {
                        outcome: Outcome::Skip,
                        error_class: None,
                        elapsed_ns: 0,
                        affected_rows: None,
                        rows: None,
                    });
                    seen += 1;
                    log_progress(config, &stats, seen);
                    continue;
                }
            };

            if runner.is_ddl(&sql) {
                drain_outstanding(&outstanding);
                execute_ddl_with_retry(runner, &sql, config, &stats);
            } else {
                while outstanding.load(Ordering::Acquire) >= max_outstanding {
                    thread::sleep(Duration::from_millis(1));
                }
                outstanding.fetch_add(1, Ordering::AcqRel);
                if job_tx.send(sql).is_err() {
                    outstanding.fetch_sub(1, Ordering::AcqRel);
                }
            }

            seen += 1;
            log_progress(config, &stats, seen);
        }

        drain_outstanding(&outstanding);
        drop(job_tx);
    });

    stats
}

/// Blocks until no statement is outstanding in the worker pool, the barrier
/// that lets a DDL statement run alone.
fn drain_outstanding(outstanding: &AtomicU64) {
    while outstanding.load(Ordering::Acquire) > 0 {
        thread::sleep(Duration::from_millis(1));
    }
}

fn log_progress(config: &RunnerConfig, stats: &ExecutionStats, count: u64) {
    if config.progress_interval > 0 && count % config.progress_interval == 0 {
        log::info!("progress: {}", stats.summary());
    }
}

fn execute_ddl_with_retry<R: Runner>(runner: &mut R, sql: &str, config: &RunnerConfig, stats: &ExecutionStats) {
    let mut attempt = 0;
    loop {
        let result = runner.execute_one(sql);
        let retryable = matches!(result.outcome, Outcome::Connection | Outcome::Timeout);
        if result.outcome == Outcome::Success || !retryable || attempt >= config.ddl_retries {
            stats.record(sql, &result);
            return;
        }
        attempt += 1;
        thread::sleep(config.ddl_retry_backoff);
    }
}

enum FilterOutcome {
    Pass(String),
    Skip,
}

fn apply_filter(filter: &Option<Arc<dyn Filter>>, sql: &str) -> FilterOutcome {
    match filter {
        None => FilterOutcome::Pass(sql.to_owned()),
        Some(f) => match f.filter(sql) {
            None => FilterOutcome::Skip,
            Some(rewritten) => FilterOutcome::Pass(rewritten),
        },
    }
}

/// Classifies a vendor error message into an [`Outcome`] and an
/// error-class string: syntax errors, cancellations, and connection
/// failures get dedicated symbols; everything else is `Other` with the raw
/// class name preserved.
pub fn classify_vendor_error(class: &str) -> Outcome {
    let lower = class.to_lowercase();
    if lower.contains("syntax") {
        Outcome::Syntax
    } else if lower.contains("cancel") || lower.contains("timeout") {
        Outcome::Timeout
    } else if lower.contains("connection") || lower.contains("operational") {
        Outcome::Connection
    } else {
        Outcome::Other
    }
}

/// Measures the elapsed time of `f`, returning `(value, elapsed_ns)`.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, u64) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed().as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_ddl_recognizes_standard_prefixes() {
        assert!(is_ddl_default("  CREATE TABLE t (id INT)"));
        assert!(is_ddl_default("DROP TABLE t"));
        assert!(!is_ddl_default("INSERT INTO t VALUES (1)"));
    }

    #[test]
    fn classify_vendor_error_maps_known_classes() {
        assert_eq!(classify_vendor_error("SyntaxError"), Outcome::Syntax);
        assert_eq!(classify_vendor_error("QueryCanceled"), Outcome::Timeout);
        assert_eq!(classify_vendor_error("OperationalError"), Outcome::Connection);
        assert_eq!(classify_vendor_error("WeirdVendorThing"), Outcome::Other);
    }

    #[test]
    fn execute_queries_totals_match_outcome_totality() {
        let mut runner = mock::MockRunner::always_success();
        let statements = (0..10).map(|i| format!("SELECT {}", i));
        let stats = execute_queries(&mut runner, statements, &RunnerConfig::default(), None);
        let (total, success, failed) = stats.totals();
        assert_eq!(total, 10);
        assert_eq!(success, 10);
        assert_eq!(failed, 0);
    }
}
