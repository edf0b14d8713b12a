//! Watchdog: detects and reports long-running
//! statement executions.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Configuration for a [`Watchdog`].
#[derive(Clone, Copy, Debug)]
pub struct WatchdogConfig {
    /// How often the background thread polls in-flight statements.
    pub interval: Duration,
    /// Elapsed time above which an in-flight statement is reported.
    pub threshold: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            interval: Duration::from_secs(5),
            threshold: Duration::from_secs(300),
        }
    }
}

/// A handle returned by [`Watchdog::register`], passed back to
/// [`Watchdog::unregister`] once the statement finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(u64);

struct InFlight {
    sql: String,
    started: Instant,
    reported: bool,
}

/// Polls registered in-flight statements on a background thread and reports
/// (at most once each) any whose elapsed time exceeds the configured
/// threshold.
pub struct Watchdog {
    config: WatchdogConfig,
    in_flight: Arc<Mutex<HashMap<u64, InFlight>>>,
    next_token: AtomicU64,
    stop: Arc<Mutex<bool>>,
    poller: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawns the background polling thread, invoking `reporter` for each
    /// long-running statement it finds. `reporter` receives the
    /// multi-line-formatted SQL and the elapsed whole seconds.
    pub fn spawn(config: WatchdogConfig, reporter: impl Fn(&str, u64) + Send + 'static) -> Self {
        let in_flight: Arc<Mutex<HashMap<u64, InFlight>>> = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(Mutex::new(false));

        let poll_in_flight = Arc::clone(&in_flight);
        let poll_stop = Arc::clone(&stop);
        let interval = config.interval;
        let threshold = config.threshold;
        let poller = thread::Builder::new()
            .name("rqg-watchdog".to_owned())
            .spawn(move || loop {
                thread::sleep(interval);
                if *poll_stop.lock().unwrap_or_else(|e| e.into_inner()) {
                    return;
                }
                let mut guard = poll_in_flight.lock().unwrap_or_else(|e| e.into_inner());
                for entry in guard.values_mut() {
                    if entry.reported {
                        continue;
                    }
                    let elapsed = entry.started.elapsed();
                    if elapsed >= threshold {
                        entry.reported = true;
                        reporter(&format_sql_multiline(&entry.sql), elapsed.as_secs());
                    }
                }
            })
            .expect("failed to spawn watchdog thread");

        Watchdog {
            config,
            in_flight,
            next_token: AtomicU64::new(0),
            stop,
            poller: Some(poller),
        }
    }

    /// Registers a statement as in-flight, returning a token to unregister
    /// it with once it completes.
    pub fn register(&self, sql: &str) -> Token {
        let id = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id,
            InFlight {
                sql: sql.to_owned(),
                started: Instant::now(),
                reported: false,
            },
        );
        Token(id)
    }

    /// Removes a statement from tracking once it has completed.
    pub fn unregister(&self, token: Token) {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).remove(&token.0);
    }

    /// A snapshot of every currently in-flight statement.
    pub fn snapshot(&self) -> Vec<(Duration, String, bool)> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|entry| (entry.started.elapsed(), entry.sql.clone(), entry.reported))
            .collect()
    }

    /// The configured poll interval and report threshold.
    pub fn config(&self) -> WatchdogConfig {
        self.config
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        *self.stop.lock().unwrap_or_else(|e| e.into_inner()) = true;
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}

/// Inserts a newline before major SQL clauses so a long statement prints
/// readably in the long-runner report.
pub fn format_sql_multiline(sql: &str) -> String {
    const CLAUSES: &[&str] = &[
        "FROM", "WHERE", "GROUP BY", "ORDER BY", "HAVING", "LIMIT", "JOIN", "UNION", "VALUES", "SET",
    ];
    let mut out = String::with_capacity(sql.len() + 16);
    let mut rest = sql;
    loop {
        let upper = rest.to_uppercase();
        let next = CLAUSES
            .iter()
            .filter_map(|clause| upper.find(clause))
            .filter(|&pos| pos > 0)
            .min();
        match next {
            Some(pos) => {
                out.push_str(&rest[..pos]);
                out.push('\n');
                rest = &rest[pos..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn s6_long_statement_is_reported_exactly_once() {
        let (tx, rx) = mpsc::channel();
        let watchdog = Watchdog::spawn(
            WatchdogConfig {
                interval: Duration::from_millis(50),
                threshold: Duration::from_millis(200),
            },
            move |sql, elapsed| {
                let _ = tx.send((sql.to_owned(), elapsed));
            },
        );

        let token = watchdog.register("SELECT pg_sleep(1)");
        thread::sleep(Duration::from_millis(700));
        watchdog.unregister(token);

        let (sql, elapsed_secs) = rx.recv_timeout(Duration::from_secs(2)).expect("expected exactly one report");
        assert!(sql.contains("SELECT"));
        assert!(elapsed_secs >= 0);
        assert!(rx.try_recv().is_err(), "must report at most once");
    }

    #[test]
    fn multiline_formatting_breaks_before_clauses() {
        let formatted = format_sql_multiline("SELECT a FROM t WHERE a > 1 ORDER BY a");
        assert!(formatted.contains('\n'));
        assert!(formatted.contains("FROM"));
    }
}
