//! End-to-end coverage for the watchdog: a statement that runs long enough
//! to cross the threshold must be reported exactly once, and a statement
//! that finishes promptly must never be reported at all.

use rqg::watchdog::{Watchdog, WatchdogConfig};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn a_long_running_statement_is_reported_exactly_once() {
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

    let token = watchdog.register("SELECT * FROM big_table WHERE needle = 'haystack' ORDER BY created_at");
    thread::sleep(Duration::from_millis(700));
    watchdog.unregister(token);

    let (sql, elapsed_secs) = rx.recv_timeout(Duration::from_secs(2)).expect("expected exactly one report");
    assert!(sql.contains("SELECT"));
    assert!(sql.contains('\n'), "multi-clause statements should print across lines");
    assert!(elapsed_secs >= 0);
    assert!(rx.try_recv().is_err(), "a statement must be reported at most once");
}

#[test]
fn a_quickly_finishing_statement_is_never_reported() {
    let (tx, rx) = mpsc::channel::<(String, u64)>();
    let watchdog = Watchdog::spawn(
        WatchdogConfig {
            interval: Duration::from_millis(20),
            threshold: Duration::from_secs(5),
        },
        move |sql, elapsed| {
            let _ = tx.send((sql.to_owned(), elapsed));
        },
    );
    let token = watchdog.register("SELECT 1");
    thread::sleep(Duration::from_millis(100));
    watchdog.unregister(token);
    thread::sleep(Duration::from_millis(100));
    assert!(rx.try_recv().is_err());
}

#[test]
fn multiple_in_flight_statements_are_tracked_independently() {
    let watchdog = Watchdog::spawn(WatchdogConfig::default(), |_, _| {});
    let a = watchdog.register("SELECT 1");
    let b = watchdog.register("SELECT 2");
    assert_eq!(watchdog.snapshot().len(), 2);
    watchdog.unregister(a);
    assert_eq!(watchdog.snapshot().len(), 1);
    watchdog.unregister(b);
    assert_eq!(watchdog.snapshot().len(), 0);
}
