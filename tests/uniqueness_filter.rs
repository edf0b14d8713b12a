//! End-to-end coverage of the rotating Bloom filter: a first pass over a
//! fixed set of statements must report them all unique, and a second pass
//! over the exact same set must report them all as duplicates.

use rqg::uniqueness::{Mode, UniquenessConfig, UniquenessTracker};

#[test]
fn duplicate_counts_match_on_a_second_pass_over_the_same_statements() {
    let tracker = UniquenessTracker::new(UniquenessConfig {
        mode: Mode::Probabilistic { false_positive_rate: 1e-4 },
        expected_items: 100_000,
        ..UniquenessConfig::default()
    });

    let statements: Vec<String> = (0..5_000).map(|i| format!("SELECT * FROM t WHERE id = {}", i)).collect();

    for s in &statements {
        assert!(tracker.check_and_add(s), "first pass should see every statement as unique");
    }
    let first_pass = tracker.stats();
    assert_eq!(first_pass.total, 5_000);
    assert_eq!(first_pass.unique, 5_000);
    assert_eq!(first_pass.duplicate, 0);

    for s in &statements {
        assert!(!tracker.check_and_add(s), "second pass should see every statement as a duplicate");
    }
    let second_pass = tracker.stats();
    assert_eq!(second_pass.total, 10_000);
    assert_eq!(second_pass.unique, 5_000);
    assert_eq!(second_pass.duplicate, 5_000);
}

#[test]
fn rotation_keeps_recently_archived_entries_detectable() {
    let tracker = UniquenessTracker::new(UniquenessConfig {
        mode: Mode::Strict,
        expected_items: 100,
        rotation_interval: 50,
        archive_capacity: 4,
        ..UniquenessConfig::default()
    });
    let statements: Vec<String> = (0..120).map(|i| format!("INSERT INTO t VALUES ({})", i)).collect();
    for s in &statements {
        tracker.check_and_add(s);
    }
    // every statement inserted before the most recent rotation should still
    // be detected as a duplicate via the archive.
    for s in &statements {
        assert!(!tracker.check_and_add(s));
    }
}

#[test]
fn none_mode_disables_filtering_entirely() {
    let tracker = UniquenessTracker::new(UniquenessConfig {
        mode: Mode::None,
        ..UniquenessConfig::default()
    });
    for _ in 0..10 {
        assert!(tracker.check_and_add("SELECT 1"));
    }
    assert_eq!(tracker.stats().duplicate, 0);
}
