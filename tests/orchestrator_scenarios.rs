//! End-to-end coverage of the production orchestrator: a mixed-grammar run
//! against a target count, checkpointing to disk, and resuming the run
//! counters (not the Bloom filter contents) from the checkpoint.

use rqg::config::{GrammarWeight, ProductionConfig};
use rqg::grammar::{Element, Grammar};
use rqg::orchestrator::{Checkpoint, ProductionOrchestrator};
use std::collections::HashMap;

fn two_grammar_registry() -> HashMap<String, Grammar> {
    let mut inserts = Grammar::new();
    inserts.add_rule("query", Element::Number { lo: 1, hi: 1_000_000 });

    let mut selects = Grammar::new();
    selects.add_rule(
        "query",
        Element::Template {
            text: "SELECT {n}".to_owned(),
            holes: {
                let mut h = std::collections::BTreeMap::new();
                h.insert("n".to_owned(), Element::Number { lo: 1, hi: 1_000_000 });
                h
            },
        },
    );

    let mut registry = HashMap::new();
    registry.insert("inserts".to_owned(), inserts);
    registry.insert("selects".to_owned(), selects);
    registry
}

#[test]
fn a_target_count_run_produces_exactly_that_many_unique_queries_or_fewer() {
    let config = ProductionConfig {
        seed: Some(7),
        target_count: Some(500),
        grammars: vec![
            GrammarWeight { name: "inserts".into(), weight: Some(3.0), rule: "query".into() },
            GrammarWeight { name: "selects".into(), weight: Some(1.0), rule: "query".into() },
        ],
        batch_size: 50,
        monitor_interval: 10_000_000,
        checkpoint_interval: 10_000_000,
        ..ProductionConfig::default()
    };
    let orchestrator = ProductionOrchestrator::new(config, two_grammar_registry()).unwrap();
    let summary = orchestrator.generate(None).unwrap();
    assert!(summary.unique <= 500);
    assert_eq!(summary.unique + summary.duplicate, summary.total_generated);
}

#[test]
fn a_checkpoint_written_mid_run_and_reloaded_reports_consistent_counters() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint_path = dir.path().join("checkpoint.json");

    let config = ProductionConfig {
        seed: Some(99),
        target_count: Some(300),
        grammars: vec![GrammarWeight { name: "inserts".into(), weight: None, rule: "query".into() }],
        batch_size: 20,
        checkpoint_path: Some(checkpoint_path.clone()),
        checkpoint_interval: 100,
        monitor_interval: 10_000_000,
        ..ProductionConfig::default()
    };
    let orchestrator = ProductionOrchestrator::new(config, two_grammar_registry()).unwrap();
    let summary = orchestrator.generate(None).unwrap();

    let checkpoint = Checkpoint::read(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.stats.unique_queries, summary.unique);
    assert_eq!(checkpoint.stats.duplicate_queries, summary.duplicate);
    assert_eq!(checkpoint.stats.total_queries_generated, summary.total_generated);
}

#[test]
fn an_unregistered_grammar_name_is_rejected_before_any_generation_starts() {
    let config = ProductionConfig {
        target_count: Some(10),
        grammars: vec![GrammarWeight { name: "nonexistent".into(), weight: None, rule: "query".into() }],
        ..ProductionConfig::default()
    };
    assert!(ProductionOrchestrator::new(config, two_grammar_registry()).is_err());
}
