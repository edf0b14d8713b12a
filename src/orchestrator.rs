//! Production Orchestrator: wires the entropy manager,
//! uniqueness filter, data generator, grammar engine, and worker pool into a
//! single run that drives a target count or a wall-clock deadline,
//! checkpointing and emitting monitoring records along the way.

use crate::{
    config::ProductionConfig,
    entropy::{EntropyConfig, EntropyManager},
    error::{Error, Result},
    grammar::Grammar,
    pool::{PoolConfig, WorkerPool},
    uniqueness::UniquenessTracker,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::Write,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// A checkpoint snapshot, written atomically (temp file + rename) so a crash
/// mid-write never leaves a corrupt checkpoint on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unix timestamp (seconds) the checkpoint was written.
    pub timestamp: i64,
    /// Running totals.
    pub stats: CheckpointStats,
    /// Entropy-manager statistics at the time of the checkpoint.
    pub entropy_stats: crate::entropy::EntropyStatistics,
    /// Uniqueness-tracker statistics at the time of the checkpoint.
    pub uniqueness_stats: crate::uniqueness::UniquenessStats,
}

/// The counter block inside a [`Checkpoint`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    /// Total queries generated (unique + duplicate + failed).
    pub total_queries_generated: u64,
    /// Queries that passed the uniqueness filter.
    pub unique_queries: u64,
    /// Queries rejected as duplicates.
    pub duplicate_queries: u64,
    /// Batches that failed to generate.
    pub failed_queries: u64,
}

impl Checkpoint {
    /// Writes `self` to `path` atomically: serialize to a sibling temp file,
    /// then rename over the destination. Resume reads counters only; full
    /// Bloom-filter-contents restore is left as future work (see DESIGN.md).
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(self).map_err(|source| Error::Serialize {
            what: "checkpoint",
            source,
        })?;
        let mut file = File::create(&tmp_path).map_err(|e| Error::io("write checkpoint", &tmp_path, e))?;
        file.write_all(&json).map_err(|e| Error::io("write checkpoint", &tmp_path, e))?;
        file.sync_all().map_err(|e| Error::io("write checkpoint", &tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| Error::io("rename checkpoint", path, e))?;
        Ok(())
    }

    /// Reads a checkpoint previously written by [`Checkpoint::write_atomic`].
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io("read checkpoint", path, e))?;
        serde_json::from_str(&text).map_err(|source| Error::Serialize {
            what: "checkpoint",
            source,
        })
    }
}

/// One line of the JSONL metrics export.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsRecord {
    /// Unix timestamp (seconds) this record was emitted.
    pub timestamp: i64,
    /// Queries generated since the previous record.
    pub interval_generated: u64,
    /// Queries generated since the run started.
    pub total_generated: u64,
    /// Throughput over the most recent interval.
    pub interval_qps: f64,
    /// Throughput averaged over the whole run so far.
    pub overall_qps: f64,
    /// `unique / total` over the whole run so far.
    pub uniqueness_rate: f64,
    /// Resident memory, estimated from the uniqueness tracker's configured
    /// cap plus archive retention (a cheap proxy; no exact accounting is
    /// attempted here).
    pub memory_mb: f64,
    /// Per-worker pool statistics.
    pub pool_stats: crate::pool::PoolStats,
}

/// A registered grammar plus the rule name to expand within it.
struct RegisteredGrammar {
    grammar: Arc<Grammar>,
    rule: String,
}

/// Drives one production run: mixes grammars by weight, generates through
/// the worker pool, filters for uniqueness, checkpoints, monitors, and
/// terminates on a target count, a deadline, or a shutdown signal.
pub struct ProductionOrchestrator {
    config: ProductionConfig,
    entropy: EntropyManager,
    registry: Arc<HashMap<String, RegisteredGrammar>>,
    uniqueness: Arc<UniquenessTracker>,
    shutdown: Arc<AtomicBool>,
}

/// Final tallies returned by [`ProductionOrchestrator::generate`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    /// Total queries the grammar engine produced (unique + duplicate).
    pub total_generated: u64,
    /// Queries that passed the uniqueness filter.
    pub unique: u64,
    /// Queries rejected as duplicates.
    pub duplicate: u64,
    /// Batches that failed to generate.
    pub failed: u64,
}

impl ProductionOrchestrator {
    /// Builds an orchestrator from `config` and a name -> [`Grammar`]
    /// registry. Grammar names in `config.grammars` not present in
    /// `grammars` are a configuration error.
    pub fn new(config: ProductionConfig, grammars: HashMap<String, Grammar>) -> Result<Self> {
        config.validate()?;
        let mut registry = HashMap::with_capacity(config.grammars.len());
        for g in &config.grammars {
            let grammar = grammars
                .get(&g.name)
                .ok_or_else(|| Error::Config(format!("unknown grammar: {}", g.name)))?;
            registry.insert(
                g.name.clone(),
                RegisteredGrammar {
                    grammar: Arc::new(grammar.clone()),
                    rule: g.rule.clone(),
                },
            );
        }
        let entropy = EntropyManager::new(EntropyConfig {
            base_seed: config.seed,
            ..EntropyConfig::default()
        });
        let uniqueness = Arc::new(UniquenessTracker::new(config.uniqueness.clone()));
        Ok(ProductionOrchestrator {
            config,
            entropy,
            registry: Arc::new(registry),
            uniqueness,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A clone of the shutdown flag, for wiring into a signal handler
    /// (`ctrlc::set_handler`) from the CLI layer.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Produces up to `self.config.target_count` unique queries (or runs
    /// until the configured deadline), writing each unique query to `sink`
    /// if given. Checkpoints every `checkpoint_interval` unique queries and
    /// emits a monitoring line every `monitor_interval`.
    pub fn generate(&self, mut sink: Option<&mut dyn Write>) -> Result<RunSummary> {
        let pool = self.build_pool();
        let weights = self.config.normalized_weights();
        let names: Vec<&String> = self.registry.keys().collect();

        let start = Instant::now();
        let deadline = self.config.duration().map(|d| start + d);
        let target = self.config.target_count;

        let total_generated = AtomicU64::new(0);
        let failed = AtomicU64::new(0);
        let mut unique_count: u64 = 0;
        let mut duplicate_count: u64 = 0;
        let mut last_monitor_at: u64 = 0;
        let mut last_monitor_time = start;
        let mut last_monitor_generated: u64 = 0;
        let mut metrics_file = self.open_metrics_file()?;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                log::info!("shutdown requested, draining and writing final checkpoint");
                break;
            }
            if let Some(t) = target {
                if unique_count >= t {
                    break;
                }
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    break;
                }
            }

            let grammar_name = self.pick_grammar(&names, &weights);
            let remaining = target.map(|t| (t - unique_count) as usize).unwrap_or(self.config.batch_size);
            let batch_size = remaining.min(self.config.batch_size).max(1);

            let handle = pool.submit_batch(grammar_name, batch_size);
            let batch = handle.wait();
            total_generated.fetch_add(batch.queries.len() as u64, Ordering::Relaxed);
            if batch.error.is_some() {
                failed.fetch_add(1, Ordering::Relaxed);
                if !self.config.continue_on_error {
                    return Err(Error::Config(format!(
                        "grammar {} failed: {}",
                        grammar_name,
                        batch.error.unwrap_or_default()
                    )));
                }
            }

            for query in &batch.queries {
                if self.uniqueness.check_and_add(query) {
                    unique_count += 1;
                    if let Some(w) = sink.as_deref_mut() {
                        let _ = writeln!(w, "{}", query);
                    }
                } else {
                    duplicate_count += 1;
                }
            }

            if unique_count.saturating_sub(last_monitor_at) >= self.config.monitor_interval {
                let now = Instant::now();
                let interval_generated = total_generated.load(Ordering::Relaxed) - last_monitor_generated;
                let interval_secs = (now - last_monitor_time).as_secs_f64().max(1e-9);
                let overall_secs = (now - start).as_secs_f64().max(1e-9);
                let total = total_generated.load(Ordering::Relaxed);
                let record = MetricsRecord {
                    timestamp: unix_now(),
                    interval_generated,
                    total_generated: total,
                    interval_qps: interval_generated as f64 / interval_secs,
                    overall_qps: total as f64 / overall_secs,
                    uniqueness_rate: if total > 0 { unique_count as f64 / total as f64 } else { 1.0 },
                    memory_mb: self.estimate_memory_mb(),
                    pool_stats: pool.stats(),
                };
                self.check_alerts(&record, overall_secs);
                if let Some(f) = metrics_file.as_mut() {
                    let _ = writeln!(f, "{}", serde_json::to_string(&record).unwrap_or_default());
                }
                log::info!(
                    "monitor: generated={} unique={} qps(interval)={:.0} qps(overall)={:.0} uniqueness_rate={:.4}",
                    record.total_generated,
                    unique_count,
                    record.interval_qps,
                    record.overall_qps,
                    record.uniqueness_rate
                );
                last_monitor_at = unique_count;
                last_monitor_time = now;
                last_monitor_generated = total;
            }

            if let Some(path) = &self.config.checkpoint_path {
                if unique_count > 0 && unique_count % self.config.checkpoint_interval == 0 {
                    self.write_checkpoint(path, unique_count, duplicate_count, total_generated.load(Ordering::Relaxed), failed.load(Ordering::Relaxed))?;
                }
            }
        }

        if let Some(path) = &self.config.checkpoint_path {
            self.write_checkpoint(path, unique_count, duplicate_count, total_generated.load(Ordering::Relaxed), failed.load(Ordering::Relaxed))?;
        }

        pool.shutdown(Some(Duration::from_secs(self.config.shutdown_drain_secs)));

        Ok(RunSummary {
            total_generated: total_generated.load(Ordering::Relaxed),
            unique: unique_count,
            duplicate: duplicate_count,
            failed: failed.load(Ordering::Relaxed),
        })
    }

    fn write_checkpoint(&self, path: &Path, unique: u64, duplicate: u64, total: u64, failed: u64) -> Result<()> {
        let checkpoint = Checkpoint {
            timestamp: unix_now(),
            stats: CheckpointStats {
                total_queries_generated: total,
                unique_queries: unique,
                duplicate_queries: duplicate,
                failed_queries: failed,
            },
            entropy_stats: self.entropy.statistics(),
            uniqueness_stats: self.uniqueness.stats(),
        };
        checkpoint.write_atomic(path)
    }

    fn open_metrics_file(&self) -> Result<Option<File>> {
        match &self.config.metrics_export_path {
            None => Ok(None),
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| Error::io("open metrics export", path, e))?;
                Ok(Some(file))
            }
        }
    }

    /// Warns (never hard-stops) on elevated duplicate rate, elevated error
    /// rate, or a QPS drop relative to the long-run average.
    fn check_alerts(&self, record: &MetricsRecord, overall_secs: f64) {
        let duplicate_rate = 1.0 - record.uniqueness_rate;
        if duplicate_rate > self.config.alert_on_duplicate_rate {
            log::warn!("duplicate rate {:.4} exceeds alert threshold {:.4}", duplicate_rate, self.config.alert_on_duplicate_rate);
        }
        if record.pool_stats.total_queries > 0 {
            let error_rate = record.pool_stats.total_errors as f64 / record.pool_stats.total_queries as f64;
            if error_rate > self.config.alert_on_error_rate {
                log::warn!("error rate {:.4} exceeds alert threshold {:.4}", error_rate, self.config.alert_on_error_rate);
            }
        }
        let long_run_average = record.total_generated as f64 / overall_secs.max(1e-9);
        let drop_floor = (1.0 - self.config.alert_on_qps_drop) * long_run_average;
        if record.interval_qps < drop_floor {
            log::warn!("interval qps {:.0} dropped below {:.0} ({:.0}% of long-run average)", record.interval_qps, drop_floor, (1.0 - self.config.alert_on_qps_drop) * 100.0);
        }
    }

    fn estimate_memory_mb(&self) -> f64 {
        self.config.uniqueness.memory_cap_bytes as f64 / (1024.0 * 1024.0)
            * (1.0 + self.config.uniqueness.archive_capacity as f64)
    }

    fn pick_grammar<'a>(&self, names: &[&'a String], weights: &[f64]) -> &'a str {
        if names.len() == 1 {
            return names[0];
        }
        let idx = self.entropy.with_rng(|rng| {
            let total: f64 = weights.iter().sum();
            let mut target = rng.uniform(0.0, total.max(1e-9));
            for (i, &w) in weights.iter().enumerate() {
                if target < w {
                    return i;
                }
                target -= w;
            }
            weights.len() - 1
        });
        names[idx]
    }

    fn build_pool(&self) -> WorkerPool {
        let registry = Arc::clone(&self.registry);
        let entropy = self.entropy.clone();
        WorkerPool::new(
            PoolConfig {
                num_threads: self.config.threads,
                queue_size: 10_000,
                backpressure_threshold: 0.8,
            },
            move |name, count| {
                let entry = registry.get(name).ok_or_else(|| format!("unknown grammar: {}", name))?;
                entry.grammar.generate_batch(&entry.rule, count, &entropy).map_err(|e| e.to_string())
            },
        )
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::GrammarWeight, grammar::Element};

    /// A grammar with far more distinct outputs than any `target_count` used
    /// below, so the uniqueness filter never runs out of fresh values to
    /// hand back (a narrow two-literal grammar would make the orchestrator
    /// loop forever waiting for a target count it can never reach).
    fn wide_number_grammar() -> Grammar {
        let mut g = Grammar::new();
        g.add_rule("query", Element::Number { lo: 0, hi: 1_000_000 });
        g
    }

    #[test]
    fn s4_uniqueness_duplicate_counts_match_second_pass() {
        let mut grammars = HashMap::new();
        grammars.insert("basic".to_owned(), wide_number_grammar());
        let config = ProductionConfig {
            seed: Some(42),
            target_count: Some(50),
            grammars: vec![GrammarWeight {
                name: "basic".into(),
                weight: None,
                rule: "query".into(),
            }],
            batch_size: 10,
            monitor_interval: 1_000_000,
            checkpoint_interval: 1_000_000,
            ..ProductionConfig::default()
        };
        let orchestrator = ProductionOrchestrator::new(config, grammars).unwrap();
        let summary = orchestrator.generate(None).unwrap();
        assert_eq!(summary.unique + summary.duplicate, summary.total_generated);
        assert!(summary.unique <= 50);
    }

    #[test]
    fn unknown_grammar_name_is_a_config_error() {
        let grammars = HashMap::new();
        let config = ProductionConfig {
            target_count: Some(1),
            grammars: vec![GrammarWeight {
                name: "missing".into(),
                weight: None,
                rule: "query".into(),
            }],
            ..ProductionConfig::default()
        };
        assert!(ProductionOrchestrator::new(config, grammars).is_err());
    }

    #[test]
    fn checkpoint_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let checkpoint = Checkpoint {
            timestamp: 1_700_000_000,
            stats: CheckpointStats {
                total_queries_generated: 100,
                unique_queries: 90,
                duplicate_queries: 10,
                failed_queries: 0,
            },
            entropy_stats: crate::entropy::EntropyStatistics {
                live_generators: 4,
                reseed_interval: 1_000_000,
                deterministic: true,
            },
            uniqueness_stats: crate::uniqueness::UniquenessStats {
                total: 100,
                unique: 90,
                duplicate: 10,
                estimated_fill_ratio: 0.01,
                archived_cells: 0,
            },
        };
        checkpoint.write_atomic(&path).unwrap();
        let reloaded = Checkpoint::read(&path).unwrap();
        assert_eq!(reloaded.stats.unique_queries, 90);
    }
}
