//! Production-run configuration, wired through as named TOML presets or
//! programmatic construction.

use crate::{
    error::{Error, Result},
    grammar::SchemaPrimitiveSpec,
    uniqueness::{Mode as UniquenessMode, UniquenessConfig},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// One grammar entry in a mixed-grammar production run, with its relative
/// weight. Weights are normalized to sum to 1.0 at config-validation time;
/// a run with no weights given is uniform across its grammars.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrammarWeight {
    /// Registered grammar name.
    pub name: String,
    /// Relative weight. `None` means "share the uniform remainder".
    #[serde(default)]
    pub weight: Option<f64>,
    /// Rule to expand within the grammar (`--grammar-rule`, default `query`).
    #[serde(default = "default_rule")]
    pub rule: String,
}

fn default_rule() -> String {
    "query".to_owned()
}

/// Schema-preparation parameters (`--schema-num-tables`, `--fk-ratio`, ...).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Number of tables to prepare before the run.
    #[serde(default = "default_num_tables")]
    pub num_tables: u32,
    /// Number of functions to prepare.
    #[serde(default)]
    pub num_functions: u32,
    /// Number of views to prepare.
    #[serde(default)]
    pub num_views: u32,
    /// Named complexity profile (`small`, `oltp`, `wide`, ...).
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Fraction of tables that get a foreign key.
    #[serde(default = "default_fk_ratio")]
    pub fk_ratio: f64,
    /// Fraction of tables that get a secondary index.
    #[serde(default = "default_index_ratio")]
    pub index_ratio: f64,
    /// Fraction of tables that get a composite index.
    #[serde(default)]
    pub composite_index_ratio: f64,
    /// Fraction of tables that get a partial index.
    #[serde(default)]
    pub partial_index_ratio: f64,
}

fn default_num_tables() -> u32 {
    4
}
fn default_profile() -> String {
    "oltp".to_owned()
}
fn default_fk_ratio() -> f64 {
    0.5
}
fn default_index_ratio() -> f64 {
    0.5
}

impl Default for SchemaConfig {
    fn default() -> Self {
        SchemaConfig {
            num_tables: default_num_tables(),
            num_functions: 0,
            num_views: 0,
            profile: default_profile(),
            fk_ratio: default_fk_ratio(),
            index_ratio: default_index_ratio(),
            composite_index_ratio: 0.0,
            partial_index_ratio: 0.0,
        }
    }
}

impl From<&SchemaConfig> for SchemaPrimitiveSpec {
    fn from(c: &SchemaConfig) -> Self {
        SchemaPrimitiveSpec {
            num_tables: c.num_tables,
            num_functions: c.num_functions,
            num_views: c.num_views,
            profile: c.profile.clone(),
            fk_ratio: c.fk_ratio,
            index_ratio: c.index_ratio,
            composite_index_ratio: c.composite_index_ratio,
            partial_index_ratio: c.partial_index_ratio,
        }
    }
}

/// Complete configuration for one production run.
///
/// Constructible two ways: programmatically (builder-style field
/// assignment, as any Rust config struct would be), or by loading a named
/// TOML preset via [`ProductionConfig::from_toml_str`]. Unknown keys in a
/// preset are rejected at load time rather than silently ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductionConfig {
    /// Deterministic base seed; `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Target number of unique queries to produce. Mutually exclusive with
    /// `duration` in streaming modes.
    #[serde(default)]
    pub target_count: Option<u64>,
    /// Wall-clock deadline, as a count of seconds, for duration-bounded runs.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Worker pool thread count.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Grammars to mix, by weight.
    pub grammars: Vec<GrammarWeight>,
    /// Queries requested per batch submitted to the pool.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Checkpoint file path, if checkpointing is enabled.
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
    /// Unique queries between checkpoints.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Unique queries between monitoring-line emissions.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,
    /// JSONL metrics export path, if set.
    #[serde(default)]
    pub metrics_export_path: Option<PathBuf>,
    /// Warn when the duplicate rate exceeds this fraction.
    #[serde(default = "default_alert_duplicate_rate")]
    pub alert_on_duplicate_rate: f64,
    /// Warn when the error rate exceeds this fraction.
    #[serde(default = "default_alert_error_rate")]
    pub alert_on_error_rate: f64,
    /// Warn when interval QPS drops below `(1 - this) * long_run_average`.
    #[serde(default = "default_alert_qps_drop")]
    pub alert_on_qps_drop: f64,
    /// Uniqueness-filter configuration; `Mode::None` disables it entirely
    /// (`--no-uniqueness`).
    #[serde(default)]
    pub uniqueness: UniquenessConfig,
    /// Output sink path for produced query text, if any (`--output`).
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Whether a grammar failure aborts the whole run rather than just the
    /// affected batch.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
    /// Wall-clock bound on the graceful-shutdown drain (SIGINT/SIGTERM).
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
fn default_batch_size() -> usize {
    1_000
}
fn default_checkpoint_interval() -> u64 {
    1_000_000
}
fn default_monitor_interval() -> u64 {
    100_000
}
fn default_alert_duplicate_rate() -> f64 {
    0.01
}
fn default_alert_error_rate() -> f64 {
    0.001
}
fn default_alert_qps_drop() -> f64 {
    0.5
}
fn default_continue_on_error() -> bool {
    true
}
fn default_shutdown_drain_secs() -> u64 {
    30
}

impl Default for ProductionConfig {
    fn default() -> Self {
        ProductionConfig {
            seed: None,
            target_count: None,
            duration_secs: None,
            threads: default_threads(),
            grammars: Vec::new(),
            batch_size: default_batch_size(),
            checkpoint_path: None,
            checkpoint_interval: default_checkpoint_interval(),
            monitor_interval: default_monitor_interval(),
            metrics_export_path: None,
            alert_on_duplicate_rate: default_alert_duplicate_rate(),
            alert_on_error_rate: default_alert_error_rate(),
            alert_on_qps_drop: default_alert_qps_drop(),
            uniqueness: UniquenessConfig::default(),
            output_path: None,
            continue_on_error: default_continue_on_error(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

impl ProductionConfig {
    /// Parses a named preset from TOML text, rejecting unknown fields.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ProductionConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid production config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants and normalizes grammar weights to
    /// sum to 1.0 (uniform if every weight was omitted).
    pub fn validate(&self) -> Result<()> {
        if self.grammars.is_empty() {
            return Err(Error::Config("production config must list at least one grammar".to_owned()));
        }
        if self.target_count.is_none() && self.duration_secs.is_none() {
            return Err(Error::Config("production config needs either target_count or duration_secs".to_owned()));
        }
        if self.target_count.is_some() && self.duration_secs.is_some() {
            return Err(Error::Config("target_count and duration_secs are mutually exclusive".to_owned()));
        }
        for g in &self.grammars {
            if let Some(w) = g.weight {
                if w < 0.0 {
                    return Err(Error::Config(format!("grammar {} has a negative weight", g.name)));
                }
            }
        }
        if self.grammars.iter().filter_map(|g| g.weight).sum::<f64>() == 0.0
            && self.grammars.iter().any(|g| g.weight.is_some())
        {
            return Err(Error::Config("grammar weights cannot all be zero".to_owned()));
        }
        Ok(())
    }

    /// Normalized weights, one per entry in `self.grammars`, summing to 1.0.
    /// Uniform across all entries if every weight was omitted.
    pub fn normalized_weights(&self) -> Vec<f64> {
        let explicit: f64 = self.grammars.iter().filter_map(|g| g.weight).sum();
        if explicit == 0.0 {
            let share = 1.0 / self.grammars.len().max(1) as f64;
            return vec![share; self.grammars.len()];
        }
        self.grammars
            .iter()
            .map(|g| g.weight.unwrap_or(0.0) / explicit)
            .collect()
    }

    /// The configured deadline as a [`Duration`], if this is a
    /// duration-bounded run.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
            target_count = 10
            grammars = [{ name = "basic" }]
            bogus_field = true
        "#;
        assert!(ProductionConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn weights_normalize_to_one() {
        let config = ProductionConfig {
            grammars: vec![
                GrammarWeight {
                    name: "a".into(),
                    weight: Some(9.0),
                    rule: "query".into(),
                },
                GrammarWeight {
                    name: "b".into(),
                    weight: Some(1.0),
                    rule: "query".into(),
                },
            ],
            target_count: Some(100),
            ..ProductionConfig::default()
        };
        let weights = config.normalized_weights();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((weights[0] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn missing_weights_are_uniform() {
        let config = ProductionConfig {
            grammars: vec![
                GrammarWeight {
                    name: "a".into(),
                    weight: None,
                    rule: "query".into(),
                },
                GrammarWeight {
                    name: "b".into(),
                    weight: None,
                    rule: "query".into(),
                },
            ],
            target_count: Some(100),
            ..ProductionConfig::default()
        };
        assert_eq!(config.normalized_weights(), vec![0.5, 0.5]);
    }

    #[test]
    fn count_and_duration_are_mutually_exclusive() {
        let config = ProductionConfig {
            grammars: vec![GrammarWeight {
                name: "a".into(),
                weight: None,
                rule: "query".into(),
            }],
            target_count: Some(10),
            duration_secs: Some(5),
            ..ProductionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
