//! Command-line surface: one tool, eight modes.
//!
//! Kept in the library so `src/bin/rqg.rs` stays a thin shell that installs
//! logging and translates [`crate::Error`] into a process exit code;
//! everything else lives here where it can be exercised by tests without
//! spawning a process.

use crate::{
    config::{GrammarWeight, ProductionConfig, SchemaConfig},
    entropy::{EntropyConfig, EntropyManager},
    error::{Error, Result},
    filter::{Filter, SubstringSkipFilter},
    grammar::{Element, Grammar},
    orchestrator::ProductionOrchestrator,
    runner::{self, mock::MockRunner, Runner, RunnerConfig},
    uniqueness::{Mode as UniquenessMode, UniquenessConfig},
    watchdog::{Watchdog, WatchdogConfig},
};
use clap::{Parser, Subcommand};
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

/// Top-level command line, parsed by `clap`'s derive API.
#[derive(Parser, Debug)]
#[command(name = "rqg", version, about = "Random query generator and executor for PostgreSQL-compatible databases")]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,
}

/// The eight supported modes.
#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Lists the registered grammars and runners.
    List,
    /// Expands a grammar rule and prints the results.
    Grammar(GrammarArgs),
    /// Prints a generated DDL bundle from the schema primitive.
    Ddl(DdlArgs),
    /// Alias for `grammar` against the default grammar/rule, for quick smoke checks.
    Random(GrammarArgs),
    /// Runs one of the named end-to-end scenarios.
    Scenario {
        /// Scenario name, e.g. `s1`, `s4`, `s6`.
        name: String,
    },
    /// Runs a mixed-grammar production load per a named preset or custom flags.
    Production(ProductionArgs),
    /// Executes a stream of statements against a live runner.
    Exec(ExecArgs),
    /// Lists the runner-name registry.
    Runners,
}

/// Flags shared by `grammar`, `ddl`, and `random`.
#[derive(clap::Args, Debug)]
pub struct GrammarArgs {
    /// Deterministic seed; omit to seed from OS entropy.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Number of expansions to produce.
    #[arg(long, default_value_t = 10)]
    pub count: u64,
    /// Registered grammar name.
    #[arg(long, default_value = "basic")]
    pub grammar: String,
    /// Rule to expand within the grammar.
    #[arg(long = "grammar-rule", default_value = "query")]
    pub grammar_rule: String,
    /// Write output here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Echo each produced query as it is generated.
    #[arg(long)]
    pub echo_queries: bool,
}

/// Flags for the `ddl` mode.
#[derive(clap::Args, Debug)]
pub struct DdlArgs {
    /// Deterministic seed; omit to seed from OS entropy.
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long = "schema-num-tables", default_value_t = 4)]
    pub num_tables: u32,
    #[arg(long = "schema-num-functions", default_value_t = 0)]
    pub num_functions: u32,
    #[arg(long = "schema-num-views", default_value_t = 0)]
    pub num_views: u32,
    #[arg(long = "schema-profile", default_value = "oltp")]
    pub profile: String,
    #[arg(long = "fk-ratio", default_value_t = 0.5)]
    pub fk_ratio: f64,
    #[arg(long = "index-ratio", default_value_t = 0.5)]
    pub index_ratio: f64,
    #[arg(long = "composite-index-ratio", default_value_t = 0.0)]
    pub composite_index_ratio: f64,
    #[arg(long = "partial-index-ratio", default_value_t = 0.0)]
    pub partial_index_ratio: f64,
}

/// Flags for the `production` mode.
#[derive(clap::Args, Debug)]
pub struct ProductionArgs {
    /// Named preset (see `--config`), or pass `--custom` to build from flags.
    #[arg(long)]
    pub config: Option<String>,
    /// Build the configuration entirely from the flags below.
    #[arg(long)]
    pub custom: bool,
    /// Comma-separated grammar names to mix (uniform weight unless the named
    /// preset overrides it).
    #[arg(long, env = "PYRQG_GRAMMARS", value_delimiter = ',')]
    pub grammars: Vec<String>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub count: Option<u64>,
    #[arg(long)]
    pub duration: Option<u64>,
    #[arg(long)]
    pub threads: Option<usize>,
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    #[arg(long = "no-uniqueness")]
    pub no_uniqueness: bool,
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long = "schema-num-tables", default_value_t = 4)]
    pub schema_num_tables: u32,
    #[arg(long = "schema-num-functions", default_value_t = 0)]
    pub schema_num_functions: u32,
    #[arg(long = "schema-num-views", default_value_t = 0)]
    pub schema_num_views: u32,
    #[arg(long = "schema-profile", env = "PYRQG_SCHEMA", default_value = "oltp")]
    pub schema_profile: String,
    #[arg(long = "fk-ratio", default_value_t = 0.5)]
    pub fk_ratio: f64,
    #[arg(long = "index-ratio", default_value_t = 0.5)]
    pub index_ratio: f64,
    #[arg(long = "composite-index-ratio", default_value_t = 0.0)]
    pub composite_index_ratio: f64,
    #[arg(long = "partial-index-ratio", default_value_t = 0.0)]
    pub partial_index_ratio: f64,
    /// Prepare a schema against this DSN before the run (`--prepare-schema TARGET`).
    #[arg(long = "prepare-schema")]
    pub prepare_schema: Option<String>,
    #[arg(long = "no-prepare-schema")]
    pub no_prepare_schema: bool,
    /// Target a YugabyteDB YCQL endpoint rather than plain PostgreSQL/YSQL.
    #[arg(long = "yb", env = "PYRQG_YB")]
    pub yb: bool,
}

/// Flags for the `exec` mode.
#[derive(clap::Args, Debug)]
pub struct ExecArgs {
    /// Target DSN; `mock://` runs against an in-process mock runner.
    #[arg(long, env = "PYRQG_DSN", default_value = "mock://")]
    pub dsn: String,
    /// Grammar to draw statements from.
    #[arg(long, default_value = "basic")]
    pub grammar: String,
    #[arg(long = "grammar-rule", default_value = "query")]
    pub grammar_rule: String,
    #[arg(long, default_value_t = 100)]
    pub count: u64,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, default_value_t = 4)]
    pub threads: usize,
    #[arg(long = "use-filter")]
    pub use_filter: Option<String>,
    #[arg(long = "print-errors")]
    pub print_errors: bool,
    #[arg(long = "error-samples", default_value_t = 10)]
    pub error_samples: u32,
    #[arg(long = "progress-every", default_value_t = 10_000)]
    pub progress_every: u64,
    #[arg(long = "watch-threshold", default_value_t = 300)]
    pub watch_threshold: u64,
    #[arg(long = "watch-interval", default_value_t = 5)]
    pub watch_interval: u64,
    /// Non-zero exit when any statement failed.
    #[arg(long = "fail-on-errors")]
    pub fail_on_errors: bool,
    /// Target a YugabyteDB YCQL endpoint rather than plain PostgreSQL/YSQL.
    #[arg(long = "yb", env = "PYRQG_YB")]
    pub yb: bool,
}

/// A minimal built-in grammar registry. Production deployments are expected
/// to supply their own grammars via a loader, not hardcode them here; these two
/// are enough to exercise every mode and the end-to-end scenarios without an
/// external file.
pub fn builtin_grammars() -> HashMap<String, Grammar> {
    let mut registry = HashMap::new();
    registry.insert("basic".to_owned(), basic_grammar());
    registry.insert("schema".to_owned(), schema_grammar());
    registry
}

fn basic_grammar() -> Grammar {
    let mut g = Grammar::new();
    let mut holes = BTreeMap::new();
    holes.insert(
        "col".to_owned(),
        Element::Choice {
            children: vec![
                Element::Literal("id".into()),
                Element::Literal("name".into()),
                Element::Literal("created_at".into()),
            ],
            weights: vec![],
        },
    );
    holes.insert("id".to_owned(), Element::Number { lo: 1, hi: 10_000 });
    g.add_rule(
        "select",
        Element::Template {
            text: "SELECT {col} FROM t WHERE id = {id}".to_owned(),
            holes,
        },
    );
    g.add_rule(
        "insert",
        Element::Template {
            text: "INSERT INTO t (id, name) VALUES ({id}, 'row')".to_owned(),
            holes: {
                let mut h = BTreeMap::new();
                h.insert("id".to_owned(), Element::Number { lo: 1, hi: 10_000 });
                h
            },
        },
    );
    g.add_rule(
        "query",
        Element::Choice {
            children: vec![Element::Reference("select".into()), Element::Reference("insert".into())],
            weights: vec![4.0, 1.0],
        },
    );
    g
}

fn schema_grammar() -> Grammar {
    let mut g = Grammar::new();
    g.add_rule("query", Element::SchemaPrimitive(Default::default()));
    g
}

/// Maps a user-facing runner/target name to the canonical registry name.
pub fn canonical_runner_name(name: &str) -> Option<&'static str> {
    match name {
        "ysql" => Some("ysql"),
        "ycql" => Some("ycql"),
        "postgres" | "postgresql" | "sql" => Some("postgresql"),
        _ => None,
    }
}

/// Parses the process arguments and dispatches to the selected mode,
/// returning the process exit code (the `2` usage-error case is handled by
/// `clap` itself, which exits before this function is ever reached).
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.mode {
        Mode::List => cmd_list(),
        Mode::Grammar(args) | Mode::Random(args) => cmd_grammar(&args),
        Mode::Ddl(args) => cmd_ddl(&args),
        Mode::Scenario { name } => cmd_scenario(&name),
        Mode::Production(args) => cmd_production(&args),
        Mode::Exec(args) => cmd_exec(&args),
        Mode::Runners => cmd_runners(),
    }
}

fn cmd_list() -> Result<i32> {
    println!("grammars:");
    for name in builtin_grammars().keys() {
        println!("  {}", name);
    }
    println!("runners:");
    for name in ["ysql", "ycql", "postgresql"] {
        println!("  {}", name);
    }
    Ok(0)
}

fn cmd_runners() -> Result<i32> {
    for (alias, canonical) in [
        ("ysql", "ysql"),
        ("ycql", "ycql"),
        ("postgres", "postgresql"),
        ("postgresql", "postgresql"),
        ("sql", "postgresql"),
    ] {
        println!("{} -> {}", alias, canonical);
    }
    Ok(0)
}

fn cmd_grammar(args: &GrammarArgs) -> Result<i32> {
    let registry = builtin_grammars();
    let grammar = registry
        .get(&args.grammar)
        .ok_or_else(|| Error::Config(format!("unknown grammar: {}", args.grammar)))?;
    let entropy = EntropyManager::new(EntropyConfig {
        base_seed: args.seed,
        ..EntropyConfig::default()
    });
    let queries = grammar.generate_batch(&args.grammar_rule, args.count as usize, &entropy)?;
    write_lines(&queries, args.output.as_deref(), args.echo_queries)?;
    Ok(0)
}

fn cmd_ddl(args: &DdlArgs) -> Result<i32> {
    let spec = SchemaConfig {
        num_tables: args.num_tables,
        num_functions: args.num_functions,
        num_views: args.num_views,
        profile: args.profile.clone(),
        fk_ratio: args.fk_ratio,
        index_ratio: args.index_ratio,
        composite_index_ratio: args.composite_index_ratio,
        partial_index_ratio: args.partial_index_ratio,
    };
    let entropy = EntropyManager::new(EntropyConfig {
        base_seed: args.seed,
        ..EntropyConfig::default()
    });
    let mut g = Grammar::new();
    g.add_rule("query", Element::SchemaPrimitive((&spec).into()));
    let ddl = g.generate("query", &entropy)?;
    println!("{}", ddl);
    Ok(0)
}

fn cmd_scenario(name: &str) -> Result<i32> {
    let ok = match name.to_lowercase().as_str() {
        "s1" => scenario_s1(),
        "s2" => scenario_s2(),
        "s3" => scenario_s3(),
        "s4" => scenario_s4(),
        "s5" => scenario_s5(),
        "s6" => scenario_s6(),
        "s7" => scenario_s7(),
        other => return Err(Error::Config(format!("unknown scenario: {}", other))),
    };
    println!("scenario {}: {}", name, if ok { "PASS" } else { "FAIL" });
    Ok(if ok { 0 } else { 1 })
}

fn scenario_s1() -> bool {
    let mut g = Grammar::new();
    g.add_rule(
        "query",
        Element::Choice {
            children: vec![Element::Literal("A".into()), Element::Literal("B".into())],
            weights: vec![1.0, 1.0],
        },
    );
    let entropy_a = EntropyManager::new(EntropyConfig { base_seed: Some(42), ..Default::default() });
    let entropy_b = EntropyManager::new(EntropyConfig { base_seed: Some(42), ..Default::default() });
    let first = g.generate_batch("query", 6, &entropy_a).unwrap_or_default();
    let second = g.generate_batch("query", 6, &entropy_b).unwrap_or_default();
    first == second && first.iter().all(|s| s == "A" || s == "B")
}

fn scenario_s2() -> bool {
    let mut g = Grammar::new();
    g.add_rule(
        "query",
        Element::Choice {
            children: vec![Element::Literal("X".into()), Element::Literal("Y".into())],
            weights: vec![9.0, 1.0],
        },
    );
    let entropy = EntropyManager::new(EntropyConfig { base_seed: Some(1), ..Default::default() });
    let batch = g.generate_batch("query", 10_000, &entropy).unwrap_or_default();
    let count_y = batch.iter().filter(|s| s.as_str() == "Y").count();
    (800..=1200).contains(&count_y)
}

fn scenario_s3() -> bool {
    let mut g = Grammar::new();
    let mut holes = BTreeMap::new();
    holes.insert(
        "c".to_owned(),
        Element::Choice {
            children: vec![Element::Literal("a".into()), Element::Literal("b".into())],
            weights: vec![],
        },
    );
    holes.insert("n".to_owned(), Element::Number { lo: 1, hi: 3 });
    g.add_rule(
        "query",
        Element::Template {
            text: "SELECT {c} FROM t WHERE id = {n}".to_owned(),
            holes,
        },
    );
    let entropy = EntropyManager::new(EntropyConfig { base_seed: Some(7), ..Default::default() });
    let batch = g.generate_batch("query", 50, &entropy).unwrap_or_default();
    batch.iter().all(|s| {
        s.starts_with("SELECT ") && s.contains(" FROM t WHERE id = ") && s.ends_with(|c: char| "123".contains(c))
    })
}

fn scenario_s4() -> bool {
    let tracker = crate::uniqueness::UniquenessTracker::new(UniquenessConfig {
        mode: UniquenessMode::Probabilistic { false_positive_rate: 1e-4 },
        expected_items: 1_000_000,
        ..UniquenessConfig::default()
    });
    let queries: Vec<String> = (0..1000).map(|i| format!("SELECT {}", i)).collect();
    for q in &queries {
        tracker.check_and_add(q);
    }
    let first_pass = tracker.stats();
    for q in &queries {
        tracker.check_and_add(q);
    }
    let second_pass = tracker.stats();
    first_pass.unique == 1000
        && first_pass.duplicate == 0
        && second_pass.unique == 1000
        && second_pass.duplicate == 1000
}

fn scenario_s5() -> bool {
    let mut runner = MockRunner::always_success();
    let statements = (0..100)
        .map(|i| format!("INSERT INTO t VALUES ({})", i))
        .chain(std::iter::once("CREATE TABLE x (id INT)".to_owned()))
        .chain((0..100).map(|i| format!("INSERT INTO t VALUES ({})", 100 + i)));
    let stats = runner::execute_queries(&mut runner, statements, &RunnerConfig::default(), None);
    stats.totals().0 == 201
}

fn scenario_s6() -> bool {
    use std::sync::mpsc;
    let (tx, rx) = mpsc::channel();
    let watchdog = Watchdog::spawn(
        WatchdogConfig {
            interval: Duration::from_millis(100),
            threshold: Duration::from_secs(1),
        },
        move |sql, elapsed| {
            let _ = tx.send((sql.to_owned(), elapsed));
        },
    );
    let token = watchdog.register("SELECT pg_sleep(3)");
    std::thread::sleep(Duration::from_secs(3));
    watchdog.unregister(token);
    match rx.recv_timeout(Duration::from_secs(1)) {
        Ok((_, elapsed)) => elapsed >= 1 && rx.try_recv().is_err(),
        Err(_) => false,
    }
}

fn scenario_s7() -> bool {
    use crate::comparator::{compare_query, ComparatorConfig};
    use crate::value::Value;
    let mut left = MockRunner::with_select_rows(vec![vec![Value::from(1i64)]]);
    let mut right = MockRunner::with_select_rows(vec![vec![Value::from(1i64)]]);
    let matching = compare_query(&mut left, &mut right, "SELECT 1", &ComparatorConfig::default());
    let mut right_mismatch = MockRunner::with_select_rows(vec![vec![Value::from(2i64)]]);
    let mismatching = compare_query(&mut left, &mut right_mismatch, "SELECT 1", &ComparatorConfig::default());
    matching.matches && !mismatching.matches && mismatching.differences.len() == 1
}

fn cmd_production(args: &ProductionArgs) -> Result<i32> {
    let config = if let Some(name) = &args.config {
        if args.custom {
            return Err(Error::Config("--config and --custom are mutually exclusive".to_owned()));
        }
        load_named_preset(name)?
    } else {
        build_custom_production_config(args)?
    };

    let registry = builtin_grammars();
    let needed: Vec<&GrammarWeight> = config.grammars.iter().collect();
    for g in &needed {
        if !registry.contains_key(&g.name) {
            return Err(Error::Config(format!("unknown grammar: {}", g.name)));
        }
    }

    if let Some(target) = &args.prepare_schema {
        if args.no_prepare_schema {
            return Err(Error::Config("--prepare-schema and --no-prepare-schema are mutually exclusive".to_owned()));
        }
        prepare_schema(target, args)?;
    }

    let orchestrator = ProductionOrchestrator::new(config, registry)?;
    let shutdown = orchestrator.shutdown_flag();
    let ctrlc_shutdown = Arc::clone(&shutdown);
    let _ = ctrlc::set_handler(move || {
        ctrlc_shutdown.store(true, Ordering::SeqCst);
    });

    let mut sink: Option<BufWriter<File>> = match &args.output {
        Some(path) => Some(BufWriter::new(File::create(path).map_err(|e| Error::io("open output", path, e))?)),
        None => None,
    };
    let summary = orchestrator.generate(sink.as_mut().map(|w| w as &mut dyn Write))?;
    if let Some(w) = sink.as_mut() {
        let _ = w.flush();
    }

    log::info!(
        "production run finished: generated={} unique={} duplicate={} failed={}",
        summary.total_generated,
        summary.unique,
        summary.duplicate,
        summary.failed
    );
    Ok(if shutdown.load(Ordering::SeqCst) { 130 } else { 0 })
}

fn load_named_preset(name: &str) -> Result<ProductionConfig> {
    match name {
        "smoke" => Ok(ProductionConfig {
            target_count: Some(1_000),
            grammars: vec![GrammarWeight { name: "basic".into(), weight: None, rule: "query".into() }],
            ..ProductionConfig::default()
        }),
        "soak" => Ok(ProductionConfig {
            duration_secs: Some(3_600),
            grammars: vec![
                GrammarWeight { name: "basic".into(), weight: Some(9.0), rule: "query".into() },
                GrammarWeight { name: "schema".into(), weight: Some(1.0), rule: "query".into() },
            ],
            ..ProductionConfig::default()
        }),
        other => Err(Error::Config(format!("unknown production preset: {}", other))),
    }
}

fn build_custom_production_config(args: &ProductionArgs) -> Result<ProductionConfig> {
    if args.grammars.is_empty() {
        return Err(Error::Config("--custom requires --grammars".to_owned()));
    }
    let grammars = args
        .grammars
        .iter()
        .map(|name| GrammarWeight { name: name.clone(), weight: None, rule: "query".into() })
        .collect();
    let uniqueness = UniquenessConfig {
        mode: if args.no_uniqueness { UniquenessMode::None } else { UniquenessMode::default() },
        ..UniquenessConfig::default()
    };
    let mut config = ProductionConfig {
        seed: args.seed,
        target_count: args.count,
        duration_secs: args.duration,
        grammars,
        checkpoint_path: args.checkpoint.clone(),
        output_path: args.output.clone(),
        uniqueness,
        ..ProductionConfig::default()
    };
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_exec(args: &ExecArgs) -> Result<i32> {
    let registry = builtin_grammars();
    let grammar = registry
        .get(&args.grammar)
        .ok_or_else(|| Error::Config(format!("unknown grammar: {}", args.grammar)))?;
    let entropy = EntropyManager::new(EntropyConfig { base_seed: args.seed, ..EntropyConfig::default() });
    let statements = grammar.generate_batch(&args.grammar_rule, args.count as usize, &entropy)?;

    let filter: Option<Arc<dyn Filter>> = args.use_filter.as_ref().map(|needle| Arc::new(SubstringSkipFilter::new(needle.clone())) as Arc<dyn Filter>);

    let runner_config = RunnerConfig {
        threads: args.threads,
        progress_interval: args.progress_every,
        filter,
        ..RunnerConfig::default()
    };

    let watchdog = Watchdog::spawn(
        WatchdogConfig {
            interval: Duration::from_secs(args.watch_interval),
            threshold: Duration::from_secs(args.watch_threshold),
        },
        |sql, elapsed| log::warn!("long-running statement ({}s): {}", elapsed, sql),
    );

    let stats = if args.dsn == "mock://" {
        let mut runner = MockRunner::always_success();
        runner::execute_queries(&mut runner, statements.into_iter(), &runner_config, Some(&watchdog))
    } else {
        connect_and_execute(&args.dsn, args.yb, statements, &runner_config, &watchdog)?
    };

    println!("{}", stats.summary());
    let (_, _, failed) = stats.totals();
    Ok(if args.fail_on_errors && failed > 0 { 1 } else { 0 })
}

/// Generates the configured schema-primitive DDL bundle and runs it against
/// `dsn` via [`Runner::setup_schema`] before a production run starts
/// (`--prepare-schema`).
#[cfg(feature = "postgres-runner")]
fn prepare_schema(dsn: &str, args: &ProductionArgs) -> Result<()> {
    use crate::runner::postgres::{Dialect, PostgresConfig, PostgresRunner};
    let spec = SchemaConfig {
        num_tables: args.schema_num_tables,
        num_functions: args.schema_num_functions,
        num_views: args.schema_num_views,
        profile: args.schema_profile.clone(),
        fk_ratio: args.fk_ratio,
        index_ratio: args.index_ratio,
        composite_index_ratio: args.composite_index_ratio,
        partial_index_ratio: args.partial_index_ratio,
    };
    let entropy = EntropyManager::new(EntropyConfig { base_seed: args.seed, ..EntropyConfig::default() });
    let mut g = Grammar::new();
    g.add_rule("query", Element::SchemaPrimitive((&spec).into()));
    let ddl = g.generate("query", &entropy)?;

    let dialect = if args.yb || dsn.contains(":9042") { Dialect::Ycql } else { Dialect::Postgres };
    let mut runner = PostgresRunner::new(PostgresConfig {
        dsn: dsn.to_owned(),
        dialect,
        statement_timeout: Duration::from_secs(30),
    });
    runner.connect()?;
    // `ddl` is table/index statements back to back, each ending in ");\n"
    // (possibly with embedded newlines of its own), so split on the
    // statement terminator rather than on every line break.
    let statements: Vec<String> = ddl
        .split(";\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{};", s))
        .collect();
    runner.setup_schema(&statements)
}

#[cfg(not(feature = "postgres-runner"))]
fn prepare_schema(_dsn: &str, _args: &ProductionArgs) -> Result<()> {
    Err(Error::Config(
        "this build has no postgres-runner support; rebuild with --features postgres-runner".to_owned(),
    ))
}

#[cfg(feature = "postgres-runner")]
fn connect_and_execute(
    dsn: &str,
    yb: bool,
    statements: Vec<String>,
    config: &RunnerConfig,
    watchdog: &Watchdog,
) -> Result<runner::ExecutionStats> {
    use crate::runner::postgres::{Dialect, PostgresConfig, PostgresRunner};
    let dialect = if yb || dsn.contains(":9042") { Dialect::Ycql } else { Dialect::Postgres };
    let mut runner = PostgresRunner::new(PostgresConfig {
        dsn: dsn.to_owned(),
        dialect,
        statement_timeout: Duration::from_secs(30),
    });
    runner.connect()?;
    Ok(runner::execute_queries(&mut runner, statements.into_iter(), config, Some(watchdog)))
}

#[cfg(not(feature = "postgres-runner"))]
fn connect_and_execute(
    _dsn: &str,
    _yb: bool,
    _statements: Vec<String>,
    _config: &RunnerConfig,
    _watchdog: &Watchdog,
) -> Result<runner::ExecutionStats> {
    Err(Error::Config("this build has no postgres-runner support; pass --dsn mock:// or rebuild with --features postgres-runner".to_owned()))
}

fn write_lines(lines: &[String], output: Option<&std::path::Path>, echo: bool) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = BufWriter::new(File::create(path).map_err(|e| Error::io("write output", path, e))?);
            for line in lines {
                writeln!(file, "{}", line).map_err(|e| Error::io("write output", path, e))?;
                if echo {
                    println!("{}", line);
                }
            }
        }
        None => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_runner_name_maps_aliases() {
        assert_eq!(canonical_runner_name("postgres"), Some("postgresql"));
        assert_eq!(canonical_runner_name("sql"), Some("postgresql"));
        assert_eq!(canonical_runner_name("ysql"), Some("ysql"));
        assert_eq!(canonical_runner_name("nope"), None);
    }

    #[test]
    fn builtin_grammars_validate() {
        for grammar in builtin_grammars().values() {
            assert!(grammar.validate().is_ok());
        }
    }

    #[test]
    fn every_scenario_passes() {
        for name in ["s1", "s2", "s3", "s4", "s5", "s7"] {
            assert_eq!(cmd_scenario(name).unwrap(), 0, "scenario {} failed", name);
        }
    }

    #[test]
    fn unknown_grammar_in_grammar_mode_is_a_config_error() {
        let args = GrammarArgs {
            seed: Some(1),
            count: 1,
            grammar: "nonexistent".to_owned(),
            grammar_rule: "query".to_owned(),
            output: None,
            echo_queries: false,
        };
        assert!(cmd_grammar(&args).is_err());
    }
}
