//! strata CLI - compile, plan and dry-run metadata-driven loads
//!
//! Usage:
//!   strata compile <dataset> [--dialect <dialect>] [--resolve]
//!   strata materialize <dataset> [--live <live.json>]
//!   strata plan [<dataset>...]
//!   strata run [<dataset>...] [--live <live.json>] [--sql-dir <dir>] [--snapshot <file>] [--cutoff <ts>]
//!   strata manifest
//!   strata diff <before.json> <after.json>
//!
//! Metadata is read from a catalog JSON document (`--catalog` or the
//! `catalog` setting). Live schema, where needed, comes from a static
//! description; an absent description means an empty warehouse.

use chrono::{NaiveDateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use strata::config::Settings;
use strata::load::{compose_load_sql, create_table_sql, resolve_load_plan, LoadMode, LoadOptions};
use strata::materialize::{self, StaticIntrospector};
use strata::metadata::{Catalog, DatasetKey};
use strata::orchestrator::{
    self, build_manifest, catalog_fingerprint, diff_snapshots, new_batch_id, resolve_order,
    ExecutionSnapshot, RunLogRecord, SnapshotContext, StepFailure,
};
use strata::sql::template::{substitute, RuntimeValues};
use strata::sql::{to_script, Dialect};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "strata - metadata-driven ELT compiler and orchestrator")]
#[command(version)]
struct Cli {
    /// Settings file (defaults: $STRATA_CONFIG, ./strata.toml, user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog JSON document, overriding the `catalog` setting
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// SQL dialect, overriding the `dialect` setting
    #[arg(short, long, global = true)]
    dialect: Option<DialectArg>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the load SQL of one dataset
    Compile {
        /// Dataset key (schema.name)
        dataset: String,

        /// Substitute runtime placeholders with a fresh run id and now()
        #[arg(long)]
        resolve: bool,

        /// Delta cutoff for --resolve, as "YYYY-MM-DD HH:MM:SS"
        #[arg(long, requires = "resolve")]
        cutoff: Option<String>,
    },

    /// Plan additive DDL for one dataset against the live schema
    Materialize {
        dataset: String,

        /// Static live-schema description (JSON)
        #[arg(long)]
        live: Option<PathBuf>,
    },

    /// Print the execution plan for the given roots (all datasets if none)
    Plan { roots: Vec<String> },

    /// Dry-run the execution plan and print its snapshot
    Run {
        roots: Vec<String>,

        #[arg(long)]
        live: Option<PathBuf>,

        /// Write one SQL script per dataset into this directory
        #[arg(long)]
        sql_dir: Option<PathBuf>,

        /// Write the snapshot here instead of stdout
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Append run-log records (JSON lines) to this file
        #[arg(long)]
        run_log: Option<PathBuf>,

        /// Delta cutoff for incremental filters, as "YYYY-MM-DD HH:MM:SS"
        #[arg(long)]
        cutoff: Option<String>,
    },

    /// Print the dependency manifest
    Manifest,

    /// Compare two run snapshots
    Diff { before: PathBuf, after: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Duckdb,
    Postgres,
    Tsql,
    Fabric,
    Mysql,
    Snowflake,
    Bigquery,
    Redshift,
    Databricks,
    Oracle,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Fabric => Dialect::Fabric,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Snowflake => Dialect::Snowflake,
            DialectArg::Bigquery => Dialect::BigQuery,
            DialectArg::Redshift => Dialect::Redshift,
            DialectArg::Databricks => Dialect::Databricks,
            DialectArg::Oracle => Dialect::Oracle,
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the -v level. `log` records from
/// the library reach the subscriber through its log bridge.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .try_init();
}

type CliResult = Result<ExitCode, String>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(dialect) = cli.dialect {
        settings.dialect = dialect.into();
    }

    let result = match cli.command {
        Commands::Diff { before, after } => cmd_diff(&before, &after),
        command => load_catalog(cli.catalog.as_deref(), &settings)
            .and_then(|catalog| dispatch(command, &catalog, &settings)),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands, catalog: &Catalog, settings: &Settings) -> CliResult {
    match command {
        Commands::Compile {
            dataset,
            resolve,
            cutoff,
        } => cmd_compile(catalog, settings, &dataset, resolve, cutoff.as_deref()),
        Commands::Materialize { dataset, live } => {
            cmd_materialize(catalog, settings, &dataset, live.as_deref())
        }
        Commands::Plan { roots } => cmd_plan(catalog, &roots),
        Commands::Run {
            roots,
            live,
            sql_dir,
            snapshot,
            run_log,
            cutoff,
        } => cmd_run(
            catalog,
            settings,
            &roots,
            RunOutputs {
                live: live.as_deref(),
                sql_dir: sql_dir.as_deref(),
                snapshot: snapshot.as_deref(),
                run_log: run_log.as_deref(),
                cutoff: cutoff.as_deref(),
            },
        ),
        Commands::Manifest => cmd_manifest(catalog, settings),
        Commands::Diff { before, after } => cmd_diff(&before, &after),
    }
}

fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("reading '{}': {}", path.display(), e))
}

fn load_catalog(explicit: Option<&Path>, settings: &Settings) -> Result<Catalog, String> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => settings
            .catalog_path()
            .map_err(|e| e.to_string())?
            .ok_or("no catalog given: pass --catalog or set `catalog` in strata.toml")?,
    };
    let json = read_file(&path)?;
    Catalog::from_json(&json).map_err(|e| format!("loading catalog '{}': {}", path.display(), e))
}

fn load_live(path: Option<&Path>) -> Result<StaticIntrospector, String> {
    match path {
        Some(p) => StaticIntrospector::from_json(&read_file(p)?)
            .map_err(|e| format!("loading live schema '{}': {}", p.display(), e)),
        None => Ok(StaticIntrospector::new()),
    }
}

fn parse_keys(keys: &[String]) -> Result<Vec<DatasetKey>, String> {
    keys.iter()
        .map(|k| k.parse().map_err(|e| format!("{}", e)))
        .collect()
}

fn parse_cutoff(cutoff: Option<&str>) -> Result<Option<NaiveDateTime>, String> {
    cutoff
        .map(|c| NaiveDateTime::parse_from_str(c, "%Y-%m-%d %H:%M:%S"))
        .transpose()
        .map_err(|e| format!("invalid --cutoff: {}", e))
}

fn cmd_compile(
    catalog: &Catalog,
    settings: &Settings,
    dataset: &str,
    resolve: bool,
    cutoff: Option<&str>,
) -> CliResult {
    let key: DatasetKey = dataset.parse().map_err(|e| format!("{}", e))?;
    let load = compose_load_sql(catalog, &key, settings.dialect, &LoadOptions::default())
        .map_err(|e| e.to_string())?;
    let mut script = to_script(&load.statements);

    if resolve {
        let values = RuntimeValues {
            load_run_id: uuid::Uuid::new_v4().to_string(),
            load_timestamp: Utc::now().naive_utc(),
            delta_cutoff: parse_cutoff(cutoff)?,
        };
        script = substitute(&script, settings.dialect, &values).map_err(|e| e.to_string())?;
    }

    println!("-- {} ({} load, {})", key, load.plan.mode, settings.dialect);
    println!("{}", script);
    Ok(ExitCode::SUCCESS)
}

fn cmd_materialize(
    catalog: &Catalog,
    settings: &Settings,
    dataset: &str,
    live: Option<&Path>,
) -> CliResult {
    let dataset = catalog.get_by_name(dataset).map_err(|e| e.to_string())?;
    let live = load_live(live)?;
    let plan = materialize::build_plan(dataset, &live, settings.dialect, &settings.materialization)
        .map_err(|e| e.to_string())?;

    for warning in &plan.warnings {
        eprintln!("warning: {}", warning);
    }
    for error in &plan.blocking_errors {
        eprintln!("blocked: {}", error);
    }
    if plan.is_blocked() {
        return Ok(ExitCode::FAILURE);
    }
    let statements = plan.render(settings.dialect).map_err(|e| e.to_string())?;
    if !statements.is_empty() {
        println!("{}", to_script(&statements));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_plan(catalog: &Catalog, roots: &[String]) -> CliResult {
    let roots = parse_keys(roots)?;
    let order = resolve_order(catalog, &roots).map_err(|e| e.to_string())?;
    let plan = orchestrator::build_plan(new_batch_id(), &order);
    let json = serde_json::to_string_pretty(&plan).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}

struct RunOutputs<'a> {
    live: Option<&'a Path>,
    sql_dir: Option<&'a Path>,
    snapshot: Option<&'a Path>,
    run_log: Option<&'a Path>,
    cutoff: Option<&'a str>,
}

/// Per-dataset figures the run log needs after execution.
struct Rendered {
    load_run_id: String,
    render_ms: u64,
    sql_length: usize,
}

fn cmd_run(catalog: &Catalog, settings: &Settings, roots: &[String], out: RunOutputs) -> CliResult {
    let dialect = settings.dialect;
    let live = load_live(out.live)?;
    let root_keys = parse_keys(roots)?;
    let order = resolve_order(catalog, &root_keys).map_err(|e| e.to_string())?;
    let plan = orchestrator::build_plan(new_batch_id(), &order);
    // Shared by every load of the batch; each load gets its own run id.
    let load_timestamp = Utc::now().naive_utc();
    let delta_cutoff = parse_cutoff(out.cutoff)?;

    let mut policy = settings.execution;
    if policy.execute {
        log::warn!("no warehouse executor is bundled with the CLI; running as a dry run");
        policy.execute = false;
    }

    if let Some(dir) = out.sql_dir {
        fs::create_dir_all(dir).map_err(|e| format!("creating '{}': {}", dir.display(), e))?;
        if settings.run_log.enabled {
            // Best effort: a run-log problem never stops the loads.
            match orchestrator::plan_run_log_provisioning(
                &live,
                dialect,
                &settings.run_log.schema,
                &settings.run_log.table,
            ) {
                Ok(statements) if !statements.is_empty() => {
                    let path = dir.join("000_run_log.sql");
                    if let Err(e) = fs::write(&path, to_script(&statements)) {
                        log::warn!("run-log provisioning script not written: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => log::warn!("run-log provisioning skipped: {}", e),
            }
        }
    }

    let mut rendered: BTreeMap<DatasetKey, Rendered> = BTreeMap::new();
    let outcome = orchestrator::execute(&plan, &policy, |ctx| {
        let key = &ctx.step.dataset_key;
        let started = Instant::now();
        // Reserved on the first attempt so retries render with the same id.
        let entry = rendered.entry(key.clone()).or_insert_with(|| Rendered {
            load_run_id: uuid::Uuid::new_v4().to_string(),
            render_ms: 0,
            sql_length: 0,
        });
        let dataset = catalog
            .get(key)
            .map_err(|e| StepFailure::fatal(e.to_string()))?;
        let load_plan = resolve_load_plan(catalog, dataset)?;

        let mut statements = vec![];
        if load_plan.mode != LoadMode::View {
            let ddl = materialize::build_plan(dataset, &live, dialect, &settings.materialization)
                .map_err(|e| StepFailure::retriable(e.to_string()))?;
            if ddl.is_blocked() {
                return Err(StepFailure::fatal(ddl.blocking_errors.join("; ")));
            }
            if !ddl.table_exists {
                statements.push(create_table_sql(dataset, dialect)?);
            }
            statements.extend(
                ddl.render(dialect)
                    .map_err(|e| StepFailure::fatal(e.to_string()))?,
            );
        }
        let load = compose_load_sql(catalog, key, dialect, &LoadOptions::default())?;
        statements.extend(load.statements);

        let values = RuntimeValues {
            load_run_id: entry.load_run_id.clone(),
            load_timestamp,
            delta_cutoff,
        };
        let script = substitute(&to_script(&statements), dialect, &values).map_err(|e| {
            StepFailure::fatal(format!("{}: {} (pass --cutoff for incremental loads)", key, e))
        })?;
        entry.render_ms = started.elapsed().as_millis() as u64;
        entry.sql_length = script.len();

        if let Some(dir) = out.sql_dir {
            let path = dir.join(format!("{:03}_{}.sql", ctx.step.dataset_id, key));
            fs::write(&path, &script)
                .map_err(|e| StepFailure::fatal(format!("writing '{}': {}", path.display(), e)))?;
        }
        Ok(())
    });

    if let Some(path) = out.run_log {
        write_run_log(path, catalog, settings, &plan.batch_id, &outcome, &rendered, policy.execute);
    }

    let mut context = SnapshotContext::new(
        &policy,
        &settings.profile,
        &settings.target_system,
        &dialect.to_string(),
    );
    context.root_dataset = (!roots.is_empty()).then(|| roots.join(","));
    context.catalog_fingerprint = catalog_fingerprint(catalog).ok();
    let snapshot = ExecutionSnapshot::new(&plan, &outcome, context);
    let json = snapshot.to_json().map_err(|e| e.to_string())?;
    match out.snapshot {
        Some(path) => {
            fs::write(path, json).map_err(|e| format!("writing '{}': {}", path.display(), e))?
        }
        None => println!("{}", json),
    }

    if let Some(failure) = outcome.first_failure() {
        eprintln!(
            "failed: {}: {}",
            failure.dataset,
            failure.message.as_deref().unwrap_or("unknown error")
        );
        let aborted = outcome.aborted();
        if !aborted.is_empty() {
            eprintln!("aborted (never attempted): {}", aborted.join(", "));
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Append one record per attempt; failures are logged, never fatal.
fn write_run_log(
    path: &Path,
    catalog: &Catalog,
    settings: &Settings,
    batch_id: &str,
    outcome: &orchestrator::ExecutionOutcome,
    rendered: &BTreeMap<DatasetKey, Rendered>,
    executed: bool,
) {
    let mut lines = String::new();
    for result in &outcome.results {
        let Ok(key) = result.dataset.parse::<DatasetKey>() else {
            continue;
        };
        let mut record =
            RunLogRecord::start(batch_id, &key, &settings.target_system, &settings.profile);
        if let Some(plan) = catalog
            .get(&key)
            .ok()
            .and_then(|d| resolve_load_plan(catalog, d).ok())
        {
            record = record.with_plan(&plan);
        }
        if let Some(r) = rendered.get(&key) {
            record = record.with_load_run_id(&r.load_run_id);
            record.render_ms = r.render_ms;
            record.sql_length = r.sql_length;
        }
        let attempts = outcome.attempts_of(&result.dataset);
        for record in orchestrator::step_records(&record, result, attempts, executed) {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    lines.push_str(&line);
                    lines.push('\n');
                }
                Err(e) => log::warn!("run-log record for {} skipped: {}", key, e),
            }
        }
    }

    let written = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| std::io::Write::write_all(&mut f, lines.as_bytes()));
    if let Err(e) = written {
        log::warn!("run log not written to '{}': {}", path.display(), e);
    }
}

fn cmd_manifest(catalog: &Catalog, settings: &Settings) -> CliResult {
    let manifest = build_manifest(catalog, &settings.profile, &settings.target_system)
        .map_err(|e| e.to_string())?;
    println!("{}", manifest.to_json().map_err(|e| e.to_string())?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_diff(before: &Path, after: &Path) -> CliResult {
    let load = |p: &Path| -> Result<ExecutionSnapshot, String> {
        ExecutionSnapshot::from_json(&read_file(p)?)
            .map_err(|e| format!("parsing snapshot '{}': {}", p.display(), e))
    };
    let diff = diff_snapshots(&load(before)?, &load(after)?);
    if diff.is_empty() {
        println!("no differences");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}", diff.render());
    // Differences exit non-zero so scripts can gate on them.
    Ok(ExitCode::from(1))
}
