use crate::error::CliError;
use audit_config::{catalog::AuditCatalog, date, db::DbConfig};
use audit_runtime::{
    execution::executor::{AuditExecutor, ExecutorParts},
    options::{RunMode, RunOptions, WatermarkOptions},
};
use chrono_tz::Tz;
use clap::Parser;
use connectors::{
    clickhouse::fetcher::{ClickHouseTaskFetcher, TaskFetcher},
    counter::driver::CounterDriver,
    mysql::sink::{MySqlResultSink, ResultSink},
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "hdfs-audit", version, about = "HDFS data audit orchestrator")]
struct Cli {
    /// Business date in YYYYMMDD format (default: yesterday)
    #[arg(short = 'd', long)]
    date: Option<String>,

    /// Comma-separated task names to audit, skipping the completion log
    #[arg(short = 't', long)]
    tasks: Option<String>,

    /// Audit every catalog entry without querying the completion log
    #[arg(long)]
    skip_clickhouse: bool,

    /// Concurrent counter processes (still clamped by catalog limits)
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Build and print the job list without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Cold-start lookback window in hours; decimals allowed
    #[arg(long, default_value_t = 24.0)]
    hours_lookback: f64,

    /// Watermark file path (overrides db config)
    #[arg(long)]
    watermark_path: Option<PathBuf>,

    /// Rescan overlap in seconds, tolerating upstream ingestion delay
    #[arg(long)]
    watermark_overlap_seconds: Option<u64>,

    /// Max hours covered per catch-up run; <= 0 for unlimited
    #[arg(long)]
    watermark_max_window_hours: Option<f64>,

    /// If the watermark does not exist, initialize it to now and exit
    #[arg(long)]
    watermark_init_now: bool,

    /// Delete the watermark file before running
    #[arg(long)]
    watermark_reset: bool,

    /// Ignore the watermark for this run
    #[arg(long)]
    disable_watermark: bool,

    /// Audit catalog path
    #[arg(short = 'c', long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Database / completion-log config path
    #[arg(long, default_value = "config/db_config.yaml")]
    db_config: PathBuf,

    /// Path to the hdfs-counter jar (or env HDFS_COUNTER_JAR)
    #[arg(long)]
    jar: Option<PathBuf>,

    /// JAVA_HOME for the counter subprocess
    #[arg(long)]
    java_home: Option<PathBuf>,

    /// HADOOP_CONF_DIR passed through to the counter subprocess
    #[arg(long)]
    hadoop_conf_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let exit_code = match run_cli(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("Audit run failed: {err}");
            1
        }
    };
    process::exit(exit_code);
}

async fn run_cli(cli: Cli) -> Result<i32, CliError> {
    let cancel = CancellationToken::new();
    shutdown::register_handlers(cancel.clone());

    let catalog = AuditCatalog::load(&cli.config)?;
    let mut db_config = DbConfig::load(&cli.db_config)?;
    db_config.apply_env_overrides();
    db_config.validate()?;

    let timezone = resolve_timezone(&db_config)?;
    let data_date = cli.date.as_deref().map(date::parse_data_date).transpose()?;
    let mode = resolve_mode(&cli);
    let watermark = resolve_watermark_options(&cli, &db_config);

    let fetcher: Option<Arc<dyn TaskFetcher>> = match (&mode, &db_config.clickhouse) {
        (RunMode::Upstream, Some(ch)) => Some(Arc::new(ClickHouseTaskFetcher::new(ch))),
        _ => None,
    };

    let counter = Arc::new(build_counter(&cli, &catalog)?);
    let sink: Option<Arc<dyn ResultSink>> = if cli.dry_run {
        None
    } else {
        Some(Arc::new(MySqlResultSink::connect(&db_config.mysql).await?))
    };

    let executor = AuditExecutor::new(ExecutorParts {
        catalog,
        timezone,
        fetcher,
        counter,
        sink,
        cancel,
    });
    let opts = RunOptions {
        mode,
        data_date,
        dry_run: cli.dry_run,
        concurrency: cli.concurrency,
        lookback_hours: cli.hours_lookback,
        watermark,
    };

    let summary = executor.run(&opts).await?;
    output::print_summary(&summary);
    Ok(summary.exit_code())
}

fn resolve_mode(cli: &Cli) -> RunMode {
    if let Some(tasks) = &cli.tasks {
        let names: Vec<String> = tasks
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        return RunMode::ExplicitTasks(names);
    }
    if cli.skip_clickhouse {
        return RunMode::SkipUpstream;
    }
    RunMode::Upstream
}

fn resolve_timezone(db_config: &DbConfig) -> Result<Tz, CliError> {
    let Some(name) = db_config
        .clickhouse
        .as_ref()
        .and_then(|ch| ch.timezone.as_deref())
    else {
        return Ok(Tz::UTC);
    };
    let tz = date::parse_timezone(name)?;
    info!(timezone = %tz, "Using configured scheduler timezone");
    Ok(tz)
}

/// CLI flags win, then the db config, then the built-in defaults.
fn resolve_watermark_options(cli: &Cli, db_config: &DbConfig) -> WatermarkOptions {
    let ch = db_config.clickhouse.as_ref();
    let defaults = WatermarkOptions::default();

    WatermarkOptions {
        enabled: !cli.disable_watermark
            && ch.and_then(|c| c.watermark_enabled).unwrap_or(true),
        path: cli
            .watermark_path
            .clone()
            .or_else(|| ch.and_then(|c| c.watermark_path.clone())),
        overlap_seconds: cli
            .watermark_overlap_seconds
            .or_else(|| ch.and_then(|c| c.watermark_overlap_seconds))
            .unwrap_or(defaults.overlap_seconds),
        max_window_hours: cli
            .watermark_max_window_hours
            .or_else(|| ch.and_then(|c| c.watermark_max_window_hours))
            .unwrap_or(defaults.max_window_hours),
        init_now: cli.watermark_init_now,
        reset: cli.watermark_reset,
        advance_on_failure: ch.map(|c| c.advance_on_failure).unwrap_or(false),
    }
}

fn build_counter(cli: &Cli, catalog: &AuditCatalog) -> Result<CounterDriver, CliError> {
    let jar_path = cli
        .jar
        .clone()
        .or_else(|| std::env::var_os("HDFS_COUNTER_JAR").map(PathBuf::from))
        .ok_or(CliError::MissingJar)?;
    if !jar_path.exists() {
        return Err(CliError::JarNotFound(jar_path.display().to_string()));
    }

    let timeout_seconds = catalog.defaults.jar_options.timeout_seconds;
    let timeout = (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds));

    Ok(CounterDriver::new(
        jar_path,
        cli.java_home.as_deref(),
        cli.hadoop_conf_dir.clone(),
        timeout,
    ))
}
