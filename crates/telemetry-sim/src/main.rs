//! Telemetry simulator
//!
//! Generates synthetic metrics and status logs for a topology export and
//! writes them to CSV and/or an InfluxDB v2 store.

mod config;
mod output;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use telemetry_lib::{
    error::PipelineError, render_metrics, sink::InfluxConnector, EntityCategory, JsonGraphCatalog,
    Orchestrator, RunError, RunOptions,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// JSON lines (default)
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Synthetic infrastructure telemetry generator
#[derive(Debug, Parser)]
#[command(name = "telemetry-sim")]
#[command(author, version, about = "Synthetic infrastructure telemetry generator", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "TELSIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Topology graph export (JSON)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Generate the last N days up to now
    #[arg(long, default_value_t = 5, conflicts_with = "start_date")]
    pub days: i64,

    /// First day to generate (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start_date: Option<NaiveDate>,

    /// Day to stop at (YYYY-MM-DD, default now)
    #[arg(long, value_parser = parse_date, requires = "start_date")]
    pub end_date: Option<NaiveDate>,

    /// Entity categories to generate (VM HOST NE HOSTGROUP STORAGE_POOL)
    #[arg(long, num_args = 1.., value_parser = parse_category)]
    pub entity_types: Vec<EntityCategory>,

    /// Limit the number of entities
    #[arg(long)]
    pub max_entities: Option<usize>,

    /// Test mode: at most 5 entities
    #[arg(long)]
    pub test: bool,

    /// Sampling interval in minutes
    #[arg(long, allow_negative_numbers = true)]
    pub sample_interval: Option<i64>,

    #[arg(long)]
    pub metric_batch_size: Option<usize>,

    #[arg(long)]
    pub log_batch_size: Option<usize>,

    /// Ingest worker count
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Time-series sink URL
    #[arg(long, env = "TELSIM_SINK_URL")]
    pub sink_url: Option<String>,

    /// Do not inject anomalies
    #[arg(long)]
    pub no_anomalies: bool,

    /// Do not derive log records
    #[arg(long)]
    pub no_logs: bool,

    /// Do not emit random lifecycle events
    #[arg(long)]
    pub no_events: bool,

    /// Also export CSV files
    #[arg(long)]
    pub csv: bool,

    /// Export CSV files and skip the sink
    #[arg(long)]
    pub csv_only: bool,

    /// Skip the sink
    #[arg(long)]
    pub no_sink: bool,

    /// CSV output directory
    #[arg(long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Write Prometheus run counters to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn parse_category(raw: &str) -> Result<EntityCategory, String> {
    raw.parse().map_err(|e: telemetry_lib::CatalogError| e.to_string())
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

impl Cli {
    fn time_range(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let now = Utc::now();
        match self.start_date {
            Some(start) => {
                let end = self.end_date.map(day_start).unwrap_or(now);
                Ok((day_start(start), end))
            }
            None => {
                if self.days <= 0 {
                    bail!("--days must be positive, got {}", self.days);
                }
                let span = ChronoDuration::try_days(self.days)
                    .with_context(|| format!("--days {} is out of range", self.days))?;
                let start = now
                    .checked_sub_signed(span)
                    .with_context(|| format!("--days {} is out of range", self.days))?;
                Ok((start, now))
            }
        }
    }

    fn uses_sink(&self) -> bool {
        !(self.csv_only || self.no_sink)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = config::SimConfig::load(cli.config.as_deref())?;

    if let Some(minutes) = cli.sample_interval {
        config.generator.sample_interval_minutes = minutes;
    }
    if let Some(seed) = cli.seed {
        config.generator.seed = Some(seed);
    }
    if cli.no_events {
        config.logs.random_events = false;
    }
    if let Some(size) = cli.metric_batch_size {
        config.ingest.metric_batch_size = size;
    }
    if let Some(size) = cli.log_batch_size {
        config.ingest.log_batch_size = size;
    }
    if let Some(workers) = cli.workers {
        config.ingest.max_workers = workers;
    }
    if let Some(retries) = cli.max_retries {
        config.ingest.max_retries = retries;
    }
    if let Some(url) = &cli.sink_url {
        config.sink.url = url.clone();
    }

    config
        .generator
        .validate()
        .context("Invalid generator configuration")?;

    let catalog_path = cli
        .catalog
        .clone()
        .or_else(|| config.catalog.path.clone())
        .context("No entity catalog configured (use --catalog or catalog.path)")?;

    let (start, end) = cli.time_range()?;
    let categories = if cli.entity_types.is_empty() {
        EntityCategory::MONITORED.to_vec()
    } else {
        cli.entity_types.clone()
    };

    let options = RunOptions {
        categories,
        max_entities: cli.max_entities,
        test_mode: cli.test,
        include_anomalies: config.generator.include_anomalies && !cli.no_anomalies,
        generate_logs: !cli.no_logs,
        csv_dir: (cli.csv || cli.csv_only).then(|| cli.output_dir.clone()),
        ingest: cli.uses_sink(),
        ..RunOptions::new(start, end)
    };

    let catalog = JsonGraphCatalog::load(&catalog_path)
        .await
        .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?;

    let mut orchestrator = Orchestrator::new(
        Arc::new(catalog),
        &config.generator,
        &config.logs,
        config.ingest.clone(),
    )?;
    if options.ingest {
        let connector = InfluxConnector::new(config.sink.clone())
            .context("Invalid time-series sink configuration")?;
        orchestrator = orchestrator.with_sink(Arc::new(connector));
    }

    info!(
        run_id = %orchestrator.run_id(),
        catalog = %catalog_path.display(),
        sink = options.ingest,
        csv = options.csv_dir.is_some(),
        "Simulator configured"
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping run");
            let _ = cancel_tx.send(true);
        }
    });

    let result = orchestrator.run(&options, cancel_rx).await;
    signal.abort();

    if let Some(path) = &cli.metrics_file {
        let text = render_metrics()?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write metrics file {}", path.display()))?;
    }

    match result {
        Ok(report) => {
            output::print_report(&report);
            Ok(())
        }
        Err(e @ RunError::NoEntities) => Err(e).context("Nothing to generate"),
        Err(e @ RunError::Pipeline(PipelineError::SinkUnreachable(_))) => {
            Err(e).context("Time-series sink unreachable")
        }
        Err(e) => Err(e.into()),
    }
}
