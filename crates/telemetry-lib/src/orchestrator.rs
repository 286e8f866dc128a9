//! Run orchestration
//!
//! Loads entities, generates series and logs per entity, optionally exports
//! CSV, then ingests metrics and logs as two independent streams.

use crate::catalog::{list_entities, EntityCatalog};
use crate::error::{PipelineError, RunError};
use crate::export::{CsvExporter, ExportSummary};
use crate::generator::{GeneratorConfig, MetricSeriesBuilder};
use crate::ingest::{IngestConfig, IngestReport, IngestStream, IngestionPipeline};
use crate::logs::{LogGenerator, LogsConfig};
use crate::models::{Entity, EntityCategory, LogRecord, Sample};
use crate::observability::{SimMetrics, StructuredLogger};
use crate::sink::{Point, SinkConnector};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Entity cap applied in test mode
pub const TEST_MODE_ENTITY_LIMIT: usize = 5;

/// Options for a single generation run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub categories: Vec<EntityCategory>,
    pub max_entities: Option<usize>,
    /// Cap the run at a handful of entities
    pub test_mode: bool,
    pub include_anomalies: bool,
    pub generate_logs: bool,
    /// Directory for CSV export; no export when absent
    pub csv_dir: Option<PathBuf>,
    /// Write to the sink when one is configured
    pub ingest: bool,
}

impl RunOptions {
    /// Options covering `[start, end)` with every other setting at its default
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            categories: EntityCategory::MONITORED.to_vec(),
            max_entities: None,
            test_mode: false,
            include_anomalies: true,
            generate_logs: true,
            csv_dir: None,
            ingest: true,
        }
    }

    fn entity_limit(&self) -> Option<usize> {
        match (self.test_mode, self.max_entities) {
            (true, Some(max)) => Some(max.min(TEST_MODE_ENTITY_LIMIT)),
            (true, None) => Some(TEST_MODE_ENTITY_LIMIT),
            (false, max) => max,
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub run_id: String,
    pub entities: usize,
    pub series: usize,
    pub samples: usize,
    pub logs: usize,
    /// Categories whose catalog lookup failed
    pub catalog_failures: Vec<(EntityCategory, String)>,
    /// Entities skipped or partially exported, with the reason
    pub entity_failures: Vec<(String, String)>,
    pub csv: Option<ExportSummary>,
    pub metrics_ingest: Option<IngestReport>,
    pub logs_ingest: Option<IngestReport>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Points that permanently failed across both streams
    pub fn failed_points(&self) -> u64 {
        [&self.metrics_ingest, &self.logs_ingest]
            .into_iter()
            .flatten()
            .map(|r| r.failed_points)
            .sum()
    }
}

/// Everything generated for one entity
struct EntityOutput {
    entity: Entity,
    series: BTreeMap<String, Vec<Sample>>,
    logs: Vec<LogRecord>,
}

impl EntityOutput {
    fn sample_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

/// Wires the catalog, generators, exporter and ingest pipelines together
pub struct Orchestrator {
    catalog: Arc<dyn EntityCatalog>,
    connector: Option<Arc<dyn SinkConnector>>,
    builder: MetricSeriesBuilder,
    log_generator: LogGenerator,
    ingest: IngestConfig,
    seed: Option<u64>,
    metrics: SimMetrics,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn EntityCatalog>,
        generator: &GeneratorConfig,
        logs: &LogsConfig,
        ingest: IngestConfig,
    ) -> Result<Self, RunError> {
        let run_id = format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S"));
        Ok(Self {
            catalog,
            connector: None,
            builder: generator.series_builder()?,
            log_generator: logs.generator(),
            ingest,
            seed: generator.seed,
            metrics: SimMetrics::new(),
            logger: StructuredLogger::new(run_id),
        })
    }

    /// Attach the time-series sink used for ingestion
    pub fn with_sink(mut self, connector: Arc<dyn SinkConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn run_id(&self) -> &str {
        self.logger.run_id()
    }

    /// Execute one run
    ///
    /// Fails only for an invalid time range, an empty entity list, a CSV
    /// output directory that cannot be created, or a sink that cannot be
    /// reached at pool warm-up. Everything else is counted in the report.
    pub async fn run(
        &self,
        options: &RunOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunReport, RunError> {
        if options.start >= options.end {
            return Err(RunError::InvalidTimeRange {
                start: options.start.to_rfc3339(),
                end: options.end.to_rfc3339(),
            });
        }

        let started = Instant::now();
        let mut report = RunReport {
            run_id: self.run_id().to_string(),
            ..RunReport::default()
        };

        let entities = self.load_entities(options, &mut report).await?;
        report.entities = entities.len();
        self.logger.log_run_started(
            &options.start.to_rfc3339(),
            &options.end.to_rfc3339(),
            entities.len(),
        );

        let exporter = match &options.csv_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    RunError::Export(anyhow::anyhow!(
                        "Failed to create output directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
                report.csv = Some(ExportSummary::default());
                Some(CsvExporter::new(dir))
            }
            None => None,
        };

        let mut metric_points = Vec::new();
        let mut log_points = Vec::new();

        for (index, entity) in entities.into_iter().enumerate() {
            if *cancel.borrow() {
                warn!(run_id = %self.run_id(), "Run cancelled during generation");
                break;
            }

            let output = self.generate_entity(index, entity, options);
            let samples = output.sample_count();

            report.series += output.series.len();
            report.samples += samples;
            report.logs += output.logs.len();
            self.metrics.add_samples_generated(samples);
            self.metrics.add_logs_generated(output.logs.len());
            self.logger.log_entity_generated(
                &output.entity.id,
                output.entity.category.as_str(),
                output.series.len(),
                samples,
                output.logs.len(),
            );

            if let (Some(exporter), Some(summary)) = (&exporter, report.csv.as_mut()) {
                match exporter.export_entity(&output.entity, &output.series, &output.logs) {
                    Ok(written) => summary.merge(written),
                    Err(e) => {
                        let reason = format!("{e:#}");
                        self.logger.log_export_failed(&output.entity.id, &reason);
                        report.entity_failures.push((output.entity.id.clone(), reason));
                    }
                }
            }

            if options.ingest && self.connector.is_some() {
                metric_points.extend(output.series.values().flatten().map(Point::from));
                log_points.extend(output.logs.iter().map(Point::from));
            }
        }

        if let Some(connector) = self.connector.as_ref().filter(|_| options.ingest) {
            report.metrics_ingest = Some(
                self.ingest_stream(connector, IngestStream::Metrics, metric_points, &cancel)
                    .await?,
            );
            if options.generate_logs {
                report.logs_ingest = Some(
                    self.ingest_stream(connector, IngestStream::Logs, log_points, &cancel)
                        .await?,
                );
            }
        }

        report.elapsed = started.elapsed();
        self.logger
            .log_run_finished(report.samples, report.logs, report.elapsed);
        Ok(report)
    }

    async fn load_entities(
        &self,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> Result<Vec<Entity>, RunError> {
        let load = list_entities(self.catalog.as_ref(), &options.categories).await;

        for (category, error) in &load.failures {
            let reason = error.to_string();
            self.logger.log_catalog_failure(category.as_str(), &reason);
            report.catalog_failures.push((*category, reason));
        }
        if load.is_partial() {
            warn!(
                failed_categories = load.failures.len(),
                loaded = load.entities.len(),
                "Catalog load incomplete, continuing with available entities"
            );
        }

        let mut entities = load.entities;
        if let Some(limit) = options.entity_limit() {
            if entities.len() > limit {
                info!(
                    total = entities.len(),
                    limit = limit,
                    "Truncating entity list"
                );
                entities.truncate(limit);
            }
        }

        if entities.is_empty() {
            return Err(RunError::NoEntities);
        }
        Ok(entities)
    }

    fn generate_entity(&self, index: usize, entity: Entity, options: &RunOptions) -> EntityOutput {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        };

        let series = self.builder.build(
            &entity,
            options.start,
            options.end,
            options.include_anomalies,
            &mut rng,
        );

        let logs = if options.generate_logs && !series.is_empty() {
            self.log_generator.generate(&entity, &series, &mut rng)
        } else {
            Vec::new()
        };

        debug!(
            entity_id = %entity.id,
            series = series.len(),
            logs = logs.len(),
            "Entity generated"
        );
        EntityOutput {
            entity,
            series,
            logs,
        }
    }

    async fn ingest_stream(
        &self,
        connector: &Arc<dyn SinkConnector>,
        stream: IngestStream,
        points: Vec<Point>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<IngestReport, PipelineError> {
        let pipeline = IngestionPipeline::new(
            stream.as_str(),
            Arc::clone(connector),
            self.ingest.pipeline_config(stream),
        );

        let report = pipeline.ingest(points, cancel.clone()).await?;
        self.logger.log_ingest_summary(
            stream.as_str(),
            report.success_points,
            report.failed_points,
            report.abandoned_points,
            report.success_rate,
            report.elapsed,
            report.points_per_sec,
        );
        Ok(report)
    }
}
