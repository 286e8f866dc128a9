//! Observability infrastructure for the telemetry simulator
//!
//! Provides:
//! - Prometheus metrics (generated volume, ingest outcomes, write latency)
//! - Structured JSON logging with tracing

use anyhow::{Context, Result};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for sink write latency (in seconds)
const WRITE_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SimMetricsInner> = OnceLock::new();

struct SimMetricsInner {
    samples_generated: IntCounter,
    logs_generated: IntCounter,
    ingest_points: IntCounterVec,
    ingest_batches: IntCounterVec,
    ingest_retries: IntCounterVec,
    ingest_write_seconds: Histogram,
    ingest_in_progress: IntGauge,
}

impl SimMetricsInner {
    fn new() -> Self {
        Self {
            samples_generated: register_int_counter!(
                "telsim_samples_generated_total",
                "Metric samples produced by the generator"
            )
            .expect("Failed to register samples_generated"),

            logs_generated: register_int_counter!(
                "telsim_logs_generated_total",
                "Log records derived from generated series"
            )
            .expect("Failed to register logs_generated"),

            ingest_points: register_int_counter_vec!(
                "telsim_ingest_points_total",
                "Points handled by the ingestion pipeline by final outcome",
                &["stream", "outcome"]
            )
            .expect("Failed to register ingest_points"),

            ingest_batches: register_int_counter_vec!(
                "telsim_ingest_batches_total",
                "Batches handled by the ingestion pipeline by final outcome",
                &["stream", "outcome"]
            )
            .expect("Failed to register ingest_batches"),

            ingest_retries: register_int_counter_vec!(
                "telsim_ingest_retries_total",
                "Batch write retries scheduled",
                &["stream"]
            )
            .expect("Failed to register ingest_retries"),

            ingest_write_seconds: register_histogram!(
                "telsim_ingest_write_seconds",
                "Latency of a single batch write to the sink",
                WRITE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register ingest_write_seconds"),

            ingest_in_progress: register_int_gauge!(
                "telsim_ingest_in_progress",
                "Batches currently being written"
            )
            .expect("Failed to register ingest_in_progress"),
        }
    }
}

/// Terminal outcome label for ingest counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    Abandoned,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Abandoned => "abandoned",
        }
    }
}

/// Lightweight handle to the global simulator metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct SimMetrics {
    _private: (),
}

impl Default for SimMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SimMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SimMetricsInner {
        GLOBAL_METRICS.get_or_init(SimMetricsInner::new)
    }

    pub fn add_samples_generated(&self, count: usize) {
        self.inner().samples_generated.inc_by(count as u64);
    }

    pub fn add_logs_generated(&self, count: usize) {
        self.inner().logs_generated.inc_by(count as u64);
    }

    /// Record a batch reaching a terminal state
    pub fn record_batch(&self, stream: &str, outcome: Outcome, points: usize) {
        self.inner()
            .ingest_batches
            .with_label_values(&[stream, outcome.as_str()])
            .inc();
        self.inner()
            .ingest_points
            .with_label_values(&[stream, outcome.as_str()])
            .inc_by(points as u64);
    }

    /// Record batches left unfinished when a run stopped early
    pub fn record_abandoned(&self, stream: &str, batches: usize, points: usize) {
        let outcome = Outcome::Abandoned.as_str();
        self.inner()
            .ingest_batches
            .with_label_values(&[stream, outcome])
            .inc_by(batches as u64);
        self.inner()
            .ingest_points
            .with_label_values(&[stream, outcome])
            .inc_by(points as u64);
    }

    pub fn inc_retries(&self, stream: &str) {
        self.inner().ingest_retries.with_label_values(&[stream]).inc();
    }

    pub fn observe_write_latency(&self, elapsed: Duration) {
        self.inner()
            .ingest_write_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_in_progress(&self, batches: usize) {
        self.inner().ingest_in_progress.set(batches as i64);
    }
}

/// Render every registered metric in the Prometheus text format
pub fn render_metrics() -> Result<String> {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics exposition is not valid UTF-8")
}

/// Structured logger for run-level events
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log run start
    pub fn log_run_started(&self, start: &str, end: &str, entities: usize) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            start = %start,
            end = %end,
            entities = entities,
            "Telemetry generation started"
        );
    }

    /// Log the partial failure of a catalog lookup
    pub fn log_catalog_failure(&self, category: &str, reason: &str) {
        warn!(
            event = "catalog_lookup_failed",
            run_id = %self.run_id,
            category = %category,
            reason = %reason,
            "Entity lookup failed for category, continuing with the rest"
        );
    }

    /// Log per-entity generation output
    pub fn log_entity_generated(
        &self,
        entity_id: &str,
        category: &str,
        series: usize,
        samples: usize,
        logs: usize,
    ) {
        info!(
            event = "entity_generated",
            run_id = %self.run_id,
            entity_id = %entity_id,
            category = %category,
            series = series,
            samples = samples,
            logs = logs,
            "Generated telemetry for entity"
        );
    }

    /// Log a CSV export failure; the entity's points are still ingested
    pub fn log_export_failed(&self, entity_id: &str, reason: &str) {
        warn!(
            event = "entity_export_failed",
            run_id = %self.run_id,
            entity_id = %entity_id,
            reason = %reason,
            "CSV export failed for entity, telemetry still ingested"
        );
    }

    /// Log the final summary of one ingest stream
    pub fn log_ingest_summary(
        &self,
        stream: &str,
        success: u64,
        failed: u64,
        abandoned: u64,
        success_rate: f64,
        elapsed: Duration,
        points_per_sec: f64,
    ) {
        if failed > 0 || abandoned > 0 {
            warn!(
                event = "ingest_finished",
                run_id = %self.run_id,
                stream = %stream,
                success = success,
                failed = failed,
                abandoned = abandoned,
                success_rate = success_rate,
                elapsed_secs = elapsed.as_secs_f64(),
                points_per_sec = points_per_sec,
                "Ingestion finished with failures"
            );
        } else {
            info!(
                event = "ingest_finished",
                run_id = %self.run_id,
                stream = %stream,
                success = success,
                failed = failed,
                abandoned = abandoned,
                success_rate = success_rate,
                elapsed_secs = elapsed.as_secs_f64(),
                points_per_sec = points_per_sec,
                "Ingestion finished"
            );
        }
    }

    /// Log run completion
    pub fn log_run_finished(&self, samples: usize, logs: usize, elapsed: Duration) {
        info!(
            event = "run_finished",
            run_id = %self.run_id,
            samples = samples,
            logs = logs,
            elapsed_secs = elapsed.as_secs_f64(),
            "Telemetry generation finished"
        );
    }
}
