//! Concurrent ingestion of generated points into a time-series sink
//!
//! This module provides:
//! - Contiguous fixed-size batching
//! - A pre-warmed connection pool with health-checked checkout
//! - Exponential backoff retries through a single delayed-requeue task
//! - Lock-guarded pipeline counters and a periodic progress monitor
//! - A global wall-clock timeout and run-level cancellation

mod batch;
mod pipeline;
mod pool;
mod retry;
mod stats;


pub use batch::{partition, IngestBatch};
pub use pipeline::{
    default_workers, IngestReport, IngestionPipeline, PipelineConfig, StopReason,
};
pub use pool::{ConnectionPool, PooledConnection};
pub use retry::RetryPolicy;
pub use stats::{PipelineStats, StatsSnapshot};

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// The two independent ingest streams of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStream {
    Metrics,
    Logs,
}

impl IngestStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStream::Metrics => "metrics",
            IngestStream::Logs => "logs",
        }
    }
}

impl fmt::Display for IngestStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the ingestion pipelines
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub metric_batch_size: usize,
    pub log_batch_size: usize,
    /// Worker count (default: min(8, available cores))
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub progress_interval_secs: u64,
    /// Per-point share of the global timeout, in microseconds
    pub per_point_timeout_us: u64,
    /// Longest wait for a free pooled connection
    pub acquire_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            metric_batch_size: 5000,
            log_batch_size: 2000,
            max_workers: default_workers(),
            max_retries: 3,
            retry_base_delay_ms: 5000,
            progress_interval_secs: 5,
            per_point_timeout_us: 500,
            acquire_timeout_ms: 30_000,
        }
    }
}

impl IngestConfig {
    /// Pipeline settings for one stream
    pub fn pipeline_config(&self, stream: IngestStream) -> PipelineConfig {
        let batch_size = match stream {
            IngestStream::Metrics => self.metric_batch_size,
            IngestStream::Logs => self.log_batch_size,
        };

        PipelineConfig {
            batch_size,
            workers: self.max_workers,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
            progress_interval: Duration::from_secs(self.progress_interval_secs.max(1)),
            per_point_budget: Duration::from_micros(self.per_point_timeout_us),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            ..PipelineConfig::default()
        }
    }
}
