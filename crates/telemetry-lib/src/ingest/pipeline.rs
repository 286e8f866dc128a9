//! Bounded producer/consumer ingestion against a time-series sink

use super::batch::{partition, IngestBatch};
use super::pool::ConnectionPool;
use super::retry::{run_scheduler, RetryPolicy};
use super::stats::{PipelineStats, StatsSnapshot};
use crate::error::{PipelineError, SinkError};
use crate::observability::{Outcome, SimMetrics};
use crate::sink::{Point, SinkConnector};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Number of workers when none is configured: one per core, at most 8
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Points per batch
    pub batch_size: usize,
    /// Worker tasks, and connections in the pool
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Cadence of progress reports
    pub progress_interval: Duration,
    /// Wall-clock budget per point for the global timeout
    pub per_point_budget: Duration,
    /// Floor of the global timeout
    pub min_timeout: Duration,
    /// Longest wait for a free connection
    pub acquire_timeout: Duration,
    /// How often idle workers re-check the stop flag
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            workers: default_workers(),
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_secs(5),
            per_point_budget: Duration::from_micros(500),
            min_timeout: Duration::from_secs(3600),
            acquire_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl PipelineConfig {
    /// `max(min_timeout, points * per_point_budget)`
    pub fn global_timeout(&self, points: usize) -> Duration {
        let budget = Duration::from_secs_f64(self.per_point_budget.as_secs_f64() * points as f64);
        budget.max(self.min_timeout)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig("worker count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Why a pipeline run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every batch reached a terminal state
    Completed,
    TimedOut,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::TimedOut => "timed_out",
            StopReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final summary of one ingest stream
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub stream: String,
    pub total_points: u64,
    pub success_points: u64,
    pub failed_points: u64,
    /// Points never attempted to completion because the run stopped early
    pub abandoned_points: u64,
    pub total_batches: u64,
    pub completed_batches: u64,
    pub retries: u64,
    pub elapsed: Duration,
    pub points_per_sec: f64,
    /// Percentage of points written successfully
    pub success_rate: f64,
    pub stop_reason: StopReason,
}

impl IngestReport {
    fn empty(stream: &str) -> Self {
        Self::from_snapshot(
            stream,
            0,
            0,
            &StatsSnapshot::default(),
            Duration::ZERO,
            StopReason::Completed,
        )
    }

    fn from_snapshot(
        stream: &str,
        total_points: u64,
        total_batches: u64,
        snapshot: &StatsSnapshot,
        elapsed: Duration,
        stop_reason: StopReason,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            stream: stream.to_string(),
            total_points,
            success_points: snapshot.success_points,
            failed_points: snapshot.failed_points,
            abandoned_points: total_points.saturating_sub(snapshot.processed_points()),
            total_batches,
            completed_batches: snapshot.completed_batches,
            retries: snapshot.retries,
            elapsed,
            points_per_sec: if secs > 0.0 {
                snapshot.success_points as f64 / secs
            } else {
                0.0
            },
            success_rate: if total_points > 0 {
                snapshot.success_points as f64 / total_points as f64 * 100.0
            } else {
                0.0
            },
            stop_reason,
        }
    }

    /// Returns true if every point was written
    pub fn is_complete(&self) -> bool {
        self.success_points == self.total_points
    }
}

/// Drives batches through a fixed worker pool against one sink
pub struct IngestionPipeline {
    stream: String,
    connector: Arc<dyn SinkConnector>,
    config: PipelineConfig,
    metrics: SimMetrics,
}

impl IngestionPipeline {
    pub fn new(
        stream: impl Into<String>,
        connector: Arc<dyn SinkConnector>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            stream: stream.into(),
            connector,
            config,
            metrics: SimMetrics::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Partition `points` and deliver them
    pub async fn ingest(
        &self,
        points: Vec<Point>,
        cancel: watch::Receiver<bool>,
    ) -> Result<IngestReport, PipelineError> {
        self.config.validate()?;
        let batches = partition(points, self.config.batch_size);
        self.run(batches, cancel).await
    }

    /// Deliver pre-partitioned batches
    ///
    /// Returns an error only when the configuration is invalid or no
    /// connection to the sink can be opened. Batch failures are counted in
    /// the report.
    pub async fn run(
        &self,
        batches: Vec<IngestBatch>,
        cancel: watch::Receiver<bool>,
    ) -> Result<IngestReport, PipelineError> {
        self.config.validate()?;

        let total_batches = batches.len() as u64;
        let total_points: u64 = batches.iter().map(|b| b.len() as u64).sum();
        if total_batches == 0 {
            debug!(stream = %self.stream, "Nothing to ingest");
            return Ok(IngestReport::empty(&self.stream));
        }

        let workers = self.config.workers;
        let pool = ConnectionPool::warm(
            Arc::clone(&self.connector),
            workers,
            self.config.acquire_timeout,
        )
        .await?;

        let timeout = self.config.global_timeout(total_points as usize);
        info!(
            stream = %self.stream,
            batches = total_batches,
            points = total_points,
            workers = workers,
            timeout_secs = timeout.as_secs(),
            "Starting ingestion"
        );

        let started = Instant::now();
        let (work_tx, work_rx) = mpsc::channel(workers * 2);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(PipelineStats::new());
        let done = Arc::new(Notify::new());

        let ctx = Arc::new(WorkerContext {
            stream: self.stream.clone(),
            queue: Mutex::new(work_rx),
            retries: retry_tx,
            pool: pool.clone(),
            stats: Arc::clone(&stats),
            policy: self.config.retry,
            stop: stop_rx.clone(),
            done: Arc::clone(&done),
            total_batches,
            poll_interval: self.config.poll_interval,
            metrics: self.metrics.clone(),
        });

        let producer = tokio::spawn(produce(
            batches,
            work_tx.clone(),
            Arc::clone(&stats),
            stop_rx.clone(),
        ));
        let scheduler = tokio::spawn(run_scheduler(retry_rx, work_tx.clone(), stop_rx.clone()));
        let monitor = tokio::spawn(monitor(MonitorState {
            stream: self.stream.clone(),
            stats: Arc::clone(&stats),
            queue: work_tx,
            total_points,
            total_batches,
            interval: self.config.progress_interval,
            started,
        }));

        let handles: Vec<_> = (0..workers)
            .map(|id| tokio::spawn(worker_loop(Arc::clone(&ctx), id)))
            .collect();

        let stop_reason = tokio::select! {
            _ = done.notified() => StopReason::Completed,
            _ = tokio::time::sleep(timeout) => StopReason::TimedOut,
            _ = wait_cancelled(cancel) => StopReason::Cancelled,
        };

        match stop_reason {
            StopReason::Completed => debug!(stream = %self.stream, "All batches terminal"),
            StopReason::TimedOut => warn!(
                stream = %self.stream,
                timeout_secs = timeout.as_secs(),
                "Ingestion timed out, stopping"
            ),
            StopReason::Cancelled => warn!(stream = %self.stream, "Ingestion cancelled, stopping"),
        }

        // Workers finish their current batch; nothing new is submitted or retried
        let _ = stop_tx.send(true);
        producer.abort();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(stream = %self.stream, error = %e, "Ingest worker terminated abnormally");
            }
        }
        scheduler.abort();
        monitor.abort();
        pool.close().await;

        let snapshot = stats.snapshot().await;
        let report = IngestReport::from_snapshot(
            &self.stream,
            total_points,
            total_batches,
            &snapshot,
            started.elapsed(),
            stop_reason,
        );

        if report.abandoned_points > 0 {
            self.metrics.record_abandoned(
                &self.stream,
                total_batches.saturating_sub(report.completed_batches) as usize,
                report.abandoned_points as usize,
            );
        }
        self.metrics.set_in_progress(0);

        info!(
            stream = %report.stream,
            success = report.success_points,
            failed = report.failed_points,
            abandoned = report.abandoned_points,
            success_rate = report.success_rate,
            elapsed_secs = report.elapsed.as_secs_f64(),
            points_per_sec = report.points_per_sec,
            stop_reason = %report.stop_reason,
            "Ingestion summary"
        );

        Ok(report)
    }
}

struct WorkerContext {
    stream: String,
    queue: Mutex<mpsc::Receiver<IngestBatch>>,
    retries: mpsc::UnboundedSender<(Duration, IngestBatch)>,
    pool: ConnectionPool,
    stats: Arc<PipelineStats>,
    policy: RetryPolicy,
    stop: watch::Receiver<bool>,
    done: Arc<Notify>,
    total_batches: u64,
    poll_interval: Duration,
    metrics: SimMetrics,
}

impl WorkerContext {
    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    fn mark_terminal(&self, completed: Option<u64>) {
        if let Some(completed) = completed {
            if completed >= self.total_batches {
                self.done.notify_one();
            }
        }
    }

    async fn process(&self, worker_id: usize, batch: IngestBatch) {
        let in_progress = self.stats.start().await;
        self.metrics.set_in_progress(in_progress as usize);

        match self.write_once(&batch).await {
            Ok(elapsed) => {
                self.metrics.observe_write_latency(elapsed);
                debug!(
                    worker = worker_id,
                    batch = batch.batch_index,
                    points = batch.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Batch written"
                );
                let completed = self.stats.finish_success(batch.batch_index, batch.len()).await;
                if completed.is_some() {
                    self.metrics
                        .record_batch(&self.stream, Outcome::Success, batch.len());
                }
                self.mark_terminal(completed);
            }
            Err(e) => self.handle_failure(worker_id, batch, e).await,
        }
    }

    /// One write attempt on a pooled connection
    async fn write_once(&self, batch: &IngestBatch) -> Result<Duration, SinkError> {
        let mut pooled = self.pool.acquire().await?;

        let started = Instant::now();
        let result = pooled.connection()?.write_batch(&batch.points).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                pooled.release().await;
                Ok(elapsed)
            }
            Err(e) if e.is_connection_fault() => {
                match pooled.replace().await {
                    Ok(()) => pooled.release().await,
                    Err(replace_err) => {
                        warn!(error = %replace_err, "Failed to replace faulted connection");
                        pooled.discard().await;
                    }
                }
                Err(e)
            }
            Err(e) => {
                pooled.release().await;
                Err(e)
            }
        }
    }

    async fn handle_failure(&self, worker_id: usize, batch: IngestBatch, error: SinkError) {
        if self.policy.should_retry(&batch, &error) {
            if self.is_stopping() {
                debug!(
                    worker = worker_id,
                    batch = batch.batch_index,
                    "Pipeline stopping, not retrying batch"
                );
                self.stats.finish_abandoned().await;
                return;
            }

            let delay = self
                .policy
                .backoff(batch.retry_count, &mut rand::thread_rng());
            warn!(
                worker = worker_id,
                batch = batch.batch_index,
                retry = batch.retry_count + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Batch write failed, scheduling retry"
            );

            self.stats.finish_retry().await;
            self.metrics.inc_retries(&self.stream);
            if self.retries.send((delay, batch.into_retry())).is_err() {
                debug!(worker = worker_id, "Retry scheduler gone, batch dropped");
            }
            return;
        }

        error!(
            worker = worker_id,
            batch = batch.batch_index,
            points = batch.len(),
            retries = batch.retry_count,
            transient = error.is_transient(),
            error = %error,
            "Batch permanently failed"
        );

        let completed = self.stats.finish_failed(batch.batch_index, batch.len()).await;
        if completed.is_some() {
            self.metrics
                .record_batch(&self.stream, Outcome::Failed, batch.len());
        }
        self.mark_terminal(completed);
    }
}

async fn worker_loop(ctx: Arc<WorkerContext>, worker_id: usize) {
    debug!(worker = worker_id, stream = %ctx.stream, "Ingest worker started");

    loop {
        if ctx.is_stopping() {
            break;
        }

        let next = {
            let mut queue = ctx.queue.lock().await;
            tokio::time::timeout(ctx.poll_interval, queue.recv()).await
        };

        match next {
            Ok(Some(batch)) => {
                if ctx.is_stopping() {
                    break;
                }
                ctx.process(worker_id, batch).await;
            }
            Ok(None) => break,
            // Idle poll; loop to re-check the stop flag
            Err(_) => continue,
        }
    }

    debug!(worker = worker_id, stream = %ctx.stream, "Ingest worker stopped");
}

async fn produce(
    batches: Vec<IngestBatch>,
    queue: mpsc::Sender<IngestBatch>,
    stats: Arc<PipelineStats>,
    stop: watch::Receiver<bool>,
) {
    let total = batches.len();
    for batch in batches {
        if *stop.borrow() {
            break;
        }
        if queue.send(batch).await.is_err() {
            break;
        }
        stats.record_submitted().await;
    }
    debug!(batches = total, "All batches submitted");
}

struct MonitorState {
    stream: String,
    stats: Arc<PipelineStats>,
    queue: mpsc::Sender<IngestBatch>,
    total_points: u64,
    total_batches: u64,
    interval: Duration,
    started: Instant,
}

async fn monitor(state: MonitorState) {
    let mut ticker = tokio::time::interval(state.interval);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot = state.stats.snapshot().await;
        let elapsed = state.started.elapsed().as_secs_f64();
        let processed = snapshot.processed_points();
        let rate = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };
        let remaining = state.total_points.saturating_sub(processed);
        let eta_secs = (rate > 0.0).then(|| remaining as f64 / rate);

        info!(
            stream = %state.stream,
            processed = processed,
            total = state.total_points,
            percent = processed as f64 / state.total_points.max(1) as f64 * 100.0,
            points_per_sec = rate,
            eta_secs = ?eta_secs,
            success = snapshot.success_points,
            failed = snapshot.failed_points,
            "Ingest progress"
        );
        info!(
            stream = %state.stream,
            submitted = snapshot.submitted_batches,
            completed = snapshot.completed_batches,
            total = state.total_batches,
            in_progress = snapshot.in_progress,
            queued = state.queue.max_capacity() - state.queue.capacity(),
            retries = snapshot.retries,
            "Ingest queue status"
        );
    }
}

async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone: cancellation can no longer arrive
            std::future::pending::<()>().await;
        }
    }
}
