//! Shared pipeline counters

use std::collections::HashSet;
use tokio::sync::Mutex;

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted_batches: u64,
    pub completed_batches: u64,
    pub success_points: u64,
    pub failed_points: u64,
    pub in_progress: u64,
    pub retries: u64,
}

impl StatsSnapshot {
    pub fn processed_points(&self) -> u64 {
        self.success_points + self.failed_points
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    counters: StatsSnapshot,
    /// Batches that reached a terminal state
    terminal: HashSet<usize>,
}

/// Counters shared by the workers, the monitor and the coordinator
///
/// Every mutation happens under one lock. Terminal outcomes are recorded at
/// most once per batch index, so a late duplicate cannot double count.
#[derive(Debug, Default)]
pub struct PipelineStats {
    inner: Mutex<StatsInner>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_submitted(&self) {
        self.inner.lock().await.counters.submitted_batches += 1;
    }

    /// Mark a batch as picked up by a worker, returning the in-progress count
    pub async fn start(&self) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.counters.in_progress += 1;
        inner.counters.in_progress
    }

    /// Record a successful write; returns the completed batch count if newly terminal
    pub async fn finish_success(&self, batch_index: usize, points: usize) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        inner.counters.in_progress = inner.counters.in_progress.saturating_sub(1);
        if !inner.terminal.insert(batch_index) {
            return None;
        }
        inner.counters.completed_batches += 1;
        inner.counters.success_points += points as u64;
        Some(inner.counters.completed_batches)
    }

    /// Record a permanent failure; returns the completed batch count if newly terminal
    pub async fn finish_failed(&self, batch_index: usize, points: usize) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        inner.counters.in_progress = inner.counters.in_progress.saturating_sub(1);
        if !inner.terminal.insert(batch_index) {
            return None;
        }
        inner.counters.completed_batches += 1;
        inner.counters.failed_points += points as u64;
        Some(inner.counters.completed_batches)
    }

    /// Release a batch that will be attempted again
    pub async fn finish_retry(&self) {
        let mut inner = self.inner.lock().await;
        inner.counters.in_progress = inner.counters.in_progress.saturating_sub(1);
        inner.counters.retries += 1;
    }

    /// Release a batch that will not be attempted again in this run
    pub async fn finish_abandoned(&self) {
        let mut inner = self.inner.lock().await;
        inner.counters.in_progress = inner.counters.in_progress.saturating_sub(1);
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().await.counters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminal_outcome_counted_once() {
        let stats = PipelineStats::new();

        stats.start().await;
        assert_eq!(stats.finish_failed(3, 10).await, Some(1));

        // A forced completion of the same batch must not count again
        stats.start().await;
        assert_eq!(stats.finish_failed(3, 10).await, None);
        stats.start().await;
        assert_eq!(stats.finish_success(3, 10).await, None);

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.failed_points, 10);
        assert_eq!(snapshot.success_points, 0);
        assert_eq!(snapshot.completed_batches, 1);
        assert_eq!(snapshot.in_progress, 0);
    }

    #[tokio::test]
    async fn test_retry_releases_in_progress() {
        let stats = PipelineStats::new();
        stats.record_submitted().await;
        assert_eq!(stats.start().await, 1);
        stats.finish_retry().await;
        stats.start().await;
        stats.finish_success(0, 4).await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.in_progress, 0);
        assert_eq!(snapshot.processed_points(), 4);
        assert_eq!(snapshot.submitted_batches, 1);
    }
}
