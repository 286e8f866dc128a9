//! Retry decisions and delayed requeueing

use super::IngestBatch;
use crate::error::SinkError;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Exponential backoff with ±50% jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Returns true if `batch` should be attempted again after `error`
    pub fn should_retry(&self, batch: &IngestBatch, error: &SinkError) -> bool {
        error.is_transient() && batch.retry_count < self.max_retries
    }

    /// Delay before attempt `retry_count + 1`: `base * 2^retry_count * [0.5, 1.5)`
    pub fn backoff<R: Rng + ?Sized>(&self, retry_count: u32, rng: &mut R) -> Duration {
        let exponent = 2f64.powi(retry_count.min(16) as i32);
        let jitter = rng.gen_range(0.5..1.5);
        self.base_delay.mul_f64(exponent * jitter)
    }
}

/// A batch waiting for its backoff to elapse
#[derive(Debug)]
pub(crate) struct DelayedBatch {
    pub ready_at: Instant,
    pub seq: u64,
    pub batch: IngestBatch,
}

impl PartialEq for DelayedBatch {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for DelayedBatch {}

impl PartialOrd for DelayedBatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedBatch {
    // Reversed so the max-heap yields the earliest deadline
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Requeues delayed batches onto the work queue once their backoff elapses
///
/// A single task serves every retry of a pipeline run. It exits when the stop
/// flag is raised; batches still waiting are left unattempted.
pub(crate) async fn run_scheduler(
    mut inbox: mpsc::UnboundedReceiver<(Duration, IngestBatch)>,
    queue: mpsc::Sender<IngestBatch>,
    mut stop: watch::Receiver<bool>,
) {
    let mut pending: BinaryHeap<DelayedBatch> = BinaryHeap::new();
    let mut seq = 0u64;
    let mut inbox_open = true;

    loop {
        if *stop.borrow() {
            break;
        }

        let next_ready = pending.peek().map(|d| d.ready_at);
        if !inbox_open && next_ready.is_none() {
            break;
        }

        tokio::select! {
            msg = inbox.recv(), if inbox_open => match msg {
                Some((delay, batch)) => {
                    pending.push(DelayedBatch {
                        ready_at: Instant::now() + delay,
                        seq,
                        batch,
                    });
                    seq += 1;
                }
                None => inbox_open = false,
            },
            _ = sleep_until(next_ready.unwrap_or_else(Instant::now)), if next_ready.is_some() => {
                if let Some(delayed) = pending.pop() {
                    debug!(
                        batch = delayed.batch.batch_index,
                        retry = delayed.batch.retry_count,
                        "Requeueing batch"
                    );
                    tokio::select! {
                        sent = queue.send(delayed.batch) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                        _ = stop.changed() => break,
                    }
                }
            }
            _ = stop.changed() => break,
        }
    }

    if !pending.is_empty() {
        debug!(pending = pending.len(), "Retry scheduler stopped with batches pending");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn batch(retry_count: u32) -> IngestBatch {
        IngestBatch {
            batch_index: 0,
            points: vec![],
            retry_count,
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        let timeout = SinkError::Timeout("slow".into());

        assert!(policy.should_retry(&batch(0), &timeout));
        assert!(policy.should_retry(&batch(2), &timeout));
        assert!(!policy.should_retry(&batch(3), &timeout));
        assert!(!policy.should_retry(&batch(0), &SinkError::Unauthorized(401)));
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        let mut rng = StdRng::seed_from_u64(1);

        for retry in 0..4u32 {
            let nominal = 100.0 * 2f64.powi(retry as i32);
            for _ in 0..50 {
                let ms = policy.backoff(retry, &mut rng).as_secs_f64() * 1000.0;
                assert!(ms >= nominal * 0.5 - 1e-6 && ms < nominal * 1.5 + 1e-6);
            }
        }
    }

    #[test]
    fn test_delayed_ordering_earliest_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(DelayedBatch {
            ready_at: now + Duration::from_secs(3),
            seq: 0,
            batch: batch(0),
        });
        heap.push(DelayedBatch {
            ready_at: now + Duration::from_secs(1),
            seq: 1,
            batch: batch(1),
        });

        assert_eq!(heap.pop().unwrap().seq, 1);
        assert_eq!(heap.pop().unwrap().seq, 0);
    }

    #[tokio::test]
    async fn test_scheduler_requeues_after_delay() {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (queue_tx, mut queue_rx) = mpsc::channel(4);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_scheduler(inbox_rx, queue_tx, stop_rx));

        let started = Instant::now();
        inbox_tx.send((Duration::from_millis(50), batch(1))).unwrap();
        let requeued = queue_rx.recv().await.unwrap();

        assert_eq!(requeued.retry_count, 1);
        assert!(started.elapsed() >= Duration::from_millis(50));

        drop(inbox_tx);
        handle.await.unwrap();
    }
}
