//! Fixed-size batches of points

use crate::sink::Point;

/// A unit of work owned by exactly one worker at a time
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub batch_index: usize,
    pub points: Vec<Point>,
    /// Number of times this batch has been requeued
    pub retry_count: u32,
}

impl IngestBatch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Consume the batch for another attempt
    pub fn into_retry(mut self) -> Self {
        self.retry_count += 1;
        self
    }
}

/// Split `points` into contiguous batches of at most `batch_size`
///
/// Order within the input is preserved across and inside batches.
pub fn partition(points: Vec<Point>, batch_size: usize) -> Vec<IngestBatch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(points.len().div_ceil(batch_size));
    let mut remaining = points.into_iter().peekable();

    while remaining.peek().is_some() {
        let chunk: Vec<Point> = remaining.by_ref().take(batch_size).collect();
        batches.push(IngestBatch {
            batch_index: batches.len(),
            points: chunk,
            retry_count: 0,
        });
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::FieldValue;
    use chrono::{Duration, TimeZone, Utc};

    fn points(n: usize) -> Vec<Point> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Point {
                measurement: "m".into(),
                tags: vec![],
                fields: vec![("value".into(), FieldValue::Float(i as f64))],
                timestamp: start + Duration::minutes(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_partition_sizes() {
        let batches = partition(points(5), 2);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(batches.iter().all(|b| b.retry_count == 0));
    }

    #[test]
    fn test_partition_preserves_order() {
        let input = points(10);
        let batches = partition(input.clone(), 3);

        let indices: Vec<usize> = batches.iter().map(|b| b.batch_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let flattened: Vec<Point> = batches.into_iter().flat_map(|b| b.points).collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_partition_empty_and_zero_size() {
        assert!(partition(Vec::new(), 10).is_empty());
        assert_eq!(partition(points(3), 0).len(), 3);
    }

    #[test]
    fn test_into_retry_increments() {
        let batch = partition(points(1), 1).remove(0);
        let retried = batch.into_retry().into_retry();
        assert_eq!(retried.retry_count, 2);
        assert_eq!(retried.batch_index, 0);
    }
}
