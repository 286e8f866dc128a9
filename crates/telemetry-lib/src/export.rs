//! CSV export of generated series and log records

use crate::models::{Entity, LogRecord, Sample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const METRICS_DIR: &str = "metrics";
const LOGS_DIR: &str = "logs";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Files written by one export
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub metric_files: Vec<PathBuf>,
    pub log_files: Vec<PathBuf>,
}

impl ExportSummary {
    pub fn file_count(&self) -> usize {
        self.metric_files.len() + self.log_files.len()
    }

    pub fn merge(&mut self, other: ExportSummary) {
        self.metric_files.extend(other.metric_files);
        self.log_files.extend(other.log_files);
    }
}

/// Writes per-series and per-entity CSV files under one output directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    root: PathBuf,
}

impl CsvExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write every series of `entity` plus its log records
    ///
    /// Empty series are skipped. No log file is written for an entity
    /// without log records.
    pub fn export_entity(
        &self,
        entity: &Entity,
        series: &BTreeMap<String, Vec<Sample>>,
        logs: &[LogRecord],
    ) -> Result<ExportSummary> {
        let mut summary = ExportSummary::default();

        for (metric, samples) in series {
            if samples.is_empty() {
                continue;
            }
            let path = self
                .root
                .join(METRICS_DIR)
                .join(format!("{}_{}.csv", file_stem(&entity.id), file_stem(metric)));
            write_samples(&path, samples)?;
            summary.metric_files.push(path);
        }

        if !logs.is_empty() {
            let path = self
                .root
                .join(LOGS_DIR)
                .join(format!("{}_logs.csv", file_stem(&entity.id)));
            write_logs(&path, logs)?;
            summary.log_files.push(path);
        }

        debug!(
            entity_id = %entity.id,
            files = summary.file_count(),
            "Exported entity to CSV"
        );
        Ok(summary)
    }
}

fn write_samples(path: &Path, samples: &[Sample]) -> Result<()> {
    let mut writer = open_writer(path)?;
    writer.write_record(["timestamp", "value", "entity_id", "category", "metric", "unit"])?;

    for sample in samples {
        writer.write_record([
            format_timestamp(&sample.timestamp),
            sample.value.to_string(),
            sample.entity_id.clone(),
            sample.category.to_string(),
            sample.metric_name.clone(),
            sample.unit.clone(),
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    debug!(path = %path.display(), rows = samples.len(), "Wrote metric CSV");
    Ok(())
}

fn write_logs(path: &Path, logs: &[LogRecord]) -> Result<()> {
    let mut writer = open_writer(path)?;
    writer.write_record([
        "timestamp",
        "entity_id",
        "category",
        "level",
        "message",
        "source",
        "metric",
        "metric_value",
    ])?;

    for record in logs {
        writer.write_record([
            format_timestamp(&record.timestamp),
            record.entity_id.clone(),
            record.category.to_string(),
            record.level.to_string(),
            record.message.clone(),
            record.source.to_string(),
            record.metric_name.clone(),
            record.metric_value.to_string(),
        ])?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    debug!(path = %path.display(), rows = logs.len(), "Wrote log CSV");
    Ok(())
}

fn open_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Replace path separators so an id always maps to a single file name
fn file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityCategory, LogLevel, LogSource};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample(minute: u32, value: f64) -> Sample {
        Sample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            value,
            entity_id: "vm-1".into(),
            category: EntityCategory::Vm,
            metric_name: "cpu_usage".into(),
            unit: "%".into(),
        }
    }

    #[test]
    fn test_export_metrics_and_logs() {
        let dir = TempDir::new().unwrap();
        let exporter = CsvExporter::new(dir.path());
        let entity = Entity::new("vm-1", EntityCategory::Vm, "web");

        let mut series = BTreeMap::new();
        series.insert("cpu_usage".to_string(), vec![sample(0, 12.5), sample(15, 40.0)]);
        series.insert("memory_usage".to_string(), Vec::new());

        let logs = vec![LogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap(),
            entity_id: "vm-1".into(),
            category: EntityCategory::Vm,
            level: LogLevel::Warning,
            message: "CPU usage high, at 85%, exceeds threshold".into(),
            source: LogSource::Threshold,
            metric_name: "cpu_usage".into(),
            metric_value: 85.0,
        }];

        let summary = exporter.export_entity(&entity, &series, &logs).unwrap();
        assert_eq!(summary.metric_files.len(), 1);
        assert_eq!(summary.log_files.len(), 1);

        let metrics = fs::read_to_string(dir.path().join("metrics/vm-1_cpu_usage.csv")).unwrap();
        let lines: Vec<&str> = metrics.lines().collect();
        assert_eq!(lines[0], "timestamp,value,entity_id,category,metric,unit");
        assert_eq!(lines[1], "2024-01-01 00:00:00,12.5,vm-1,VM,cpu_usage,%");
        assert_eq!(lines.len(), 3);

        let log_csv = fs::read_to_string(dir.path().join("logs/vm-1_logs.csv")).unwrap();
        let mut reader = csv::Reader::from_reader(log_csv.as_bytes());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[3], "WARNING");
        // Message with a comma survives quoting
        assert_eq!(&row[4], "CPU usage high, at 85%, exceeds threshold");
        assert_eq!(&row[5], "threshold");
    }

    #[test]
    fn test_entity_without_logs_writes_no_log_file() {
        let dir = TempDir::new().unwrap();
        let exporter = CsvExporter::new(dir.path());
        let entity = Entity::new("pool/a", EntityCategory::StoragePool, "a");

        let summary = exporter
            .export_entity(&entity, &BTreeMap::new(), &[])
            .unwrap();
        assert_eq!(summary.file_count(), 0);
        assert!(!dir.path().join(LOGS_DIR).exists());
    }

    #[test]
    fn test_file_stem_sanitizes_separators() {
        assert_eq!(file_stem("pool/a:1"), "pool_a_1");
    }
}
