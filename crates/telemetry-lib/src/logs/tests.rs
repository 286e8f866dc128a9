use super::*;
use crate::models::{Entity, EntityCategory, LogLevel, LogSource, Sample, SYSTEM_METRIC};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
}

fn series(entity: &Entity, metric: &str, unit: &str, values: &[f64]) -> Vec<Sample> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Sample {
            timestamp: start() + Duration::minutes(15 * i as i64),
            value: *v,
            entity_id: entity.id.clone(),
            category: entity.category,
            metric_name: metric.to_string(),
            unit: unit.to_string(),
        })
        .collect()
}

/// Generator with heartbeats and lifecycle events switched off
fn threshold_only() -> LogGenerator {
    LogGenerator::new(
        LogRuleBook::default(),
        LogsConfig {
            info_log_frequency: 0,
            random_events: false,
            lifecycle_probability: 0.0,
        },
    )
}

#[test]
fn test_single_error_transition_references_value() {
    let vm = Entity::new("VM_001", EntityCategory::Vm, "web");
    let mut input = BTreeMap::new();
    input.insert("cpu_usage".to_string(), series(&vm, "cpu_usage", "%", &[50.0, 96.0]));

    let logs = threshold_only().generate(&vm, &input, &mut StdRng::seed_from_u64(1));
    let threshold: Vec<_> = logs
        .iter()
        .filter(|l| l.source == LogSource::Threshold)
        .collect();

    assert_eq!(threshold.len(), 1);
    assert_eq!(threshold[0].level, LogLevel::Error);
    assert!(threshold[0].message.contains("96"));
    assert_eq!(threshold[0].metric_value, 96.0);
    assert!(logs.iter().all(|l| l.level != LogLevel::Warning || l.source != LogSource::Threshold));
}

#[test]
fn test_constant_series_yields_no_logs() {
    let host = Entity::new("HOST_01", EntityCategory::Host, "rack-1");
    let mut input = BTreeMap::new();
    input.insert(
        "cpu_usage".to_string(),
        series(&host, "cpu_usage", "%", &[42.0; 96]),
    );

    let logs = threshold_only().generate(&host, &input, &mut StdRng::seed_from_u64(2));
    assert!(logs.is_empty());
}

#[test]
fn test_inverse_metric_transitions() {
    let ne = Entity::new("NE_01", EntityCategory::Ne, "edge");
    let mut input = BTreeMap::new();
    input.insert(
        "success_rate".to_string(),
        series(&ne, "success_rate", "%", &[90.0, 40.0, 20.0, 75.0]),
    );

    let logs = threshold_only().generate(&ne, &input, &mut StdRng::seed_from_u64(3));
    // Jitter may reorder records that sit close together, so match by value
    let threshold: Vec<_> = logs
        .iter()
        .filter(|l| l.source == LogSource::Threshold)
        .collect();

    assert_eq!(threshold.len(), 3);
    let by_value = |v: f64| threshold.iter().find(|l| l.metric_value == v).unwrap();
    assert_eq!(by_value(40.0).level, LogLevel::Warning);
    assert_eq!(by_value(20.0).level, LogLevel::Error);
    assert_eq!(by_value(75.0).level, LogLevel::Info);
}

#[test]
fn test_metrics_without_rules_are_skipped() {
    let ne = Entity::new("NE_02", EntityCategory::Ne, "core");
    let mut input = BTreeMap::new();
    input.insert(
        "resource_usage".to_string(),
        series(&ne, "resource_usage", "%", &[10.0, 99.0, 10.0]),
    );

    let logs = threshold_only().generate(&ne, &input, &mut StdRng::seed_from_u64(4));
    assert!(logs.is_empty());
}

#[test]
fn test_outlier_logged_once_near_threshold_log() {
    let vm = Entity::new("VM_002", EntityCategory::Vm, "db");
    let mut values = vec![40.0; 40];
    values[20] = 99.0;
    let mut input = BTreeMap::new();
    input.insert("cpu_usage".to_string(), series(&vm, "cpu_usage", "%", &values));

    let logs = threshold_only().generate(&vm, &input, &mut StdRng::seed_from_u64(5));

    // Threshold error at the spike already covers that timestamp
    let anomalies = logs.iter().filter(|l| l.source == LogSource::Anomaly).count();
    assert_eq!(anomalies, 0);
    assert!(logs
        .iter()
        .any(|l| l.source == LogSource::Threshold && l.level == LogLevel::Error));
}

#[test]
fn test_outlier_without_threshold_crossing() {
    let vm = Entity::new("VM_003", EntityCategory::Vm, "cache");
    let mut values = vec![20.0; 40];
    values[10] = 21.0;
    values[30] = 60.0;
    let mut input = BTreeMap::new();
    input.insert("cpu_usage".to_string(), series(&vm, "cpu_usage", "%", &values));

    let logs = threshold_only().generate(&vm, &input, &mut StdRng::seed_from_u64(6));

    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.source, LogSource::Anomaly);
    assert_eq!(log.level, LogLevel::Warning);
    assert_eq!(log.metric_value, 60.0);
    assert!(log.message.contains("spiked"));

    let sample_ts = start() + Duration::minutes(15 * 30);
    assert!((log.timestamp - sample_ts).num_seconds().abs() <= 120);
}

#[test]
fn test_heartbeat_cadence() {
    let vm = Entity::new("VM_004", EntityCategory::Vm, "batch");
    let mut input = BTreeMap::new();
    input.insert("cpu_usage".to_string(), series(&vm, "cpu_usage", "%", &[30.0; 31]));
    input.insert(
        "memory_usage".to_string(),
        series(&vm, "memory_usage", "%", &[30.0; 31]),
    );

    let generator = LogGenerator::new(
        LogRuleBook::default(),
        LogsConfig {
            info_log_frequency: 15,
            random_events: false,
            lifecycle_probability: 0.0,
        },
    );
    let logs = generator.generate(&vm, &input, &mut StdRng::seed_from_u64(7));

    // 31 shared timestamps -> indices 0, 15, 30
    assert_eq!(logs.len(), 3);
    for log in &logs {
        assert_eq!(log.source, LogSource::Info);
        assert_eq!(log.level, LogLevel::Info);
        assert_eq!(log.metric_name, SYSTEM_METRIC);
        assert!(log.message.contains("VM_004"));
    }
}

#[test]
fn test_lifecycle_events_when_certain() {
    let host = Entity::new("HOST_02", EntityCategory::Host, "rack-2");
    let mut input = BTreeMap::new();
    input.insert(
        "temperature".to_string(),
        series(&host, "temperature", "°C", &[40.0; 10]),
    );

    let generator = LogGenerator::new(
        LogRuleBook::default(),
        LogsConfig {
            info_log_frequency: 0,
            random_events: true,
            lifecycle_probability: 1.0,
        },
    );
    let grid: Vec<DateTime<Utc>> = input["temperature"].iter().map(|s| s.timestamp).collect();

    for seed in 0..20 {
        let logs = generator.generate(&host, &input, &mut StdRng::seed_from_u64(seed));
        assert!((1..=2).contains(&logs.len()));
        for log in &logs {
            assert_eq!(log.source, LogSource::Event);
            // Events land exactly on a sample timestamp
            assert!(grid.contains(&log.timestamp));
            let warning =
                log.message.contains("powered off") || log.message.contains("maintenance");
            assert_eq!(log.level == LogLevel::Warning, warning);
        }
    }
}

#[test]
fn test_categories_without_events_emit_none() {
    let pool = Entity::new("TRU_01", EntityCategory::StoragePool, "pool");
    let mut input = BTreeMap::new();
    input.insert("usage".to_string(), series(&pool, "usage", "%", &[40.0; 10]));

    let generator = LogGenerator::new(
        LogRuleBook::default(),
        LogsConfig {
            info_log_frequency: 0,
            random_events: true,
            lifecycle_probability: 1.0,
        },
    );
    let logs = generator.generate(&pool, &input, &mut StdRng::seed_from_u64(8));
    assert!(logs.is_empty());
}

#[test]
fn test_output_sorted_by_timestamp() {
    let vm = Entity::new("VM_005", EntityCategory::Vm, "mixed");
    let values: Vec<f64> = (0..200)
        .map(|i| if i % 17 == 0 { 97.0 } else if i % 5 == 0 { 85.0 } else { 50.0 })
        .collect();
    let mut input = BTreeMap::new();
    input.insert("cpu_usage".to_string(), series(&vm, "cpu_usage", "%", &values));
    input.insert("disk_io".to_string(), series(&vm, "disk_io", "IOPS", &values));

    let generator = LogsConfig {
        info_log_frequency: 3,
        random_events: true,
        lifecycle_probability: 1.0,
    }
    .generator();

    let logs = generator.generate(&vm, &input, &mut StdRng::seed_from_u64(9));
    assert!(!logs.is_empty());
    assert!(logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_structural_entity_has_no_logs() {
    let dc = Entity::new("DC_1", EntityCategory::Dc, "dc");
    let logs = LogsConfig::default()
        .generator()
        .generate(&dc, &BTreeMap::new(), &mut StdRng::seed_from_u64(10));
    assert!(logs.is_empty());
}
