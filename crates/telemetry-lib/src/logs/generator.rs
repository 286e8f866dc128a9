//! Per-entity log derivation from generated metric series

use super::outlier::{OutlierDetector, OutlierKind, SeriesStats};
use super::rules::{format_value, render, CategoryRules, LogRuleBook, MetricRule};
use super::state_machine::{LogStateMachine, MetricState};
use super::LogsConfig;
use crate::models::{Entity, LogLevel, LogRecord, LogSource, Sample, SYSTEM_METRIC};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

const THRESHOLD_JITTER_SECS: i64 = 5 * 60;
const ANOMALY_JITTER_SECS: i64 = 2 * 60;
const HEARTBEAT_JITTER_SECS: i64 = 10 * 60;
/// Outliers within this distance of an existing log for the metric are dropped
const OUTLIER_DEDUP_SECS: i64 = 300;

/// Derives threshold, outlier, heartbeat and lifecycle records for entities
#[derive(Debug, Clone)]
pub struct LogGenerator {
    rules: LogRuleBook,
    config: LogsConfig,
    detector: OutlierDetector,
}

impl LogGenerator {
    pub fn new(rules: LogRuleBook, config: LogsConfig) -> Self {
        Self {
            rules,
            config,
            detector: OutlierDetector::default(),
        }
    }

    /// Generate every log record for one entity, sorted by timestamp
    pub fn generate<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        series: &BTreeMap<String, Vec<Sample>>,
        rng: &mut R,
    ) -> Vec<LogRecord> {
        let Some(rules) = self.rules.category(entity.category) else {
            debug!(
                entity_id = %entity.id,
                category = %entity.category,
                "No log rules for category"
            );
            return Vec::new();
        };

        let mut logs = Vec::new();

        for (metric_name, samples) in series {
            match rules.metrics.get(metric_name) {
                Some(rule) => self.series_logs(entity, rules, rule, samples, rng, &mut logs),
                None => debug!(
                    entity_id = %entity.id,
                    metric = %metric_name,
                    "No threshold rule, skipping log derivation"
                ),
            }
        }

        let timepoints = timepoints(series);
        self.heartbeat_logs(entity, rules, &timepoints, rng, &mut logs);

        if self.config.random_events {
            self.lifecycle_logs(entity, rules, &timepoints, rng, &mut logs);
        }

        logs.sort_by_key(|log| log.timestamp);
        logs
    }

    fn series_logs<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        rules: &CategoryRules,
        rule: &MetricRule,
        samples: &[Sample],
        rng: &mut R,
        logs: &mut Vec<LogRecord>,
    ) {
        let threshold = &rule.threshold;
        let mut machine = LogStateMachine::new(threshold.clone());

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let stats = SeriesStats::from_values(&values);
        let anomaly_templates = rules.anomaly_templates(&threshold.metric_name);

        for sample in samples {
            if let Some(transition) = machine.observe(sample.value) {
                let template = match transition.to {
                    MetricState::Warning => rule.templates.warning,
                    MetricState::Error => rule.templates.error,
                    MetricState::Recovery => rule.templates.recovery,
                    MetricState::Normal => None,
                };
                let limit = match transition.to {
                    MetricState::Warning => threshold.warning,
                    MetricState::Error => threshold.error,
                    _ => threshold.recovery,
                };

                if let Some(template) = template {
                    let message = render(
                        template,
                        &[
                            ("entity_id", entity.id.clone()),
                            ("category", entity.category.to_string()),
                            ("metric", sample.metric_name.clone()),
                            ("value", format_value(sample.value)),
                            ("threshold", format_value(limit)),
                        ],
                    );
                    logs.push(LogRecord {
                        timestamp: jitter(sample.timestamp, THRESHOLD_JITTER_SECS, rng),
                        entity_id: entity.id.clone(),
                        category: entity.category,
                        level: transition.to.level(),
                        message,
                        source: LogSource::Threshold,
                        metric_name: sample.metric_name.clone(),
                        metric_value: sample.value,
                    });
                }
            }

            let Some(outlier) = self.detector.detect(sample.value, &stats, threshold.inverse)
            else {
                continue;
            };

            let already_logged = logs.iter().any(|log| {
                log.metric_name == sample.metric_name
                    && (log.timestamp - sample.timestamp).num_seconds().abs() <= OUTLIER_DEDUP_SECS
            });
            if already_logged {
                continue;
            }

            let template = match outlier.kind {
                OutlierKind::Spike => anomaly_templates.spike,
                OutlierKind::Drop => anomaly_templates.drop,
            };
            let message = render(
                template,
                &[
                    ("entity_id", entity.id.clone()),
                    ("category", entity.category.to_string()),
                    ("metric", sample.metric_name.clone()),
                    ("value", format_value(sample.value)),
                    ("mean", format_value(outlier.mean)),
                ],
            );
            logs.push(LogRecord {
                timestamp: jitter(sample.timestamp, ANOMALY_JITTER_SECS, rng),
                entity_id: entity.id.clone(),
                category: entity.category,
                level: LogLevel::Warning,
                message,
                source: LogSource::Anomaly,
                metric_name: sample.metric_name.clone(),
                metric_value: sample.value,
            });
        }
    }

    fn heartbeat_logs<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        rules: &CategoryRules,
        timepoints: &[DateTime<Utc>],
        rng: &mut R,
        logs: &mut Vec<LogRecord>,
    ) {
        if self.config.info_log_frequency == 0 || rules.heartbeats.is_empty() {
            return;
        }

        for ts in timepoints.iter().step_by(self.config.info_log_frequency) {
            let Some(template) = rules.heartbeats.choose(rng) else {
                continue;
            };
            logs.push(LogRecord {
                timestamp: jitter(*ts, HEARTBEAT_JITTER_SECS, rng),
                entity_id: entity.id.clone(),
                category: entity.category,
                level: LogLevel::Info,
                message: render(template, &[("entity_id", entity.id.clone())]),
                source: LogSource::Info,
                metric_name: SYSTEM_METRIC.to_string(),
                metric_value: 0.0,
            });
        }
    }

    fn lifecycle_logs<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        rules: &CategoryRules,
        timepoints: &[DateTime<Utc>],
        rng: &mut R,
        logs: &mut Vec<LogRecord>,
    ) {
        if timepoints.is_empty() || rules.events.is_empty() {
            return;
        }
        if rng.gen::<f64>() >= self.config.lifecycle_probability {
            return;
        }

        let count = rng.gen_range(1..=2);
        for _ in 0..count {
            let (Some(ts), Some((event, template))) =
                (timepoints.choose(rng), rules.events.choose(rng))
            else {
                continue;
            };
            logs.push(LogRecord {
                timestamp: *ts,
                entity_id: entity.id.clone(),
                category: entity.category,
                level: event.level(),
                message: render(template, &[("entity_id", entity.id.clone())]),
                source: LogSource::Event,
                metric_name: SYSTEM_METRIC.to_string(),
                metric_value: 0.0,
            });
        }
    }
}

/// Sorted, de-duplicated timestamps across every series of an entity
fn timepoints(series: &BTreeMap<String, Vec<Sample>>) -> Vec<DateTime<Utc>> {
    let mut points: Vec<DateTime<Utc>> = series
        .values()
        .flat_map(|samples| samples.iter().map(|s| s.timestamp))
        .collect();
    points.sort();
    points.dedup();
    points
}

fn jitter<R: Rng + ?Sized>(ts: DateTime<Utc>, max_secs: i64, rng: &mut R) -> DateTime<Utc> {
    ts + Duration::seconds(rng.gen_range(-max_secs..=max_secs))
}
