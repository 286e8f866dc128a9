//! Wire points and line protocol encoding

use crate::models::{LogRecord, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement that receives every log record
pub const LOG_MEASUREMENT: &str = "node_logs";

/// Timestamp precision of encoded points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    S,
    Ms,
    Us,
    Ns,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::S => "s",
            Precision::Ms => "ms",
            Precision::Us => "us",
            Precision::Ns => "ns",
        }
    }

    fn encode(&self, ts: &DateTime<Utc>) -> i64 {
        match self {
            Precision::S => ts.timestamp(),
            Precision::Ms => ts.timestamp_millis(),
            Precision::Us => ts.timestamp_micros(),
            Precision::Ns => ts
                .timestamp_nanos_opt()
                .unwrap_or_else(|| ts.timestamp().saturating_mul(1_000_000_000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Str(String),
}

/// One row destined for the time-series store
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Encode as a single line protocol row
    ///
    /// Tags with empty values are omitted; the store rejects them.
    pub fn to_line(&self, precision: Precision) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::Float(v) => format!("{v}"),
                    FieldValue::Str(s) => format!("\"{}\"", escape(s, &['"', '\\'])),
                };
                format!("{}={}", escape(key, &[',', '=', ' ']), value)
            })
            .collect();

        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&precision.encode(&self.timestamp).to_string());
        line
    }
}

impl From<&Sample> for Point {
    fn from(sample: &Sample) -> Self {
        Self {
            measurement: format!("{}_metrics", sample.category.as_str().to_lowercase()),
            tags: vec![
                ("node_id".to_string(), sample.entity_id.clone()),
                ("node_type".to_string(), sample.category.to_string()),
                ("metric".to_string(), sample.metric_name.clone()),
            ],
            fields: vec![
                ("value".to_string(), FieldValue::Float(sample.value)),
                ("unit".to_string(), FieldValue::Str(sample.unit.clone())),
            ],
            timestamp: sample.timestamp,
        }
    }
}

impl From<&LogRecord> for Point {
    fn from(log: &LogRecord) -> Self {
        Self {
            measurement: LOG_MEASUREMENT.to_string(),
            tags: vec![
                ("node_id".to_string(), log.entity_id.clone()),
                ("node_type".to_string(), log.category.to_string()),
                ("level".to_string(), log.level.to_string()),
                ("source".to_string(), log.source.to_string()),
                ("metric".to_string(), log.metric_name.clone()),
            ],
            fields: vec![
                ("message".to_string(), FieldValue::Str(log.message.clone())),
                ("value".to_string(), FieldValue::Float(log.metric_value)),
            ],
            timestamp: log.timestamp,
        }
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
