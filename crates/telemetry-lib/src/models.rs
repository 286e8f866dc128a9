//! Core data models for the telemetry simulator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Category of a monitored infrastructure object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityCategory {
    Vm,
    Host,
    Ne,
    Hostgroup,
    StoragePool,
    Dc,
    Tenant,
}

impl EntityCategory {
    /// Categories that carry a metric catalog
    pub const MONITORED: [EntityCategory; 5] = [
        EntityCategory::Vm,
        EntityCategory::Host,
        EntityCategory::Ne,
        EntityCategory::Hostgroup,
        EntityCategory::StoragePool,
    ];

    /// Every category the topology may contain
    pub const ALL: [EntityCategory; 7] = [
        EntityCategory::Dc,
        EntityCategory::Tenant,
        EntityCategory::Ne,
        EntityCategory::Vm,
        EntityCategory::Host,
        EntityCategory::Hostgroup,
        EntityCategory::StoragePool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Vm => "VM",
            EntityCategory::Host => "HOST",
            EntityCategory::Ne => "NE",
            EntityCategory::Hostgroup => "HOSTGROUP",
            EntityCategory::StoragePool => "STORAGE_POOL",
            EntityCategory::Dc => "DC",
            EntityCategory::Tenant => "TENANT",
        }
    }

    /// Returns true for structural categories that never receive metrics
    pub fn is_structural(&self) -> bool {
        matches!(self, EntityCategory::Dc | EntityCategory::Tenant)
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VM" => Ok(EntityCategory::Vm),
            "HOST" => Ok(EntityCategory::Host),
            "NE" => Ok(EntityCategory::Ne),
            "HOSTGROUP" => Ok(EntityCategory::Hostgroup),
            // TRU is the storage pool label used by the topology export
            "STORAGE_POOL" | "STORAGEPOOL" | "TRU" => Ok(EntityCategory::StoragePool),
            "DC" => Ok(EntityCategory::Dc),
            "TENANT" => Ok(EntityCategory::Tenant),
            other => Err(CatalogError::UnknownCategory(other.to_string())),
        }
    }
}

/// A monitored infrastructure object loaded from the topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub category: EntityCategory,
    pub name: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, category: EntityCategory, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            name: name.into(),
        }
    }
}

/// Qualitative noise level of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    Medium,
    High,
}

impl Volatility {
    /// Standard deviation as a fraction of the base value
    pub fn factor(&self) -> f64 {
        match self {
            Volatility::Low => 0.05,
            Volatility::Medium => 0.15,
            Volatility::High => 0.30,
        }
    }
}

/// Magnitude of an injected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Multiplicative factor applied to a spike (or divisor for a drop)
    pub fn factor(&self) -> f64 {
        match self {
            Severity::Low => 1.5,
            Severity::Medium => 2.5,
            Severity::High => 4.0,
        }
    }
}

/// One generated metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub entity_id: String,
    pub category: EntityCategory,
    pub metric_name: String,
    pub unit: String,
}

/// Severity level of a derived log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Threshold,
    Anomaly,
    Info,
    Event,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Threshold => "threshold",
            LogSource::Anomaly => "anomaly",
            LogSource::Info => "info",
            LogSource::Event => "event",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric name used by records that are not tied to a metric
pub const SYSTEM_METRIC: &str = "system";

/// Status or event record derived from a metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub entity_id: String,
    pub category: EntityCategory,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
    pub metric_name: String,
    pub metric_value: f64,
}
