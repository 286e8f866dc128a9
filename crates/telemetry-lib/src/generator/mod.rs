//! Synthetic metric series generation
//!
//! This module provides:
//! - A static metric catalog per entity category
//! - Base signal synthesis with daily and weekly periodicity
//! - Spike/drop anomaly injection
//! - Per-entity series construction with range clamping

mod anomaly;
mod catalog;
mod pattern;
mod series;

pub use anomaly::AnomalyInjector;
pub use catalog::{MetricCatalog, MetricDefinition, DEFAULT_SAMPLE_INTERVAL_MINUTES};
pub use pattern::{daily_factor, weekly_factor, PatternSynthesizer};
pub use series::{time_grid, MetricSeriesBuilder};

use crate::error::RunError;
use crate::models::Severity;
use serde::Deserialize;

/// Configuration for metric generation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Sampling interval applied to every metric, in minutes
    pub sample_interval_minutes: i64,
    /// Whether to inject spike/drop windows
    pub include_anomalies: bool,
    pub anomaly_probability: f64,
    pub anomaly_severity: Severity,
    /// Anomaly window length in samples
    pub anomaly_duration: usize,
    pub weekly_pattern: bool,
    /// Seed for reproducible runs; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_interval_minutes: DEFAULT_SAMPLE_INTERVAL_MINUTES,
            include_anomalies: true,
            anomaly_probability: 0.05,
            anomaly_severity: Severity::Medium,
            anomaly_duration: 5,
            weekly_pattern: true,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// Reject settings that would yield no samples or an unrepresentable grid
    pub fn validate(&self) -> Result<(), RunError> {
        self.sample_interval()?;
        if !(0.0..=1.0).contains(&self.anomaly_probability) {
            return Err(RunError::InvalidConfig(format!(
                "anomaly probability must be within [0, 1], got {}",
                self.anomaly_probability
            )));
        }
        Ok(())
    }

    fn sample_interval(&self) -> Result<chrono::Duration, RunError> {
        if self.sample_interval_minutes <= 0 {
            return Err(RunError::InvalidConfig(format!(
                "sample interval must be positive, got {} minutes",
                self.sample_interval_minutes
            )));
        }
        chrono::Duration::try_minutes(self.sample_interval_minutes).ok_or_else(|| {
            RunError::InvalidConfig(format!(
                "sample interval of {} minutes is out of range",
                self.sample_interval_minutes
            ))
        })
    }

    /// Build a series builder from this configuration
    pub fn series_builder(&self) -> Result<MetricSeriesBuilder, RunError> {
        self.validate()?;
        let catalog = MetricCatalog::default().with_sample_interval(self.sample_interval()?);
        Ok(MetricSeriesBuilder::new(
            catalog,
            PatternSynthesizer::new(true, self.weekly_pattern),
            AnomalyInjector::new(
                self.anomaly_probability,
                self.anomaly_severity,
                self.anomaly_duration,
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GeneratorConfig::default().series_builder().is_ok());
    }

    #[test]
    fn test_non_positive_interval_is_rejected() {
        for minutes in [0, -15] {
            let config = GeneratorConfig {
                sample_interval_minutes: minutes,
                ..GeneratorConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(RunError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let config = GeneratorConfig {
            sample_interval_minutes: i64::MAX,
            ..GeneratorConfig::default()
        };
        assert!(config.series_builder().is_err());
    }

    #[test]
    fn test_probability_out_of_range_is_rejected() {
        let config = GeneratorConfig {
            anomaly_probability: 1.5,
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
