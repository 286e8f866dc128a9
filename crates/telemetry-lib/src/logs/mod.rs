//! Log record derivation
//!
//! Turns generated metric series into discrete log records:
//! - Threshold transitions (normal, warning, error, recovery)
//! - Statistical outliers classified as spike or drop
//! - Periodic INFO heartbeats
//! - Random lifecycle events

mod generator;
mod outlier;
mod rules;
mod state_machine;

#[cfg(test)]
mod tests;

pub use generator::LogGenerator;
pub use outlier::{Outlier, OutlierDetector, OutlierKind, SeriesStats, DEFAULT_SIGMA};
pub use rules::{
    format_value, render, AnomalyTemplates, CategoryRules, LifecycleEvent, LogRuleBook,
    MetricRule, ThresholdRule, TransitionTemplates, GENERIC_ANOMALY_TEMPLATES,
};
pub use state_machine::{LogStateMachine, MetricState, Transition};

use serde::Deserialize;

/// Configuration for log derivation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Emit a heartbeat every N-th entity timestamp
    pub info_log_frequency: usize,
    /// Emit random lifecycle events
    pub random_events: bool,
    /// Per-entity chance of lifecycle events
    pub lifecycle_probability: f64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            info_log_frequency: 15,
            random_events: true,
            lifecycle_probability: 0.3,
        }
    }
}

impl LogsConfig {
    pub fn generator(&self) -> LogGenerator {
        LogGenerator::new(LogRuleBook::default(), self.clone())
    }
}
