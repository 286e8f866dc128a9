//! Static metric catalog keyed by entity category

use crate::models::{EntityCategory, Volatility};
use chrono::Duration;
use std::collections::HashMap;

/// Default sampling interval for every category (15 minutes)
pub const DEFAULT_SAMPLE_INTERVAL_MINUTES: i64 = 15;

/// Definition of one metric in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
    pub volatility: Volatility,
    pub sample_interval: Duration,
}

impl MetricDefinition {
    /// Midpoint of the valid range, used as the series base value
    pub fn base_value(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Catalog of metrics per category, built once at startup
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    metrics: HashMap<EntityCategory, Vec<MetricDefinition>>,
}

impl MetricCatalog {
    /// Build an empty catalog
    pub fn empty() -> Self {
        Self {
            metrics: HashMap::new(),
        }
    }

    /// Register a category's metric list, replacing any previous entry
    pub fn insert(&mut self, category: EntityCategory, metrics: Vec<MetricDefinition>) {
        self.metrics.insert(category, metrics);
    }

    /// Look up the metrics for a category
    pub fn metrics_for(&self, category: EntityCategory) -> Option<&[MetricDefinition]> {
        self.metrics.get(&category).map(Vec::as_slice)
    }

    /// Look up a single metric definition
    pub fn metric(&self, category: EntityCategory, name: &str) -> Option<&MetricDefinition> {
        self.metrics_for(category)?.iter().find(|m| m.name == name)
    }

    /// Override the sampling interval of every metric
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        for metrics in self.metrics.values_mut() {
            for metric in metrics.iter_mut() {
                metric.sample_interval = interval;
            }
        }
        self
    }

    /// Number of categories with a metric list
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl Default for MetricCatalog {
    fn default() -> Self {
        let interval = Duration::minutes(DEFAULT_SAMPLE_INTERVAL_MINUTES);
        let def = |name, min, max, unit, volatility| MetricDefinition {
            name,
            min,
            max,
            unit,
            volatility,
            sample_interval: interval,
        };

        let mut catalog = Self::empty();
        catalog.insert(
            EntityCategory::Vm,
            vec![
                def("cpu_usage", 0.0, 100.0, "%", Volatility::Medium),
                def("memory_usage", 0.0, 100.0, "%", Volatility::Low),
                def("disk_io", 0.0, 10_000.0, "IOPS", Volatility::High),
                def("network_throughput", 0.0, 10_000.0, "Mbps", Volatility::High),
            ],
        );
        catalog.insert(
            EntityCategory::Host,
            vec![
                def("cpu_usage", 0.0, 100.0, "%", Volatility::Medium),
                def("memory_usage", 0.0, 100.0, "%", Volatility::Low),
                def("disk_usage", 0.0, 100.0, "%", Volatility::Low),
                def("temperature", 20.0, 90.0, "°C", Volatility::Low),
            ],
        );
        catalog.insert(
            EntityCategory::Ne,
            vec![
                def("load", 0.0, 100.0, "%", Volatility::Medium),
                def("response_time", 0.0, 1000.0, "ms", Volatility::High),
                def("success_rate", 0.0, 100.0, "%", Volatility::Low),
                def("resource_usage", 0.0, 100.0, "%", Volatility::Medium),
            ],
        );
        catalog.insert(
            EntityCategory::Hostgroup,
            vec![
                def("aggregate_cpu", 0.0, 100.0, "%", Volatility::Medium),
                def("aggregate_memory", 0.0, 100.0, "%", Volatility::Low),
                def("load_balance", 0.0, 1.0, "ratio", Volatility::Medium),
            ],
        );
        catalog.insert(
            EntityCategory::StoragePool,
            vec![
                def("usage", 0.0, 100.0, "%", Volatility::Low),
                def("iops", 0.0, 50_000.0, "IOPS", Volatility::High),
                def("latency", 0.0, 100.0, "ms", Volatility::Medium),
                def("read_write_ratio", 0.0, 1.0, "ratio", Volatility::Medium),
            ],
        );
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_covers_monitored_categories() {
        let catalog = MetricCatalog::default();
        for category in EntityCategory::MONITORED {
            assert!(catalog.metrics_for(category).is_some(), "{category}");
        }
        assert!(catalog.metrics_for(EntityCategory::Dc).is_none());
        assert!(catalog.metrics_for(EntityCategory::Tenant).is_none());
    }

    #[test]
    fn test_base_value_and_clamp() {
        let catalog = MetricCatalog::default();
        let temp = catalog.metric(EntityCategory::Host, "temperature").unwrap();
        assert_eq!(temp.base_value(), 55.0);
        assert_eq!(temp.clamp(5.0), 20.0);
        assert_eq!(temp.clamp(120.0), 90.0);
    }

    #[test]
    fn test_sample_interval_override() {
        let catalog = MetricCatalog::default().with_sample_interval(Duration::minutes(60));
        let metric = catalog.metric(EntityCategory::Vm, "cpu_usage").unwrap();
        assert_eq!(metric.sample_interval, Duration::minutes(60));
    }
}
