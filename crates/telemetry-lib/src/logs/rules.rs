//! Threshold rules and message templates per category

use crate::models::{EntityCategory, LogLevel};
use std::collections::HashMap;

/// Numeric boundaries for one metric's state transitions
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric_name: String,
    pub warning: f64,
    pub error: f64,
    pub recovery: f64,
    /// Lower values are worse (e.g. success rate)
    pub inverse: bool,
}

impl ThresholdRule {
    pub fn new(metric_name: impl Into<String>, warning: f64, error: f64, recovery: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            warning,
            error,
            recovery,
            inverse: false,
        }
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }
}

/// Messages for threshold transitions; `None` means no record is emitted
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionTemplates {
    pub warning: Option<&'static str>,
    pub error: Option<&'static str>,
    pub recovery: Option<&'static str>,
}

/// Messages for statistical outliers
#[derive(Debug, Clone, Copy)]
pub struct AnomalyTemplates {
    pub spike: &'static str,
    pub drop: &'static str,
}

/// Fallback outlier messages for metrics without a dedicated template
pub const GENERIC_ANOMALY_TEMPLATES: AnomalyTemplates = AnomalyTemplates {
    spike: "{category} {entity_id} {metric} shows a sudden spike, current value {value}, well off its average of {mean}",
    drop: "{category} {entity_id} {metric} shows an abnormal drop, current value {value}, well off its average of {mean}",
};

/// Discrete lifecycle events an entity may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Start,
    Stop,
    Restart,
    Migrate,
    Maintenance,
    Upgrade,
}

impl LifecycleEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            LifecycleEvent::Stop
            | LifecycleEvent::Maintenance
            | LifecycleEvent::Restart
            | LifecycleEvent::Migrate => LogLevel::Warning,
            LifecycleEvent::Start | LifecycleEvent::Upgrade => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Start => "start",
            LifecycleEvent::Stop => "stop",
            LifecycleEvent::Restart => "restart",
            LifecycleEvent::Migrate => "migrate",
            LifecycleEvent::Maintenance => "maintenance",
            LifecycleEvent::Upgrade => "upgrade",
        }
    }
}

/// Threshold rule plus its transition messages
#[derive(Debug, Clone)]
pub struct MetricRule {
    pub threshold: ThresholdRule,
    pub templates: TransitionTemplates,
}

/// Everything needed to derive logs for one category
#[derive(Debug, Clone, Default)]
pub struct CategoryRules {
    pub metrics: HashMap<String, MetricRule>,
    pub anomalies: HashMap<String, AnomalyTemplates>,
    pub heartbeats: Vec<&'static str>,
    pub events: Vec<(LifecycleEvent, &'static str)>,
}

impl CategoryRules {
    fn metric(
        mut self,
        rule: ThresholdRule,
        warning: &'static str,
        error: &'static str,
        recovery: &'static str,
    ) -> Self {
        self.metrics.insert(
            rule.metric_name.clone(),
            MetricRule {
                threshold: rule,
                templates: TransitionTemplates {
                    warning: Some(warning),
                    error: Some(error),
                    recovery: Some(recovery),
                },
            },
        );
        self
    }

    fn anomaly(mut self, metric: &str, spike: &'static str, drop: &'static str) -> Self {
        self.anomalies
            .insert(metric.to_string(), AnomalyTemplates { spike, drop });
        self
    }

    fn heartbeats(mut self, templates: [&'static str; 3]) -> Self {
        self.heartbeats = templates.to_vec();
        self
    }

    fn events(mut self, events: Vec<(LifecycleEvent, &'static str)>) -> Self {
        self.events = events;
        self
    }

    /// Outlier templates for a metric, falling back to the generic pair
    pub fn anomaly_templates(&self, metric: &str) -> AnomalyTemplates {
        self.anomalies
            .get(metric)
            .copied()
            .unwrap_or(GENERIC_ANOMALY_TEMPLATES)
    }
}

/// Typed lookup table of log rules, built once at startup
#[derive(Debug, Clone)]
pub struct LogRuleBook {
    categories: HashMap<EntityCategory, CategoryRules>,
}

impl LogRuleBook {
    pub fn empty() -> Self {
        Self {
            categories: HashMap::new(),
        }
    }

    pub fn insert(&mut self, category: EntityCategory, rules: CategoryRules) {
        self.categories.insert(category, rules);
    }

    pub fn category(&self, category: EntityCategory) -> Option<&CategoryRules> {
        self.categories.get(&category)
    }

    pub fn metric_rule(&self, category: EntityCategory, metric: &str) -> Option<&MetricRule> {
        self.category(category)?.metrics.get(metric)
    }
}

impl Default for LogRuleBook {
    fn default() -> Self {
        use LifecycleEvent::*;

        let mut book = Self::empty();

        book.insert(
            EntityCategory::Vm,
            CategoryRules::default()
                .metric(
                    ThresholdRule::new("cpu_usage", 80.0, 95.0, 70.0),
                    "VM {entity_id} CPU usage is high at {value}%, above the warning threshold of {threshold}%",
                    "VM {entity_id} CPU usage is critically high at {value}%, system performance is severely degraded",
                    "VM {entity_id} CPU usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("memory_usage", 85.0, 95.0, 75.0),
                    "VM {entity_id} memory usage is high at {value}%, system performance may suffer",
                    "VM {entity_id} memory usage is critically high at {value}%, the system risks running out of memory",
                    "VM {entity_id} memory usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("disk_io", 7000.0, 9000.0, 5000.0),
                    "VM {entity_id} disk IO is high at {value} IOPS, responsiveness may suffer",
                    "VM {entity_id} disk IO is critically high at {value} IOPS, the system is responding slowly",
                    "VM {entity_id} disk IO is back to normal at {value} IOPS",
                )
                .metric(
                    ThresholdRule::new("network_throughput", 7000.0, 9000.0, 5000.0),
                    "VM {entity_id} network throughput is high at {value} Mbps, network services may suffer",
                    "VM {entity_id} network throughput is critically high at {value} Mbps, network service quality is degraded",
                    "VM {entity_id} network throughput is back to normal at {value} Mbps",
                )
                .anomaly(
                    "cpu_usage",
                    "VM {entity_id} CPU usage spiked to {value}%, well above its average of {mean}%",
                    "VM {entity_id} CPU usage dropped to {value}%, well below its average of {mean}%",
                )
                .anomaly(
                    "memory_usage",
                    "VM {entity_id} memory usage surged to {value}%, well above its average of {mean}%",
                    "VM {entity_id} memory usage dropped to {value}%, well below its average of {mean}%",
                )
                .anomaly(
                    "disk_io",
                    "VM {entity_id} disk IO spiked to {value} IOPS, well above its average of {mean} IOPS",
                    "VM {entity_id} disk IO dropped to {value} IOPS, well below its average of {mean} IOPS",
                )
                .anomaly(
                    "network_throughput",
                    "VM {entity_id} network throughput spiked to {value} Mbps, well above its average of {mean} Mbps",
                    "VM {entity_id} network throughput dropped to {value} Mbps, well below its average of {mean} Mbps",
                )
                .heartbeats([
                    "VM {entity_id} is running normally, all metrics within range",
                    "VM {entity_id} status check complete, system is stable",
                    "VM {entity_id} passed its periodic health check",
                ])
                .events(vec![
                    (Start, "VM {entity_id} started and is running normally"),
                    (Stop, "VM {entity_id} stopped"),
                    (Restart, "VM {entity_id} restarted and is restoring service"),
                    (Migrate, "VM {entity_id} is migrating, brief service interruption possible"),
                ]),
        );

        book.insert(
            EntityCategory::Host,
            CategoryRules::default()
                .metric(
                    ThresholdRule::new("cpu_usage", 70.0, 90.0, 60.0),
                    "Host {entity_id} CPU usage is high at {value}%, above the warning threshold of {threshold}%",
                    "Host {entity_id} CPU usage is critically high at {value}%, all hosted VMs may be affected",
                    "Host {entity_id} CPU usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("memory_usage", 80.0, 90.0, 70.0),
                    "Host {entity_id} memory usage is high at {value}%, approaching the alert level",
                    "Host {entity_id} memory usage is critically high at {value}%, swapping is likely",
                    "Host {entity_id} memory usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("disk_usage", 80.0, 90.0, 70.0),
                    "Host {entity_id} disk usage is high at {value}%, approaching the alert level",
                    "Host {entity_id} is critically low on disk space at {value}% used, operation may be affected",
                    "Host {entity_id} disk usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("temperature", 65.0, 80.0, 60.0),
                    "Host {entity_id} temperature is high at {value}°C, above normal operating range",
                    "Host {entity_id} temperature is critical at {value}°C, thermal throttling may engage",
                    "Host {entity_id} temperature is back to normal at {value}°C",
                )
                .heartbeats([
                    "Host {entity_id} is running normally, all metrics within range",
                    "Host {entity_id} status check complete, hardware is healthy",
                    "Host {entity_id} passed its periodic health check",
                ])
                .events(vec![
                    (Start, "Host {entity_id} powered on and is running normally"),
                    (Stop, "Host {entity_id} powered off"),
                    (Maintenance, "Host {entity_id} entered maintenance mode and stopped serving"),
                    (Upgrade, "Host {entity_id} is upgrading firmware"),
                ]),
        );

        book.insert(
            EntityCategory::Ne,
            CategoryRules::default()
                .metric(
                    ThresholdRule::new("load", 75.0, 90.0, 65.0),
                    "Network element {entity_id} load is high at {value}%, forwarding may suffer",
                    "Network element {entity_id} load is critically high at {value}%, packet loss is likely",
                    "Network element {entity_id} load is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("response_time", 500.0, 800.0, 300.0),
                    "Network element {entity_id} response time rose to {value}ms, latency is increasing",
                    "Network element {entity_id} response time is severely elevated at {value}ms, network performance is degraded",
                    "Network element {entity_id} response time is back to normal at {value}ms",
                )
                .metric(
                    ThresholdRule::new("success_rate", 50.0, 30.0, 70.0).inverse(),
                    "Network element {entity_id} success rate fell to {value}%, below normal",
                    "Network element {entity_id} success rate collapsed to {value}%, service availability is affected",
                    "Network element {entity_id} success rate is back to normal at {value}%",
                )
                .heartbeats([
                    "Network element {entity_id} is running normally, network state is good",
                    "Network element {entity_id} status check complete, links are stable",
                    "Network element {entity_id} passed its periodic health check",
                ]),
        );

        book.insert(
            EntityCategory::StoragePool,
            CategoryRules::default()
                .metric(
                    ThresholdRule::new("usage", 80.0, 95.0, 70.0),
                    "Storage pool {entity_id} usage is high at {value}%, approaching the alert level",
                    "Storage pool {entity_id} usage is critically high at {value}%, capacity is at risk",
                    "Storage pool {entity_id} usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("latency", 50.0, 80.0, 30.0),
                    "Storage pool {entity_id} latency rose to {value}ms, storage is responding slowly",
                    "Storage pool {entity_id} latency is severely elevated at {value}ms, storage access is degraded",
                    "Storage pool {entity_id} latency is back to normal at {value}ms",
                )
                .heartbeats([
                    "Storage pool {entity_id} is running normally, storage state is good",
                    "Storage pool {entity_id} status check complete, data access is normal",
                    "Storage pool {entity_id} passed its periodic health check",
                ]),
        );

        book.insert(
            EntityCategory::Hostgroup,
            CategoryRules::default()
                .metric(
                    ThresholdRule::new("aggregate_cpu", 75.0, 90.0, 65.0),
                    "Host group {entity_id} aggregate CPU usage is high at {value}%, cluster load is rising",
                    "Host group {entity_id} aggregate CPU usage is critically high at {value}%, the cluster risks overload",
                    "Host group {entity_id} aggregate CPU usage is back to normal at {value}%",
                )
                .metric(
                    ThresholdRule::new("aggregate_memory", 80.0, 90.0, 70.0),
                    "Host group {entity_id} aggregate memory usage is high at {value}%, cluster resources are tight",
                    "Host group {entity_id} aggregate memory usage is critically high at {value}%, cluster memory is insufficient",
                    "Host group {entity_id} aggregate memory usage is back to normal at {value}%",
                )
                .heartbeats([
                    "Host group {entity_id} is running normally, cluster state is good",
                    "Host group {entity_id} status check complete, resources are balanced",
                    "Host group {entity_id} passed its periodic health check",
                ]),
        );

        book
    }
}

/// Substitute `{key}` placeholders in a template
pub fn render(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |message, (key, value)| {
        message.replace(&format!("{{{key}}}"), value)
    })
}

/// Format a metric value for a message, rounded to two decimals
pub fn format_value(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_placeholders() {
        let message = render(
            "VM {entity_id} at {value}%, threshold {threshold}%",
            &[
                ("entity_id", "VM_1".to_string()),
                ("value", "96".to_string()),
                ("threshold", "95".to_string()),
            ],
        );
        assert_eq!(message, "VM VM_1 at 96%, threshold 95%");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(96.0), "96");
        assert_eq!(format_value(12.3456), "12.35");
        assert_eq!(format_value(0.5), "0.5");
    }

    #[test]
    fn test_default_rule_book() {
        let book = LogRuleBook::default();
        let rule = book
            .metric_rule(EntityCategory::Ne, "success_rate")
            .unwrap();
        assert!(rule.threshold.inverse);
        assert_eq!(rule.threshold.recovery, 70.0);

        assert!(book.metric_rule(EntityCategory::Ne, "resource_usage").is_none());
        assert!(book.category(EntityCategory::Dc).is_none());
    }

    #[test]
    fn test_anomaly_template_fallback() {
        let book = LogRuleBook::default();
        let host = book.category(EntityCategory::Host).unwrap();
        let templates = host.anomaly_templates("temperature");
        assert_eq!(templates.spike, GENERIC_ANOMALY_TEMPLATES.spike);

        let vm = book.category(EntityCategory::Vm).unwrap();
        assert!(vm.anomaly_templates("cpu_usage").spike.starts_with("VM"));
    }

    #[test]
    fn test_lifecycle_levels() {
        assert_eq!(LifecycleEvent::Stop.level(), LogLevel::Warning);
        assert_eq!(LifecycleEvent::Migrate.level(), LogLevel::Warning);
        assert_eq!(LifecycleEvent::Start.level(), LogLevel::Info);
        assert_eq!(LifecycleEvent::Upgrade.level(), LogLevel::Info);
    }
}
