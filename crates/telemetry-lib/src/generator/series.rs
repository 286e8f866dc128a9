//! Per-entity metric series construction

use super::{AnomalyInjector, MetricCatalog, MetricDefinition, PatternSynthesizer};
use crate::models::{Entity, Sample};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds one labelled series per catalog metric for an entity
#[derive(Debug, Clone)]
pub struct MetricSeriesBuilder {
    catalog: MetricCatalog,
    synthesizer: PatternSynthesizer,
    injector: AnomalyInjector,
}

impl MetricSeriesBuilder {
    pub fn new(
        catalog: MetricCatalog,
        synthesizer: PatternSynthesizer,
        injector: AnomalyInjector,
    ) -> Self {
        Self {
            catalog,
            synthesizer,
            injector,
        }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Generate every metric series for `entity` over `[start, end]`
    ///
    /// Structural categories and categories missing from the catalog yield an
    /// empty map; callers treat that as "no metrics", never as a failure.
    pub fn build<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_anomalies: bool,
        rng: &mut R,
    ) -> BTreeMap<String, Vec<Sample>> {
        let mut series = BTreeMap::new();

        if entity.category.is_structural() {
            debug!(
                entity_id = %entity.id,
                category = %entity.category,
                "Skipping structural entity"
            );
            return series;
        }

        let Some(metrics) = self.catalog.metrics_for(entity.category) else {
            warn!(
                entity_id = %entity.id,
                category = %entity.category,
                "No metric definitions for category"
            );
            return series;
        };

        for metric in metrics {
            let samples = self.build_metric(entity, metric, start, end, include_anomalies, rng);
            series.insert(metric.name.to_string(), samples);
        }

        series
    }

    fn build_metric<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        metric: &MetricDefinition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_anomalies: bool,
        rng: &mut R,
    ) -> Vec<Sample> {
        let timestamps = time_grid(start, end, metric.sample_interval);

        let mut values =
            self.synthesizer
                .generate(metric.base_value(), metric.volatility, &timestamps, rng);

        if include_anomalies {
            values = self.injector.inject(&values, rng);
        }

        timestamps
            .into_iter()
            .zip(values)
            .map(|(timestamp, value)| Sample {
                timestamp,
                value: metric.clamp(value),
                entity_id: entity.id.clone(),
                category: entity.category,
                metric_name: metric.name.to_string(),
                unit: metric.unit.to_string(),
            })
            .collect()
    }
}

/// Inclusive grid of timestamps from `start` to `end` at `interval`
pub fn time_grid(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
) -> Vec<DateTime<Utc>> {
    if interval <= Duration::zero() || start > end {
        return Vec::new();
    }

    let mut grid = Vec::new();
    let mut current = start;
    while current <= end {
        grid.push(current);
        current += interval;
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityCategory, Severity};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn builder() -> MetricSeriesBuilder {
        MetricSeriesBuilder::new(
            MetricCatalog::default(),
            PatternSynthesizer::default(),
            AnomalyInjector::new(0.2, Severity::High, 3),
        )
    }

    fn range() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        (start, start + Duration::days(2))
    }

    #[test]
    fn test_time_grid_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let grid = time_grid(start, start + Duration::hours(1), Duration::minutes(15));
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[4], start + Duration::hours(1));
    }

    #[test]
    fn test_time_grid_degenerate() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(time_grid(start, start - Duration::hours(1), Duration::minutes(15)).is_empty());
        assert!(time_grid(start, start + Duration::hours(1), Duration::zero()).is_empty());
    }

    #[test]
    fn test_values_within_metric_range() {
        let (start, end) = range();
        let catalog = MetricCatalog::default();
        let mut rng = StdRng::seed_from_u64(17);

        for category in EntityCategory::MONITORED {
            let entity = Entity::new(format!("{category}_001"), category, "test");
            let series = builder().build(&entity, start, end, true, &mut rng);
            assert!(!series.is_empty());

            for (name, samples) in &series {
                let def = catalog.metric(category, name).unwrap();
                for s in samples {
                    assert!(
                        s.value >= def.min && s.value <= def.max,
                        "{category}/{name} out of range: {}",
                        s.value
                    );
                }
            }
        }
    }

    #[test]
    fn test_timestamps_strictly_increasing_by_interval() {
        let (start, end) = range();
        let entity = Entity::new("VM_001", EntityCategory::Vm, "vm");
        let series = builder().build(&entity, start, end, true, &mut StdRng::seed_from_u64(2));

        for samples in series.values() {
            for pair in samples.windows(2) {
                assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(15));
            }
        }
    }

    #[test]
    fn test_samples_are_labelled() {
        let (start, end) = range();
        let entity = Entity::new("NE_007", EntityCategory::Ne, "edge");
        let series = builder().build(&entity, start, end, false, &mut StdRng::seed_from_u64(4));

        let rt = &series["response_time"];
        assert!(rt.iter().all(|s| s.entity_id == "NE_007"
            && s.category == EntityCategory::Ne
            && s.metric_name == "response_time"
            && s.unit == "ms"));
    }

    #[test]
    fn test_structural_and_uncatalogued_categories_are_empty() {
        let (start, end) = range();
        let mut rng = StdRng::seed_from_u64(0);

        let dc = Entity::new("DC_1", EntityCategory::Dc, "dc");
        assert!(builder().build(&dc, start, end, true, &mut rng).is_empty());

        let sparse = MetricSeriesBuilder::new(
            MetricCatalog::empty(),
            PatternSynthesizer::default(),
            AnomalyInjector::default(),
        );
        let vm = Entity::new("VM_1", EntityCategory::Vm, "vm");
        assert!(sparse.build(&vm, start, end, true, &mut rng).is_empty());
    }
}
