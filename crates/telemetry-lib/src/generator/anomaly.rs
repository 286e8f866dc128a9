//! Spike and drop injection into generated series

use crate::models::Severity;
use rand::Rng;

/// Randomly perturbs contiguous windows of a series
#[derive(Debug, Clone, Copy)]
pub struct AnomalyInjector {
    /// Chance that any eligible index starts a window
    pub probability: f64,
    pub severity: Severity,
    /// Window length in samples
    pub duration: usize,
}

impl Default for AnomalyInjector {
    fn default() -> Self {
        Self {
            probability: 0.05,
            severity: Severity::Medium,
            duration: 5,
        }
    }
}

impl AnomalyInjector {
    pub fn new(probability: f64, severity: Severity, duration: usize) -> Self {
        Self {
            probability,
            severity,
            duration,
        }
    }

    /// Return a copy of `values` with anomaly windows applied
    ///
    /// Every index in `[0, len - duration)` draws once against `probability`.
    /// Each selected window is then a spike (multiplied by the severity
    /// factor) or a drop (divided by it) on a fair coin flip. Overlapping
    /// windows compound.
    pub fn inject<R: Rng + ?Sized>(&self, values: &[f64], rng: &mut R) -> Vec<f64> {
        let mut result = values.to_vec();
        if values.len() <= self.duration {
            return result;
        }

        let factor = self.severity.factor();
        let eligible = values.len() - self.duration;

        let starts: Vec<usize> = (0..eligible)
            .filter(|_| rng.gen::<f64>() < self.probability)
            .collect();

        for start in starts {
            let spike = rng.gen::<f64>() > 0.5;
            for value in &mut result[start..start + self.duration] {
                if spike {
                    *value *= factor;
                } else {
                    *value /= factor;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_probability_is_identity() {
        let values: Vec<f64> = (0..100).map(|i| i as f64 * 1.5).collect();
        let injector = AnomalyInjector::new(0.0, Severity::High, 5);

        let result = injector.inject(&values, &mut StdRng::seed_from_u64(1));
        assert_eq!(result, values);
    }

    #[test]
    fn test_full_probability_perturbs_every_window() {
        let values = vec![10.0; 20];
        let injector = AnomalyInjector::new(1.0, Severity::Medium, 1);

        let result = injector.inject(&values, &mut StdRng::seed_from_u64(3));

        // Each of the first len - duration positions starts exactly one window
        for (i, v) in result.iter().enumerate().take(19) {
            assert!(
                (*v - 25.0).abs() < 1e-9 || (*v - 4.0).abs() < 1e-9,
                "index {i} not perturbed: {v}"
            );
        }
        assert_eq!(result[19], 10.0);
    }

    #[test]
    fn test_overlapping_windows_compound() {
        let values = vec![1.0; 4];
        let injector = AnomalyInjector::new(1.0, Severity::Low, 2);

        let result = injector.inject(&values, &mut StdRng::seed_from_u64(11));

        // Windows start at 0 and 1, so index 1 is hit twice
        let exponent = (result[1].ln() / 1.5f64.ln()).round();
        assert!(exponent.abs() == 2.0 || exponent == 0.0);
        assert!((result[1] - 1.5f64.powf(exponent)).abs() < 1e-9);
        assert_eq!(result[3], 1.0);
    }

    #[test]
    fn test_short_series_untouched() {
        let values = vec![5.0, 6.0, 7.0];
        let injector = AnomalyInjector::new(1.0, Severity::High, 3);

        let result = injector.inject(&values, &mut StdRng::seed_from_u64(5));
        assert_eq!(result, values);
    }

    #[test]
    fn test_input_not_mutated() {
        let values = vec![2.0; 50];
        let injector = AnomalyInjector::new(1.0, Severity::High, 5);
        let _ = injector.inject(&values, &mut StdRng::seed_from_u64(9));
        assert!(values.iter().all(|v| *v == 2.0));
    }
}
