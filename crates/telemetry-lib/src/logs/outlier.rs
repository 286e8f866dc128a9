//! Statistical outlier detection over a complete series
//!
//! Statistics are computed once over the whole series, then every sample is
//! scored against them.

/// Default deviation threshold in standard deviations
pub const DEFAULT_SIGMA: f64 = 2.5;

/// Mean and sample standard deviation of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl SeriesStats {
    /// Two-pass mean and variance with Bessel's correction
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                count,
            };
        }

        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            std_dev,
            count,
        }
    }
}

/// Which side of the mean an outlier falls on, from the health perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierKind {
    Spike,
    Drop,
}

/// One flagged sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outlier {
    pub kind: OutlierKind,
    pub value: f64,
    pub mean: f64,
    pub z_score: f64,
}

/// Flags values further than `sigma` standard deviations from the mean
#[derive(Debug, Clone, Copy)]
pub struct OutlierDetector {
    pub sigma: f64,
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
        }
    }
}

impl OutlierDetector {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    /// Score `value` against `stats`
    ///
    /// For inverse metrics the classification flips: a value above the mean
    /// is reported as a drop and one below it as a spike.
    pub fn detect(&self, value: f64, stats: &SeriesStats, inverse: bool) -> Option<Outlier> {
        // Flat series have nothing to deviate from
        if stats.std_dev < f64::EPSILON {
            return None;
        }

        let deviation = value - stats.mean;
        if deviation.abs() <= self.sigma * stats.std_dev {
            return None;
        }

        let above = deviation > 0.0;
        let kind = if above != inverse {
            OutlierKind::Spike
        } else {
            OutlierKind::Drop
        };

        Some(Outlier {
            kind,
            value,
            mean: stats.mean,
            z_score: deviation / stats.std_dev,
        })
    }
}
