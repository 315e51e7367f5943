// Dataset pre-analysis
// Level statistics shown before a scan and wind-speed exceedances

use serde::{Deserialize, Serialize};

use crate::residual::estimator::percentile;
use crate::timeline::MeasurementSeries;

/// Default wind limit in m/s above which measurements are unreliable
pub const DEFAULT_WIND_LIMIT_MS: f64 = 5.0;

/// Whole-series level statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub l90: f64,

    /// Starting point offered to the operator for the residual line (the minimum)
    pub residual_suggestion: f64,

    /// Number of valid levels the statistics were computed from
    pub sample_count: usize,
}

impl LevelSummary {
    /// Statistics over the finite levels. All zero when there are none.
    pub fn compute(levels: &[Option<f64>]) -> Self {
        let mut values: Vec<f64> = levels.iter().flatten().copied().filter(|v| v.is_finite()).collect();

        let Some(l90) = percentile(&mut values, 10.0) else {
            return LevelSummary::default();
        };

        // sorted by percentile()
        let min = values[0];
        let max = values[values.len() - 1];
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        LevelSummary {
            min,
            max,
            mean,
            l90,
            residual_suggestion: min,
            sample_count: values.len(),
        }
    }

    pub fn of_series(series: &MeasurementSeries) -> Self {
        Self::compute(series.levels())
    }
}

/// Timestamps whose wind speed is strictly above `limit`
pub fn wind_alerts(timestamps: &[f64], wind: &[Option<f64>], limit: f64) -> Vec<f64> {
    timestamps
        .iter()
        .zip(wind)
        .filter_map(|(&ts, speed)| match speed {
            Some(v) if *v > limit => Some(ts),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_statistics() {
        let levels = vec![Some(40.0), None, Some(50.0), Some(f64::NAN), Some(30.0)];
        let summary = LevelSummary::compute(&levels);

        assert_eq!(summary.min, 30.0);
        assert_eq!(summary.max, 50.0);
        assert_eq!(summary.mean, 40.0);
        assert!((summary.l90 - 32.0).abs() < 1e-9);
        assert_eq!(summary.residual_suggestion, 30.0);
        assert_eq!(summary.sample_count, 3);
    }

    #[test]
    fn test_summary_of_nothing() {
        assert_eq!(LevelSummary::compute(&[None, None]), LevelSummary::default());
    }

    #[test]
    fn test_wind_alerts_strictly_above_limit() {
        let ts = vec![0.0, 1.0, 2.0, 3.0];
        let wind = vec![Some(4.0), Some(5.0), Some(7.5), None];

        assert_eq!(wind_alerts(&ts, &wind, DEFAULT_WIND_LIMIT_MS), vec![2.0]);
    }
}
