// Residual (background) level estimation
// L90 = level exceeded 90% of the time = 10th percentile, split day/night

use crate::residual::types::ResidualLevels;
use crate::timeline::{DayPeriod, DayWindow};

/// Percentile with linear interpolation between order statistics.
///
/// Rank is `p / 100 * (n - 1)`; the result interpolates between the two
/// neighbouring sorted values. Sorts `values` in place. `None` when empty.
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(values[lower] + (values[upper] - values[lower]) * fraction)
}

/// Day/night residual estimator
#[derive(Debug, Clone, Copy)]
pub struct ResidualEstimator {
    window: DayWindow,
    percentile: f64,
}

impl ResidualEstimator {
    /// `percentile` is 10.0 for L90
    pub fn new(window: DayWindow, percentile: f64) -> Self {
        ResidualEstimator { window, percentile }
    }

    pub fn window(&self) -> &DayWindow {
        &self.window
    }

    /// Estimate day and night residuals.
    /// Missing or non-finite levels are ignored; an empty period yields 0.
    pub fn estimate(&self, timestamps: &[f64], levels: &[Option<f64>]) -> ResidualLevels {
        let mut day = Vec::new();
        let mut night = Vec::new();

        for (&ts, level) in timestamps.iter().zip(levels) {
            let Some(value) = level.filter(|v| v.is_finite()) else {
                continue;
            };
            match self.window.period_of(ts) {
                DayPeriod::Day => day.push(value),
                DayPeriod::Night => night.push(value),
            }
        }

        ResidualLevels {
            day_l90: percentile(&mut day, self.percentile).unwrap_or(0.0),
            night_l90: percentile(&mut night, self.percentile).unwrap_or(0.0),
        }
    }
}

impl Default for ResidualEstimator {
    fn default() -> Self {
        ResidualEstimator::new(DayWindow::default(), 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::LocalZone;

    const HOUR: f64 = 3600.0;

    fn estimator() -> ResidualEstimator {
        ResidualEstimator::new(DayWindow::new(7, 22, LocalZone::utc()), 10.0)
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let mut values = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        // rank 0.4 between 1.0 and 2.0
        assert!((percentile(&mut values, 10.0).unwrap() - 1.4).abs() < 1e-12);

        let mut values = vec![10.0, 20.0];
        assert_eq!(percentile(&mut values, 50.0), Some(15.0));
        assert_eq!(percentile(&mut values, 0.0), Some(10.0));
        assert_eq!(percentile(&mut values, 100.0), Some(20.0));
    }

    #[test]
    fn test_percentile_empty_and_single() {
        assert_eq!(percentile(&mut [], 10.0), None);
        assert_eq!(percentile(&mut [42.0], 10.0), Some(42.0));
    }

    #[test]
    fn test_day_night_split() {
        // Two day samples at noon, two night samples at 02:00
        let ts = vec![12.0 * HOUR, 12.0 * HOUR + 1.0, 26.0 * HOUR, 26.0 * HOUR + 1.0];
        let levels = vec![Some(50.0), Some(60.0), Some(30.0), Some(40.0)];

        let residuals = estimator().estimate(&ts, &levels);

        assert!((residuals.day_l90 - 51.0).abs() < 1e-9);
        assert!((residuals.night_l90 - 31.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_night_samples_gives_zero() {
        let ts: Vec<f64> = (0..100).map(|i| 10.0 * HOUR + i as f64).collect();
        let levels: Vec<Option<f64>> = (0..100).map(|i| Some(40.0 + (i % 7) as f64)).collect();

        let residuals = estimator().estimate(&ts, &levels);

        assert_eq!(residuals.night_l90, 0.0);
        assert!(residuals.day_l90 > 0.0);
    }

    #[test]
    fn test_missing_levels_ignored() {
        let ts = vec![12.0 * HOUR, 12.0 * HOUR + 1.0, 12.0 * HOUR + 2.0];
        let levels = vec![None, Some(f64::NAN), Some(47.0)];

        let residuals = estimator().estimate(&ts, &levels);
        assert_eq!(residuals.day_l90, 47.0);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let ts: Vec<f64> = (0..500).map(|i| i as f64 * 300.0).collect();
        let levels: Vec<Option<f64>> = (0..500).map(|i| Some(30.0 + ((i * 37) % 23) as f64)).collect();

        let a = estimator().estimate(&ts, &levels);
        let b = estimator().estimate(&ts, &levels);
        assert_eq!(a, b);
    }
}
