// Residual and emergence types
// Results of a full expert scan

use serde::{Deserialize, Serialize};

use crate::timeline::DayPeriod;

/// Background (L90) levels per regulatory period.
/// A value of 0 means the period had no valid sample, not silence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResidualLevels {
    pub day_l90: f64,
    pub night_l90: f64,
}

impl ResidualLevels {
    pub fn for_period(&self, period: DayPeriod) -> f64 {
        match period {
            DayPeriod::Day => self.day_l90,
            DayPeriod::Night => self.night_l90,
        }
    }
}

/// A sustained period above the residual-derived threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emergence {
    /// First committed sample (epoch seconds)
    pub start_ts: f64,

    /// Last committed sample (epoch seconds)
    pub end_ts: f64,

    /// Period of the first sample of the event
    pub period: DayPeriod,

    /// Highest level reached during the event (dB)
    pub peak_db: f64,

    /// Number of over-threshold samples merged into the event
    pub sample_count: usize,
}

impl Emergence {
    pub fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    /// Midpoint, where playback starts when jumping to the event
    pub fn center(&self) -> f64 {
        (self.start_ts + self.end_ts) / 2.0
    }

    /// Timeline range showing the event with `padding` seconds on each side
    pub fn view_range(&self, padding: f64) -> (f64, f64) {
        (self.start_ts - padding, self.end_ts + padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergence_geometry() {
        let event = Emergence {
            start_ts: 1000.0,
            end_ts: 2000.0,
            period: DayPeriod::Night,
            peak_db: 55.0,
            sample_count: 11,
        };

        assert_eq!(event.duration(), 1000.0);
        assert_eq!(event.center(), 1500.0);
        assert_eq!(event.view_range(120.0), (880.0, 2120.0));
    }

    #[test]
    fn test_residual_for_period() {
        let residuals = ResidualLevels {
            day_l90: 45.0,
            night_l90: 32.0,
        };

        assert_eq!(residuals.for_period(DayPeriod::Day), 45.0);
        assert_eq!(residuals.for_period(DayPeriod::Night), 32.0);
    }
}
