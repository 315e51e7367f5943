// Analysis configuration
// Every threshold the engine uses, with the regulatory defaults, loadable from JSON

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::classifier::ClassifierConfig;
use crate::measurement::default_band_labels;
use crate::residual::{ResidualEstimator, ScanConfig, DEFAULT_WIND_LIMIT_MS};
use crate::spectrum::DEFAULT_WINDOW_SECS;
use crate::sync::SyncConfig;
use crate::timeline::{DayWindow, LocalZone};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// First local hour of the day period
    pub day_start_hour: u32,

    /// First local hour of the night period
    pub day_end_hour: u32,

    /// Site offset from UTC in minutes; `None` uses the host's local time
    pub utc_offset_minutes: Option<i32>,

    /// Residual percentile (10 = L90)
    pub percentile: f64,

    pub scan: ScanConfig,

    /// Trailing spectral window in seconds
    pub window_secs: f64,

    pub classifier: ClassifierConfig,
    pub sync: SyncConfig,

    /// Band columns read from measurement files
    pub band_labels: Vec<String>,

    /// Wind speed above which samples are flagged (m/s)
    pub wind_limit_ms: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            day_start_hour: 7,
            day_end_hour: 22,
            utc_offset_minutes: None,
            percentile: 10.0,
            scan: ScanConfig::default(),
            window_secs: DEFAULT_WINDOW_SECS,
            classifier: ClassifierConfig::default(),
            sync: SyncConfig::default(),
            band_labels: default_band_labels(),
            wind_limit_ms: DEFAULT_WIND_LIMIT_MS,
        }
    }
}

impl AnalysisConfig {
    /// Read a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.day_start_hour >= self.day_end_hour || self.day_end_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "day window {}h-{}h",
                self.day_start_hour, self.day_end_hour
            )));
        }
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(ConfigError::Invalid(format!("percentile {}", self.percentile)));
        }
        if self.scan.min_duration_secs < 0.0 || self.scan.merge_gap_secs < 0.0 {
            return Err(ConfigError::Invalid("negative scan duration".to_string()));
        }
        if self.window_secs < 0.0 {
            return Err(ConfigError::Invalid(format!("window {}s", self.window_secs)));
        }
        if self.classifier.low_limit_hz > self.classifier.high_limit_hz {
            return Err(ConfigError::Invalid(format!(
                "band limits {}Hz > {}Hz",
                self.classifier.low_limit_hz, self.classifier.high_limit_hz
            )));
        }
        Ok(())
    }

    pub fn zone(&self) -> LocalZone {
        LocalZone::from_offset_minutes(self.utc_offset_minutes)
    }

    pub fn day_window(&self) -> DayWindow {
        DayWindow::new(self.day_start_hour, self.day_end_hour, self.zone())
    }

    pub fn estimator(&self) -> ResidualEstimator {
        ResidualEstimator::new(self.day_window(), self.percentile)
    }
}
