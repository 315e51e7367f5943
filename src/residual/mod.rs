// Residual analysis module
// Day/night L90, emergence detection and dataset statistics

pub mod estimator;
pub mod scanner;
pub mod summary;
pub mod types;

pub use estimator::{percentile, ResidualEstimator};
pub use scanner::{merge_runs, CommittedRun, EmergenceScanner, ScanConfig, ScanReport};
pub use summary::{wind_alerts, LevelSummary, DEFAULT_WIND_LIMIT_MS};
pub use types::{Emergence, ResidualLevels};
