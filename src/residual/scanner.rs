// Emergence scanner
// Two-stage segmentation: minimum-duration filter on over-threshold runs,
// then gap merging of the committed runs into display events

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::pipeline::{LogSink, TraceBuilder, TraceSink};
use crate::residual::estimator::ResidualEstimator;
use crate::residual::types::{Emergence, ResidualLevels};
use crate::timeline::{DayPeriod, MeasurementSeries};

/// Scan thresholds and durations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Margin above the day residual (dB)
    pub day_margin_db: f64,

    /// Margin above the night residual (dB).
    /// Smaller than the day margin: the night background is lower and steadier.
    pub night_margin_db: f64,

    /// Minimum run duration in seconds, inclusive
    pub min_duration_secs: f64,

    /// Committed points further apart than this start a new event
    pub merge_gap_secs: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            day_margin_db: 5.0,
            night_margin_db: 3.0,
            min_duration_secs: 900.0,
            merge_gap_secs: 120.0,
        }
    }
}

/// Result of a full scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub residuals: ResidualLevels,
    pub events: Vec<Emergence>,
}

/// A run of consecutive over-threshold samples that passed the duration filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommittedRun {
    pub start_ts: f64,
    pub end_ts: f64,
    pub period: DayPeriod,
    pub peak_db: f64,
    pub sample_count: usize,
}

impl CommittedRun {
    fn open(ts: f64, level: f64, period: DayPeriod) -> Self {
        CommittedRun {
            start_ts: ts,
            end_ts: ts,
            period,
            peak_db: level,
            sample_count: 1,
        }
    }

    fn extend(&mut self, ts: f64, level: f64) {
        self.end_ts = ts;
        self.peak_db = self.peak_db.max(level);
        self.sample_count += 1;
    }

    fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }
}

pub struct EmergenceScanner {
    estimator: ResidualEstimator,
    config: ScanConfig,
    sink: Arc<dyn TraceSink>,
}

impl EmergenceScanner {
    pub fn new(estimator: ResidualEstimator, config: ScanConfig) -> Self {
        EmergenceScanner {
            estimator,
            config,
            sink: Arc::new(LogSink),
        }
    }

    /// Replace the reporting sink
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Threshold in force for a period
    pub fn threshold(&self, residuals: &ResidualLevels, period: DayPeriod) -> f64 {
        match period {
            DayPeriod::Day => residuals.day_l90 + self.config.day_margin_db,
            DayPeriod::Night => residuals.night_l90 + self.config.night_margin_db,
        }
    }

    pub fn scan_series(&self, series: &MeasurementSeries) -> ScanReport {
        self.scan(series.timestamps(), series.levels())
    }

    /// Compute residuals and emergence events over the whole timeline
    pub fn scan(&self, timestamps: &[f64], levels: &[Option<f64>]) -> ScanReport {
        self.sink.emit(
            TraceBuilder::stage("emergence_scan")
                .start(format!("Scanning {} samples", timestamps.len())),
        );

        let residuals = self.estimator.estimate(timestamps, levels);
        let runs = self.committed_runs(timestamps, levels, &residuals);
        let events = merge_runs(&runs, self.config.merge_gap_secs);

        self.sink.emit(TraceBuilder::stage("emergence_scan").with_data(
            1.0,
            format!(
                "Residuals: day {:.1} | night {:.1}, {} events",
                residuals.day_l90,
                residuals.night_l90,
                events.len()
            ),
            serde_json::json!({
                "day_l90": residuals.day_l90,
                "night_l90": residuals.night_l90,
                "committed_runs": runs.len(),
                "events": events.len(),
            }),
        ));

        ScanReport { residuals, events }
    }

    /// Stage one: runs of consecutive over-threshold samples lasting at least
    /// the minimum duration. Missing levels neither extend nor close a run.
    pub fn committed_runs(
        &self,
        timestamps: &[f64],
        levels: &[Option<f64>],
        residuals: &ResidualLevels,
    ) -> Vec<CommittedRun> {
        let window = self.estimator.window();
        let mut committed = Vec::new();
        let mut current: Option<CommittedRun> = None;

        for (&ts, level) in timestamps.iter().zip(levels) {
            let Some(value) = level.filter(|v| v.is_finite()) else {
                continue;
            };

            let period = window.period_of(ts);
            if value > self.threshold(residuals, period) {
                match current.as_mut() {
                    Some(run) => run.extend(ts, value),
                    None => current = Some(CommittedRun::open(ts, value, period)),
                }
            } else if let Some(run) = current.take() {
                self.commit(run, &mut committed);
            }
        }

        if let Some(run) = current.take() {
            self.commit(run, &mut committed);
        }

        committed
    }

    fn commit(&self, run: CommittedRun, committed: &mut Vec<CommittedRun>) {
        if run.duration() >= self.config.min_duration_secs {
            committed.push(run);
        }
    }
}

impl Default for EmergenceScanner {
    fn default() -> Self {
        EmergenceScanner::new(ResidualEstimator::default(), ScanConfig::default())
    }
}

/// Stage two: merge committed runs whose gap is at most `merge_gap` seconds.
///
/// A run is never split, so every event is at least as long as its longest
/// committed run.
pub fn merge_runs(runs: &[CommittedRun], merge_gap: f64) -> Vec<Emergence> {
    let mut events: Vec<Emergence> = Vec::new();

    for run in runs {
        if let Some(last) = events.last_mut() {
            if run.start_ts - last.end_ts <= merge_gap {
                last.end_ts = run.end_ts;
                last.peak_db = last.peak_db.max(run.peak_db);
                last.sample_count += run.sample_count;
                continue;
            }
        }

        events.push(Emergence {
            start_ts: run.start_ts,
            end_ts: run.end_ts,
            period: run.period,
            peak_db: run.peak_db,
            sample_count: run.sample_count,
        });
    }

    events
}
