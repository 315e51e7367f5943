// Trailing spectral window
// Instantaneous, mean and peak band levels over the seconds preceding a query time

use serde::{Deserialize, Serialize};

use crate::timeline::{BandLevels, MeasurementSeries};

/// Default trailing window length in seconds
pub const DEFAULT_WINDOW_SECS: f64 = 5.0;

/// Per-band statistics for one query time.
///
/// Vectors are aligned with `band_labels`, with 0 for bands that have no
/// reading. A query before the first sample yields all-zero vectors and
/// `sample_count == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralWindowResult {
    pub band_labels: Vec<String>,
    pub instant: Vec<f64>,
    pub mean: Vec<f64>,
    pub peak: Vec<f64>,
    pub sample_count: usize,

    /// Bands of `instant` that hold a real reading
    #[serde(skip)]
    instant_valid: Vec<bool>,
}

impl SpectralWindowResult {
    fn empty(band_labels: &[String]) -> Self {
        let zeros = vec![0.0; band_labels.len()];
        SpectralWindowResult {
            band_labels: band_labels.to_vec(),
            instant: zeros.clone(),
            mean: zeros.clone(),
            peak: zeros,
            sample_count: 0,
            instant_valid: vec![false; band_labels.len()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Instantaneous spectrum keyed by band label. Bands without a reading
    /// are left out.
    pub fn instant_levels(&self) -> BandLevels {
        self.band_labels
            .iter()
            .zip(&self.instant)
            .enumerate()
            .filter(|(i, _)| self.instant_valid.get(*i).copied().unwrap_or(true))
            .map(|(_, (label, &value))| (label.clone(), value))
            .collect()
    }

    /// Mean spectrum keyed by band label
    pub fn mean_levels(&self) -> BandLevels {
        labelled(&self.band_labels, &self.mean)
    }

    /// Peak spectrum keyed by band label
    pub fn peak_levels(&self) -> BandLevels {
        labelled(&self.band_labels, &self.peak)
    }
}

fn labelled(labels: &[String], values: &[f64]) -> BandLevels {
    labels.iter().cloned().zip(values.iter().copied()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralWindowAggregator {
    window_secs: f64,
}

impl SpectralWindowAggregator {
    pub fn new(window_secs: f64) -> Self {
        SpectralWindowAggregator { window_secs }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Query with the configured window length
    pub fn query(&self, series: &MeasurementSeries, ts: f64) -> SpectralWindowResult {
        Self::query_with(series, ts, self.window_secs)
    }

    /// Statistics over samples in `[ts - window_secs, ts]`.
    ///
    /// `instant` is the last sample at or before `ts`, however old. When no
    /// sample falls inside the window, mean and peak are taken from that
    /// sample alone. Non-finite cells are left out of mean and peak; a band
    /// with no finite cell reports 0.
    pub fn query_with(series: &MeasurementSeries, ts: f64, window_secs: f64) -> SpectralWindowResult {
        let labels = series.band_labels();
        let index = series.index();

        let Some(idx_end) = index.last_at_or_before(ts) else {
            return SpectralWindowResult::empty(labels);
        };
        let idx_start = index
            .first_at_or_after(ts - window_secs)
            .map_or(idx_end, |idx| idx.min(idx_end));

        let width = labels.len();
        let mut sums = vec![0.0; width];
        let mut counts = vec![0usize; width];
        let mut peak = vec![f64::NEG_INFINITY; width];

        for idx in idx_start..=idx_end {
            let Some(row) = series.band_row(idx) else {
                continue;
            };
            for (band, &value) in row.iter().enumerate() {
                if value.is_finite() {
                    sums[band] += value;
                    counts[band] += 1;
                    peak[band] = peak[band].max(value);
                }
            }
        }

        let row = series.band_row(idx_end).unwrap_or(&[]);
        let instant_valid: Vec<bool> = (0..width)
            .map(|band| row.get(band).is_some_and(|v| v.is_finite()))
            .collect();
        let instant = (0..width)
            .map(|band| if instant_valid[band] { row[band] } else { 0.0 })
            .collect();

        let mean = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
            .collect();

        let peak = peak
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();

        SpectralWindowResult {
            band_labels: labels.to_vec(),
            instant,
            mean,
            peak,
            sample_count: idx_end - idx_start + 1,
            instant_valid,
        }
    }
}

impl Default for SpectralWindowAggregator {
    fn default() -> Self {
        SpectralWindowAggregator::new(DEFAULT_WINDOW_SECS)
    }
}
