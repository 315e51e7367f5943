// Measurement series
// Column-oriented storage of a cleaned survey log: timestamps, global level,
// per-band levels and operator notes

use std::collections::BTreeMap;

use thiserror::Error;

use crate::timeline::index::TimeIndex;

/// A spectrum keyed by band label (e.g. "50Hz" -> 42.3 dB)
pub type BandLevels = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Timestamp at row {row} is not finite")]
    NonFiniteTimestamp { row: usize },

    #[error("Timestamps go backwards at row {row} ({previous} -> {current})")]
    Unordered {
        row: usize,
        previous: f64,
        current: f64,
    },

    #[error("Row {row} has {found} band values, expected {expected}")]
    BandCountMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Sample index {0} out of range")]
    IndexOutOfRange(usize),
}

/// One row handed over by the loader
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Epoch seconds
    pub ts: f64,

    /// Global level (dBA / LAeq), `None` when missing
    pub level_db: Option<f64>,

    /// Band levels aligned with the series band labels; non-finite = missing
    pub bands: Vec<f64>,

    /// Operator annotation
    pub note: Option<String>,

    /// Audio file the sample was recorded into
    pub audio_ref: Option<String>,

    /// Wind speed in m/s when the logger has an anemometer
    pub wind_ms: Option<f64>,
}

impl Sample {
    pub fn new(ts: f64, level_db: Option<f64>) -> Self {
        Sample {
            ts,
            level_db,
            ..Default::default()
        }
    }

    pub fn with_bands(mut self, bands: Vec<f64>) -> Self {
        self.bands = bands;
        self
    }
}

/// The full measurement timeline.
///
/// Replaced wholesale on reload; the only in-place mutation is the per-sample
/// note.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSeries {
    band_labels: Vec<String>,
    timestamps: Vec<f64>,
    levels: Vec<Option<f64>>,
    /// Row-major matrix, `band_labels.len()` values per sample
    bands: Vec<f64>,
    notes: Vec<Option<String>>,
    audio_refs: Vec<Option<String>>,
    wind: Vec<Option<f64>>,
}

impl MeasurementSeries {
    /// Build a series, checking timestamp order and band row widths
    pub fn new(band_labels: Vec<String>, samples: Vec<Sample>) -> Result<Self, SeriesError> {
        let width = band_labels.len();
        let mut series = MeasurementSeries {
            band_labels,
            timestamps: Vec::with_capacity(samples.len()),
            levels: Vec::with_capacity(samples.len()),
            bands: Vec::with_capacity(samples.len() * width),
            notes: Vec::with_capacity(samples.len()),
            audio_refs: Vec::with_capacity(samples.len()),
            wind: Vec::with_capacity(samples.len()),
        };

        for (row, sample) in samples.into_iter().enumerate() {
            if !sample.ts.is_finite() {
                return Err(SeriesError::NonFiniteTimestamp { row });
            }
            if let Some(&previous) = series.timestamps.last() {
                if sample.ts < previous {
                    return Err(SeriesError::Unordered {
                        row,
                        previous,
                        current: sample.ts,
                    });
                }
            }

            // Rows without band data have every band missing
            if sample.bands.is_empty() {
                series.bands.extend(std::iter::repeat(f64::NAN).take(width));
            } else if sample.bands.len() == width {
                series.bands.extend_from_slice(&sample.bands);
            } else {
                return Err(SeriesError::BandCountMismatch {
                    row,
                    found: sample.bands.len(),
                    expected: width,
                });
            }

            series.timestamps.push(sample.ts);
            series.levels.push(sample.level_db.filter(|v| v.is_finite()));
            series.notes.push(sample.note.filter(|n| !n.trim().is_empty()));
            series.audio_refs.push(sample.audio_ref);
            series.wind.push(sample.wind_ms.filter(|v| v.is_finite()));
        }

        Ok(series)
    }

    /// Level-only series (no bands), mostly for scans
    pub fn from_levels(timestamps: Vec<f64>, levels: Vec<Option<f64>>) -> Result<Self, SeriesError> {
        let samples = timestamps
            .into_iter()
            .zip(levels)
            .map(|(ts, level)| Sample::new(ts, level))
            .collect();
        Self::new(Vec::new(), samples)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn levels(&self) -> &[Option<f64>] {
        &self.levels
    }

    pub fn band_labels(&self) -> &[String] {
        &self.band_labels
    }

    pub fn band_count(&self) -> usize {
        self.band_labels.len()
    }

    pub fn index(&self) -> TimeIndex<'_> {
        TimeIndex::new(&self.timestamps)
    }

    /// First timestamp of the series
    pub fn start_ts(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn end_ts(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Band values of one sample, aligned with `band_labels()`
    pub fn band_row(&self, idx: usize) -> Option<&[f64]> {
        let width = self.band_count();
        if idx >= self.len() {
            return None;
        }
        Some(&self.bands[idx * width..(idx + 1) * width])
    }

    /// Spectrum of one sample as a label map, missing cells left out
    pub fn spectrum_at(&self, idx: usize) -> Option<BandLevels> {
        let row = self.band_row(idx)?;
        Some(
            self.band_labels
                .iter()
                .zip(row)
                .filter(|(_, v)| v.is_finite())
                .map(|(label, v)| (label.clone(), *v))
                .collect(),
        )
    }

    pub fn notes(&self) -> &[Option<String>] {
        &self.notes
    }

    pub fn note(&self, idx: usize) -> Option<&str> {
        self.notes.get(idx).and_then(|n| n.as_deref())
    }

    /// Attach, replace or clear (`None`) the note of one sample
    pub fn set_note(&mut self, idx: usize, note: Option<String>) -> Result<(), SeriesError> {
        let slot = self
            .notes
            .get_mut(idx)
            .ok_or(SeriesError::IndexOutOfRange(idx))?;
        *slot = note.filter(|n| !n.trim().is_empty());
        Ok(())
    }

    pub fn audio_ref(&self, idx: usize) -> Option<&str> {
        self.audio_refs.get(idx).and_then(|r| r.as_deref())
    }

    pub fn wind(&self) -> &[Option<f64>] {
        &self.wind
    }

    /// Index of the sample nearest in time to `ts`
    pub fn nearest(&self, ts: f64) -> Option<usize> {
        self.index().nearest(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["50Hz".to_string(), "100Hz".to_string()]
    }

    #[test]
    fn test_series_creation() {
        let samples = vec![
            Sample::new(0.0, Some(40.0)).with_bands(vec![30.0, 31.0]),
            Sample::new(3.0, None).with_bands(vec![32.0, f64::NAN]),
        ];
        let series = MeasurementSeries::new(labels(), samples).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.levels(), &[Some(40.0), None]);
        assert_eq!(series.band_row(1).unwrap()[0], 32.0);
        assert_eq!(series.start_ts(), Some(0.0));
        assert_eq!(series.end_ts(), Some(3.0));
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let result = MeasurementSeries::from_levels(vec![5.0, 4.0], vec![Some(1.0), Some(2.0)]);
        assert!(matches!(result, Err(SeriesError::Unordered { row: 1, .. })));
    }

    #[test]
    fn test_rejects_non_finite_timestamp() {
        let result = MeasurementSeries::from_levels(vec![f64::NAN], vec![Some(1.0)]);
        assert!(matches!(result, Err(SeriesError::NonFiniteTimestamp { row: 0 })));
    }

    #[test]
    fn test_band_width_mismatch() {
        let samples = vec![Sample::new(0.0, None).with_bands(vec![1.0])];
        let result = MeasurementSeries::new(labels(), samples);
        assert!(matches!(result, Err(SeriesError::BandCountMismatch { .. })));
    }

    #[test]
    fn test_nan_level_is_missing() {
        let series = MeasurementSeries::from_levels(vec![0.0], vec![Some(f64::NAN)]).unwrap();
        assert_eq!(series.levels()[0], None);
    }

    #[test]
    fn test_spectrum_skips_missing_cells() {
        let samples = vec![Sample::new(0.0, None).with_bands(vec![30.0, f64::NAN])];
        let series = MeasurementSeries::new(labels(), samples).unwrap();

        let spectrum = series.spectrum_at(0).unwrap();
        assert_eq!(spectrum.len(), 1);
        assert_eq!(spectrum["50Hz"], 30.0);
    }

    #[test]
    fn test_row_without_bands_has_empty_spectrum() {
        let samples = vec![Sample::new(0.0, Some(40.0))];
        let series = MeasurementSeries::new(labels(), samples).unwrap();

        assert!(series.band_row(0).unwrap().iter().all(|v| v.is_nan()));
        assert!(series.spectrum_at(0).unwrap().is_empty());
    }

    #[test]
    fn test_set_note() {
        let mut series = MeasurementSeries::from_levels(vec![0.0, 1.0], vec![None, None]).unwrap();

        series.set_note(1, Some("Source Std {d=120}".to_string())).unwrap();
        assert_eq!(series.note(1), Some("Source Std {d=120}"));

        series.set_note(1, Some("   ".to_string())).unwrap();
        assert_eq!(series.note(1), None);

        assert!(series.set_note(5, None).is_err());
    }
}
