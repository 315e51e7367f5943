// Operator zone annotations
// Zones are stored in the note column as "<label> {d=<seconds>}" on the sample
// nearest to the zone centre

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::SourceCategory;
use crate::timeline::{MeasurementSeries, SeriesError};

/// Zone length assumed when a note carries no duration tag
pub const DEFAULT_ZONE_SECS: f64 = 120.0;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("No measurement loaded")]
    EmptySeries,

    #[error("Zone too short: both ends snap to the same sample")]
    ZoneTooShort,

    #[error("Zone label is empty")]
    EmptyLabel,

    #[error("No zone marker near {0}")]
    NoMarker(f64),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// A labelled zone read back from a note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneMarker {
    /// Timestamp of the sample holding the note (zone centre)
    pub ts: f64,
    pub label: String,
    pub duration_secs: f64,
}

impl ZoneMarker {
    /// Read a note. Notes without a `{d=..}` tag get the default duration.
    pub fn parse(ts: f64, note: &str) -> Self {
        let (label, tag) = match note.find('{') {
            Some(pos) => (&note[..pos], Some(&note[pos..])),
            None => (note, None),
        };

        let duration_secs = tag
            .and_then(|t| t.strip_prefix("{d="))
            .and_then(|t| t.split('}').next())
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(DEFAULT_ZONE_SECS);

        ZoneMarker {
            ts,
            label: label.trim().to_string(),
            duration_secs,
        }
    }

    /// Note text for this marker
    pub fn to_note(&self) -> String {
        format_note(&self.label, self.duration_secs)
    }

    /// Covered time range, centred on the marker
    pub fn range(&self) -> (f64, f64) {
        let half = self.duration_secs / 2.0;
        (self.ts - half, self.ts + half)
    }

    pub fn category(&self) -> Option<SourceCategory> {
        SourceCategory::from_label(&self.label)
    }
}

pub fn format_note(label: &str, duration_secs: f64) -> String {
    format!("{} {{d={:.1}}}", label.trim(), duration_secs)
}

/// Every annotated sample of the series, in time order
pub fn markers(series: &MeasurementSeries) -> Vec<ZoneMarker> {
    let mut markers: Vec<ZoneMarker> = series
        .timestamps()
        .iter()
        .zip(series.notes())
        .filter_map(|(&ts, note)| note.as_deref().map(|n| ZoneMarker::parse(ts, n)))
        .collect();
    markers.dedup();
    markers
}

/// Mark `[start, end]` (any order) with `label`.
///
/// Both ends snap to their nearest samples; the note goes on the sample
/// nearest to the snapped centre.
pub fn annotate_zone(
    series: &mut MeasurementSeries,
    start: f64,
    end: f64,
    label: &str,
) -> Result<ZoneMarker, AnnotationError> {
    if label.trim().is_empty() {
        return Err(AnnotationError::EmptyLabel);
    }

    let (raw_start, raw_end) = (start.min(end), start.max(end));
    let ts = series.timestamps();
    let idx_start = series.nearest(raw_start).ok_or(AnnotationError::EmptySeries)?;
    let idx_end = series.nearest(raw_end).ok_or(AnnotationError::EmptySeries)?;

    let (real_start, real_end) = (ts[idx_start], ts[idx_end]);
    if real_start == real_end {
        return Err(AnnotationError::ZoneTooShort);
    }

    let center = (real_start + real_end) / 2.0;
    let idx_center = series.nearest(center).ok_or(AnnotationError::EmptySeries)?;

    let marker = ZoneMarker {
        ts: series.timestamps()[idx_center],
        label: label.trim().to_string(),
        duration_secs: real_end - real_start,
    };
    series.set_note(idx_center, Some(marker.to_note()))?;

    Ok(marker)
}

/// Sample index of the marker nearest to `ts`
fn marker_index(series: &MeasurementSeries, ts: f64) -> Result<usize, AnnotationError> {
    let idx = series.nearest(ts).ok_or(AnnotationError::EmptySeries)?;
    if series.note(idx).is_none() {
        return Err(AnnotationError::NoMarker(ts));
    }
    Ok(idx)
}

/// Change the label of a marker, keeping its duration
pub fn relabel_marker(series: &mut MeasurementSeries, ts: f64, label: &str) -> Result<ZoneMarker, AnnotationError> {
    if label.trim().is_empty() {
        return Err(AnnotationError::EmptyLabel);
    }

    let idx = marker_index(series, ts)?;
    let old = ZoneMarker::parse(series.timestamps()[idx], series.note(idx).unwrap_or_default());
    let marker = ZoneMarker {
        label: label.trim().to_string(),
        ..old
    };
    series.set_note(idx, Some(marker.to_note()))?;

    Ok(marker)
}

/// Remove a marker, returning what was removed
pub fn delete_marker(series: &mut MeasurementSeries, ts: f64) -> Result<ZoneMarker, AnnotationError> {
    let idx = marker_index(series, ts)?;
    let removed = ZoneMarker::parse(series.timestamps()[idx], series.note(idx).unwrap_or_default());
    series.set_note(idx, None)?;
    Ok(removed)
}
