// Measurement file loader
// Reads sound-level-meter exports (`;` separated, decimal comma, optional
// `#` metadata line) into a MeasurementSeries and writes notes back

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::timeline::{MeasurementSeries, Sample, SeriesError};

const BOM: &str = "\u{feff}";

/// Third-octave bands read by default
pub const DEFAULT_BAND_LABELS: [&str; 14] = [
    "20Hz", "25Hz", "31.5Hz", "40Hz", "50Hz", "63Hz", "80Hz", "100Hz", "125Hz", "160Hz", "200Hz",
    "250Hz", "315Hz", "400Hz",
];

pub fn default_band_labels() -> Vec<String> {
    DEFAULT_BAND_LABELS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("No measurement file in {0}")]
    NoMeasurementFile(PathBuf),

    #[error("Invalid measurement data: {0}")]
    Series(#[from] SeriesError),
}

/// Column positions, resolved once per file
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub ts: usize,
    pub level: usize,
    pub note: Option<usize>,
    pub audio_ref: Option<usize>,
    pub wind: Option<usize>,

    /// One entry per requested band label; `None` when absent (read as missing)
    pub bands: Vec<Option<usize>>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String], band_labels: &[String]) -> Result<Self, LoadError> {
        let lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let ts = position(&lower, |h| h == "ts").ok_or_else(|| LoadError::MissingColumn("ts".to_string()))?;

        let level = position(&lower, |h| h.contains("leq") || h.contains("dba"))
            .or_else(|| (headers.len() > 2 && ts != 2).then_some(2))
            .ok_or_else(|| LoadError::MissingColumn("level (LAeq / dBA)".to_string()))?;

        let note = position(&lower, |h| h.contains("note"));
        let audio_ref = position(&lower, |h| h == "audio_ref");
        let wind = position(&lower, |h| h.contains("vent") || h.contains("wind"));

        // Exact match first so "25Hz" does not land on "125Hz"
        let bands = band_labels
            .iter()
            .map(|label| {
                let label = label.to_lowercase();
                position(&lower, |h| h == label).or_else(|| position(&lower, |h| h.contains(label.as_str())))
            })
            .collect();

        Ok(ColumnMap {
            ts,
            level,
            note,
            audio_ref,
            wind,
            bands,
        })
    }
}

/// Parse a number written with either decimal separator. Blank, unparseable
/// and non-finite cells are missing.
pub fn parse_decimal(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

fn position(lower_headers: &[String], pred: impl Fn(&str) -> bool) -> Option<usize> {
    lower_headers.iter().position(|h| pred(h.as_str()))
}

fn clean_header(raw: &str) -> String {
    raw.trim().replace(|c: char| c == '"' || c == '\'', "").trim().to_string()
}

/// A loaded measurement file, kept so notes can be written back
#[derive(Debug, Clone)]
pub struct MeasurementFile {
    path: PathBuf,
    has_bom: bool,
    metadata_header: Option<String>,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    /// Row of each sample in `rows`
    sample_rows: Vec<usize>,
    columns: ColumnMap,
    series: MeasurementSeries,
}

impl MeasurementFile {
    pub fn load(path: &Path, band_labels: &[String]) -> Result<Self, LoadError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(path.to_path_buf(), &contents, band_labels)
    }

    fn parse(path: PathBuf, contents: &str, band_labels: &[String]) -> Result<Self, LoadError> {
        let has_bom = contents.starts_with(BOM);
        let body = contents.strip_prefix(BOM).unwrap_or(contents);

        let (metadata_header, table) = if body.starts_with('#') {
            match body.split_once('\n') {
                Some((first, rest)) => (Some(first.trim_end_matches('\r').to_string()), rest),
                None => (Some(body.trim_end().to_string()), ""),
            }
        } else {
            (None, body)
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(table.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();
        let columns = ColumnMap::resolve(&headers, band_labels)?;

        let mut rows = Vec::new();
        let mut samples = Vec::new();
        let mut sample_rows = Vec::new();
        let mut dropped = 0usize;

        for result in reader.records() {
            let record = result?;
            let row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");
            let optional = |idx: Option<usize>| idx.map(|i| cell(i).trim()).filter(|c| !c.is_empty());

            match parse_decimal(cell(columns.ts)) {
                Some(ts) => {
                    let bands = columns
                        .bands
                        .iter()
                        .map(|col| match col {
                            Some(i) => parse_decimal(cell(*i)).unwrap_or(f64::NAN),
                            None => f64::NAN,
                        })
                        .collect();

                    samples.push(Sample {
                        ts,
                        level_db: parse_decimal(cell(columns.level)),
                        bands,
                        note: optional(columns.note).map(str::to_string),
                        audio_ref: optional(columns.audio_ref).map(str::to_string),
                        wind_ms: columns.wind.and_then(|i| parse_decimal(cell(i))),
                    });
                    sample_rows.push(rows.len());
                }
                None => dropped += 1,
            }

            rows.push(row);
        }

        if dropped > 0 {
            log::warn!("{}: {} rows without a valid timestamp", path.display(), dropped);
        }

        let series = MeasurementSeries::new(band_labels.to_vec(), samples)?;
        log::info!(
            "Loaded {} samples, {} bands from {}",
            series.len(),
            series.band_count(),
            path.display()
        );

        Ok(MeasurementFile {
            path,
            has_bom,
            metadata_header,
            headers,
            rows,
            sample_rows,
            columns,
            series,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata_header(&self) -> Option<&str> {
        self.metadata_header.as_deref()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn series(&self) -> &MeasurementSeries {
        &self.series
    }

    pub fn series_mut(&mut self) -> &mut MeasurementSeries {
        &mut self.series
    }

    /// First audio reference of the file
    pub fn first_audio_ref(&self) -> Option<&str> {
        (0..self.series.len()).find_map(|i| self.series.audio_ref(i))
    }

    /// Write the file back with the current notes.
    ///
    /// Cells other than notes are written as read, so number formatting is
    /// preserved. A note column is appended when the source had none.
    pub fn save(&mut self) -> Result<(), LoadError> {
        let note_col = match self.columns.note {
            Some(col) => col,
            None => {
                self.headers.push("note".to_string());
                let col = self.headers.len() - 1;
                self.columns.note = Some(col);
                col
            }
        };

        for (sample, &row_idx) in self.sample_rows.iter().enumerate() {
            let row = &mut self.rows[row_idx];
            if row.len() <= note_col {
                row.resize(note_col + 1, String::new());
            }
            row[note_col] = self.series.note(sample).unwrap_or_default().to_string();
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let table = writer.into_inner().map_err(|e| e.into_error())?;

        let mut out = Vec::with_capacity(table.len() + 64);
        if self.has_bom {
            out.extend_from_slice(BOM.as_bytes());
        }
        if let Some(header) = &self.metadata_header {
            out.extend_from_slice(header.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(&table);

        fs::write(&self.path, out)?;
        log::info!("Saved {}", self.path.display());
        Ok(())
    }
}
