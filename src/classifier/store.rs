// Knowledge store
// Append-only CSV of operator-confirmed examples: `label,low,mid,high`, no header

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::classifier::backend::ClassifierError;
use crate::classifier::types::{ClassifierExample, SpectralFeatures};

/// Outcome of a permissive load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
}

impl KnowledgeStore {
    pub fn new(path: PathBuf) -> Self {
        KnowledgeStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every well-formed example, oldest first.
    ///
    /// A missing file is an empty store. Rows with fewer than four fields,
    /// an empty label or a non-numeric feature are skipped and counted. Only
    /// an unreadable file is an error.
    pub fn load(&self) -> Result<(Vec<ClassifierExample>, StoreReport), ClassifierError> {
        if !self.path.exists() {
            return Ok((Vec::new(), StoreReport::default()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut examples = Vec::new();
        let mut report = StoreReport::default();

        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    log::warn!("Skipping unreadable knowledge row: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            match parse_record(&record) {
                Some(example) => {
                    examples.push(example);
                    report.loaded += 1;
                }
                None => {
                    log::warn!(
                        "Skipping malformed knowledge row at line {}",
                        record.position().map(|p| p.line()).unwrap_or(0)
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok((examples, report))
    }

    /// Append one example, creating the file and its directory on first use
    pub fn append(&self, example: &ClassifierExample) -> Result<(), ClassifierError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        // a hand-edited store may lack the final line break
        if ends_without_newline(&mut file)? {
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        let features = &example.features;
        writer.write_record([
            example.label.clone(),
            features.low.to_string(),
            features.mid.to_string(),
            features.high.to_string(),
        ])?;
        writer.flush()?;

        Ok(())
    }
}

fn ends_without_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn parse_record(record: &csv::StringRecord) -> Option<ClassifierExample> {
    if record.len() < 4 {
        return None;
    }

    let label = record.get(0)?.trim();
    if label.is_empty() {
        return None;
    }

    let mut values = [0.0; 3];
    for (slot, field) in values.iter_mut().zip(record.iter().skip(1)) {
        let value: f64 = field.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        *slot = value;
    }

    Some(ClassifierExample::new(
        label,
        SpectralFeatures::new(values[0], values[1], values[2]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(temp_dir.path().join("knowledge.csv"));

        let (examples, report) = store.load().unwrap();
        assert!(examples.is_empty());
        assert_eq!(report, StoreReport::default());
    }

    #[test]
    fn test_append_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(temp_dir.path().join("brain").join("knowledge.csv"));

        store
            .append(&ClassifierExample::new("Source Std", SpectralFeatures::new(61.5, 48.25, 30.0)))
            .unwrap();
        store
            .append(&ClassifierExample::new("Résiduel (Calme)", SpectralFeatures::new(35.0, 30.0, 20.0)))
            .unwrap();

        let (examples, report) = store.load().unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(examples[0].label, "Source Std");
        assert_eq!(examples[0].features, SpectralFeatures::new(61.5, 48.25, 30.0));
        assert_eq!(examples[1].label, "Résiduel (Calme)");

        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(contents.starts_with("Source Std,61.5,48.25,30\n"));
    }

    #[test]
    fn test_malformed_rows_are_counted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.csv");
        fs::write(
            &path,
            "A,1,2,3\nB,1,2\nC,x,2,3\n,1,2,3\nD,4,5,6,extra\n",
        )
        .unwrap();

        let (examples, report) = KnowledgeStore::new(path).load().unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 3);
        assert_eq!(examples[0].label, "A");
        assert_eq!(examples[1].label, "D");
        assert_eq!(examples[1].features, SpectralFeatures::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_append_after_unterminated_last_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("knowledge.csv");
        fs::write(&path, "Source Std,61.5,48.25,30").unwrap();

        let store = KnowledgeStore::new(path);
        store
            .append(&ClassifierExample::new("Source -", SpectralFeatures::new(40.0, 35.0, 20.0)))
            .unwrap();

        let (examples, report) = store.load().unwrap();
        assert_eq!(report, StoreReport { loaded: 2, skipped: 0 });
        assert_eq!(examples[0].features, SpectralFeatures::new(61.5, 48.25, 30.0));
        assert_eq!(examples[1].label, "Source -");
    }

    #[test]
    fn test_append_to_unwritable_location_fails() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be
        let path = temp_dir.path().join("knowledge.csv");
        fs::create_dir(&path).unwrap();

        let store = KnowledgeStore::new(path);
        let result = store.append(&ClassifierExample::new("A", SpectralFeatures::default()));
        assert!(result.is_err());
    }
}
