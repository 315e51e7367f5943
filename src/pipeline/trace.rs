// Analysis progress tracing
// Reporting port injected into the scanner, classifier and sync resolver, plus
// an append-only JSONL trace file per session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed trace entry at line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}

/// One progress report from an analysis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,

    /// "load", "emergence_scan", "classifier" or "sync"
    pub stage: String,

    /// [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Stage results (residual levels, event count, chosen label...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now(),
            stage: stage.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured results
    pub fn with(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Destination for trace entries.
///
/// Components receive a sink explicitly instead of reaching for a global
/// logger. Emitting never fails the caller: sinks deal with their own errors.
pub trait TraceSink: Send + Sync {
    fn emit(&self, entry: TraceEntry);
}

/// Forwards entries to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn emit(&self, entry: TraceEntry) {
        match &entry.data {
            Some(data) => log::info!("[{}] {} {}", entry.stage, entry.message, data),
            None => log::info!("[{}] {}", entry.stage, entry.message),
        }
    }
}

/// Keeps entries in memory (UI polling, tests)
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<TraceEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far
    pub fn entries(&self) -> Vec<TraceEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, entry: TraceEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Sends every entry to several sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TraceSink>>) -> Self {
        FanoutSink { sinks }
    }
}

impl TraceSink for FanoutSink {
    fn emit(&self, entry: TraceEntry) {
        for sink in &self.sinks {
            sink.emit(entry.clone());
        }
    }
}

/// Appends entries to a JSONL file, one object per line
pub struct TraceWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl TraceWriter {
    /// Open (or create) the trace file and its directory
    pub fn open(path: PathBuf) -> Result<Self, TraceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(TraceWriter {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for TraceWriter {
    fn emit(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!(
                "Trace entry for stage '{}' not written to {}: {}",
                entry.stage,
                self.path.display(),
                e
            );
        }
    }
}

/// Shorthand for the entries a stage emits
pub struct TraceBuilder {
    stage: String,
}

impl TraceBuilder {
    pub fn stage(stage: impl Into<String>) -> Self {
        TraceBuilder {
            stage: stage.into(),
        }
    }

    pub fn start(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.stage, 0.0, message)
    }

    pub fn complete(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.stage, 1.0, message)
    }

    pub fn with_data(
        self,
        progress: f32,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> TraceEntry {
        TraceEntry::new(self.stage, progress, message).with(data)
    }
}

/// Read back a session trace. Blank lines are skipped.
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line)
            .map_err(|source| TraceError::Malformed { line: i + 1, source })?;
        entries.push(entry);
    }

    Ok(entries)
}
