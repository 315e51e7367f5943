// Audio/measurement clock alignment
// The recorder names each file after its local start time; that time anchors
// the audio on the measurement timeline

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::pipeline::{LogSink, TraceBuilder, TraceSink};
use crate::sync::resolver::AudioResolver;
use crate::timeline::LocalZone;

/// Playback alignment could not be established. Never fatal: analysis
/// carries on without audio.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync unavailable: cannot read a start time from '{name}' ({reason})")]
    UnparseableName { name: String, reason: String },

    #[error("Sync unavailable: audio file '{0}' not found")]
    MissingArtifact(String),

    #[error("Sync unavailable: no audio reference")]
    NoAudioReference,
}

/// Filename conventions of the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// chrono format of the start time prefix
    pub filename_format: String,

    /// Text separating the start time from the rest of the name
    pub suffix_marker: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            filename_format: "%Y-%m-%d_%Hh%M".to_string(),
            suffix_marker: "_Audio".to_string(),
        }
    }
}

/// Alignment of one audio file with the measurement timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSyncOffset {
    /// Epoch seconds of the first audio sample
    pub audio_start_epoch: f64,

    /// `measurement_start_ts - audio_start_epoch`, negative when the audio
    /// starts after the measurements
    pub time_offset: f64,

    pub audio_ref: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl AudioSyncOffset {
    /// Seconds into the audio for measurement time `ts`, never negative and
    /// never past the end of the file when its duration is known
    pub fn playback_position(&self, ts: f64) -> f64 {
        let position = (ts - self.audio_start_epoch).max(0.0);
        match self.duration_secs {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    pub fn playback_position_ms(&self, ts: f64) -> u64 {
        (self.playback_position(ts) * 1000.0).round() as u64
    }
}

/// Part of a path after the last `/` or `\`
fn basename(name: &str) -> &str {
    name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name)
}

/// Local start time embedded in an audio filename, as epoch seconds
pub fn parse_audio_start(filename: &str, config: &SyncConfig, zone: &LocalZone) -> Result<f64, SyncError> {
    let base = basename(filename.trim());
    let unparseable = |reason: String| SyncError::UnparseableName {
        name: base.to_string(),
        reason,
    };

    let prefix = match base.find(config.suffix_marker.as_str()) {
        Some(pos) if !config.suffix_marker.is_empty() => &base[..pos],
        // No marker: try the name without its extension
        _ => base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base),
    };

    let local = NaiveDateTime::parse_from_str(prefix, &config.filename_format)
        .map_err(|e| unparseable(e.to_string()))?;

    zone.epoch_of(&local)
        .ok_or_else(|| unparseable("local time does not exist in the configured zone".to_string()))
}

/// Resolves audio offsets against an artifact resolver
pub struct AudioTimeSync {
    config: SyncConfig,
    zone: LocalZone,
    resolver: Arc<dyn AudioResolver>,
    sink: Arc<dyn TraceSink>,
}

impl AudioTimeSync {
    pub fn new(config: SyncConfig, zone: LocalZone, resolver: Arc<dyn AudioResolver>) -> Self {
        AudioTimeSync {
            config,
            zone,
            resolver,
            sink: Arc::new(LogSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Offset from the filename alone, without looking for the file
    pub fn offset_for_name(&self, measurement_start_ts: f64, filename: &str) -> Result<AudioSyncOffset, SyncError> {
        let audio_start_epoch = parse_audio_start(filename, &self.config, &self.zone)?;
        let time_offset = measurement_start_ts - audio_start_epoch;

        if time_offset < 0.0 {
            log::warn!(
                "Audio '{}' starts {:.1}s after the first measurement",
                filename,
                -time_offset
            );
        }

        Ok(AudioSyncOffset {
            audio_start_epoch,
            time_offset,
            audio_ref: filename.to_string(),
            path: None,
            duration_secs: None,
        })
    }

    /// Offset of `filename` relative to the series start. The file must exist.
    pub fn resolve(&self, measurement_start_ts: f64, filename: &str) -> Result<AudioSyncOffset, SyncError> {
        self.sink
            .emit(TraceBuilder::stage("sync").start(format!("Resolving audio '{}'", filename)));

        let result = self.offset_for_name(measurement_start_ts, filename).and_then(|offset| {
            let artifact = self
                .resolver
                .resolve(filename)
                .ok_or_else(|| SyncError::MissingArtifact(filename.to_string()))?;
            Ok(AudioSyncOffset {
                path: Some(artifact.path),
                duration_secs: artifact.duration_secs,
                ..offset
            })
        });

        match &result {
            Ok(offset) => self.sink.emit(TraceBuilder::stage("sync").with_data(
                1.0,
                format!("Audio offset {:.3}s", offset.time_offset),
                serde_json::json!({
                    "audio_start_epoch": offset.audio_start_epoch,
                    "time_offset": offset.time_offset,
                    "duration_secs": offset.duration_secs,
                }),
            )),
            Err(e) => self.sink.emit(TraceBuilder::stage("sync").complete(e.to_string())),
        }

        result
    }
}
