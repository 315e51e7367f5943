// Audio artifact resolution
// Maps an audio reference from the measurement file to a file on disk

use hound::WavReader;
use std::path::{Path, PathBuf};

/// An audio file found for a reference
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    pub path: PathBuf,

    /// Known only for formats that can be probed (WAV)
    pub duration_secs: Option<f64>,
}

/// Answers whether an audio reference exists and where
pub trait AudioResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Option<AudioArtifact>;
}

/// Looks references up relative to a project folder
#[derive(Debug, Clone)]
pub struct FolderResolver {
    root: PathBuf,
}

impl FolderResolver {
    pub fn new(root: PathBuf) -> Self {
        FolderResolver { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AudioResolver for FolderResolver {
    fn resolve(&self, reference: &str) -> Option<AudioArtifact> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        let path = self.root.join(reference);
        if !path.is_file() {
            log::debug!("Audio reference '{}' not found under {}", reference, self.root.display());
            return None;
        }

        let duration_secs = probe_wav_duration(&path);
        Some(AudioArtifact { path, duration_secs })
    }
}

/// Duration of a WAV file from its header, `None` for other formats or
/// unreadable files
pub fn probe_wav_duration(path: &Path) -> Option<f64> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if !is_wav {
        return None;
    }

    match WavReader::open(path) {
        Ok(reader) => {
            let spec = reader.spec();
            if spec.sample_rate == 0 {
                return None;
            }
            Some(reader.duration() as f64 / spec.sample_rate as f64)
        }
        Err(e) => {
            log::warn!("Could not read WAV header of {}: {}", path.display(), e);
            None
        }
    }
}
