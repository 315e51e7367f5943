// File system locations and fingerprints
// Application data directory, knowledge store, per-session traces
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

const APP_DIR: &str = "com.prism.app";
const KNOWLEDGE_FILE: &str = "ia_knowledge.csv";

/// Get the app data directory for Prism
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    app_dir_in(&data_dir)
}

/// App directory under an explicit base (tests, portable installs)
pub fn app_dir_in(base: &Path) -> StorageResult<PathBuf> {
    let prism_dir = base.join(APP_DIR);
    fs::create_dir_all(&prism_dir)?;
    Ok(prism_dir)
}

/// Knowledge store used when the configuration names none
pub fn default_knowledge_path() -> StorageResult<PathBuf> {
    knowledge_path_in(&get_app_data_dir()?)
}

pub fn knowledge_path_in(app_dir: &Path) -> StorageResult<PathBuf> {
    let brain_dir = app_dir.join("ai_brain");
    fs::create_dir_all(&brain_dir)?;
    Ok(brain_dir.join(KNOWLEDGE_FILE))
}

/// Get the directory for a specific analysis session
pub fn get_session_dir(app_dir: &Path, session_id: &Uuid) -> StorageResult<PathBuf> {
    let session_dir = app_dir.join("sessions").join(session_id.to_string());
    fs::create_dir_all(&session_dir)?;
    Ok(session_dir)
}

/// JSONL trace file of a session
pub fn trace_path(app_dir: &Path, session_id: &Uuid) -> StorageResult<PathBuf> {
    Ok(get_session_dir(app_dir, session_id)?.join("trace.jsonl"))
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA256 of a file, streamed
pub fn hash_file(path: &Path) -> StorageResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_calculate_sha256() {
        let data = b"hello world";
        let hash = calculate_sha256(data);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hash_file_matches_in_memory_hash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("survey.csv");
        fs::write(&path, b"hello world").unwrap();

        assert_eq!(hash_file(&path).unwrap(), calculate_sha256(b"hello world"));
    }

    #[test]
    fn test_layout_under_base() {
        let temp_dir = TempDir::new().unwrap();
        let app_dir = app_dir_in(temp_dir.path()).unwrap();
        let session = Uuid::new_v4();

        let knowledge = knowledge_path_in(&app_dir).unwrap();
        let trace = trace_path(&app_dir, &session).unwrap();

        assert!(knowledge.ends_with("com.prism.app/ai_brain/ia_knowledge.csv"));
        assert!(knowledge.parent().unwrap().is_dir());
        assert!(trace.parent().unwrap().ends_with(session.to_string()));
        assert!(trace.parent().unwrap().is_dir());
    }
}
