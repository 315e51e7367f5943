// Project folder discovery
// A project is a folder holding one logger export, its audio files and the
// working copy that receives the operator's notes

use std::fs;
use std::path::{Path, PathBuf};

use crate::measurement::loader::LoadError;

/// Suffix of the working copy next to the original export
pub const WORKING_COPY_SUFFIX: &str = "_PRISM";

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFiles {
    pub folder: PathBuf,

    /// File the session reads and writes
    pub measurement: PathBuf,

    /// Whether the working copy was created by this call
    pub created_copy: bool,
}

fn is_measurement_csv(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".csv") && !lower.contains("knowledge")
}

/// Locate the working copy of a project folder, creating it from the original
/// export when missing. The original file is never written to.
pub fn discover(folder: &Path) -> Result<ProjectFiles, LoadError> {
    let mut names: Vec<String> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| is_measurement_csv(name))
        .collect();
    names.sort();

    if let Some(working) = names.iter().find(|n| n.contains(WORKING_COPY_SUFFIX)) {
        log::info!("Resuming project from {}", working);
        return Ok(ProjectFiles {
            folder: folder.to_path_buf(),
            measurement: folder.join(working),
            created_copy: false,
        });
    }

    let original = names
        .first()
        .ok_or_else(|| LoadError::NoMeasurementFile(folder.to_path_buf()))?;

    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original.as_str());
    let copy = folder.join(format!("{}{}.csv", stem, WORKING_COPY_SUFFIX));

    fs::copy(folder.join(original), &copy)?;
    log::info!("New project from {}, working on {}", original, copy.display());

    Ok(ProjectFiles {
        folder: folder.to_path_buf(),
        measurement: copy,
        created_copy: true,
    })
}
