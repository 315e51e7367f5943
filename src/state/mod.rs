// State module
// Application data locations and file fingerprints

pub mod storage;

pub use storage::{
    app_dir_in, calculate_sha256, default_knowledge_path, get_app_data_dir, get_session_dir,
    hash_file, knowledge_path_in, trace_path, StorageError, StorageResult,
};
