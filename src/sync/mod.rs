// Audio synchronisation module
// Anchors audio recordings on the measurement timeline

pub mod offset;
pub mod resolver;

pub use offset::{parse_audio_start, AudioSyncOffset, AudioTimeSync, SyncConfig, SyncError};
pub use resolver::{probe_wav_duration, AudioArtifact, AudioResolver, FolderResolver};
