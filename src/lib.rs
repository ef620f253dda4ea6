pub mod backup;
pub mod device;
pub mod duration;
pub mod error;
pub mod library;
pub mod logging;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod settings;

// Re-export main types for convenience
pub use backup::LocalBackup;
pub use device::{AdbBridge, CopyResults, DeviceBridge, Phone};
pub use duration::{format_duration, format_time_delta};
pub use error::{
    BackupError, DatabaseError, DeviceError, EpisodeLoadError, FolderError, ProbeError, ProcessError, ScanError,
    SelectionError, SettingsError,
};
pub use library::{
    BatchRequest, LoftyProbe, PodcastDatabase, Priority, SelectedEpisode, Show, get_batch_of_podcast_files,
    validate_podcast_folders,
};
pub use process::{AudioProcessor, FfmpegProcessor, ProcessJob, ProcessOptions, process_episodes};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use settings::Settings;
