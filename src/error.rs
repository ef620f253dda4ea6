// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding a single persisted episode record
#[derive(Error, Debug)]
pub enum EpisodeLoadError {
    #[error("Episode record ended before its {field} line")]
    MissingField { field: &'static str },

    #[error("Failed to load {field} for episode, got '{value}': {source}")]
    InvalidField {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Failed to load {field} for episode, {value} is out of range")]
    OutOfRange { field: &'static str, value: String },

    #[error("Failed to read episode record: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading audio durations
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to read audio file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("File with unknown duration: {0}")]
    UnknownDuration(PathBuf),
}

/// Errors raised while scanning a show folder for new or removed episodes
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read modification time of {path}: {source}")]
    StatFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename {path}: {source}")]
    RenameFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown file type '{extension}' for file {path}, please teach the scanner about it")]
    UnknownFileType { path: PathBuf, extension: String },

    #[error("Doubled file? {0}")]
    DoubledFile(PathBuf),

    #[error("Indexing was not initialized for {folder}")]
    IndexingDeclined { folder: PathBuf },

    #[error("No episode index left for {folder}")]
    IndexExhausted { folder: PathBuf },

    #[error("Duration of {seconds}s for {path} is out of range")]
    DurationOutOfRange { path: PathBuf, seconds: u64 },

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Errors raised while loading, saving or reconciling the podcast database
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Found duplicate show folders: {0:?}")]
    DuplicateFolders(Vec<PathBuf>),

    #[error("Failed to resolve podcast folder {path}: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read database {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write database {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read database stream: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Database ended before the {what} line")]
    MissingLine { what: &'static str },

    #[error("Invalid {what} '{value}' in database")]
    InvalidCount { what: &'static str, value: String },

    #[error("Invalid next index '{value}' for show {folder}")]
    InvalidNextIndex { folder: PathBuf, value: String },

    #[error("Failed to load episode of show {folder}: {source}")]
    Episode {
        folder: PathBuf,
        #[source]
        source: EpisodeLoadError,
    },

    #[error("Failed to load {folder}: no configured show matches it")]
    UnmatchedShow { folder: PathBuf },

    #[error("Failed to write stats file {path}: {source}")]
    StatsFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Errors raised while resolving explicitly requested episodes
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Given show path, {0}, doesn't exist")]
    UnknownShow(String),

    #[error("File, {episode}, doesn't exist for show {show}")]
    UnknownEpisode { show: String, episode: PathBuf },
}

/// Errors raised while loading the settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised when the podcast root holds folders no show claims
#[derive(Error, Debug)]
pub enum FolderError {
    #[error("Failed to read podcast root {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} unknown folders, please configure them: {folders:?}", .folders.len())]
    UnknownFolders { folders: Vec<PathBuf> },
}

/// Errors raised while preparing an episode for the phone
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to archive {path}: {source}")]
    ArchiveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run ffmpeg for {path}: {source}")]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {status} for {path}")]
    FfmpegFailed { path: PathBuf, status: String },

    #[error("Failed to tag {path}: {source}")]
    TagFailed {
        path: PathBuf,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("Failed to move {path}: {source}")]
    MoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} source files were not removed after processing", .0.len())]
    SourcesLeftBehind(Vec<PathBuf>),
}

/// Errors raised by the phone bridge
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to run adb: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed to query podcast episodes on phone, android output:\n{output}")]
    QueryFailed { output: String },

    #[error("Failed to write history file {path}: {source}")]
    HistoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while moving files into, or pruning, the local backup
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to move {path} into backup: {source}")]
    MoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read backup folder {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path} from backup: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write history file {path}: {source}")]
    HistoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
