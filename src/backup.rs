// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::BackupError;

/// Local folder mirroring what is on the phone
#[derive(Debug, Clone)]
pub struct LocalBackup {
    folder: PathBuf,
    history_file: PathBuf,
}

impl LocalBackup {
    pub fn new(folder: impl Into<PathBuf>, history_file: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            history_file: history_file.into(),
        }
    }

    fn history(&self) -> Result<File, BackupError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_file)
            .map_err(|e| BackupError::HistoryFailed {
                path: self.history_file.clone(),
                source: e,
            })
    }

    fn log(&self, history: &mut File, line: &str) -> Result<(), BackupError> {
        writeln!(history, "{line}").map_err(|e| BackupError::HistoryFailed {
            path: self.history_file.clone(),
            source: e,
        })
    }

    /// Move `files` into the backup folder, returning their new paths
    pub fn move_files_to_backup(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, BackupError> {
        let mut history = self.history()?;
        let mut moved = Vec::with_capacity(files.len());

        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let destination = self.folder.join(name);
            move_file(file, &destination).map_err(|e| BackupError::MoveFailed {
                path: file.clone(),
                source: e,
            })?;

            self.log(&mut history, &format!("Copied {} to backup folder", file.display()))?;
            moved.push(destination);
        }

        Ok(moved)
    }

    /// Offer to delete backup files that are no longer on the phone
    ///
    /// Each candidate is confirmed through `user_prompt`. Returns the deleted paths.
    pub fn remove_unneeded_backup_files(
        &self,
        files_on_device: &HashSet<String>,
        user_prompt: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Vec<PathBuf>, BackupError> {
        let read_error = |e| BackupError::ReadFailed {
            path: self.folder.clone(),
            source: e,
        };

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(&self.folder).map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            if !entry.file_type().map_err(read_error)?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !files_on_device.contains(&name) {
                candidates.push((name, entry.path()));
            }
        }
        candidates.sort();

        let mut deleted = Vec::new();
        for (name, path) in candidates {
            if !user_prompt(&format!("{name} is no longer in the source, delete from backup")) {
                continue;
            }

            let mut history = self.history()?;
            self.log(
                &mut history,
                &format!(
                    "Deleting {} at {}",
                    path.display(),
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ),
            )?;

            std::fs::remove_file(&path).map_err(|e| BackupError::DeleteFailed {
                path: path.clone(),
                source: e,
            })?;
            info!("Deleted {} from backup", path.display());
            deleted.push(path);
        }

        Ok(deleted)
    }
}

/// Rename, falling back to copy and delete across filesystems
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}
