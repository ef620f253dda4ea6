// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use lofty::prelude::*;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::DeviceError;
use crate::library::modified_time;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Phone access abstraction for testability
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Identifier of the phone, as shown to the user
    fn name(&self) -> &str;

    async fn is_connected(&self) -> Result<bool, DeviceError>;

    /// Copy `local` to `remote` on the phone, returning whether it succeeded
    async fn push(&self, local: &Path, remote: &str) -> Result<bool, DeviceError>;

    /// File names in the phone directory `remote`
    async fn list_directory(&self, remote: &str) -> Result<Vec<String>, DeviceError>;
}

/// Talks to an Android phone through the `adb` command line tool
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb: PathBuf,
    serial: String,
}

impl AdbBridge {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            adb: PathBuf::from("adb"),
            serial: serial.into(),
        }
    }

    pub fn with_adb(mut self, adb: impl Into<PathBuf>) -> Self {
        self.adb = adb.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, DeviceError> {
        Command::new(&self.adb)
            .args(args)
            .output()
            .await
            .map_err(DeviceError::SpawnFailed)
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    fn name(&self) -> &str {
        &self.serial
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        let output = self.run(&["devices"]).await?;
        Ok(output.status.success() && device_listed(&String::from_utf8_lossy(&output.stdout), &self.serial))
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<bool, DeviceError> {
        let local = local.to_string_lossy();
        let output = self.run(&["-s", self.serial.as_str(), "push", local.as_ref(), remote]).await?;
        if !output.status.success() {
            warn!(
                "adb push of {} failed: {}",
                local,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }

    async fn list_directory(&self, remote: &str) -> Result<Vec<String>, DeviceError> {
        let output = self.run(&["-s", self.serial.as_str(), "shell", "ls", remote]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            return Err(DeviceError::QueryFailed {
                output: format!("{}{}", stdout, String::from_utf8_lossy(&output.stderr)),
            });
        }

        Ok(parse_listing(&stdout))
    }
}

/// Whether `adb devices` output lists `serial` as an attached device
pub fn device_listed(devices_output: &str, serial: &str) -> bool {
    devices_output.lines().any(|line| {
        let mut parts = line.split_whitespace();
        parts.next() == Some(serial) && parts.next() == Some("device")
    })
}

/// File names from `ls` output, one per line; empty output means no files
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyResults {
    pub copied: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// The phone's podcast directory plus a history of what was copied there
pub struct Phone<B: DeviceBridge> {
    bridge: B,
    podcast_directory: String,
    history_file: PathBuf,
}

impl<B: DeviceBridge> Phone<B> {
    pub fn new(bridge: B, podcast_directory: impl Into<String>, history_file: impl Into<PathBuf>) -> Self {
        Self {
            bridge,
            podcast_directory: podcast_directory.into(),
            history_file: history_file.into(),
        }
    }

    /// Check for the phone, asking `retry` whether to look again when it is missing
    pub async fn connected(&self, retry: &mut dyn FnMut(&str) -> bool) -> Result<bool, DeviceError> {
        loop {
            if self.bridge.is_connected().await? {
                return Ok(true);
            }

            let message = format!("Didn't find phone ({}), try again?", self.bridge.name());
            if !retry(&message) {
                return Ok(false);
            }
        }
    }

    fn remote_path(&self, file: &Path) -> String {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.podcast_directory.trim_end_matches('/'), name)
    }

    /// Push `files` into the podcast directory, logging the batch to the history file first
    pub async fn copy_files(
        &self,
        files: &[PathBuf],
        reporter: &SharedProgressReporter,
    ) -> Result<CopyResults, DeviceError> {
        self.write_history(files)?;

        reporter.report(ProgressEvent::TransferStarting {
            total_to_transfer: files.len(),
        });

        let mut results = CopyResults::default();
        for file in files {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if self.bridge.push(file, &self.remote_path(file)).await? {
                info!("Successfully copied {} to phone", file.display());
                reporter.report(ProgressEvent::FileTransferred { file_name });
                results.copied.push(file.clone());
            } else {
                reporter.report(ProgressEvent::TransferFailed {
                    file_name,
                    error: "adb push failed".to_string(),
                });
                results.failed.push(file.clone());
            }
        }

        if !results.failed.is_empty() {
            warn!("Failed to copy {} files to phone", results.failed.len());
        }

        reporter.report(ProgressEvent::TransferCompleted {
            copied_count: results.copied.len(),
            failed_count: results.failed.len(),
        });

        Ok(results)
    }

    /// Names of the files currently in the phone's podcast directory
    pub async fn podcast_episodes(&self) -> Result<HashSet<String>, DeviceError> {
        Ok(self
            .bridge
            .list_directory(&self.podcast_directory)
            .await?
            .into_iter()
            .collect())
    }

    fn write_history(&self, files: &[PathBuf]) -> Result<(), DeviceError> {
        let history_error = |e| DeviceError::HistoryFailed {
            path: self.history_file.clone(),
            source: e,
        };

        let mut history = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_file)
            .map_err(history_error)?;

        writeln!(
            history,
            "Copying {} files to android at {}",
            files.len(),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )
        .map_err(history_error)?;

        for file in files {
            writeln!(history, "  {}", history_entry(file)).map_err(history_error)?;
        }
        Ok(())
    }
}

fn history_entry(file: &Path) -> String {
    let (album, title) = album_and_title(file);
    let downloaded = modified_time(file)
        .ok()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .map(|t| t.to_string())
        .unwrap_or_default();

    format!(
        "filename: \"{}\", podcast: \"{}\", title: \"{}\", download time: \"{}\"",
        file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
        album.unwrap_or_default(),
        title.unwrap_or_default(),
        downloaded
    )
}

fn album_and_title(file: &Path) -> (Option<String>, Option<String>) {
    let Ok(tagged) = lofty::read_from_path(file) else {
        return (None, None);
    };
    match tagged.primary_tag().or_else(|| tagged.first_tag()) {
        Some(tag) => (
            tag.album().map(|a| a.into_owned()),
            tag.title().map(|t| t.into_owned()),
        ),
        None => (None, None),
    }
}
