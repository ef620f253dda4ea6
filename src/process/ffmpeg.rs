// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::prelude::*;
use lofty::tag::Tag;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ProcessError;

use super::{AudioProcessor, ProcessJob};

/// Target integrated loudness passed to ffmpeg's `loudnorm`
const LOUDNESS_TARGET: f32 = -10.0;

/// Marker inserted into the file name while ffmpeg writes the output
const PARTIAL_MARKER: &str = "partial";

/// Normalizes loudness, applies the playback speed and tags episodes using ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    ffmpeg: PathBuf,
    dry_run: bool,
}

impl FfmpegProcessor {
    pub fn new(dry_run: bool) -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            dry_run,
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    async fn archive(&self, source: &Path, archive: &Path) -> Result<(), ProcessError> {
        let archive_error = |e| ProcessError::ArchiveFailed {
            path: archive.to_path_buf(),
            source: e,
        };

        if let Some(parent) = archive.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(archive_error)?;
        }
        tokio::fs::copy(source, archive).await.map_err(archive_error)?;
        debug!("Archived {} to {}", source.display(), archive.display());
        Ok(())
    }

    async fn run_ffmpeg(&self, job: &ProcessJob, output: &Path) -> Result<(), ProcessError> {
        let result = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(&job.source)
            .arg("-af")
            .arg(audio_filter(job.speed))
            .arg(output)
            .output()
            .await
            .map_err(|e| ProcessError::SpawnFailed {
                path: job.source.clone(),
                source: e,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ProcessError::FfmpegFailed {
                path: job.source.clone(),
                status: format!("{}: {}", result.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AudioProcessor for FfmpegProcessor {
    async fn process(&self, job: &ProcessJob) -> Result<(), ProcessError> {
        let title = generate_title(existing_title(&job.source).as_deref(), &job.file_name(), &job.title_prefix);

        if self.dry_run {
            info!(
                "Dry run: would prepare {} as '{}' in album '{}' at {}x and move it to {}",
                job.source.display(),
                title,
                job.album,
                job.speed,
                job.destination.display()
            );
            return Ok(());
        }

        if let Some(archive) = &job.archive_destination {
            self.archive(&job.source, archive).await?;
        }

        info!("Preparing audio file {}", job.source.display());
        let partial = partial_path(&job.destination);
        let converted = match self.run_ffmpeg(job, &partial).await {
            Ok(()) => write_tags(&partial, &job.album, &title),
            Err(e) => Err(e),
        };
        if let Err(e) = converted {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, &job.destination)
            .await
            .map_err(|e| ProcessError::MoveFailed {
                path: job.destination.clone(),
                source: e,
            })?;
        tokio::fs::remove_file(&job.source)
            .await
            .map_err(|e| ProcessError::MoveFailed {
                path: job.source.clone(),
                source: e,
            })?;

        info!("Moved {} to {}", job.source.display(), job.destination.display());
        Ok(())
    }
}

/// ffmpeg audio filter chain for the given playback speed
///
/// Speeds within a hair of 1.0 skip `atempo` entirely.
pub fn audio_filter(speed: f32) -> String {
    let loudnorm = format!("loudnorm=I={LOUDNESS_TARGET}");
    if (speed - 1.0).abs() < 1e-3 {
        loudnorm
    } else {
        format!("{loudnorm},atempo={speed}")
    }
}

/// Title for the processed file: the prefix plus the current title, or the file name
pub fn generate_title(current_title: Option<&str>, file_name: &str, prefix: &str) -> String {
    match current_title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("{prefix}{title}"),
        None => format!("{prefix}{file_name}"),
    }
}

fn existing_title(path: &Path) -> Option<String> {
    let tagged = lofty::read_from_path(path).ok()?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag())?;
    tag.title().map(|t| t.into_owned())
}

fn write_tags(path: &Path, album: &str, title: &str) -> Result<(), ProcessError> {
    let tag_error = |e| ProcessError::TagFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let tagged = lofty::read_from_path(path).map_err(tag_error)?;
    let mut tag = tagged
        .primary_tag()
        .cloned()
        .unwrap_or_else(|| Tag::new(tagged.primary_tag_type()));

    tag.set_album(album.to_string());
    tag.set_title(title.to_string());
    tag.save_to_path(path, WriteOptions::default()).map_err(tag_error)
}

/// `dir/name.partial.ext`, keeping the extension so ffmpeg picks the container
fn partial_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match destination.extension() {
        Some(ext) => destination.with_file_name(format!("{stem}.{PARTIAL_MARKER}.{}", ext.to_string_lossy())),
        None => destination.with_file_name(format!("{stem}.{PARTIAL_MARKER}")),
    }
}
