// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod ffmpeg;
mod pool;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::library::{Archive, SelectedEpisode};

pub use ffmpeg::{FfmpegProcessor, audio_filter, generate_title};
pub use pool::{ProcessOptions, ProcessResult, default_worker_count, process_episodes};

/// Everything needed to turn one library file into a phone-ready file
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessJob {
    pub source: PathBuf,
    /// Final location inside the boarding zone
    pub destination: PathBuf,
    /// Where to keep an untouched copy, for shows that archive
    pub archive_destination: Option<PathBuf>,
    pub album: String,
    /// Prepended to the episode title, e.g. `0042_`
    pub title_prefix: String,
    pub speed: f32,
}

impl ProcessJob {
    pub fn for_episode(episode: &SelectedEpisode, boarding_zone: &Path, archive_folder: &Path) -> Self {
        let file_name = episode.file_name();

        let album = episode
            .path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| episode.show_name.clone());

        let title_prefix = if episode.index > 0 {
            format!("{:04}_", episode.index)
        } else {
            String::new()
        };

        let archive_destination = match episode.archive {
            Archive::Yes => Some(archive_folder.join(&episode.show_name).join(file_name)),
            Archive::No => None,
        };

        Self {
            source: episode.path.clone(),
            destination: boarding_zone.join(file_name),
            archive_destination,
            album,
            title_prefix,
            speed: episode.speed,
        }
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Converts a single episode; implementations must remove the source on success
#[async_trait]
pub trait AudioProcessor: Send + Sync {
    async fn process(&self, job: &ProcessJob) -> Result<(), ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn episode(index: u32, archive: Archive) -> SelectedEpisode {
        SelectedEpisode {
            index,
            path: PathBuf::from("/podcasts/Some Show/episode 7.mp3"),
            show_name: "Some Show".to_string(),
            speed: 1.2,
            archive,
            modification_time: 666,
            duration: TimeDelta::seconds(9),
        }
    }

    #[test]
    fn job_for_archived_episode() {
        let job = ProcessJob::for_episode(
            &episode(42, Archive::Yes),
            Path::new("/boarding"),
            Path::new("/archive"),
        );

        assert_eq!(
            job,
            ProcessJob {
                source: PathBuf::from("/podcasts/Some Show/episode 7.mp3"),
                destination: PathBuf::from("/boarding/episode 7.mp3"),
                archive_destination: Some(PathBuf::from("/archive/Some Show/episode 7.mp3")),
                album: "Some Show".to_string(),
                title_prefix: "0042_".to_string(),
                speed: 1.2,
            }
        );
        assert_eq!(job.file_name(), "episode 7.mp3");
    }

    #[test]
    fn job_without_archive_or_index() {
        let job = ProcessJob::for_episode(
            &episode(0, Archive::No),
            Path::new("/boarding"),
            Path::new("/archive"),
        );

        assert_eq!(job.archive_destination, None);
        assert_eq!(job.title_prefix, "");
    }
}
