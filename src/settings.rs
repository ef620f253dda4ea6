// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::Deserialize;

use crate::error::SettingsError;
use crate::library::{Archive, BatchRequest, DEFAULT_SPEED, Preprocess, Priority, Show};

/// Settings file used when none is given on the command line
pub const DEFAULT_SETTINGS_FILE: &str = "user_data/user_settings.json";

fn default_speed() -> f32 {
    DEFAULT_SPEED
}

/// One subscribed show as configured by the user
#[derive(Debug, Clone, Deserialize)]
pub struct ShowConfig {
    /// Folder relative to `podcast_folder`
    pub folder: PathBuf,
    pub priority: Priority,
    #[serde(default)]
    pub archive: bool,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub preprocess: Option<Preprocess>,
}

impl ShowConfig {
    pub fn to_show(&self) -> Show {
        Show::new(self.folder.clone(), self.priority)
            .with_archive(Archive::from(self.archive))
            .with_speed(self.speed)
            .with_preprocess(self.preprocess)
    }
}

/// User settings, read from a JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub android_phone_id: String,
    pub podcast_folder: PathBuf,
    pub processed_file_boarding_zone_folder: PathBuf,
    pub archive_folder: PathBuf,
    pub backup_folder: PathBuf,
    pub podcast_directory_on_phone: PathBuf,
    pub user_data_folder: PathBuf,
    pub num_oldest_episodes_to_add: usize,
    pub time_of_podcasts_to_add_in_hours: u32,
    #[serde(default)]
    pub shows: Vec<ShowConfig>,
    /// Episodes to always include in the next batch, keyed by show folder name
    #[serde(default)]
    pub specified_files: BTreeMap<String, Vec<PathBuf>>,
}

impl Settings {
    /// Read settings from `path` and create the folders they own
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings =
            serde_json::from_str(&contents).map_err(|e| SettingsError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        settings.create_folders()?;
        Ok(settings)
    }

    fn create_folders(&self) -> Result<(), SettingsError> {
        for folder in [&self.archive_folder, &self.backup_folder, &self.user_data_folder] {
            std::fs::create_dir_all(folder).map_err(|e| SettingsError::CreateDirectoryFailed {
                path: folder.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn shows(&self) -> Vec<Show> {
        self.shows.iter().map(ShowConfig::to_show).collect()
    }

    pub fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            duration_limit: TimeDelta::hours(i64::from(self.time_of_podcasts_to_add_in_hours)),
            num_oldest: self.num_oldest_episodes_to_add,
            required_files: self.specified_files.clone(),
        }
    }

    pub fn podcast_database(&self) -> PathBuf {
        self.user_data_folder.join("podcast.db")
    }

    pub fn podcast_history(&self) -> PathBuf {
        self.user_data_folder.join("history.txt")
    }

    pub fn podcast_stats(&self) -> PathBuf {
        self.user_data_folder.join("stats.txt")
    }

    /// History of transfers to the phone and of backup moves
    pub fn android_history(&self) -> PathBuf {
        self.user_data_folder.join("android_history.txt")
    }
}
