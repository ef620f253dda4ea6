// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod batch;
mod database;
mod episode;
mod folders;
mod priority;
mod probe;
mod selection;
mod show;

pub use batch::{BatchRequest, get_batch_of_podcast_files};
pub use database::{BlockOutcome, PodcastDatabase, REMOVE_KEYWORD};
pub use episode::{EpisodeRecord, SelectedEpisode};
pub use folders::{find_unknown_folders, validate_podcast_folders};
pub use priority::{Archive, DEFAULT_SPEED, Preprocess, Priority, TIER_COUNT};
pub use probe::{DurationProbe, FixedProbe, LoftyProbe};
pub use selection::{get_oldest_files, get_podcast_episodes_by_priority, get_specified_files};
pub use show::{Show, modified_time};
