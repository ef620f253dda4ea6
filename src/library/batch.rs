// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::TimeDelta;
use rand::Rng;
use tracing::info;

use crate::duration::format_time_delta;
use crate::error::SelectionError;

use super::database::PodcastDatabase;
use super::episode::SelectedEpisode;

/// What a single run should move to the phone
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Listening time to aim for, including the oldest and requested episodes
    pub duration_limit: TimeDelta,
    pub num_oldest: usize,
    /// Episode names to include regardless of priority, keyed by show folder name
    pub required_files: BTreeMap<String, Vec<PathBuf>>,
}

/// Compose a batch: the oldest episodes, then the requested ones, then a
/// priority fill for whatever budget is left
///
/// The result keeps that concatenation order and never lists a file twice.
/// The oldest and requested episodes may overshoot the limit on their own, in
/// which case the priority fill adds nothing.
pub fn get_batch_of_podcast_files<R: Rng + ?Sized>(
    database: &PodcastDatabase,
    request: &BatchRequest,
    user_prompt: &mut dyn FnMut(&str) -> bool,
    rng: &mut R,
) -> Result<Vec<SelectedEpisode>, SelectionError> {
    let mut files = database.get_oldest_files(request.num_oldest, &HashSet::new());

    let ignore = collected_paths(&files);
    files.extend(database.get_specified_files(&request.required_files, &ignore)?);

    let time_so_far: TimeDelta = files.iter().map(|f| f.duration).sum();
    let priority_duration = request.duration_limit - time_so_far;
    info!(
        "{} episodes ({}) chosen before priority fill",
        files.len(),
        format_time_delta(time_so_far)
    );

    let ignore = collected_paths(&files);
    files.extend(database.get_podcast_episodes_by_priority(priority_duration, user_prompt, &ignore, rng));

    Ok(files)
}

fn collected_paths(files: &[SelectedEpisode]) -> HashSet<PathBuf> {
    files.iter().map(|f| f.path.clone()).collect()
}
