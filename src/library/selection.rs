// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Episode selection across shows.
//!
//! Three strategies feed a batch: the globally oldest episodes, episodes the
//! user asked for by name, and a priority-ordered fill up to a time budget.
//! All of them take a set of paths to leave out so the strategies can be
//! chained without picking the same file twice.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::duration::format_time_delta;
use crate::error::SelectionError;

use super::episode::SelectedEpisode;
use super::priority::Priority;
use super::show::Show;

/// The `count` oldest episodes across all selectable shows, oldest first
///
/// Stops short without error when the library runs out of episodes.
pub fn get_oldest_files(
    shows: &[Show],
    count: usize,
    files_to_ignore: &HashSet<PathBuf>,
) -> Vec<SelectedEpisode> {
    let mut ignore = files_to_ignore.clone();
    let mut oldest = Vec::with_capacity(count);

    while oldest.len() < count {
        let next = shows
            .iter()
            .filter(|show| !show.priority().is_skip())
            .filter_map(|show| show.first_episode(&ignore))
            .min_by_key(|episode| episode.modification_time);

        let Some(episode) = next else {
            info!(
                "Only found {} old episodes, when {} were requested",
                oldest.len(),
                count
            );
            break;
        };

        ignore.insert(episode.path.clone());
        oldest.push(episode);
    }

    oldest
}

/// Fill up to `duration_limit` with episodes, draining priority tiers in order
///
/// Within a tier the oldest episode wins, with ties between shows broken by
/// `rng`. When a tier runs dry before the limit is reached, `user_prompt`
/// decides whether to continue with the next tier.
pub fn get_podcast_episodes_by_priority<R: Rng + ?Sized>(
    shows: &[Show],
    duration_limit: TimeDelta,
    user_prompt: &mut dyn FnMut(&str) -> bool,
    files_to_ignore: &HashSet<PathBuf>,
    rng: &mut R,
) -> Vec<SelectedEpisode> {
    let mut ignore = files_to_ignore.clone();
    let mut selected: Vec<SelectedEpisode> = Vec::new();
    let mut total = TimeDelta::zero();

    let mut tiers = Priority::tiers();
    let mut current = tiers.next();

    while total < duration_limit {
        let Some(tier) = current else {
            break;
        };

        if let Some(picked) = pick_oldest_in_tier(shows, tier, &ignore, rng) {
            debug!("Picked {} from tier {}", picked.path.display(), tier);
            total += picked.duration;
            ignore.insert(picked.path.clone());
            selected.push(picked);
            continue;
        }

        current = tiers.next();
        let Some(next_tier) = current else {
            break;
        };

        let message = format!(
            "\nFinished adding podcasts with priority {}\nCurrently {} episodes with length {}\nContinue to priority {}?",
            tier,
            selected.len(),
            format_time_delta(total),
            next_tier
        );
        if !user_prompt(&message) {
            break;
        }
    }

    selected
}

fn pick_oldest_in_tier<R: Rng + ?Sized>(
    shows: &[Show],
    tier: Priority,
    files_to_ignore: &HashSet<PathBuf>,
    rng: &mut R,
) -> Option<SelectedEpisode> {
    let candidates: Vec<SelectedEpisode> = shows
        .iter()
        .filter(|show| show.priority() == tier)
        .filter_map(|show| show.first_episode(files_to_ignore))
        .collect();

    let oldest = candidates.iter().map(|c| c.modification_time).min()?;
    let tied: Vec<SelectedEpisode> = candidates
        .into_iter()
        .filter(|c| c.modification_time == oldest)
        .collect();

    tied.choose(rng).cloned()
}

/// Resolve explicitly requested episodes, keyed by show folder name
///
/// Episode names are resolved inside the show folder under `root`. An unknown
/// show or episode is an error; requested files already in `files_to_ignore`
/// are dropped silently.
pub fn get_specified_files(
    root: &Path,
    shows: &[Show],
    specified_files: &BTreeMap<String, Vec<PathBuf>>,
    files_to_ignore: &HashSet<PathBuf>,
) -> Result<Vec<SelectedEpisode>, SelectionError> {
    let mut ignore = files_to_ignore.clone();
    let mut files = Vec::new();

    for (show_key, episode_paths) in specified_files {
        let show_name = Path::new(show_key)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| show_key.clone());

        let show = shows
            .iter()
            .find(|show| show.name() == show_name)
            .ok_or_else(|| SelectionError::UnknownShow(show_name.clone()))?;

        for episode_path in episode_paths {
            let full_path = root.join(show.folder()).join(episode_path);
            let episode = show
                .get_episode(&full_path)
                .ok_or_else(|| SelectionError::UnknownEpisode {
                    show: show_name.clone(),
                    episode: episode_path.clone(),
                })?;

            if ignore.insert(episode.path.clone()) {
                files.push(episode);
            }
        }
    }

    Ok(files)
}
