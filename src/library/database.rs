// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The podcast database: every configured show and its tracked episodes.
//!
//! The on-disk format is line oriented. The first line holds the number of
//! show blocks that follow; each block is the show folder, its next index
//! (or `None`), its episode count and then four lines per episode.

use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta};
use rand::Rng;
use tracing::{debug, info};

use crate::duration::format_duration;
use crate::error::{DatabaseError, SelectionError};

use super::episode::SelectedEpisode;
use super::priority::Priority;
use super::probe::DurationProbe;
use super::selection;
use super::show::{Show, ShowBlock, require_line};

/// Keyword the user must type to drop a persisted show nobody configures anymore
pub const REMOVE_KEYWORD: &str = "REMOVE";

/// What happened to one persisted show block during [`PodcastDatabase::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Matched,
    Removed,
    Unmatched(PathBuf),
}

#[derive(Debug)]
pub struct PodcastDatabase {
    root: PathBuf,
    shows: Vec<Show>,
    verbose: bool,
}

impl PodcastDatabase {
    /// Build a database over `shows`, rooted at the podcast folder `root`
    ///
    /// Fails if two shows share a folder; all duplicates are reported at once.
    /// `root` is made absolute so episode paths match across runs however the
    /// folder was spelled.
    pub fn new(root: impl AsRef<Path>, shows: Vec<Show>, verbose: bool) -> Result<Self, DatabaseError> {
        let duplicates: Vec<PathBuf> = {
            let mut seen = HashSet::new();
            shows
                .iter()
                .filter(|show| !seen.insert(show.folder()))
                .map(|show| show.folder().to_path_buf())
                .collect()
        };

        if !duplicates.is_empty() {
            return Err(DatabaseError::DuplicateFolders(duplicates));
        }

        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|e| DatabaseError::InvalidRoot {
            path: root.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            root,
            shows,
            verbose,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shows(&self) -> &[Show] {
        &self.shows
    }

    fn log(&self, message: &str) {
        if self.verbose {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }

    /// Load persisted show state from `path`
    ///
    /// Blocks for folders no configured show claims are offered to
    /// `user_input` for removal. Returns the number of shows loaded; a
    /// missing file loads nothing.
    pub fn load(
        &mut self,
        path: &Path,
        user_input: &mut dyn FnMut(&str) -> String,
    ) -> Result<usize, DatabaseError> {
        if !path.is_file() {
            self.log(&format!("{} isn't a file, not loading a database", path.display()));
            return Ok(0);
        }

        let file = File::open(path).map_err(|e| DatabaseError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = BufReader::new(file);

        let count = require_line(&mut reader, "show count")?;
        let count: usize = count.trim().parse().map_err(|_| DatabaseError::InvalidCount {
            what: "show count",
            value: count.clone(),
        })?;
        self.log(&format!("Loading {} podcasts from {}", count, path.display()));

        let mut loaded = 0;
        for _ in 0..count {
            match self.load_block(&mut reader, user_input)? {
                BlockOutcome::Matched => loaded += 1,
                BlockOutcome::Removed => {}
                BlockOutcome::Unmatched(folder) => {
                    return Err(DatabaseError::UnmatchedShow { folder });
                }
            }
        }

        Ok(loaded)
    }

    /// Read one block and hand it to its show, or ask whether to drop it
    ///
    /// The block is parsed in full either way so the next one starts on the
    /// right line.
    pub fn load_block<R: BufRead>(
        &mut self,
        reader: &mut R,
        user_input: &mut dyn FnMut(&str) -> String,
    ) -> Result<BlockOutcome, DatabaseError> {
        let block = ShowBlock::read_from(reader)?;

        if let Some(show) = self.shows.iter_mut().find(|s| s.folder() == block.folder) {
            show.apply(block);
            return Ok(BlockOutcome::Matched);
        }

        let message = format!(
            "No match found for {}. Please type {} if you want to remove this podcast:\n",
            block.folder.display(),
            REMOVE_KEYWORD
        );
        if user_input(&message) == REMOVE_KEYWORD {
            info!("Removed {} from the database", block.folder.display());
            Ok(BlockOutcome::Removed)
        } else {
            Ok(BlockOutcome::Unmatched(block.folder))
        }
    }

    /// Write every show to `path`, ordered by folder
    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let write_error = |e| DatabaseError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::create(path).map_err(write_error)?;
        let mut writer = BufWriter::new(file);

        let mut shows: Vec<&Show> = self.shows.iter().collect();
        shows.sort_by(|a, b| a.folder().cmp(b.folder()));

        writeln!(writer, "{}", shows.len()).map_err(write_error)?;
        for show in shows {
            show.save(&mut writer).map_err(write_error)?;
        }
        writer.flush().map_err(write_error)?;

        self.log(&format!("Saved {} podcasts to {}", self.shows.len(), path.display()));
        Ok(())
    }

    /// Reconcile every show with the filesystem
    ///
    /// Shows whose folder is gone are dropped; `Skip` shows are left alone.
    pub fn update_podcasts(
        &mut self,
        probe: &dyn DurationProbe,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), DatabaseError> {
        let root = self.root.clone();
        self.shows.retain(|show| {
            let present = root.join(show.folder()).is_dir();
            if !present {
                info!("Dropping {}, its folder is gone", show.folder().display());
            }
            present
        });

        for show in &mut self.shows {
            if show.priority().is_skip() {
                info!("Skipping {}", show);
                continue;
            }
            show.scan_for_updates(&root, probe, confirm)?;
        }

        Ok(())
    }

    /// Selectable shows, tier by tier, ordered by folder within a tier
    pub fn shows_by_priority(&self) -> Vec<&Show> {
        let mut grouped: BTreeMap<Priority, Vec<&Show>> = BTreeMap::new();
        for show in &self.shows {
            grouped.entry(show.priority()).or_default().push(show);
        }

        Priority::tiers()
            .flat_map(|tier| {
                let mut shows = grouped.remove(&tier).unwrap_or_default();
                shows.sort_by(|a, b| a.folder().cmp(b.folder()));
                shows
            })
            .collect()
    }

    /// Append one dated backlog summary line to the history file at `path`
    pub fn update_remaining_time(
        &self,
        path: &Path,
        date: Option<NaiveDateTime>,
        files_to_ignore: &HashSet<PathBuf>,
    ) -> Result<(), DatabaseError> {
        let date = date.unwrap_or_else(|| Local::now().naive_local());
        let shows = self.shows_by_priority();

        let remaining_episodes: usize = shows
            .iter()
            .map(|show| show.remaining_episodes(files_to_ignore).len())
            .sum();
        let remaining_duration: u64 = shows
            .iter()
            .map(|show| show.remaining_time(files_to_ignore))
            .sum();

        let stats_error = |e| DatabaseError::StatsFailed {
            path: path.to_path_buf(),
            source: e,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(stats_error)?;

        writeln!(
            file,
            "As of {}, the podcast episode backlog is {} episodes with total duration {}",
            date.format("%Y-%m-%d %H:%M:%S"),
            remaining_episodes,
            format_duration(remaining_duration)
        )
        .map_err(stats_error)
    }

    /// Rewrite the per-show backlog breakdown at `path`
    pub fn log_stats(&self, path: &Path, files_to_ignore: &HashSet<PathBuf>) -> Result<(), DatabaseError> {
        let stats_error = |e| DatabaseError::StatsFailed {
            path: path.to_path_buf(),
            source: e,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(stats_error)?);

        for show in self.shows_by_priority() {
            let remaining = show.remaining_episodes(files_to_ignore).len() as u64;
            if remaining == 0 {
                continue;
            }
            let total = show.remaining_time(files_to_ignore);

            writeln!(
                writer,
                "{}: total duration of {}, {} episodes, {} long on average",
                show.folder().display(),
                format_duration(total),
                remaining,
                format_duration(total / remaining)
            )
            .map_err(stats_error)?;
        }

        writer.flush().map_err(stats_error)
    }

    pub fn get_oldest_files(&self, count: usize, files_to_ignore: &HashSet<PathBuf>) -> Vec<SelectedEpisode> {
        selection::get_oldest_files(&self.shows, count, files_to_ignore)
    }

    pub fn get_podcast_episodes_by_priority<R: Rng + ?Sized>(
        &self,
        duration_limit: TimeDelta,
        user_prompt: &mut dyn FnMut(&str) -> bool,
        files_to_ignore: &HashSet<PathBuf>,
        rng: &mut R,
    ) -> Vec<SelectedEpisode> {
        selection::get_podcast_episodes_by_priority(&self.shows, duration_limit, user_prompt, files_to_ignore, rng)
    }

    pub fn get_specified_files(
        &self,
        specified_files: &BTreeMap<String, Vec<PathBuf>>,
        files_to_ignore: &HashSet<PathBuf>,
    ) -> Result<Vec<SelectedEpisode>, SelectionError> {
        selection::get_specified_files(&self.root, &self.shows, specified_files, files_to_ignore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EpisodeLoadError;
    use crate::library::probe::FixedProbe;
    use crate::library::show::test_support::{always, create_show_folder, touch};
    use chrono::NaiveDate;
    use std::io::Cursor;
    use tempfile::tempdir;

    const LENGTH: u64 = 9;

    fn never_remove() -> impl FnMut(&str) -> String {
        |_: &str| String::new()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn duplicate_folders_are_rejected() {
        let result = PodcastDatabase::new(
            "root",
            vec![
                Show::new("a", Priority::P0),
                Show::new("b", Priority::P1),
                Show::new("a", Priority::P2),
                Show::new("b", Priority::Skip),
                Show::new("c", Priority::P0),
            ],
            false,
        );

        match result {
            Err(DatabaseError::DuplicateFolders(folders)) => {
                assert_eq!(folders, vec![PathBuf::from("a"), PathBuf::from("b")]);
            }
            other => panic!("expected duplicate folders, got {other:?}"),
        }
    }

    #[test]
    fn root_is_made_absolute() {
        let dir = tempdir().unwrap();
        let db = PodcastDatabase::new(dir.path().join(".").join("podcasts"), vec![], false).unwrap();
        assert_eq!(db.root(), dir.path().join("podcasts"));

        let db = PodcastDatabase::new("podcasts", vec![], false).unwrap();
        assert_eq!(db.root(), std::env::current_dir().unwrap().join("podcasts"));
    }

    #[test]
    fn differently_spelled_root_keeps_indices() {
        let dir = tempfile::tempdir_in(".").unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        create_show_folder(dir.path(), "show", &["1.mp3", "2.mp3"], 666);
        let db_path = dir.path().join("podcast.db");

        let mut db = PodcastDatabase::new(&relative, vec![Show::new("show", Priority::P0)], false).unwrap();
        db.update_podcasts(&FixedProbe(LENGTH), &mut always(true)).unwrap();
        db.save(&db_path).unwrap();

        let mut db = PodcastDatabase::new(
            Path::new(".").join(&relative),
            vec![Show::new("show", Priority::P0)],
            false,
        )
        .unwrap();
        db.load(&db_path, &mut never_remove()).unwrap();
        db.update_podcasts(&FixedProbe(LENGTH), &mut |_: &str| -> bool { panic!("no new episodes expected") })
            .unwrap();

        let indices: Vec<u32> = db.shows()[0].episodes().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(db.shows()[0].next_index(), Some(3));
    }

    #[test]
    fn oversized_duration_fails_the_load() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("podcast.db");
        std::fs::write(&db_path, "1\nknown\n2\n1\nknown/a.mp3\n1\n100000000000000000\n666\n").unwrap();

        let mut db = PodcastDatabase::new(dir.path(), vec![Show::new("known", Priority::P0)], false).unwrap();
        let result = db.load(&db_path, &mut never_remove());
        assert!(matches!(
            result,
            Err(DatabaseError::Episode { folder, source: EpisodeLoadError::OutOfRange { field: "duration", .. } })
                if folder == PathBuf::from("known")
        ));
        assert!(db.get_oldest_files(1, &HashSet::new()).is_empty());
    }

    #[test]
    fn missing_database_file_loads_nothing() {
        let dir = tempdir().unwrap();
        let mut db = PodcastDatabase::new(dir.path(), vec![Show::new("a", Priority::P0)], false).unwrap();
        assert_eq!(db.load(&dir.path().join("missing.db"), &mut never_remove()).unwrap(), 0);
    }

    #[test]
    fn save_empty_and_single_show() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("podcast.db");

        let db = PodcastDatabase::new(dir.path(), vec![], false).unwrap();
        db.save(&db_path).unwrap();
        assert_eq!(read(&db_path), "0\n");

        let db = PodcastDatabase::new(dir.path(), vec![Show::new("known_folder", Priority::P0)], false).unwrap();
        db.save(&db_path).unwrap();
        assert_eq!(read(&db_path), "1\nknown_folder\nNone\n0\n");
    }

    #[test]
    fn save_orders_by_folder_and_reloads() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "b_show", &["1.mp3", "2.mp3"], 666);
        create_show_folder(root.path(), "a_show", &["1.mp3"], 1666);

        let shows = || vec![Show::new("b_show", Priority::P1), Show::new("a_show", Priority::P0)];
        let mut db = PodcastDatabase::new(root.path(), shows(), false).unwrap();
        db.update_podcasts(&FixedProbe(LENGTH), &mut always(true)).unwrap();

        let db_path = root.path().join("podcast.db");
        db.save(&db_path).unwrap();
        let text = read(&db_path);
        assert!(text.starts_with("2\na_show\n2\n1\n"));
        assert!(text.find("b_show\n3\n2\n").unwrap() > text.find("a_show").unwrap());

        let mut reloaded = PodcastDatabase::new(root.path(), shows(), false).unwrap();
        assert_eq!(reloaded.load(&db_path, &mut never_remove()).unwrap(), 2);

        let again = root.path().join("again.db");
        reloaded.save(&again).unwrap();
        assert_eq!(read(&again), text);
    }

    #[test]
    fn unmatched_block_can_be_removed() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("podcast.db");
        std::fs::write(
            &db_path,
            "2\ngone\n4\n1\ngone/a.mp3\n3\n9\n666\nknown\n2\n0\n",
        )
        .unwrap();

        let mut db = PodcastDatabase::new(dir.path(), vec![Show::new("known", Priority::P0)], false).unwrap();
        let mut prompts = Vec::new();
        let loaded = db
            .load(&db_path, &mut |message: &str| {
                prompts.push(message.to_string());
                REMOVE_KEYWORD.to_string()
            })
            .unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(db.shows()[0].next_index(), Some(2));
        assert_eq!(
            prompts,
            vec!["No match found for gone. Please type REMOVE if you want to remove this podcast:\n".to_string()]
        );
    }

    #[test]
    fn unmatched_block_without_keyword_is_fatal() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("podcast.db");
        std::fs::write(&db_path, "1\ngone\nNone\n0\n").unwrap();

        let mut db = PodcastDatabase::new(dir.path(), vec![Show::new("known", Priority::P0)], false).unwrap();
        let result = db.load(&db_path, &mut |_: &str| "remove".to_string());
        assert!(matches!(result, Err(DatabaseError::UnmatchedShow { folder }) if folder == PathBuf::from("gone")));
    }

    #[test]
    fn load_block_reports_three_outcomes() {
        let mut db = PodcastDatabase::new("root", vec![Show::new("known", Priority::P0)], false).unwrap();

        let outcome = db
            .load_block(&mut Cursor::new("known\n5\n0\n"), &mut never_remove())
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Matched);

        let outcome = db
            .load_block(&mut Cursor::new("other\nNone\n0\n"), &mut |_: &str| REMOVE_KEYWORD.to_string())
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Removed);

        let outcome = db
            .load_block(&mut Cursor::new("other\nNone\n0\n"), &mut never_remove())
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Unmatched(PathBuf::from("other")));
    }

    #[test]
    fn truncated_database_is_an_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("podcast.db");
        std::fs::write(&db_path, "2\nknown\nNone\n0\n").unwrap();

        let mut db = PodcastDatabase::new(dir.path(), vec![Show::new("known", Priority::P0)], false).unwrap();
        let result = db.load(&db_path, &mut never_remove());
        assert!(matches!(result, Err(DatabaseError::MissingLine { .. })));
    }

    #[test]
    fn update_drops_missing_folders_and_skips_skip_shows() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "present", &["1.mp3"], 666);
        create_show_folder(root.path(), "skipped", &["1.mp3"], 666);

        let mut db = PodcastDatabase::new(
            root.path(),
            vec![
                Show::new("present", Priority::P0),
                Show::new("missing", Priority::P0),
                Show::new("skipped", Priority::Skip),
            ],
            true,
        )
        .unwrap();
        db.update_podcasts(&FixedProbe(LENGTH), &mut always(true)).unwrap();

        let folders: Vec<_> = db.shows().iter().map(|s| s.folder().to_path_buf()).collect();
        assert_eq!(folders, vec![PathBuf::from("present"), PathBuf::from("skipped")]);
        assert_eq!(db.shows()[0].episodes().len(), 1);
        assert!(db.shows()[1].episodes().is_empty());
    }

    #[test]
    fn shows_by_priority_orders_tiers_then_folders() {
        let db = PodcastDatabase::new(
            "root",
            vec![
                Show::new("z", Priority::P1),
                Show::new("y", Priority::P0),
                Show::new("skip", Priority::Skip),
                Show::new("b", Priority::P1),
                Show::new("a", Priority::P2),
            ],
            false,
        )
        .unwrap();

        let folders: Vec<_> = db.shows_by_priority().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(folders, vec!["y", "b", "z", "a"]);
    }

    #[test]
    fn remaining_time_history_line() {
        let root = tempdir().unwrap();
        let paths = create_show_folder(root.path(), "show", &["1.mp3", "2.mp3", "3.mp3"], 666);
        let mut db = PodcastDatabase::new(root.path(), vec![Show::new("show", Priority::P0)], false).unwrap();
        db.update_podcasts(&FixedProbe(3600), &mut always(true)).unwrap();

        let history = root.path().join("history.txt");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 5, 9)
            .unwrap();

        db.update_remaining_time(&history, Some(date), &HashSet::new()).unwrap();
        db.update_remaining_time(&history, Some(date), &HashSet::from([paths[0].clone()]))
            .unwrap();

        assert_eq!(
            read(&history),
            "As of 2024-03-01 08:05:09, the podcast episode backlog is 3 episodes with total duration 3h\n\
             As of 2024-03-01 08:05:09, the podcast episode backlog is 2 episodes with total duration 2h\n"
        );
    }

    #[test]
    fn stats_skip_empty_shows() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "busy", &["1.mp3", "2.mp3"], 666);
        std::fs::create_dir(root.path().join("empty")).unwrap();
        let lonely = create_show_folder(root.path(), "lonely", &["1.mp3"], 666);

        let mut db = PodcastDatabase::new(
            root.path(),
            vec![
                Show::new("busy", Priority::P1),
                Show::new("empty", Priority::P0),
                Show::new("lonely", Priority::P0),
            ],
            false,
        )
        .unwrap();
        db.update_podcasts(&FixedProbe(90), &mut always(true)).unwrap();

        let stats = root.path().join("stats.txt");
        db.log_stats(&stats, &HashSet::new()).unwrap();
        assert_eq!(
            read(&stats),
            "lonely: total duration of 1m30s, 1 episodes, 1m30s long on average\n\
             busy: total duration of 3m, 2 episodes, 1m30s long on average\n"
        );

        db.log_stats(&stats, &HashSet::from([lonely[0].clone()])).unwrap();
        assert_eq!(
            read(&stats),
            "busy: total duration of 3m, 2 episodes, 1m30s long on average\n"
        );
    }

    #[test]
    fn selection_entry_points_use_root() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["1.mp3", "2.mp3"], 666);
        touch(&root.path().join("show").join("3.mp3"), 10);

        let mut db = PodcastDatabase::new(root.path(), vec![Show::new("show", Priority::P0)], false).unwrap();
        db.update_podcasts(&FixedProbe(LENGTH), &mut always(true)).unwrap();

        let oldest = db.get_oldest_files(1, &HashSet::new());
        assert_eq!(oldest[0].file_name(), "3.mp3");
        assert_eq!(oldest[0].index, 1);

        let wanted = BTreeMap::from([("show".to_string(), vec![PathBuf::from("2.mp3")])]);
        let specified = db.get_specified_files(&wanted, &HashSet::new()).unwrap();
        assert_eq!(specified[0].file_name(), "2.mp3");
    }
}
