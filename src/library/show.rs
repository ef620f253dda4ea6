// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, ScanError};

use super::episode::{EpisodeRecord, MAX_DURATION_SECONDS, SelectedEpisode, read_line};
use super::priority::{Archive, DEFAULT_SPEED, Preprocess, Priority};
use super::probe::DurationProbe;

/// Extensions that are tracked as episodes
const PODCAST_EXTENSIONS: &[&str] = &["mp3", "m4a"];

/// Extensions that are known to live next to episodes and are skipped
const IGNORED_EXTENSIONS: &[&str] = &["db", "jpg", "jpeg", "partial", "png"];

/// Marker left behind when a download tool saves the same episode twice
const DOUBLED_FILE_MARKER: &str = "(2)";

/// A show folder together with the episodes tracked for it
#[derive(Debug, Clone)]
pub struct Show {
    folder: PathBuf,
    name: String,
    priority: Priority,
    archive: Archive,
    speed: f32,
    preprocess: Option<Preprocess>,
    episodes: Vec<EpisodeRecord>,
    next_index: Option<u32>,
}

impl Show {
    /// Create a show for `folder`, relative to the podcast root
    pub fn new(folder: impl Into<PathBuf>, priority: Priority) -> Self {
        let folder = folder.into();
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.to_string_lossy().into_owned());

        Self {
            folder,
            name,
            priority,
            archive: Archive::No,
            speed: DEFAULT_SPEED,
            preprocess: None,
            episodes: Vec::new(),
            next_index: None,
        }
    }

    pub fn with_archive(mut self, archive: Archive) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_preprocess(mut self, preprocess: Option<Preprocess>) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Last component of the folder, used to address the show in requests
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn archive(&self) -> Archive {
        self.archive
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    pub fn next_index(&self) -> Option<u32> {
        self.next_index
    }

    pub fn set_next_index(&mut self, next_index: Option<u32>) {
        self.next_index = next_index;
    }

    /// Reconcile the tracked episodes with the files in the show folder
    ///
    /// Episodes whose file disappeared are dropped. Files not yet tracked are
    /// added oldest first so indices follow download order. Returns the newly
    /// added paths in the order they were indexed.
    pub fn scan_for_updates(
        &mut self,
        root: &Path,
        probe: &dyn DurationProbe,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Vec<PathBuf>, ScanError> {
        info!("Scanning for updates for {}", self.folder.display());
        let full_folder = root.join(&self.folder);

        if let Some(preprocess) = self.preprocess {
            debug!("Running {:?} for {}", preprocess, self.folder.display());
            run_preprocess(preprocess, &full_folder)?;
        }

        let files_present = list_files(&full_folder)?;

        let before = self.episodes.len();
        self.episodes.retain(|episode| files_present.contains(&episode.path));
        if self.episodes.len() < before {
            debug!(
                "Dropped {} vanished episodes from {}",
                before - self.episodes.len(),
                self.folder.display()
            );
        }

        let known: HashSet<&Path> = self.episodes.iter().map(|e| e.path.as_path()).collect();

        let mut new_episodes = Vec::new();
        for path in files_present.iter().filter(|p| !known.contains(p.as_path())) {
            if !is_podcast_file(path)? {
                continue;
            }

            if path.to_string_lossy().contains(DOUBLED_FILE_MARKER) {
                return Err(ScanError::DoubledFile(path.clone()));
            }

            new_episodes.push((modified_time(path)?, path.clone()));
        }

        // Ties on modification time fall back to the path so repeated scans index identically.
        new_episodes.sort();

        let mut added = Vec::with_capacity(new_episodes.len());
        for (_, path) in new_episodes {
            self.add_episode(&path, probe, confirm)?;
            added.push(path);
        }

        Ok(added)
    }

    /// Start tracking `path` under the next free index
    ///
    /// The first episode of a show asks `confirm` before the index counter is
    /// initialized; refusing aborts the scan.
    pub fn add_episode(
        &mut self,
        path: &Path,
        probe: &dyn DurationProbe,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), ScanError> {
        let index = match self.next_index {
            Some(index) => index,
            None => {
                let message = format!("Initialize next_index to 1 for {}", self.folder.display());
                if !confirm(&message) {
                    return Err(ScanError::IndexingDeclined {
                        folder: self.folder.clone(),
                    });
                }
                1
            }
        };

        let next_index = index.checked_add(1).ok_or_else(|| ScanError::IndexExhausted {
            folder: self.folder.clone(),
        })?;

        let duration_seconds = probe.duration_seconds(path)?;
        if duration_seconds > MAX_DURATION_SECONDS {
            return Err(ScanError::DurationOutOfRange {
                path: path.to_path_buf(),
                seconds: duration_seconds,
            });
        }
        let modification_time = modified_time(path)?;

        self.episodes.push(EpisodeRecord {
            path: path.to_path_buf(),
            index,
            duration_seconds,
            modification_time,
        });
        self.next_index = Some(next_index);

        Ok(())
    }

    fn candidates<'a>(
        &'a self,
        files_to_ignore: &'a HashSet<PathBuf>,
    ) -> impl Iterator<Item = &'a EpisodeRecord> + 'a {
        self.episodes
            .iter()
            .filter(move |e| !files_to_ignore.contains(&e.path))
    }

    fn select(&self, episode: &EpisodeRecord) -> SelectedEpisode {
        SelectedEpisode {
            index: episode.index,
            path: episode.path.clone(),
            show_name: self.name.clone(),
            speed: self.speed,
            archive: self.archive,
            modification_time: episode.modification_time,
            duration: episode.duration(),
        }
    }

    /// Oldest episode not in `files_to_ignore`; ties keep list order
    pub fn first_episode(&self, files_to_ignore: &HashSet<PathBuf>) -> Option<SelectedEpisode> {
        self.candidates(files_to_ignore)
            .min_by_key(|e| e.modification_time)
            .map(|e| self.select(e))
    }

    pub fn remaining_episodes(&self, files_to_ignore: &HashSet<PathBuf>) -> Vec<SelectedEpisode> {
        self.candidates(files_to_ignore)
            .map(|e| self.select(e))
            .collect()
    }

    /// Summed duration in seconds of the episodes not in `files_to_ignore`
    pub fn remaining_time(&self, files_to_ignore: &HashSet<PathBuf>) -> u64 {
        self.candidates(files_to_ignore)
            .map(|e| e.duration_seconds)
            .sum()
    }

    pub fn get_episode(&self, path: &Path) -> Option<SelectedEpisode> {
        self.episodes
            .iter()
            .find(|e| e.path == path)
            .map(|e| self.select(e))
    }

    /// Write this show's block of the database file
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        ShowBlock::write_parts(writer, &self.folder, self.next_index, &self.episodes)
    }

    /// Load this show's state from a database block
    ///
    /// The block is always consumed. Returns `Ok(false)` when it belongs to
    /// another folder, leaving this show untouched.
    pub fn load<R: BufRead>(&mut self, reader: &mut R) -> Result<bool, DatabaseError> {
        let block = ShowBlock::read_from(reader)?;
        if block.folder != self.folder {
            warn!(
                "Attempted to load podcast {} into {}",
                block.folder.display(),
                self.folder.display()
            );
            return Ok(false);
        }

        self.apply(block);
        Ok(true)
    }

    pub(crate) fn apply(&mut self, block: ShowBlock) {
        self.next_index = block.next_index;
        self.episodes = block.episodes;
    }
}

impl std::fmt::Display for Show {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.folder.display())
    }
}

/// One show's persisted state, parsed before it is matched to a configured show
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShowBlock {
    pub folder: PathBuf,
    pub next_index: Option<u32>,
    pub episodes: Vec<EpisodeRecord>,
}

impl ShowBlock {
    fn write_parts<W: Write>(
        writer: &mut W,
        folder: &Path,
        next_index: Option<u32>,
        episodes: &[EpisodeRecord],
    ) -> io::Result<()> {
        writeln!(writer, "{}", folder.display())?;
        match next_index {
            Some(index) => writeln!(writer, "{index}")?,
            None => writeln!(writer, "None")?,
        }
        writeln!(writer, "{}", episodes.len())?;
        for episode in episodes {
            episode.write_to(writer)?;
        }
        Ok(())
    }

    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self, DatabaseError> {
        let folder = PathBuf::from(require_line(reader, "show folder")?.trim());

        let next_index = require_line(reader, "next index")?;
        let next_index = match next_index.trim() {
            "None" => None,
            value => Some(value.parse().map_err(|_| DatabaseError::InvalidNextIndex {
                folder: folder.clone(),
                value: value.to_string(),
            })?),
        };

        let count = require_line(reader, "episode count")?;
        let count: usize = count.trim().parse().map_err(|_| DatabaseError::InvalidCount {
            what: "episode count",
            value: count.clone(),
        })?;

        let mut episodes = Vec::with_capacity(count);
        for _ in 0..count {
            let episode = EpisodeRecord::read_from(reader).map_err(|e| DatabaseError::Episode {
                folder: folder.clone(),
                source: e,
            })?;
            episodes.push(episode);
        }

        Ok(Self {
            folder,
            next_index,
            episodes,
        })
    }
}

pub(crate) fn require_line<R: BufRead>(
    reader: &mut R,
    what: &'static str,
) -> Result<String, DatabaseError> {
    read_line(reader)?.ok_or(DatabaseError::MissingLine { what })
}

/// Decide whether a file in a show folder is an episode
///
/// Unknown extensions are an error so new media types are never silently skipped.
fn is_podcast_file(path: &Path) -> Result<bool, ScanError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if IGNORED_EXTENSIONS.contains(&extension.as_str()) {
        return Ok(false);
    }

    if !PODCAST_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ScanError::UnknownFileType {
            path: path.to_path_buf(),
            extension,
        });
    }

    Ok(true)
}

fn list_files(folder: &Path) -> Result<HashSet<PathBuf>, ScanError> {
    let read_dir_error = |e| ScanError::ReadDirectoryFailed {
        path: folder.to_path_buf(),
        source: e,
    };

    let mut files = HashSet::new();
    for entry in std::fs::read_dir(folder).map_err(read_dir_error)? {
        let entry = entry.map_err(read_dir_error)?;
        if entry.file_type().map_err(read_dir_error)?.is_file() {
            files.insert(entry.path());
        }
    }
    Ok(files)
}

/// Modification time of `path` in epoch seconds
pub fn modified_time(path: &Path) -> Result<i64, ScanError> {
    let stat_error = |e| ScanError::StatFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(stat_error)?;
    Ok(DateTime::<Utc>::from(modified).timestamp())
}

fn run_preprocess(preprocess: Preprocess, folder: &Path) -> Result<(), ScanError> {
    match preprocess {
        Preprocess::AddMp3Suffix => {
            for path in list_files(folder)? {
                if path.extension().is_some() {
                    continue;
                }
                let renamed = path.with_extension("mp3");
                std::fs::rename(&path, &renamed).map_err(|e| ScanError::RenameFailed {
                    path: path.clone(),
                    source: e,
                })?;
                info!("Renamed {} to {}", path.display(), renamed.display());
            }
            Ok(())
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::library::probe::FixedProbe;
    use chrono::TimeDelta;
    use std::io::Cursor;
    use tempfile::tempdir;

    const LENGTH: u64 = 9;

    fn saved(show: &Show) -> String {
        let mut out = Vec::new();
        show.save(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn scan_indexes_oldest_first() {
        let root = tempdir().unwrap();
        // Names sort opposite to age to prove ordering is by modification time.
        let dir = root.path().join("show");
        std::fs::create_dir(&dir).unwrap();
        let c = touch(&dir.join("a.mp3"), 3000);
        let b = touch(&dir.join("b.mp3"), 2000);
        let a = touch(&dir.join("c.mp3"), 1000);

        let mut show = Show::new("show", Priority::P0);
        let added = show
            .scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true))
            .unwrap();

        assert_eq!(added, vec![a.clone(), b.clone(), c.clone()]);
        let indices: Vec<_> = show.episodes().iter().map(|e| (e.path.clone(), e.index)).collect();
        assert_eq!(indices, vec![(a, 1), (b, 2), (c, 3)]);
        assert_eq!(show.next_index(), Some(4));
    }

    #[test]
    fn rescan_is_idempotent() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["1.mp3", "2.mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        let probe = FixedProbe(LENGTH);
        assert_eq!(show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap().len(), 2);
        let before = saved(&show);

        assert!(show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap().is_empty());
        assert_eq!(saved(&show), before);
    }

    #[test]
    fn indices_are_never_reused() {
        let root = tempdir().unwrap();
        let paths = create_show_folder(root.path(), "show", &["1.mp3", "2.mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        let probe = FixedProbe(LENGTH);
        show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap();

        std::fs::remove_file(&paths[1]).unwrap();
        show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap();
        assert_eq!(show.episodes().len(), 1);

        let replacement = touch(&root.path().join("show").join("3.mp3"), 5000);
        show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap();

        let added = show.get_episode(&replacement).unwrap();
        assert_eq!(added.index, 3);
        let mut indices: Vec<_> = show.episodes().iter().map(|e| e.index).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn declined_index_initialization_is_fatal() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["1.mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        let result = show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(false));

        assert!(matches!(result, Err(ScanError::IndexingDeclined { .. })));
        assert!(show.episodes().is_empty());
        assert_eq!(show.next_index(), None);
    }

    #[test]
    fn exhausted_index_counter_is_an_error() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["1.mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        show.set_next_index(Some(u32::MAX));
        let result = show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true));

        assert!(matches!(result, Err(ScanError::IndexExhausted { .. })));
        assert!(show.episodes().is_empty());
        assert_eq!(show.next_index(), Some(u32::MAX));
    }

    #[test]
    fn oversized_probed_duration_is_an_error() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["1.mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        let result = show.scan_for_updates(
            root.path(),
            &FixedProbe(MAX_DURATION_SECONDS + 1),
            &mut always(true),
        );

        assert!(matches!(result, Err(ScanError::DurationOutOfRange { .. })));
        assert!(show.episodes().is_empty());
    }

    #[test]
    fn index_prompt_is_only_asked_once() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["1.mp3", "2.mp3", "3.mp3"], 666);

        let mut asked = 0;
        let mut show = Show::new("show", Priority::P0);
        show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut |_: &str| {
            asked += 1;
            true
        })
        .unwrap();

        assert_eq!(asked, 1);
    }

    #[test]
    fn ignored_extensions_are_skipped() {
        let root = tempdir().unwrap();
        create_show_folder(
            root.path(),
            "show",
            &["cover.JPG", "Thumbs.db", "ep.mp3.partial", "ep.m4a"],
            666,
        );

        let mut show = Show::new("show", Priority::P0);
        let added = show
            .scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true))
            .unwrap();
        assert_eq!(added, vec![root.path().join("show").join("ep.m4a")]);
    }

    #[test]
    fn unknown_extension_is_fatal() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["episode.ogg"], 666);

        let mut show = Show::new("show", Priority::P0);
        let result = show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true));
        assert!(matches!(
            result,
            Err(ScanError::UnknownFileType { extension, .. }) if extension == "ogg"
        ));
    }

    #[test]
    fn doubled_file_is_fatal() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["episode (2).mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        let result = show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true));
        assert!(matches!(result, Err(ScanError::DoubledFile(_))));
    }

    #[test]
    fn preprocess_adds_mp3_suffix() {
        let root = tempdir().unwrap();
        create_show_folder(root.path(), "show", &["episode"], 666);

        let mut show = Show::new("show", Priority::P0).with_preprocess(Some(Preprocess::AddMp3Suffix));
        let added = show
            .scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true))
            .unwrap();

        let renamed = root.path().join("show").join("episode.mp3");
        assert_eq!(added, vec![renamed.clone()]);
        assert!(renamed.is_file());
    }

    #[test]
    fn first_episode_and_remaining_respect_ignores() {
        let root = tempdir().unwrap();
        let paths = create_show_folder(root.path(), "show", &["1.mp3", "2.mp3", "3.mp3"], 666);

        let mut show = Show::new("show", Priority::P0);
        show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true)).unwrap();

        let mut ignore = HashSet::new();
        for (i, path) in paths.iter().enumerate() {
            let first = show.first_episode(&ignore).unwrap();
            assert_eq!(&first.path, path);
            assert_eq!(first.index, i as u32 + 1);

            ignore.insert(first.path);
            let remaining = paths.len() - ignore.len();
            assert_eq!(show.remaining_episodes(&ignore).len(), remaining);
            assert_eq!(show.remaining_time(&ignore), remaining as u64 * LENGTH);
        }

        assert!(show.first_episode(&ignore).is_none());
        assert_eq!(show.remaining_time(&ignore), 0);
    }

    #[test]
    fn first_episode_tie_keeps_list_order() {
        let mut show = Show::new("show", Priority::P0);
        show.apply(ShowBlock {
            folder: PathBuf::from("show"),
            next_index: Some(3),
            episodes: vec![
                EpisodeRecord {
                    path: PathBuf::from("show/b.mp3"),
                    index: 1,
                    duration_seconds: 1,
                    modification_time: 10,
                },
                EpisodeRecord {
                    path: PathBuf::from("show/a.mp3"),
                    index: 2,
                    duration_seconds: 1,
                    modification_time: 10,
                },
            ],
        });

        let first = show.first_episode(&HashSet::new()).unwrap();
        assert_eq!(first.path, PathBuf::from("show/b.mp3"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let root = tempdir().unwrap();
        let dir = root.path().join("podcast");
        std::fs::create_dir(&dir).unwrap();

        let mut show = Show::new("podcast", Priority::P0);
        assert_eq!(saved(&show), "podcast\nNone\n0\n");

        let file = touch(&dir.join("podcast_1_c.mp3"), 1330712222);
        let probe = FixedProbe(LENGTH);
        assert_eq!(
            show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap(),
            vec![file.clone()]
        );

        let text = saved(&show);
        assert_eq!(
            text,
            format!("podcast\n2\n1\n{}\n1\n{LENGTH}\n1330712222\n", file.display())
        );

        let mut reloaded = Show::new("podcast", Priority::P0);
        assert!(reloaded.load(&mut Cursor::new(text)).unwrap());
        assert_eq!(reloaded.next_index(), show.next_index());
        assert_eq!(reloaded.episodes(), show.episodes());

        std::fs::remove_file(&file).unwrap();
        assert!(show.scan_for_updates(root.path(), &probe, &mut always(true)).unwrap().is_empty());
        assert_eq!(saved(&show), "podcast\n2\n0\n");
    }

    #[test]
    fn load_of_other_folder_returns_false() {
        let mut show = Show::new("podcast", Priority::P0);
        assert!(!show.load(&mut Cursor::new("bad_podcast\nNone\n0\n")).unwrap());
        assert!(show.episodes().is_empty());
    }

    #[test]
    fn load_reports_bad_episode_with_show() {
        let mut show = Show::new("podcast", Priority::P0);
        let result = show.load(&mut Cursor::new("podcast\n2\n1\npodcast/a.mp3\nx\n9\n1\n"));
        assert!(matches!(result, Err(DatabaseError::Episode { folder, .. }) if folder == PathBuf::from("podcast")));
    }

    #[test]
    fn get_episode_present_and_absent() {
        let root = tempdir().unwrap();
        let paths = create_show_folder(root.path(), "show", &["1.mp3"], 666);

        let mut show = Show::new("show", Priority::P1).with_speed(1.0).with_archive(Archive::Yes);
        show.scan_for_updates(root.path(), &FixedProbe(LENGTH), &mut always(true)).unwrap();

        let expected = SelectedEpisode {
            index: 1,
            path: paths[0].clone(),
            show_name: "show".to_string(),
            speed: 1.0,
            archive: Archive::Yes,
            modification_time: 666,
            duration: TimeDelta::seconds(LENGTH as i64),
        };
        assert_eq!(show.get_episode(&paths[0]), Some(expected));
        assert_eq!(show.get_episode(Path::new("fake_path")), None);
    }
}
