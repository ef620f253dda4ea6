// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local, TimeDelta};

use crate::duration::format_duration;
use crate::error::EpisodeLoadError;

use super::priority::Archive;

/// Longest episode duration accepted, in seconds
///
/// Any realistic library summed at this length still fits a `TimeDelta`.
pub const MAX_DURATION_SECONDS: u64 = u32::MAX as u64;

/// One tracked episode file as persisted in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRecord {
    pub path: PathBuf,
    /// Per-show sequence number, assigned once and never reused
    pub index: u32,
    pub duration_seconds: u64,
    /// Modification time in epoch seconds
    pub modification_time: i64,
}

impl EpisodeRecord {
    /// Write the record as four lines: path, index, duration, modification time
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{}", self.path.display())?;
        writeln!(writer, "{}", self.index)?;
        writeln!(writer, "{}", self.duration_seconds)?;
        writeln!(writer, "{}", self.modification_time)
    }

    pub fn duration(&self) -> TimeDelta {
        i64::try_from(self.duration_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Read a record previously written with [`EpisodeRecord::write_to`]
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self, EpisodeLoadError> {
        let path = read_line(reader)?.ok_or(EpisodeLoadError::MissingField { field: "path" })?;
        let index = parse_field(reader, "index")?;
        let duration_seconds: u64 = parse_field(reader, "duration")?;
        if duration_seconds > MAX_DURATION_SECONDS {
            return Err(EpisodeLoadError::OutOfRange {
                field: "duration",
                value: duration_seconds.to_string(),
            });
        }
        let modification_time = parse_field(reader, "modification_time")?;

        Ok(Self {
            path: PathBuf::from(path),
            index,
            duration_seconds,
            modification_time,
        })
    }
}

impl std::fmt::Display for EpisodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:({})",
            self.path.display(),
            format_duration(self.duration_seconds)
        )
    }
}

fn parse_field<R: BufRead, T: std::str::FromStr<Err = std::num::ParseIntError>>(
    reader: &mut R,
    field: &'static str,
) -> Result<T, EpisodeLoadError> {
    let value = read_line(reader)?.ok_or(EpisodeLoadError::MissingField { field })?;
    value
        .trim()
        .parse()
        .map_err(|e| EpisodeLoadError::InvalidField { field, value, source: e })
}

/// Read one line without its terminator, `None` at end of stream
pub(crate) fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// An episode joined with the settings of the show it belongs to
///
/// This is what selection hands to the processing and transfer stages.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedEpisode {
    pub index: u32,
    pub path: PathBuf,
    pub show_name: String,
    pub speed: f32,
    pub archive: Archive,
    /// Modification time in epoch seconds
    pub modification_time: i64,
    pub duration: TimeDelta,
}

impl SelectedEpisode {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn modified_at(&self) -> Option<DateTime<Local>> {
        DateTime::from_timestamp(self.modification_time, 0).map(|dt| dt.with_timezone(&Local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record() -> EpisodeRecord {
        EpisodeRecord {
            path: PathBuf::from("known_folder/podcast_1.mp3"),
            index: 1,
            duration_seconds: 9,
            modification_time: 666,
        }
    }

    #[test]
    fn writes_four_lines() {
        let mut out = Vec::new();
        record().write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "known_folder/podcast_1.mp3\n1\n9\n666\n"
        );
    }

    #[test]
    fn write_and_read_roundtrip() {
        let mut out = Vec::new();
        record().write_to(&mut out).unwrap();
        let read_back = EpisodeRecord::read_from(&mut Cursor::new(out)).unwrap();
        assert_eq!(read_back, record());
    }

    #[test]
    fn roundtrip_keeps_unicode_paths() {
        let original = EpisodeRecord {
            path: PathBuf::from("show/podcast_élè.mp3"),
            ..record()
        };
        let mut out = Vec::new();
        original.write_to(&mut out).unwrap();
        assert_eq!(EpisodeRecord::read_from(&mut Cursor::new(out)).unwrap(), original);
    }

    #[test]
    fn bad_index_names_field() {
        let err = EpisodeRecord::read_from(&mut Cursor::new("a.mp3\nfoo\n9\n666\n")).unwrap_err();
        assert!(matches!(err, EpisodeLoadError::InvalidField { field: "index", .. }));
    }

    #[test]
    fn bad_duration_names_field() {
        let err = EpisodeRecord::read_from(&mut Cursor::new("a.mp3\n1\n9.5\n666\n")).unwrap_err();
        assert!(matches!(err, EpisodeLoadError::InvalidField { field: "duration", .. }));
    }

    #[test]
    fn oversized_duration_is_rejected() {
        let err = EpisodeRecord::read_from(&mut Cursor::new("a.mp3\n1\n100000000000000000\n666\n")).unwrap_err();
        assert!(matches!(err, EpisodeLoadError::OutOfRange { field: "duration", .. }));

        let longest = format!("a.mp3\n1\n{MAX_DURATION_SECONDS}\n666\n");
        let record = EpisodeRecord::read_from(&mut Cursor::new(longest)).unwrap();
        assert_eq!(record.duration(), TimeDelta::seconds(MAX_DURATION_SECONDS as i64));
    }

    #[test]
    fn bad_modification_time_names_field() {
        let err = EpisodeRecord::read_from(&mut Cursor::new("a.mp3\n1\n9\nnever\n")).unwrap_err();
        assert!(matches!(
            err,
            EpisodeLoadError::InvalidField { field: "modification_time", .. }
        ));
    }

    #[test]
    fn path_only_record_is_an_error() {
        let err = EpisodeRecord::read_from(&mut Cursor::new("a.mp3\n")).unwrap_err();
        assert!(matches!(err, EpisodeLoadError::MissingField { field: "index" }));
    }

    #[test]
    fn selected_episode_accessors() {
        let episode = SelectedEpisode {
            index: 3,
            path: PathBuf::from("/podcasts/show/episode_3.mp3"),
            show_name: "show".to_string(),
            speed: 1.0,
            archive: Archive::No,
            modification_time: 1330712222,
            duration: TimeDelta::seconds(9),
        };

        assert_eq!(episode.file_name(), "episode_3.mp3");
        assert_eq!(episode.modified_at().unwrap().timestamp(), 1330712222);
    }

    #[test]
    fn display_shows_duration() {
        assert_eq!(record().to_string(), "known_folder/podcast_1.mp3:(9s)");
    }
}
