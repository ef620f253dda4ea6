// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde::{Deserialize, Deserializer, de};

/// Number of selectable priority tiers, `0` being the most important
pub const TIER_COUNT: u8 = 3;

/// Playback speed applied when a show does not configure one
pub const DEFAULT_SPEED: f32 = 1.55;

/// Selection priority of a show
///
/// Lower tiers are drained first. `Skip` shows are never scanned,
/// selected or counted in the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Tier(u8),
    Skip,
}

impl Priority {
    pub const P0: Priority = Priority::Tier(0);
    pub const P1: Priority = Priority::Tier(1);
    pub const P2: Priority = Priority::Tier(2);

    /// All selectable tiers in the order they are drained
    pub fn tiers() -> impl Iterator<Item = Priority> {
        (0..TIER_COUNT).map(Priority::Tier)
    }

    pub fn is_skip(self) -> bool {
        matches!(self, Priority::Skip)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Tier(tier) => write!(f, "{tier}"),
            Priority::Skip => write!(f, "skip"),
        }
    }
}

// Settings spell priorities as a plain tier number or the string "skip".
impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Tier(u64),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Tier(tier) if tier < u64::from(TIER_COUNT) => Ok(Priority::Tier(tier as u8)),
            Raw::Tier(tier) => Err(de::Error::custom(format!(
                "priority {tier} is out of range, expected 0..{TIER_COUNT} or \"skip\""
            ))),
            Raw::Word(word) if word.eq_ignore_ascii_case("skip") => Ok(Priority::Skip),
            Raw::Word(word) => Err(de::Error::custom(format!(
                "unknown priority \"{word}\", expected 0..{TIER_COUNT} or \"skip\""
            ))),
        }
    }
}

/// Whether processed episodes of a show are also copied into the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Archive {
    Yes,
    #[default]
    No,
}

impl From<bool> for Archive {
    fn from(value: bool) -> Self {
        if value { Archive::Yes } else { Archive::No }
    }
}

/// Folder fix-ups run before a show is scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocess {
    /// Rename extension-less files to `.mp3`, for feeds that stopped sending one
    AddMp3Suffix,
}
