// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::FolderError;

use super::show::Show;

/// Directories directly under `root` that no show is configured for, sorted
pub fn find_unknown_folders(root: &Path, shows: &[Show]) -> Result<Vec<PathBuf>, FolderError> {
    let read_error = |e| FolderError::ReadFailed {
        path: root.to_path_buf(),
        source: e,
    };

    let known: HashSet<&str> = shows.iter().map(|show| show.name()).collect();

    let mut unknown = Vec::new();
    for entry in std::fs::read_dir(root).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        if !entry.file_type().map_err(read_error)?.is_dir() {
            continue;
        }

        let name = entry.file_name();
        if !known.contains(name.to_string_lossy().as_ref()) {
            unknown.push(PathBuf::from(name));
        }
    }

    unknown.sort();
    Ok(unknown)
}

/// Fail when the podcast root holds folders no show claims
pub fn validate_podcast_folders(root: &Path, shows: &[Show]) -> Result<(), FolderError> {
    let folders = find_unknown_folders(root, shows)?;
    if folders.is_empty() {
        Ok(())
    } else {
        Err(FolderError::UnknownFolders { folders })
    }
}
