// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use lofty::prelude::*;

use crate::error::ProbeError;

/// Audio duration lookup, abstracted for testability
pub trait DurationProbe {
    /// Whole seconds of audio in the file at `path`
    fn duration_seconds(&self, path: &Path) -> Result<u64, ProbeError>;
}

/// Reads durations from the container headers using lofty
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyProbe;

impl DurationProbe for LoftyProbe {
    fn duration_seconds(&self, path: &Path) -> Result<u64, ProbeError> {
        let tagged = lofty::read_from_path(path).map_err(|e| ProbeError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let duration = tagged.properties().duration();
        if duration.is_zero() {
            return Err(ProbeError::UnknownDuration(path.to_path_buf()));
        }

        Ok(duration.as_secs())
    }
}

/// Every file reports the same duration
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u64);

impl DurationProbe for FixedProbe {
    fn duration_seconds(&self, _path: &Path) -> Result<u64, ProbeError> {
        Ok(self.0)
    }
}
