// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// Events emitted while preparing episodes and moving them to the phone
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An episode entered a processing slot
    ProcessingStarting {
        /// Identifies the worker slot (0 to workers-1)
        slot: usize,
        show_name: String,
        file_name: String,
        /// Position of this episode in the batch
        episode_index: usize,
        total_to_process: usize,
    },

    /// An episode was normalized, tagged and moved into the boarding zone
    ProcessingCompleted { slot: usize, file_name: String },

    ProcessingFailed {
        slot: usize,
        file_name: String,
        error: String,
    },

    /// Every processing job has finished
    ProcessingFinished {
        processed_count: usize,
        failed_count: usize,
    },

    /// Copying to the phone is about to start
    TransferStarting { total_to_transfer: usize },

    FileTransferred { file_name: String },

    TransferFailed { file_name: String, error: String },

    TransferCompleted {
        copied_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress of the processing and transfer stages.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A progress reporter that silently ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
