// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ProcessError;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::{AudioProcessor, ProcessJob};

/// CPUs left free so the machine stays usable while converting
const RESERVED_CPUS: usize = 2;

/// Worker count for the processing pool: all CPUs but two, at least one
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(RESERVED_CPUS)
        .max(1)
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub workers: usize,
    /// Nothing is converted, so sources are expected to stay put
    pub dry_run: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub processed: usize,
    /// Source path and error message of each failed job
    pub failed: Vec<(PathBuf, String)>,
}

/// Run every job through `processor` on a bounded pool of worker slots
///
/// Individual failures are reported and collected rather than aborting the
/// batch. Outside a dry run, any source file still present afterwards is an
/// error, since a successful job always removes its source.
pub async fn process_episodes<P: AudioProcessor + 'static>(
    processor: Arc<P>,
    jobs: Vec<ProcessJob>,
    options: &ProcessOptions,
    reporter: SharedProgressReporter,
) -> Result<ProcessResult, ProcessError> {
    let workers = options.workers.max(1);
    let total_to_process = jobs.len();
    let sources: Vec<PathBuf> = jobs.iter().map(|job| job.source.clone()).collect();

    // The slot pool limits concurrency and gives each running job a stable slot id.
    let (slot_tx, mut slot_rx) = tokio::sync::mpsc::channel(workers);
    for slot in 0..workers {
        let _ = slot_tx.try_send(slot);
    }

    let processed_count = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::with_capacity(total_to_process);
    for (episode_index, job) in jobs.into_iter().enumerate() {
        // Acquire a slot before spawning so jobs start in batch order.
        let Some(slot) = slot_rx.recv().await else {
            break;
        };

        let slot_tx = slot_tx.clone();
        let processor = processor.clone();
        let reporter = reporter.clone();
        let processed_count = processed_count.clone();
        let failed = failed.clone();

        let handle = tokio::spawn(async move {
            let file_name = job.file_name();
            reporter.report(ProgressEvent::ProcessingStarting {
                slot,
                show_name: job.album.clone(),
                file_name: file_name.clone(),
                episode_index,
                total_to_process,
            });

            match processor.process(&job).await {
                Ok(()) => {
                    processed_count.fetch_add(1, Ordering::SeqCst);
                    reporter.report(ProgressEvent::ProcessingCompleted { slot, file_name });
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", job.source.display(), e);
                    reporter.report(ProgressEvent::ProcessingFailed {
                        slot,
                        file_name,
                        error: e.to_string(),
                    });
                    failed.lock().await.push((job.source.clone(), e.to_string()));
                }
            }

            let _ = slot_tx.send(slot).await;
        });

        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.await;
    }

    let processed = processed_count.load(Ordering::SeqCst);
    let failed = failed.lock().await.clone();

    reporter.report(ProgressEvent::ProcessingFinished {
        processed_count: processed,
        failed_count: failed.len(),
    });

    if !options.dry_run {
        let left_behind: Vec<PathBuf> = sources.into_iter().filter(|source| source.exists()).collect();
        if !left_behind.is_empty() {
            for source in &left_behind {
                warn!("{} wasn't deleted, check if it was converted", source.display());
            }
            return Err(ProcessError::SourcesLeftBehind(left_behind));
        }
    }

    Ok(ProcessResult { processed, failed })
}
