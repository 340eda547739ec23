//! # Job Worker Pool
//!
//! Runs one job from `pending` to a terminal status.
//!
//! Files of the source folder are dispatched in name order to at most
//! `workers` concurrent transforms. Pause and cancellation are cooperative and
//! only checked at the dispatch boundary, right before a file is handed to a
//! worker; files already dispatched always run to completion. A paused job
//! holds no worker slot.

use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::job::{Job, JobStatus};
use crate::observer::Reporter;
use crate::transform::{FileTransform, TransformMode};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Why the dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchEnd {
    Exhausted,
    Cancelled,
}

/// Bounded per-job pool of file workers
#[derive(Clone)]
pub struct WorkerPool {
    transform: FileTransform,
    workers: usize,
    reporter: Reporter,
}

impl WorkerPool {
    pub fn new(transform: FileTransform, workers: usize, reporter: Reporter) -> Self {
        Self {
            transform,
            workers: workers.max(1),
            reporter,
        }
    }

    /// Drive `job` to `completed`, `stopped` or `error`
    pub async fn run_job(&self, job: Arc<Job>) {
        if job.status().is_terminal() {
            debug!("Skipping {}: already {}", job.id(), job.status());
            return;
        }
        if job.is_cancelled() {
            // stopped or shut down while still queued
            self.finish(&job, JobStatus::Stopped);
            return;
        }
        if !job.transition(JobStatus::Processing) {
            return;
        }
        self.reporter.emit_forced(&job);
        info!("Processing {}: {}", job.id(), job.source_path().display());

        let files = match FileManager::list_qualifying_files(job.source_path()).await {
            Ok(files) => files,
            Err(source) => {
                let e = CompressError::Setup {
                    path: job.source_path().to_path_buf(),
                    source,
                };
                error!("{} failed: {}", job.id(), e);
                self.finish(&job, JobStatus::Error);
                return;
            }
        };

        job.set_total(files.len());
        info!("Found {} images in {}", files.len(), job.source_path().display());

        if files.is_empty() {
            self.finish(&job, JobStatus::Completed);
            return;
        }

        if let Err(source) = tokio::fs::create_dir_all(job.output_path()).await {
            let e = CompressError::Setup {
                path: job.output_path().to_path_buf(),
                source,
            };
            error!("{} failed: {}", job.id(), e);
            self.finish(&job, JobStatus::Error);
            return;
        }

        let end = self.dispatch(&job, files).await;
        debug!("All workers of {} drained", job.id());

        match end {
            DispatchEnd::Exhausted => self.finish(&job, JobStatus::Completed),
            DispatchEnd::Cancelled => self.finish(&job, JobStatus::Stopped),
        }
    }

    async fn dispatch(&self, job: &Arc<Job>, files: Vec<PathBuf>) -> DispatchEnd {
        let collisions = colliding_stems(&files);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut in_flight = JoinSet::new();
        let mut end = DispatchEnd::Exhausted;

        for path in files {
            let Some(permit) = self.next_slot(job, &semaphore).await else {
                end = DispatchEnd::Cancelled;
                break;
            };

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mode = if collisions.contains(&stem_key(&path)) {
                TransformMode::CopyOnly
            } else {
                TransformMode::Compress
            };

            job.begin_file(&name);
            self.reporter.emit(job);

            let transform = self.transform.clone();
            let out_dir = job.output_path().to_path_buf();
            let job = Arc::clone(job);
            let reporter = self.reporter.clone();

            in_flight.spawn(async move {
                let outcome = tokio::task::spawn_blocking(move || transform.run(&path, &out_dir, mode))
                    .await
                    .unwrap_or_else(|e| Err(CompressError::Task(e)));
                drop(permit);

                if let Err(e) = &outcome {
                    warn!("{}: {} left out of the output: {}", job.id(), name, e);
                }
                job.finish_file(&outcome);
                reporter.emit(&job);
                tokio::task::yield_now().await;
            });
        }

        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!("File worker of {} aborted: {}", job.id(), e);
            }
        }

        end
    }

    /// Dispatch boundary: cancellation, then pause, then a free worker slot.
    ///
    /// A pause that lands while waiting for the slot gives the slot back and
    /// waits again. `None` once the job is cancelled.
    async fn next_slot(&self, job: &Job, semaphore: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
        let cancel = job.cancellation();
        loop {
            if cancel.is_cancelled() || !job.wait_while_paused().await {
                return None;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok()?,
            };

            if cancel.is_cancelled() {
                return None;
            }
            if job.status() != JobStatus::Paused {
                return Some(permit);
            }
            drop(permit);
        }
    }

    fn finish(&self, job: &Job, status: JobStatus) {
        if !job.transition(status) {
            let current = job.status();
            if current.is_terminal() {
                debug!("{} already {}, not moving to {}", job.id(), current, status);
            } else {
                error!("{} stuck in {}: cannot move to {}", job.id(), current, status);
            }
            return;
        }
        self.reporter.emit_forced(job);

        let snapshot = job.snapshot();
        match status {
            JobStatus::Completed => info!(
                "{} completed: {}",
                job.id(),
                snapshot.tally.format_summary()
            ),
            JobStatus::Stopped => info!(
                "{} stopped after {}/{} files",
                job.id(),
                snapshot.done_files,
                snapshot.total_files
            ),
            _ => info!("{} finished with status {}", job.id(), status),
        }
    }
}

/// Case-insensitive stem, the key under which compressed outputs could clash
fn stem_key(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Stems shared by more than one input file
fn colliding_stems(files: &[PathBuf]) -> HashSet<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for file in files {
        *counts.entry(stem_key(file)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(stem, _)| stem)
        .collect()
}
