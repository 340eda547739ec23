//! # Job Scheduler
//!
//! The public face of the engine. [`Processor`] admits folder jobs, keeps the
//! job registry, and owns the dispatch loop that runs jobs strictly one at a
//! time, in submission order.
//!
//! ## Flow:
//! 1. `submit_folder` registers a `pending` job and pushes it onto a bounded
//!    queue (callers wait while the queue is full)
//! 2. The dispatch loop pops the next job and hands it to the [`WorkerPool`]
//! 3. After a job ends the loop waits `job_gap` before taking the next one
//!
//! Control requests (`pause_job`, `resume_job`, `stop_job`, `delete_job`) are
//! keyed by the string form of a [`JobId`]. Unknown ids are ignored.

use super::worker_pool::WorkerPool;
use crate::codec::{AvifCodec, Codec};
use crate::config::Config;
use crate::file_manager::FileManager;
use crate::job::{Job, JobId, JobSnapshot, StopEffect};
use crate::observer::{JobObserver, Reporter};
use crate::transform::{FileTransform, TransformSettings};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Inner {
    config: Config,
    jobs: Mutex<BTreeMap<JobId, Arc<Job>>>,
    next_id: AtomicU64,
    queue: mpsc::Sender<Arc<Job>>,
    reporter: Reporter,
    lifecycle: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Folder compression engine handle. Cheap to clone; all clones drive the
/// same registry and dispatch loop.
#[derive(Clone)]
pub struct Processor {
    inner: Arc<Inner>,
}

impl Processor {
    /// Start the engine with the AVIF codec.
    ///
    /// Must be called from within a Tokio runtime. Cancelling `lifecycle`
    /// stops the running job at its next dispatch boundary and ends the
    /// dispatch loop.
    pub fn start(
        config: Config,
        observer: Arc<dyn JobObserver>,
        lifecycle: CancellationToken,
    ) -> Result<Self> {
        Self::with_codec(config, Arc::new(AvifCodec), observer, lifecycle)
    }

    /// Start the engine with a custom codec
    pub fn with_codec(
        config: Config,
        codec: Arc<dyn Codec>,
        observer: Arc<dyn JobObserver>,
        lifecycle: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .context("Processor must be started inside a Tokio runtime")?;

        let reporter = Reporter::new(observer);
        let transform = FileTransform::new(codec, TransformSettings::from(&config));
        let pool = WorkerPool::new(transform, config.workers, reporter.clone());
        let (queue, receiver) = mpsc::channel(config.queue_capacity);

        let dispatcher = runtime.spawn(dispatch_loop(
            receiver,
            pool,
            lifecycle.clone(),
            config.job_gap(),
        ));

        info!(
            "🚀 Compression engine started: {} workers, quality {}, speed {}, threshold {:.0}%",
            config.workers,
            config.quality,
            config.speed,
            config.size_threshold * 100.0
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                jobs: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                queue,
                reporter,
                lifecycle,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Folder a picked path refers to; see [`FileManager::resolve_folder`]
    pub fn resolve_folder(path: impl AsRef<Path>) -> Option<PathBuf> {
        FileManager::resolve_folder(path.as_ref())
    }

    /// Register a job for `path` and queue it.
    ///
    /// Always yields a job id. Problems with the folder itself surface later
    /// as the job's `error` status. Waits while the admission queue is full.
    pub async fn submit_folder(&self, path: impl AsRef<Path>) -> JobId {
        let source = path.as_ref().to_path_buf();
        let output = FileManager::output_dir_for(&source, &self.inner.config.output_suffix);
        let id = JobId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));

        let job = Arc::new(Job::new(
            id,
            source,
            output,
            self.inner.lifecycle.child_token(),
            self.inner.config.throttle_interval(),
        ));

        self.jobs().insert(id, Arc::clone(&job));
        info!("📥 Queued {}: {}", id, job.source_path().display());
        // observers see `pending` before the dispatch loop can touch the job
        self.inner.reporter.emit_forced(&job);

        if self.inner.queue.send(job).await.is_err() {
            warn!("Dispatch loop is not running, {} stays pending", id);
        }
        id
    }

    /// processing -> paused. Files already dispatched finish.
    pub fn pause_job(&self, id: &str) {
        let Some(job) = self.lookup(id) else {
            return;
        };
        if job.pause() {
            info!("⏸️  Paused {}", job.id());
            self.inner.reporter.emit_forced(&job);
        } else {
            debug!("Pause ignored for {} ({})", job.id(), job.status());
        }
    }

    /// paused -> processing
    pub fn resume_job(&self, id: &str) {
        let Some(job) = self.lookup(id) else {
            return;
        };
        if job.resume() {
            info!("▶️  Resumed {}", job.id());
            self.inner.reporter.emit_forced(&job);
        } else {
            debug!("Resume ignored for {} ({})", job.id(), job.status());
        }
    }

    /// Stop a job. A pending job is stopped on the spot; a running or paused
    /// one stops dispatching and turns `stopped` once its workers drain.
    pub fn stop_job(&self, id: &str) {
        let Some(job) = self.lookup(id) else {
            return;
        };
        match job.stop() {
            StopEffect::Stopped => {
                info!("⏹️  Stopped {} before it started", job.id());
                self.inner.reporter.emit_forced(&job);
            }
            StopEffect::Requested => info!("⏹️  Stop requested for {}", job.id()),
            StopEffect::Ignored => debug!("Stop ignored for {} ({})", job.id(), job.status()),
        }
    }

    /// Remove a finished job from the registry. Jobs that are pending,
    /// processing or paused are kept; returns whether the job was removed.
    pub fn delete_job(&self, id: &str) -> bool {
        let Ok(id) = id.parse::<JobId>() else {
            return false;
        };
        let mut jobs = self.jobs();
        let Some(job) = jobs.get(&id) else {
            return false;
        };

        let status = job.status();
        if !status.is_terminal() {
            warn!("Refusing to delete {} while it is {}", id, status);
            return false;
        }

        jobs.remove(&id);
        debug!("Deleted {}", id);
        true
    }

    /// Remove every completed, stopped or failed job; returns how many went
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, job| !job.status().is_terminal());
        let removed = before - jobs.len();
        if removed > 0 {
            debug!("Cleared {} finished jobs", removed);
        }
        removed
    }

    /// Snapshots of every registered job, in submission order
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        let jobs: Vec<Arc<Job>> = self.jobs().values().cloned().collect();
        jobs.iter().map(|job| job.snapshot()).collect()
    }

    pub fn job(&self, id: &str) -> Option<JobSnapshot> {
        self.lookup(id).map(|job| job.snapshot())
    }

    /// Cancel the lifecycle token and wait for the dispatch loop to end.
    /// The running job, if any, ends `stopped`; queued jobs stay `pending`.
    pub async fn shutdown(&self) {
        self.inner.lifecycle.cancel();
        let dispatcher = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                error!("Dispatch loop ended abnormally: {}", e);
            }
        }
    }

    fn jobs(&self) -> MutexGuard<'_, BTreeMap<JobId, Arc<Job>>> {
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, id: &str) -> Option<Arc<Job>> {
        let job = id
            .parse::<JobId>()
            .ok()
            .and_then(|id| self.jobs().get(&id).cloned());
        if job.is_none() {
            debug!("No job with id {:?}", id);
        }
        job
    }
}

async fn dispatch_loop(
    mut queue: mpsc::Receiver<Arc<Job>>,
    pool: WorkerPool,
    lifecycle: CancellationToken,
    job_gap: Duration,
) {
    debug!("Dispatch loop running");

    loop {
        let job = tokio::select! {
            biased;
            _ = lifecycle.cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        pool.run_job(job).await;

        tokio::select! {
            _ = lifecycle.cancelled() => break,
            _ = tokio::time::sleep(job_gap) => {}
        }
    }

    info!("Dispatch loop stopped");
}
