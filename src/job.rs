//! # Compression Job
//!
//! One folder-conversion run. A [`Job`] owns its mutable state behind its own
//! lock and is only driven through its methods: control requests
//! (`pause`/`resume`/`stop`), worker-pool bookkeeping, and [`Job::snapshot`]
//! reads. Observers never touch a `Job`; they get [`JobSnapshot`] copies.
//!
//! ## State machine
//! ```text
//! pending -> processing <-> paused -> completed | stopped | error
//! ```
//! `completed`, `stopped` and `error` are terminal.

use crate::progress::{percent, FileTally, ProgressThrottle};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Job identifier, rendered as `job_<n>`; `n` grows monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid job id: {0}")]
pub struct InvalidJobId(String);

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("job_")
            .and_then(|n| n.parse::<u64>().ok())
            .map(JobId)
            .ok_or_else(|| InvalidJobId(s.to_string()))
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Paused,
    Completed,
    Stopped,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Error)
    }

    /// Allowed transitions. Only processing <-> paused ever goes back and forth;
    /// a running job reaches every terminal status from either of the two.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Stopped)
                | (Processing, Paused)
                | (Processing, Completed)
                | (Processing, Stopped)
                | (Processing, Error)
                | (Paused, Processing)
                | (Paused, Completed)
                | (Paused, Stopped)
                | (Paused, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable copy of a job's externally relevant fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub status: JobStatus,
    pub progress: u8,
    pub total_files: usize,
    pub done_files: usize,
    pub current_file: String,
    #[serde(flatten)]
    pub tally: FileTally,
}

/// What a stop request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEffect {
    /// Job was pending and is now `stopped`
    Stopped,
    /// Cancellation requested; the worker pool reports `stopped` once drained
    Requested,
    /// Job already terminal
    Ignored,
}

struct JobState {
    status: JobStatus,
    total_files: usize,
    done_files: usize,
    progress: u8,
    current_file: String,
    in_flight: usize,
    tally: FileTally,
    throttle: ProgressThrottle,
}

pub struct Job {
    id: JobId,
    source_path: PathBuf,
    output_path: PathBuf,
    state: Mutex<JobState>,
    cancel: CancellationToken,
    resume: Notify,
}

impl Job {
    pub fn new(
        id: JobId,
        source_path: PathBuf,
        output_path: PathBuf,
        cancel: CancellationToken,
        throttle_interval: Duration,
    ) -> Self {
        Self {
            id,
            source_path,
            output_path,
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                total_files: 0,
                done_files: 0,
                progress: 0,
                current_file: String::new(),
                in_flight: 0,
                tally: FileTally::new(),
                throttle: ProgressThrottle::new(throttle_interval),
            }),
            cancel,
            resume: Notify::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        // a panicking holder cannot leave the counters half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &JobState) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            source_path: self.source_path.clone(),
            output_path: self.output_path.clone(),
            status: state.status,
            progress: state.progress,
            total_files: state.total_files,
            done_files: state.done_files,
            current_file: state.current_file.clone(),
            tally: state.tally,
        }
    }

    /// Snapshot for emission, or `None` when the throttle holds it back
    pub fn snapshot_for_emit(&self, force: bool) -> Option<JobSnapshot> {
        let mut state = self.lock();
        if state.throttle.should_emit(Instant::now(), force) {
            Some(self.snapshot_locked(&state))
        } else {
            None
        }
    }

    /// Move to `next` if the state machine allows it
    pub fn transition(&self, next: JobStatus) -> bool {
        let mut state = self.lock();
        if !state.status.can_transition_to(next) {
            return false;
        }
        state.status = next;
        if next.is_terminal() {
            state.current_file.clear();
        }
        true
    }

    /// processing -> paused; anything else is a no-op
    pub fn pause(&self) -> bool {
        let mut state = self.lock();
        if state.status != JobStatus::Processing {
            return false;
        }
        state.status = JobStatus::Paused;
        if state.in_flight == 0 {
            state.current_file.clear();
        }
        true
    }

    /// paused -> processing, then wake the dispatcher if it is waiting.
    /// The wake-up is not stored: the status change is what a later check sees.
    pub fn resume(&self) -> bool {
        {
            let mut state = self.lock();
            if state.status != JobStatus::Paused {
                return false;
            }
            state.status = JobStatus::Processing;
        }
        self.resume.notify_waiters();
        true
    }

    pub fn stop(&self) -> StopEffect {
        let mut state = self.lock();
        let status = state.status;
        match status {
            s if s.is_terminal() => StopEffect::Ignored,
            JobStatus::Pending => {
                state.status = JobStatus::Stopped;
                drop(state);
                self.cancel.cancel();
                StopEffect::Stopped
            }
            _ => {
                drop(state);
                self.cancel.cancel();
                StopEffect::Requested
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Block while the job is paused.
    ///
    /// Returns `true` once the job may dispatch again, `false` if it was
    /// cancelled first.
    pub async fn wait_while_paused(&self) -> bool {
        loop {
            let notified = self.resume.notified();
            tokio::pin!(notified);
            // register before reading the status so a resume in between is not lost
            notified.as_mut().enable();

            if self.cancel.is_cancelled() {
                return false;
            }
            if self.status() != JobStatus::Paused {
                return true;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.cancel.cancelled() => return false,
            }
        }
    }

    pub fn set_total(&self, total_files: usize) {
        let mut state = self.lock();
        state.total_files = total_files;
        state.done_files = 0;
        state.progress = percent(0, total_files);
    }

    /// A file was dispatched to a worker
    pub fn begin_file(&self, name: &str) {
        let mut state = self.lock();
        state.in_flight += 1;
        state.current_file.clear();
        state.current_file.push_str(name);
    }

    /// A worker finished a file, whatever the outcome
    pub fn finish_file(&self, outcome: &crate::error::Result<crate::transform::TransformOutcome>) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.done_files = (state.done_files + 1).min(state.total_files);
        state.progress = percent(state.done_files, state.total_files);
        state.tally.record(outcome);
        if state.in_flight == 0 && state.status != JobStatus::Processing {
            state.current_file.clear();
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("source_path", &self.source_path)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{FallbackReason, TransformOutcome};
    use std::sync::Arc;

    fn job() -> Job {
        Job::new(
            JobId::new(1),
            PathBuf::from("/photos"),
            PathBuf::from("/photos_translated"),
            CancellationToken::new(),
            Duration::from_millis(300),
        )
    }

    #[test]
    fn test_job_id_format_and_parse() {
        let id = JobId::new(7);
        assert_eq!(id.to_string(), "job_7");
        assert_eq!("job_7".parse::<JobId>().unwrap(), id);
        assert!("job_".parse::<JobId>().is_err());
        assert!("7".parse::<JobId>().is_err());
        assert!(JobId::new(2) < JobId::new(10));
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Error));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Error));
        for running in [Processing, Paused] {
            for terminal in [Completed, Stopped, Error] {
                assert!(running.can_transition_to(terminal));
            }
        }
        for terminal in [Completed, Stopped, Error] {
            assert!(terminal.is_terminal());
            for next in [Pending, Processing, Paused, Completed, Stopped, Error] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_pause_resume_only_from_matching_state() {
        let job = job();
        assert!(!job.pause());
        assert!(!job.resume());

        assert!(job.transition(JobStatus::Processing));
        assert!(job.pause());
        assert!(!job.pause());
        assert_eq!(job.status(), JobStatus::Paused);
        assert!(job.resume());
        assert!(!job.resume());
        assert_eq!(job.status(), JobStatus::Processing);
    }

    #[test]
    fn test_stop_effects() {
        let pending = job();
        assert_eq!(pending.stop(), StopEffect::Stopped);
        assert_eq!(pending.status(), JobStatus::Stopped);
        assert!(pending.is_cancelled());
        assert_eq!(pending.stop(), StopEffect::Ignored);

        let running = job();
        running.transition(JobStatus::Processing);
        assert_eq!(running.stop(), StopEffect::Requested);
        assert_eq!(running.status(), JobStatus::Processing);
        assert!(running.is_cancelled());
    }

    #[test]
    fn test_progress_bookkeeping() {
        let job = job();
        job.transition(JobStatus::Processing);
        job.set_total(3);

        job.begin_file("a.png");
        assert_eq!(job.snapshot().current_file, "a.png");
        job.finish_file(&Ok(TransformOutcome::Copied {
            reason: FallbackReason::DecodeFailed,
        }));

        let snapshot = job.snapshot();
        assert_eq!(snapshot.done_files, 1);
        assert_eq!(snapshot.progress, 33);
        assert_eq!(snapshot.tally.copied, 1);

        job.transition(JobStatus::Completed);
        assert!(job.snapshot().current_file.is_empty());
    }

    #[test]
    fn test_idle_pause_clears_current_file() {
        let job = job();
        job.transition(JobStatus::Processing);
        job.set_total(2);
        job.begin_file("a.png");
        job.pause();
        // still running a.png
        assert_eq!(job.snapshot().current_file, "a.png");
        job.finish_file(&Ok(TransformOutcome::Skipped));
        assert!(job.snapshot().current_file.is_empty());
    }

    #[test]
    fn test_snapshot_for_emit_throttles() {
        let job = job();
        assert!(job.snapshot_for_emit(false).is_some());
        assert!(job.snapshot_for_emit(false).is_none());
        assert!(job.snapshot_for_emit(true).is_some());
    }

    #[test]
    fn test_snapshot_serializes_for_ui() {
        let job = job();
        let value = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(value["id"], "job_1");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["sourcePath"], "/photos");
        assert_eq!(value["doneFiles"], 0);
        assert_eq!(value["currentFile"], "");
        assert_eq!(value["bytesSaved"], 0);
    }

    #[tokio::test]
    async fn test_wait_while_paused_resumes() {
        let job = Arc::new(job());
        job.transition(JobStatus::Processing);
        job.pause();

        let waiter = tokio::spawn({
            let job = Arc::clone(&job);
            async move { job.wait_while_paused().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        job.resume();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_while_paused_cancelled() {
        let job = Arc::new(job());
        job.transition(JobStatus::Processing);
        job.pause();

        let waiter = tokio::spawn({
            let job = Arc::clone(&job);
            async move { job.wait_while_paused().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(job.stop(), StopEffect::Requested);
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_while_not_paused_returns_immediately() {
        let job = job();
        job.transition(JobStatus::Processing);
        tokio_test::assert_ready!(tokio_test::task::spawn(job.wait_while_paused()).poll());
    }
}
