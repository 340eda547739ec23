//! # Progress Observers
//!
//! Everything the engine tells the outside world goes through [`JobObserver`]
//! as a [`JobSnapshot`]. Observers are called from engine-internal tasks and
//! blocking workers: any thread, any time, possibly concurrently. A UI must
//! marshal the snapshot onto its own rendering context.
//!
//! ## Provided observers:
//! - closures `Fn(JobSnapshot)`
//! - `BroadcastObserver`: fan-out to any number of async subscribers
//! - `JsonLinesObserver`: one JSON object per line on a writer (stdout, pipe,
//!   webview bridge)
//! - `NoopObserver`

use crate::job::{Job, JobSnapshot};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::warn;

/// Receives display-ready job snapshots
pub trait JobObserver: Send + Sync + 'static {
    fn on_update(&self, snapshot: JobSnapshot);
}

impl<F> JobObserver for F
where
    F: Fn(JobSnapshot) + Send + Sync + 'static,
{
    fn on_update(&self, snapshot: JobSnapshot) {
        self(snapshot)
    }
}

/// Drops every snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {
    fn on_update(&self, _snapshot: JobSnapshot) {}
}

/// Fan-out over a tokio broadcast channel. Slow subscribers lag and lose the
/// oldest snapshots; later snapshots carry the full state anyway.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    sender: broadcast::Sender<JobSnapshot>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<JobSnapshot>) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        self.sender.subscribe()
    }
}

impl JobObserver for BroadcastObserver {
    fn on_update(&self, snapshot: JobSnapshot) {
        // no subscriber is not an error
        let _ = self.sender.send(snapshot);
    }
}

/// Message written by [`JsonLinesObserver`]
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage<'a> {
    #[serde(rename = "job_update")]
    JobUpdate {
        #[serde(flatten)]
        job: &'a JobSnapshot,
    },
}

/// Writes each snapshot as a single JSON line
pub struct JsonLinesObserver<W: Write + Send + 'static> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send + 'static> JobObserver for JsonLinesObserver<W> {
    fn on_update(&self, snapshot: JobSnapshot) {
        let line = match serde_json::to_string(&JsonMessage::JobUpdate { job: &snapshot }) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize snapshot of {}: {}", snapshot.id, e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to write snapshot of {}: {}", snapshot.id, e);
        }
    }
}

/// Routes job snapshots to the observer, applying each job's throttle
#[derive(Clone)]
pub struct Reporter {
    observer: Arc<dyn JobObserver>,
}

impl Reporter {
    pub fn new(observer: Arc<dyn JobObserver>) -> Self {
        Self { observer }
    }

    /// Throttled emission: dropped if the job emitted less than one interval ago
    pub fn emit(&self, job: &Job) {
        if let Some(snapshot) = job.snapshot_for_emit(false) {
            self.observer.on_update(snapshot);
        }
    }

    /// Emission that bypasses the throttle (creation, status changes, completion)
    pub fn emit_forced(&self, job: &Job) {
        if let Some(snapshot) = job.snapshot_for_emit(true) {
            self.observer.on_update(snapshot);
        }
    }
}
