//! # Progress Tracking and Statistics Module
//!
//! Per-job bookkeeping behind the snapshots:
//! - `percent()`: integer progress, `floor(100 * done / total)`
//! - `FileTally`: how each finished file ended (compressed, copied, skipped, failed)
//! - `ProgressThrottle`: rate limit for non-forced progress emissions
//!
//! The throttle bounds how often an observer hears about one job, however many
//! file workers are running.

use crate::error::Result;
use crate::file_manager::FileManager;
use crate::transform::TransformOutcome;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Integer progress in percent, 0 when nothing is known yet
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Outcome counters of one job's files
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTally {
    pub compressed: usize,
    pub copied: usize,
    pub skipped: usize,
    /// Files whose fallback copy failed
    pub failed: usize,
    pub bytes_saved: u64,
}

impl FileTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &Result<TransformOutcome>) {
        match outcome {
            Ok(TransformOutcome::Compressed {
                original_size,
                compressed_size,
            }) => {
                self.compressed += 1;
                self.bytes_saved += original_size.saturating_sub(*compressed_size);
            }
            Ok(TransformOutcome::Copied { .. }) => self.copied += 1,
            Ok(TransformOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.compressed + self.copied + self.skipped + self.failed
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Compressed: {} | Copied: {} | Skipped: {} | Failed: {} | Total saved: {}",
            self.processed(),
            self.compressed,
            self.copied,
            self.skipped,
            self.failed,
            FileManager::format_size(self.bytes_saved)
        )
    }
}

/// Minimum-interval gate for progress emissions of a single job
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Decide whether an emission at `now` goes out, and remember it if so.
    /// Forced emissions always pass and restart the interval.
    pub fn should_emit(&mut self, now: Instant, force: bool) -> bool {
        let due = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if force || due {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }

    pub fn last_emit(&self) -> Option<Instant> {
        self.last_emit
    }
}
