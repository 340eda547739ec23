//! # Configuration Module
//!
//! Engine-wide parameters for folder compression.
//!
//! ## Parameters:
//! - `quality`: AVIF quality (0-100, default: 55)
//! - `speed`: AVIF encoder speed (0-10, default: 8, higher = faster)
//! - `workers`: Concurrent file workers per job (default: 2)
//! - `size_threshold`: Keep the compressed file only if `compressed <= original * threshold` (default: 0.85)
//! - `output_suffix`: Appended to the source folder path to name the output folder (default: "_translated")
//! - `queue_capacity`: Pending jobs the admission queue holds before `submit_folder` waits (default: 100)
//! - `throttle_ms`: Minimum gap between non-forced progress snapshots of one job (default: 300)
//! - `job_gap_ms`: Pause between two jobs in the dispatch loop (default: 100)
//! - `skip_existing`: Count files whose output already exists as done without work (default: false)
//!
//! The engine never reads or writes a configuration file. A host that keeps
//! settings elsewhere can hand them over as JSON through [`Config::from_json_str`].
//!
//! ## Example:
//! ```rust
//! use folder_compressor::Config;
//!
//! let config = Config {
//!     quality: 60,
//!     workers: 4,
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the compression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AVIF quality (0-100)
    pub quality: u8,
    /// AVIF encoder speed (0-10, higher = faster, larger files)
    pub speed: u8,
    /// Number of files transformed concurrently inside one job
    pub workers: usize,
    /// Size threshold (keep if compressed size <= original * threshold)
    pub size_threshold: f64,
    /// Suffix appended to the source folder to build the output folder
    pub output_suffix: String,
    /// Capacity of the pending-job queue
    pub queue_capacity: usize,
    /// Minimum milliseconds between throttled progress snapshots
    pub throttle_ms: u64,
    /// Milliseconds the dispatch loop waits between jobs
    pub job_gap_ms: u64,
    /// Skip files whose output is already present in the output folder
    pub skip_existing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: 55,
            speed: 8,
            workers: 2,
            size_threshold: 0.85,
            output_suffix: "_translated".to_string(),
            queue_capacity: 100,
            throttle_ms: 300,
            job_gap_ms: 100,
            skip_existing: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(anyhow::anyhow!("Quality must be between 0 and 100"));
        }

        if self.speed > 10 {
            return Err(anyhow::anyhow!("Speed must be between 0 and 10"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if !(self.size_threshold > 0.0 && self.size_threshold <= 1.0) {
            return Err(anyhow::anyhow!("Size threshold must be between 0.0 and 1.0"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("Queue capacity must be greater than 0"));
        }

        if self.output_suffix.is_empty() {
            return Err(anyhow::anyhow!("Output suffix must not be empty"));
        }

        if self.output_suffix.contains(['/', '\\']) {
            return Err(anyhow::anyhow!(
                "Output suffix must not contain path separators: {}",
                self.output_suffix
            ));
        }

        Ok(())
    }

    /// Parse and validate a configuration handed over as JSON.
    /// Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn job_gap(&self) -> Duration {
        Duration::from_millis(self.job_gap_ms)
    }
}
