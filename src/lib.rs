//! # Folder Compressor Library
//!
//! Background engine that turns folders of images into sibling folders of
//! AVIF files, one job per folder, while a UI watches and steers.
//!
//! ## Architecture of the modules:
//! - `config`: Engine parameters and validation
//! - `error`: Error types of file-level operations
//! - `file_manager`: Folder resolution, image discovery and file helpers
//! - `codec`: Image decode / AVIF encode behind the `Codec` trait
//! - `transform`: Per-file compress-or-copy policy
//! - `progress`: Progress math, outcome tally and emission throttle
//! - `job`: Job state machine and snapshots
//! - `observer`: Where snapshots go (closures, broadcast, JSON lines)
//! - `processor`: Job queue, dispatch loop and worker pool
//! - `logging`: tracing subscriber setup for hosts
//!
//! ## Usage:
//! ```rust,no_run
//! use folder_compressor::{Config, JobSnapshot, Processor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let observer = |snapshot: JobSnapshot| println!("{} {}%", snapshot.id, snapshot.progress);
//! let processor = Processor::start(Config::default(), Arc::new(observer), CancellationToken::new())?;
//!
//! let id = processor.submit_folder("/photos/trip").await;
//! processor.pause_job(&id.to_string());
//! processor.resume_job(&id.to_string());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod job;
pub mod logging;
pub mod observer;
pub mod processor;
pub mod progress;
pub mod transform;

#[cfg(test)]
mod test_support;

pub use codec::{AvifCodec, Codec, EncodeSettings};
pub use config::Config;
pub use error::CompressError;
pub use job::{JobId, JobSnapshot, JobStatus};
pub use observer::{BroadcastObserver, JobObserver, JsonLinesObserver, NoopObserver};
pub use processor::Processor;
