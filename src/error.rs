//! # Error Types Module
//!
//! Error taxonomy of the engine.
//!
//! ## Categories:
//! - `Io`: plain I/O failures
//! - `Image`: decode/encode failures reported by the `image` crate
//! - `Encode`: encoder failures not coming from `image` (empty output, custom codecs)
//! - `Setup`: the job cannot start (source unreadable, output uncreatable); ends the job in `error`
//! - `Copy`: the fallback copy itself failed; counted per file, never fatal to the job
//! - `Task`: a blocking worker task panicked or was aborted
//!
//! Decode, encode and "not worth it" results are not errors at the job level:
//! the transform absorbs them by copying the source file verbatim.

use std::path::PathBuf;

/// Custom error types for folder compression
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Job setup failed for {}: {source}", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fallback copy failed for {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = CompressError> = std::result::Result<T, E>;
