//! # Processor Module
//!
//! Job admission and execution, split in:
//! - `scheduler`: `Processor`, the job registry and the one-job-at-a-time dispatch loop
//! - `worker_pool`: per-job bounded file workers with pause/stop at the dispatch boundary

pub mod scheduler;
pub mod worker_pool;

pub use scheduler::Processor;
pub use worker_pool::WorkerPool;
