//! Delayed job queue and worker.
//!
//! The scheduler only sees [`JobQueue`]; [`DelayedQueue`] and [`Worker`] are
//! the in-process implementation used by the daemon.

mod delayed;
mod job;
mod worker;

pub use delayed::DelayedQueue;
pub use job::{EnqueueOutcome, JobKind, JobQueue, ScheduledRun};
pub use worker::{JobHandler, QueueSweep, Worker, WorkerConfig, WorkerStats};
