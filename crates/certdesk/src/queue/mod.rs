//! Durable priority job queue with retry and exponential backoff.

pub mod backoff;
pub mod job;
mod scheduler;

pub use backoff::RetryPolicy;
pub use job::{AttachmentRef, JobData, JobPriority, JobStatus, QueuedJob};
pub use scheduler::{
    read_stats, JobQueue, QueueSettings, QueueStats, DEFAULT_MAX_CONCURRENT_JOBS,
    DEFAULT_POLL_INTERVAL,
};
