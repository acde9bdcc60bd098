//! Job scheduling subsystem
//!
//! This module provides the concurrent job machinery:
//! - `Job` / `JobBuilder`: schedulable units of user-supplied work
//! - `JobQueue`: priority-ordered waiting queue with conflict-aware dequeue
//! - worker pool: bounded set of threads executing ready jobs
//! - delay timer: promotes delay-scheduled jobs into the queue
//! - `JobManager`: the façade coordinating all of the above plus the rule
//!   engine and the lock table

pub mod job;
pub mod job_manager;
pub mod job_queue;
pub mod types;

pub(crate) mod delay;
pub(crate) mod rule_context;
pub(crate) mod worker_pool;

pub use job::{Job, JobBuilder, JobWork};
pub use job_manager::JobManager;
pub use types::{JobEvent, JobPriority, JobState, JobStatus, QueueStats};
