//! Concurrent job scheduling with rule-based locking
//!
//! This crate queues asynchronous units of work ("jobs"), runs them on a
//! bounded pool of worker threads, groups them into families for bulk
//! control (cancel/sleep/wake/join), and provides reentrant
//! mutual-exclusion locks plus hierarchical scheduling rules that avoid
//! deadlock even when jobs claim overlapping resources from different
//! threads.
//!
//! The entry point is [`JobManager`]: an explicitly constructed,
//! process-scoped coordinator. Jobs are built with [`Job::builder`],
//! scheduled through the manager, and observed through
//! [`JobChangeListener`] callbacks and [`ProgressMonitor`] sinks.
//!
//! ```no_run
//! use job_conductor::{Job, JobManager, JobPriority, SchedulerConfig};
//! use std::time::Duration;
//!
//! # fn main() -> job_conductor::SchedulerResult<()> {
//! let manager = JobManager::new(SchedulerConfig::default())?;
//! let job = Job::builder("refresh-index")
//!     .priority(JobPriority::Short)
//!     .family_token("indexing")
//!     .work(|monitor: &dyn job_conductor::ProgressMonitor| {
//!         monitor.begin_task("refreshing", 1);
//!         monitor.worked(1);
//!         monitor.done();
//!         Ok(())
//!     })
//!     .build();
//! manager.schedule(&job, Duration::ZERO)?;
//! manager.join(Some(&"indexing"), None)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod locks;
pub mod progress;
pub mod rules;
pub mod scheduling;

pub use config::SchedulerConfig;
pub use errors::{SchedulerError, SchedulerResult};
pub use events::JobChangeListener;
pub use locks::{Lock, LockListener};
pub use progress::{NullProgressMonitor, ProgressMonitor, ProgressProvider};
pub use rules::{PathRule, Rule, SchedulingRule};
pub use scheduling::{
    Job, JobBuilder, JobEvent, JobManager, JobPriority, JobState, JobStatus, JobWork, QueueStats,
};
