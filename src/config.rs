//! Scheduler configuration
//!
//! Plain serde-backed configuration for the worker pool and timer. All
//! fields have conservative defaults so `SchedulerConfig::default()` is a
//! usable configuration for embedding the scheduler in another process.

use crate::errors::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently live worker threads.
    pub max_workers: usize,
    /// Number of workers kept alive through idle periods. The pool never
    /// shrinks below this once grown.
    pub min_workers: usize,
    /// How long an idle worker waits for new work before terminating,
    /// in milliseconds.
    pub worker_idle_timeout_ms: u64,
    /// Name prefix for worker threads, suffixed with a worker index.
    pub worker_name_prefix: String,
}

impl SchedulerConfig {
    /// Configuration with a single worker thread. Useful for callers that
    /// need strictly serial job execution.
    pub fn single_worker() -> Self {
        Self {
            max_workers: 1,
            min_workers: 1,
            ..Self::default()
        }
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout_ms)
    }

    pub(crate) fn validate(&self) -> SchedulerResult<()> {
        if self.max_workers == 0 {
            return Err(SchedulerError::illegal_argument(
                "max_workers must be at least 1",
            ));
        }
        if self.min_workers == 0 {
            return Err(SchedulerError::illegal_argument(
                "min_workers must be at least 1",
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(SchedulerError::illegal_argument(format!(
                "min_workers ({}) must not exceed max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            min_workers: 1,
            worker_idle_timeout_ms: 3000,
            worker_name_prefix: "job-worker".to_string(),
        }
    }
}
