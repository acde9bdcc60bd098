//! Job scheduling type definitions

use crate::errors::SchedulerError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Priority levels for job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPriority {
    /// Work the user is actively waiting on
    Interactive = 0,
    /// Short-running responsiveness-sensitive work
    Short = 1,
    /// Regular long-running operations
    Long = 2,
    /// Build-class background work
    Build = 3,
    /// Decoration and other lowest-urgency work
    Decorate = 4,
}

impl PartialOrd for JobPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JobPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

/// Lifecycle state of a job
///
/// `None -> Waiting -> Running -> None`, with `Sleeping` as an alternate
/// holding state entered by a delayed schedule or an explicit `sleep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Not known to the manager: never scheduled, or already finished
    None,
    /// Queued and eligible for a worker to pick up
    Waiting,
    /// Currently executing on a worker thread
    Running,
    /// Held back by a start delay or an explicit sleep request
    Sleeping,
}

impl JobState {
    /// Whether the job is visible to family operations (`find`, `join`).
    pub fn is_live(&self) -> bool {
        !matches!(self, JobState::None)
    }
}

/// Terminal result of one job run
#[derive(Debug, Clone)]
pub enum JobStatus {
    /// The work function returned successfully
    Ok,
    /// The run was canceled before or during execution
    Canceled,
    /// The work function returned an error or panicked
    Error(Arc<SchedulerError>),
}

impl JobStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, JobStatus::Ok)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, JobStatus::Canceled)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JobStatus::Error(_))
    }
}

/// Lifecycle transition delivered to job-change listeners
#[derive(Debug, Clone)]
pub enum JobEvent {
    Scheduled { delay: Duration },
    AboutToRun,
    Running,
    Sleeping,
    Awake,
    Done(JobStatus),
}

/// Point-in-time snapshot of scheduler state
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Jobs queued and eligible to run
    pub waiting_jobs: usize,
    /// Jobs held back by a delay or an explicit sleep
    pub sleeping_jobs: usize,
    /// Jobs currently executing
    pub running_jobs: usize,
    /// Worker threads currently alive
    pub total_workers: usize,
    /// Worker threads parked waiting for work
    pub idle_workers: usize,
}
