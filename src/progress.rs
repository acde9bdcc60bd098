//! Progress reporting and cooperative cancellation
//!
//! The scheduler never renders progress itself. Running jobs and blocking
//! waits report through a [`ProgressMonitor`] sink supplied by the caller
//! or manufactured per job run by the registered [`ProgressProvider`].
//! Cancellation is cooperative: the manager and blocking primitives poll
//! `is_canceled`, and job code is expected to do the same at its own
//! check-points.

use crate::scheduling::Job;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sink for progress reporting and cooperative cancellation.
///
/// Implementations must be callable from worker threads. Every method has
/// a meaningful no-op interpretation, and the manager tolerates callers
/// that pass no monitor at all.
pub trait ProgressMonitor: Send + Sync {
    /// Notifies that a task with the given total amount of work is starting.
    fn begin_task(&self, name: &str, total_work: usize);

    /// Notifies that the given number of work units has completed.
    fn worked(&self, units: usize);

    /// Notifies that the task is complete.
    fn done(&self);

    /// Whether cancellation of the current operation has been requested.
    fn is_canceled(&self) -> bool;

    /// Sets or clears the cancellation request.
    fn set_canceled(&self, canceled: bool);
}

/// A monitor that discards all progress reports but still records the
/// cancellation flag, so it remains usable as a cancellation token.
#[derive(Debug, Default)]
pub struct NullProgressMonitor {
    canceled: AtomicBool,
}

impl NullProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressMonitor for NullProgressMonitor {
    fn begin_task(&self, _name: &str, _total_work: usize) {}

    fn worked(&self, _units: usize) {}

    fn done(&self) {}

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn set_canceled(&self, canceled: bool) {
        self.canceled.store(canceled, Ordering::SeqCst);
    }
}

/// Factory invoked once per job run to obtain a progress sink scoped to
/// that run. Registered wholesale via
/// [`JobManager::set_progress_provider`](crate::scheduling::JobManager::set_progress_provider);
/// the last registration wins.
pub trait ProgressProvider: Send + Sync {
    fn create_monitor(&self, job: &Job) -> Arc<dyn ProgressMonitor>;
}

/// Default provider handing out null monitors.
#[derive(Debug, Default)]
pub(crate) struct NullProgressProvider;

impl ProgressProvider for NullProgressProvider {
    fn create_monitor(&self, _job: &Job) -> Arc<dyn ProgressMonitor> {
        Arc::new(NullProgressMonitor::new())
    }
}

/// Per-run monitor combining the provider's sink with the manager's
/// cooperative-cancel flag, so `cancel` on a running job is observable
/// through the monitor the job code already holds.
pub(crate) struct JobMonitor {
    sink: Arc<dyn ProgressMonitor>,
    cancel_flag: Arc<AtomicBool>,
}

impl JobMonitor {
    pub(crate) fn new(sink: Arc<dyn ProgressMonitor>, cancel_flag: Arc<AtomicBool>) -> Self {
        Self { sink, cancel_flag }
    }
}

impl ProgressMonitor for JobMonitor {
    fn begin_task(&self, name: &str, total_work: usize) {
        self.sink.begin_task(name, total_work);
    }

    fn worked(&self, units: usize) {
        self.sink.worked(units);
    }

    fn done(&self) {
        self.sink.done();
    }

    fn is_canceled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst) || self.sink.is_canceled()
    }

    fn set_canceled(&self, canceled: bool) {
        self.cancel_flag.store(canceled, Ordering::SeqCst);
        self.sink.set_canceled(canceled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_monitor_records_cancellation() {
        let monitor = NullProgressMonitor::new();
        assert!(!monitor.is_canceled());
        monitor.set_canceled(true);
        assert!(monitor.is_canceled());
        monitor.set_canceled(false);
        assert!(!monitor.is_canceled());
    }

    #[test]
    fn test_job_monitor_merges_cancel_sources() {
        let sink: Arc<dyn ProgressMonitor> = Arc::new(NullProgressMonitor::new());
        let flag = Arc::new(AtomicBool::new(false));
        let monitor = JobMonitor::new(sink.clone(), flag.clone());

        assert!(!monitor.is_canceled());

        // Manager-side request is visible through the merged monitor.
        flag.store(true, Ordering::SeqCst);
        assert!(monitor.is_canceled());

        flag.store(false, Ordering::SeqCst);
        sink.set_canceled(true);
        assert!(monitor.is_canceled());
    }
}
