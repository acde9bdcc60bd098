//! Job state-change notification
//!
//! Listeners observe job lifecycle transitions: `scheduled`, `about_to_run`,
//! `running`, `sleeping`, `awake` and `done`. Notification is synchronous on
//! the thread performing the transition (the worker thread for run-state
//! transitions, the scheduling thread for enqueue/cancel), with no internal
//! lock held. Each listener invocation is individually isolated: a panic in
//! one listener is caught and logged and never blocks other listeners or
//! corrupts manager state.

use crate::scheduling::{Job, JobEvent, JobStatus};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Observer protocol for job lifecycle transitions. All methods have no-op
/// defaults so listeners implement only what they care about.
#[allow(unused_variables)]
pub trait JobChangeListener: Send + Sync {
    /// The job was accepted by the manager, possibly with a start delay.
    fn scheduled(&self, job: &Job, delay: Duration) {}

    /// A worker is about to run the job.
    fn about_to_run(&self, job: &Job) {}

    /// The job's work function has started.
    fn running(&self, job: &Job) {}

    /// The job was moved to the sleeping state.
    fn sleeping(&self, job: &Job) {}

    /// The job was woken and is again eligible to run.
    fn awake(&self, job: &Job) {}

    /// The job reached a terminal state with the given status.
    fn done(&self, job: &Job, status: &JobStatus) {}
}

/// Registered listeners. Registration and removal are idempotent and keyed
/// by listener identity (`Arc` pointer), matching the protocol contract:
/// duplicate add is a no-op, remove-of-absent is a no-op.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Vec<Arc<dyn JobChangeListener>>,
}

impl ListenerSet {
    pub(crate) fn add(&mut self, listener: Arc<dyn JobChangeListener>) {
        if !self.listeners.iter().any(|l| same_listener(l, &listener)) {
            self.listeners.push(listener);
        }
    }

    pub(crate) fn remove(&mut self, listener: &Arc<dyn JobChangeListener>) {
        self.listeners.retain(|l| !same_listener(l, listener));
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn JobChangeListener>> {
        self.listeners.clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

fn same_listener(a: &Arc<dyn JobChangeListener>, b: &Arc<dyn JobChangeListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Deliver one event to every listener, isolating failures per listener.
pub(crate) fn dispatch(listeners: &[Arc<dyn JobChangeListener>], job: &Job, event: &JobEvent) {
    for listener in listeners {
        let outcome = catch_unwind(AssertUnwindSafe(|| match event {
            JobEvent::Scheduled { delay } => listener.scheduled(job, *delay),
            JobEvent::AboutToRun => listener.about_to_run(job),
            JobEvent::Running => listener.running(job),
            JobEvent::Sleeping => listener.sleeping(job),
            JobEvent::Awake => listener.awake(job),
            JobEvent::Done(status) => listener.done(job, status),
        }));
        if outcome.is_err() {
            error!(
                "Job change listener panicked while handling {:?} for job '{}'",
                event,
                job.name()
            );
        }
    }
}
