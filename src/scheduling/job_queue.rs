//! Waiting-job queue with priority ordering and conflict-aware dequeue
//!
//! The queue keeps jobs ordered by priority, FIFO within one priority
//! level. It is a plain structure: callers (the manager and the worker
//! pool) access it under the manager's state lock so that dequeue is
//! atomic with rule grants and lock acquisition.

use crate::rules::{self, Rule};
use crate::scheduling::job::Job;
use crate::scheduling::types::JobPriority;
use std::any::Any;
use tracing::debug;
use uuid::Uuid;

struct QueueEntry {
    priority: JobPriority,
    seq: u64,
    job: Job,
}

impl QueueEntry {
    fn sort_key(&self) -> (JobPriority, u64) {
        (self.priority, self.seq)
    }
}

/// Priority-ordered waiting queue.
#[derive(Default)]
pub(crate) struct JobQueue {
    /// Sorted ascending by (priority, submission seq); index 0 dequeues first.
    entries: Vec<QueueEntry>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a job keeping the queue sorted. `seq` is the submission
    /// sequence assigned by the manager at schedule time.
    pub(crate) fn enqueue(&mut self, job: Job) {
        let (priority, seq) = {
            let m = job.mutable();
            (m.priority, m.seq)
        };
        let entry = QueueEntry { priority, seq, job };
        let at = self
            .entries
            .partition_point(|e| e.sort_key() <= entry.sort_key());
        debug!(
            "Enqueued job '{}' (priority: {:?}, seq: {})",
            entry.job.name(),
            priority,
            seq
        );
        self.entries.insert(at, entry);
    }

    /// Remove and return the first job whose rule conflicts with none of
    /// the given active rules. Scanning past a conflicting head lets
    /// lower-priority unrelated work proceed while the busy resource is
    /// held, at the documented cost of possible starvation of the head
    /// under adversarial rule patterns.
    pub(crate) fn dequeue_next(&mut self, active_rules: &[Rule]) -> Option<Job> {
        let at = self.entries.iter().position(|e| {
            match e.job.mutable().rule.as_ref() {
                None => true,
                Some(rule) => !active_rules.iter().any(|a| rules::conflicting(rule, a)),
            }
        })?;
        Some(self.entries.remove(at).job)
    }

    /// Remove every queued job matching the family key, returning them.
    pub(crate) fn remove_matching(&mut self, family: Option<&dyn Any>) -> Vec<Job> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.job.matches_family(family) {
                removed.push(e.job.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn remove(&mut self, id: Uuid) -> Option<Job> {
        let at = self.entries.iter().position(|e| e.job.id() == id)?;
        Some(self.entries.remove(at).job)
    }

    pub(crate) fn iter_jobs(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().map(|e| &e.job)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
