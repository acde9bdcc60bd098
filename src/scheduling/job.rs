//! Job handles and user-supplied work
//!
//! A [`Job`] is a cheap-clone handle over shared state. The manager owns
//! the lifecycle once the job is scheduled; the submitting collaborator
//! keeps the handle only to query state and request cancellation.

use crate::progress::{JobMonitor, ProgressMonitor};
use crate::rules::Rule;
use crate::scheduling::types::{JobPriority, JobState, JobStatus};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use uuid::Uuid;

/// The work a job performs. Opaque, user-supplied logic; the scheduler
/// only manages its lifecycle.
///
/// Long-running implementations should poll `monitor.is_canceled()` at
/// reasonable check-points and return early when cancellation is
/// requested. Returning `Err` produces a terminal error status; returning
/// `Err` carrying [`SchedulerError::OperationCanceled`]
/// (or finishing with the monitor canceled) produces a canceled status.
///
/// [`SchedulerError::OperationCanceled`]: crate::errors::SchedulerError::OperationCanceled
pub trait JobWork: Send {
    fn run(&mut self, monitor: &dyn ProgressMonitor) -> anyhow::Result<()>;
}

impl<F> JobWork for F
where
    F: FnMut(&dyn ProgressMonitor) -> anyhow::Result<()> + Send,
{
    fn run(&mut self, monitor: &dyn ProgressMonitor) -> anyhow::Result<()> {
        (self)(monitor)
    }
}

type FamilyPredicate = Box<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Mutable job bookkeeping. Guarded by the job's own mutex; the manager
/// always takes its state lock before a job lock, never the reverse.
pub(crate) struct JobMut {
    pub(crate) state: JobState,
    pub(crate) priority: JobPriority,
    pub(crate) rule: Option<Rule>,
    pub(crate) status: Option<JobStatus>,
    /// Submission sequence, the FIFO tie-break within a priority level.
    pub(crate) seq: u64,
    pub(crate) scheduled_at: Option<DateTime<Utc>>,
    /// Present while the job is running; lets `cancel` reach the run.
    pub(crate) cancel_flag: Option<Arc<AtomicBool>>,
    pub(crate) monitor: Option<Arc<JobMonitor>>,
}

struct JobInner {
    id: Uuid,
    name: String,
    family: Option<FamilyPredicate>,
    work: Mutex<Box<dyn JobWork>>,
    mutable: Mutex<JobMut>,
}

/// Handle to a schedulable unit of asynchronous work.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> JobState {
        self.inner.mutable.lock().state
    }

    pub fn priority(&self) -> JobPriority {
        self.inner.mutable.lock().priority
    }

    pub fn rule(&self) -> Option<Rule> {
        self.inner.mutable.lock().rule.clone()
    }

    /// Terminal status of the most recent run, if any.
    pub fn status(&self) -> Option<JobStatus> {
        self.inner.mutable.lock().status.clone()
    }

    /// When the job was last accepted by `schedule`.
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.inner.mutable.lock().scheduled_at
    }

    /// Whether this job belongs to the given family key. Jobs built
    /// without a family predicate belong to no family.
    pub fn belongs_to(&self, key: &dyn Any) -> bool {
        self.inner.family.as_ref().is_some_and(|p| p(key))
    }

    /// Family matching as used by the bulk operations: a `None` key
    /// matches every job.
    pub(crate) fn matches_family(&self, key: Option<&dyn Any>) -> bool {
        match key {
            None => true,
            Some(key) => self.belongs_to(key),
        }
    }

    pub(crate) fn mutable(&self) -> MutexGuard<'_, JobMut> {
        self.inner.mutable.lock()
    }

    /// Invoke the user work function. Holding the work mutex for the whole
    /// run also serializes any (illegal) attempt to run the same job twice.
    pub(crate) fn run_work(&self, monitor: &dyn ProgressMonitor) -> anyhow::Result<()> {
        let mut work = self.inner.work.lock();
        work.run(monitor)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.inner.mutable.lock();
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &m.state)
            .field("priority", &m.priority)
            .finish()
    }
}

/// Builder for [`Job`] handles.
pub struct JobBuilder {
    name: String,
    priority: JobPriority,
    rule: Option<Rule>,
    family: Option<FamilyPredicate>,
    work: Option<Box<dyn JobWork>>,
}

impl JobBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: JobPriority::Long,
            rule: None,
            family: None,
            work: None,
        }
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Scheduling rule held for the whole duration of each run.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Caller-defined family membership predicate.
    pub fn family_predicate(
        mut self,
        predicate: impl Fn(&dyn Any) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.family = Some(Box::new(predicate));
        self
    }

    /// Family membership by equality with a token value. The job belongs
    /// to exactly the keys that downcast to `T` and compare equal.
    pub fn family_token<T>(self, token: T) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
    {
        self.family_predicate(move |key| key.downcast_ref::<T>() == Some(&token))
    }

    pub fn work(mut self, work: impl JobWork + 'static) -> Self {
        self.work = Some(Box::new(work));
        self
    }

    pub fn build(self) -> Job {
        let work = self.work.unwrap_or_else(|| {
            Box::new(|_: &dyn ProgressMonitor| -> anyhow::Result<()> { Ok(()) })
        });
        Job {
            inner: Arc::new(JobInner {
                id: Uuid::new_v4(),
                name: self.name,
                family: self.family,
                work: Mutex::new(work),
                mutable: Mutex::new(JobMut {
                    state: JobState::None,
                    priority: self.priority,
                    rule: self.rule,
                    status: None,
                    seq: 0,
                    scheduled_at: None,
                    cancel_flag: None,
                    monitor: None,
                }),
            }),
        }
    }
}
