//! Job manager façade
//!
//! The manager coordinates the waiting queue, the worker pool, the delay
//! timer, family bookkeeping, the rule engine and the lock table. It is an
//! explicitly constructed, process-scoped object: collaborators receive a
//! reference, there are no static singletons. All mutations of job state,
//! rule stacks and worker accounting are serialized through one internal
//! state lock, making dequeue, rule grant and lock acquisition atomic with
//! respect to each other. Listeners, progress sinks and user work are
//! always invoked with no internal lock held.

use crate::config::SchedulerConfig;
use crate::errors::{SchedulerError, SchedulerResult};
use crate::events::{self, JobChangeListener, ListenerSet};
use crate::locks::{Lock, LockListener, LockManager};
use crate::progress::{NullProgressProvider, ProgressMonitor, ProgressProvider};
use crate::rules::{self, Rule};
use crate::scheduling::delay;
use crate::scheduling::job::Job;
use crate::scheduling::job_queue::JobQueue;
use crate::scheduling::rule_context::ThreadRuleContext;
use crate::scheduling::types::{JobEvent, JobState, JobStatus, QueueStats};
use crate::scheduling::worker_pool;
use chrono::Utc;
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Poll granularity for blocking waits that must observe a cancellation
/// monitor (`begin_rule`, `join`).
const BLOCK_POLL: Duration = Duration::from_millis(50);

/// A job held back by a start delay or an explicit sleep request.
pub(crate) struct SleepEntry {
    pub(crate) job: Job,
    /// Automatic wake time for delayed schedules; `None` for explicit
    /// sleeps, which wait for `wake_up`.
    pub(crate) wake_at: Option<Instant>,
}

pub(crate) struct ManagerState {
    pub(crate) queue: JobQueue,
    pub(crate) sleeping: Vec<SleepEntry>,
    pub(crate) running: HashMap<Uuid, Job>,
    pub(crate) contexts: HashMap<ThreadId, ThreadRuleContext>,
    pub(crate) total_workers: usize,
    pub(crate) idle_workers: usize,
    pub(crate) worker_counter: u64,
    pub(crate) worker_handles: Vec<JoinHandle<()>>,
    pub(crate) timer_handle: Option<JoinHandle<()>>,
    pub(crate) shutdown: bool,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            queue: JobQueue::new(),
            sleeping: Vec::new(),
            running: HashMap::new(),
            contexts: HashMap::new(),
            total_workers: 0,
            idle_workers: 0,
            worker_counter: 0,
            worker_handles: Vec::new(),
            timer_handle: None,
            shutdown: false,
        }
    }

    /// Effective rules granted to any thread: running jobs' rules plus
    /// explicit `begin_rule` spans.
    pub(crate) fn active_rules(&self) -> Vec<Rule> {
        self.contexts
            .values()
            .filter_map(|c| c.effective_rule().cloned())
            .collect()
    }

    /// Live (waiting, sleeping or running) family members, optionally
    /// excluding one job id.
    fn live_family_count(&self, family: Option<&dyn Any>, exclude: Option<Uuid>) -> usize {
        self.iter_live()
            .filter(|j| exclude.map_or(true, |ex| j.id() != ex))
            .filter(|j| j.matches_family(family))
            .count()
    }

    fn iter_live(&self) -> impl Iterator<Item = &Job> {
        self.queue
            .iter_jobs()
            .chain(self.sleeping.iter().map(|e| &e.job))
            .chain(self.running.values())
    }
}

pub(crate) struct ManagerCore {
    pub(crate) config: SchedulerConfig,
    pub(crate) state: Mutex<ManagerState>,
    /// Wakes parked workers when queue contents or active rules change.
    pub(crate) work_available: Condvar,
    /// Wakes the delay timer and threads blocked in `join`/`begin_rule`.
    pub(crate) change: Condvar,
    pub(crate) listeners: RwLock<ListenerSet>,
    pub(crate) progress: RwLock<Arc<dyn ProgressProvider>>,
    pub(crate) locks: LockManager,
    seq: AtomicU64,
}

impl ManagerCore {
    pub(crate) fn emit(&self, job: &Job, event: &JobEvent) {
        let listeners = self.listeners.read().snapshot();
        if !listeners.is_empty() {
            events::dispatch(&listeners, job, event);
        }
    }
}

/// The scheduler façade. See the crate documentation for the lifecycle
/// and blocking contracts of each operation.
pub struct JobManager {
    core: Arc<ManagerCore>,
}

impl JobManager {
    /// Construct a manager with the given configuration, starting its
    /// delay timer thread. Workers are spawned on demand.
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        let core = Arc::new(ManagerCore {
            config,
            state: Mutex::new(ManagerState::new()),
            work_available: Condvar::new(),
            change: Condvar::new(),
            listeners: RwLock::new(ListenerSet::default()),
            progress: RwLock::new(Arc::new(NullProgressProvider)),
            locks: LockManager::new(),
            seq: AtomicU64::new(1),
        });
        let timer_core = Arc::clone(&core);
        let handle = thread::Builder::new()
            .name("job-timer".to_string())
            .spawn(move || delay::timer_loop(timer_core))
            .map_err(|e| {
                SchedulerError::illegal_state(format!("failed to spawn timer thread: {e}"))
            })?;
        core.state.lock().timer_handle = Some(handle);
        info!(
            "Job manager started (workers: {}..{})",
            core.config.min_workers, core.config.max_workers
        );
        Ok(Self { core })
    }

    /// Submit a job for execution after the given delay. A zero delay
    /// queues the job immediately. Never blocks.
    pub fn schedule(&self, job: &Job, delay: Duration) -> SchedulerResult<()> {
        {
            let mut state = self.core.state.lock();
            if state.shutdown {
                return Err(SchedulerError::illegal_state("manager is shut down"));
            }
            {
                let mut m = job.mutable();
                if m.state != JobState::None {
                    return Err(SchedulerError::illegal_state(format!(
                        "job '{}' is already {:?}",
                        job.name(),
                        m.state
                    )));
                }
                m.seq = self.core.seq.fetch_add(1, Ordering::Relaxed);
                m.scheduled_at = Some(Utc::now());
                m.status = None;
                m.state = if delay.is_zero() {
                    JobState::Waiting
                } else {
                    JobState::Sleeping
                };
            }
            if delay.is_zero() {
                state.queue.enqueue(job.clone());
                worker_pool::signal_work(&self.core, &mut state);
            } else {
                state.sleeping.push(SleepEntry {
                    job: job.clone(),
                    wake_at: Some(Instant::now() + delay),
                });
            }
        }
        // Re-arm the delay timer / join waiters outside the lock.
        self.core.change.notify_all();
        if delay.is_zero() {
            info!("Scheduled job '{}' ({})", job.name(), job.id());
        } else {
            info!(
                "Scheduled job '{}' ({}) with delay {:?}",
                job.name(),
                job.id(),
                delay
            );
        }
        self.core.emit(job, &JobEvent::Scheduled { delay });
        Ok(())
    }

    /// Cancel all jobs in the family (`None` matches every job). Waiting
    /// and sleeping members are discarded outright with a `Canceled`
    /// status; running members only get their cooperative cancel flag set
    /// — the result for those is requested, not guaranteed.
    pub fn cancel(&self, family: Option<&dyn Any>) {
        let discarded = {
            let mut state = self.core.state.lock();
            let mut discarded = state.queue.remove_matching(family);
            state.sleeping.retain(|entry| {
                if entry.job.matches_family(family) {
                    discarded.push(entry.job.clone());
                    false
                } else {
                    true
                }
            });
            for job in &discarded {
                let mut m = job.mutable();
                m.state = JobState::None;
                m.status = Some(JobStatus::Canceled);
            }
            for job in state.running.values() {
                if job.matches_family(family) {
                    request_cancel(job);
                }
            }
            discarded
        };
        self.core.change.notify_all();
        for job in &discarded {
            self.core.emit(job, &JobEvent::Done(JobStatus::Canceled));
        }
        if !discarded.is_empty() {
            info!("Canceled {} queued/sleeping job(s)", discarded.len());
        }
    }

    /// Cancel one job. Returns `true` when the job is guaranteed not to
    /// run again (it was waiting, sleeping or already finished); `false`
    /// when it is running and only a cooperative request was made.
    pub fn cancel_job(&self, job: &Job) -> bool {
        let (discarded, was_live) = {
            let mut state = self.core.state.lock();
            let current = job.state();
            match current {
                JobState::Waiting => {
                    state.queue.remove(job.id());
                    (true, true)
                }
                JobState::Sleeping => {
                    state.sleeping.retain(|e| e.job.id() != job.id());
                    (true, true)
                }
                JobState::Running => {
                    request_cancel(job);
                    (false, false)
                }
                JobState::None => (true, false),
            }
        };
        if was_live {
            {
                let mut m = job.mutable();
                m.state = JobState::None;
                m.status = Some(JobStatus::Canceled);
            }
            self.core.change.notify_all();
            self.core.emit(job, &JobEvent::Done(JobStatus::Canceled));
        }
        discarded
    }

    /// Move waiting family members to the sleeping state. Sleeping
    /// members lose any pending auto-wake; running members are
    /// unaffected.
    pub fn sleep(&self, family: Option<&dyn Any>) {
        let slept = {
            let mut state = self.core.state.lock();
            let moved = state.queue.remove_matching(family);
            for job in &moved {
                job.mutable().state = JobState::Sleeping;
                state.sleeping.push(SleepEntry {
                    job: job.clone(),
                    wake_at: None,
                });
            }
            for entry in state.sleeping.iter_mut() {
                if entry.job.matches_family(family) {
                    entry.wake_at = None;
                }
            }
            moved
        };
        for job in &slept {
            debug!("Job '{}' put to sleep", job.name());
            self.core.emit(job, &JobEvent::Sleeping);
        }
    }

    /// Return sleeping family members to the waiting queue, making them
    /// eligible for dequeue again.
    pub fn wake_up(&self, family: Option<&dyn Any>) {
        let woken = {
            let mut state = self.core.state.lock();
            let mut woken = Vec::new();
            state.sleeping.retain(|entry| {
                if entry.job.matches_family(family) {
                    woken.push(entry.job.clone());
                    false
                } else {
                    true
                }
            });
            for job in &woken {
                job.mutable().state = JobState::Waiting;
                state.queue.enqueue(job.clone());
            }
            if !woken.is_empty() {
                worker_pool::signal_work(&self.core, &mut state);
            }
            woken
        };
        for job in &woken {
            debug!("Job '{}' woken up", job.name());
            self.core.emit(job, &JobEvent::Awake);
        }
    }

    /// Point-in-time snapshot of live family members in any state.
    pub fn find(&self, family: Option<&dyn Any>) -> Vec<Job> {
        let state = self.core.state.lock();
        state
            .iter_live()
            .filter(|j| j.matches_family(family))
            .cloned()
            .collect()
    }

    /// The job currently running on the calling thread, if any.
    pub fn current_job(&self) -> Option<Job> {
        let state = self.core.state.lock();
        state
            .contexts
            .get(&thread::current().id())
            .and_then(|c| c.current_job.clone())
    }

    /// Block until no job of the family is waiting, running or sleeping.
    ///
    /// Progress is reported to the monitor (one unit per job that leaves
    /// the live set); canceling the monitor raises `OperationCanceled`
    /// without touching any job state, and a manager shutdown raises
    /// `Interrupted`. Locks owned by the calling thread are released for
    /// the duration of the wait and reacquired before returning. When
    /// called from inside a running job, that job itself is excluded so
    /// the join cannot self-deadlock.
    pub fn join(
        &self,
        family: Option<&dyn Any>,
        monitor: Option<&dyn ProgressMonitor>,
    ) -> SchedulerResult<()> {
        let tid = thread::current().id();
        let (total, own) = {
            let state = self.core.state.lock();
            let own = state
                .contexts
                .get(&tid)
                .and_then(|c| c.current_job.as_ref().map(Job::id));
            (state.live_family_count(family, own), own)
        };
        if total == 0 {
            return Ok(());
        }
        debug!("Joining {} live job(s)", total);
        if let Some(m) = monitor {
            m.begin_task("Waiting for jobs to complete", total);
        }
        let suspended = self.core.locks.suspend_current_thread();

        let mut reported = 0usize;
        let mut guard = self.core.state.lock();
        let result = loop {
            let live = guard.live_family_count(family, own);
            if live == 0 {
                break Ok(());
            }
            if guard.shutdown {
                break Err(SchedulerError::Interrupted);
            }
            let delta = (total.saturating_sub(live)).saturating_sub(reported);
            drop(guard);
            let mut canceled = false;
            if let Some(m) = monitor {
                if delta > 0 {
                    m.worked(delta);
                    reported += delta;
                }
                canceled = m.is_canceled();
            }
            guard = self.core.state.lock();
            if canceled {
                break Err(SchedulerError::OperationCanceled);
            }
            self.core.change.wait_for(&mut guard, BLOCK_POLL);
        };
        drop(guard);
        if let Some(m) = monitor {
            if result.is_ok() {
                // Jobs that finished between the last report and the final
                // recheck still count.
                let delta = total.saturating_sub(reported);
                if delta > 0 {
                    m.worked(delta);
                }
            }
            m.done();
        }
        let reacquired = self.core.locks.reacquire(suspended);
        match result {
            Ok(()) => reacquired,
            err => {
                if let Err(e) = reacquired {
                    warn!("Failed to reacquire locks after join: {}", e);
                }
                err
            }
        }
    }

    /// Begin applying a rule on the calling thread.
    ///
    /// Nesting is strict: a non-null rule must be contained by the
    /// thread's current outermost non-null rule when one exists. If the
    /// rule becomes the thread's effective rule and conflicts with another
    /// thread's effective rule, the call blocks until the conflict clears
    /// or the monitor cancels. While blocked, locks owned by the calling
    /// thread are released and reacquired in their original order before
    /// the call returns. A null rule is legal, never blocks and never
    /// conflicts, but must still be ended.
    pub fn begin_rule(
        &self,
        rule: Option<&Rule>,
        monitor: Option<&dyn ProgressMonitor>,
    ) -> SchedulerResult<()> {
        let tid = thread::current().id();
        let mut guard = self.core.state.lock();

        if let Some(r) = rule {
            if let Some(outer) = guard.contexts.get(&tid).and_then(|c| c.effective_rule()) {
                if !outer.contains(r.as_ref()) {
                    return Err(SchedulerError::illegal_nesting(format!(
                        "rule {:?} is not contained by the thread's outermost rule {:?}",
                        r, outer
                    )));
                }
            }
        }

        let becomes_effective = rule.is_some()
            && guard
                .contexts
                .get(&tid)
                .map_or(true, |c| c.effective_rule().is_none());
        let rule_to_wait = match (rule, becomes_effective) {
            (Some(r), true) => r.clone(),
            _ => {
                // Nested or null begins piggyback on the already-granted
                // effective rule and never block.
                guard
                    .contexts
                    .entry(tid)
                    .or_default()
                    .stack
                    .push(rule.cloned());
                return Ok(());
            }
        };

        let mut suspended = None;
        let mut result = Ok(());
        loop {
            if guard.shutdown {
                result = Err(SchedulerError::Interrupted);
                break;
            }
            let conflict = guard.contexts.iter().any(|(t, c)| {
                *t != tid
                    && c.effective_rule()
                        .is_some_and(|e| rules::conflicting(&rule_to_wait, e))
            });
            if !conflict {
                // Admission happens atomically under the state lock: once
                // granted here, every other beginner and dequeue sees it.
                guard
                    .contexts
                    .entry(tid)
                    .or_default()
                    .stack
                    .push(Some(rule_to_wait.clone()));
                break;
            }
            if suspended.is_none() {
                // Holding resource locks while parked on a rule can
                // deadlock against the rule holder; release them first.
                drop(guard);
                suspended = Some(self.core.locks.suspend_current_thread());
                guard = self.core.state.lock();
                continue;
            }
            drop(guard);
            let canceled = monitor.is_some_and(|m| m.is_canceled());
            guard = self.core.state.lock();
            if canceled {
                result = Err(SchedulerError::OperationCanceled);
                break;
            }
            self.core.change.wait_for(&mut guard, BLOCK_POLL);
        }
        drop(guard);

        if let Some(suspended) = suspended {
            let reacquired = self.core.locks.reacquire(suspended);
            match (&result, reacquired) {
                (Ok(()), r) => result = r,
                (Err(_), Err(e)) => {
                    warn!("Failed to reacquire locks after rule wait: {}", e);
                }
                _ => {}
            }
        }
        result
    }

    /// End the most recently begun rule on the calling thread. The
    /// argument must match the top of the thread's rule stack (identical
    /// rule handle, or null for a begun null rule).
    pub fn end_rule(&self, rule: Option<&Rule>) -> SchedulerResult<()> {
        let tid = thread::current().id();
        let mut guard = self.core.state.lock();
        let Some(ctx) = guard.contexts.get_mut(&tid) else {
            return Err(SchedulerError::illegal_argument(
                "end_rule called with no begun rule on this thread",
            ));
        };
        let matches = match (ctx.stack.last(), rule) {
            (None, _) => {
                return Err(SchedulerError::illegal_argument(
                    "end_rule called with no begun rule on this thread",
                ));
            }
            (Some(None), None) => true,
            (Some(Some(top)), Some(r)) => rules::same_rule(top, r),
            _ => false,
        };
        if !matches {
            return Err(SchedulerError::illegal_argument(
                "rule does not match the most recent begin_rule on this thread",
            ));
        }
        ctx.stack.pop();
        if ctx.is_idle() {
            guard.contexts.remove(&tid);
        }
        // Ending an effective rule may unblock queued jobs and other
        // beginners.
        worker_pool::signal_work(&self.core, &mut guard);
        drop(guard);
        self.core.change.notify_all();
        Ok(())
    }

    /// Create a new lock tracked by this manager's deadlock detector.
    pub fn new_lock(&self) -> Lock {
        self.core.locks.new_lock()
    }

    /// Install or clear the lock wait/release hook. Single slot; the last
    /// registration wins.
    pub fn set_lock_listener(&self, listener: Option<Arc<dyn LockListener>>) {
        self.core.locks.set_listener(listener);
    }

    /// Replace the progress provider wholesale (`None` restores the
    /// default no-op provider). The last registration wins.
    pub fn set_progress_provider(&self, provider: Option<Arc<dyn ProgressProvider>>) {
        let provider = provider.unwrap_or_else(|| Arc::new(NullProgressProvider));
        *self.core.progress.write() = provider;
    }

    /// Register a job-change listener. Duplicate registration is a no-op.
    pub fn add_job_change_listener(&self, listener: Arc<dyn JobChangeListener>) {
        self.core.listeners.write().add(listener);
    }

    /// Remove a previously registered listener. Removing an absent
    /// listener is a no-op.
    pub fn remove_job_change_listener(&self, listener: &Arc<dyn JobChangeListener>) {
        self.core.listeners.write().remove(listener);
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.core.state.lock();
        QueueStats {
            waiting_jobs: state.queue.len(),
            sleeping_jobs: state.sleeping.len(),
            running_jobs: state.running.len(),
            total_workers: state.total_workers,
            idle_workers: state.idle_workers,
        }
    }

    /// Stop the manager: discard queued and sleeping jobs with a
    /// `Canceled` status, request cancellation of running jobs, interrupt
    /// blocked waiters, then join the timer and worker threads.
    /// Idempotent; also invoked on drop.
    pub fn shutdown(&self) {
        let (discarded, worker_handles, timer_handle) = {
            let mut state = self.core.state.lock();
            if state.shutdown {
                return;
            }
            info!("Shutting down job manager");
            state.shutdown = true;
            let mut discarded = state.queue.remove_matching(None);
            for entry in std::mem::take(&mut state.sleeping) {
                discarded.push(entry.job);
            }
            for job in &discarded {
                let mut m = job.mutable();
                m.state = JobState::None;
                m.status = Some(JobStatus::Canceled);
            }
            for job in state.running.values() {
                request_cancel(job);
            }
            (
                discarded,
                std::mem::take(&mut state.worker_handles),
                state.timer_handle.take(),
            )
        };
        self.core.locks.close();
        self.core.work_available.notify_all();
        self.core.change.notify_all();
        for job in &discarded {
            self.core.emit(job, &JobEvent::Done(JobStatus::Canceled));
        }

        let me = thread::current().id();
        if let Some(handle) = timer_handle {
            if handle.thread().id() != me {
                let _ = handle.join();
            }
        }
        for handle in worker_handles {
            if handle.thread().id() != me {
                let _ = handle.join();
            }
        }
        info!("Job manager stopped");
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Set the cooperative cancel flag of a running job.
fn request_cancel(job: &Job) {
    let m = job.mutable();
    if let Some(flag) = &m.cancel_flag {
        flag.store(true, Ordering::SeqCst);
        debug!("Requested cancellation of running job '{}'", job.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PathRule;

    fn manager() -> JobManager {
        JobManager::new(SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn test_schedule_twice_is_illegal() {
        let mgr = manager();
        // A delayed job stays sleeping long enough to observe the state.
        let job = Job::builder("dup").work(|_m: &dyn ProgressMonitor| Ok(())).build();
        mgr.schedule(&job, Duration::from_secs(60)).unwrap();
        assert_eq!(job.state(), JobState::Sleeping);

        let err = mgr.schedule(&job, Duration::ZERO).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalState { .. }));
        mgr.cancel(None);
    }

    #[test]
    fn test_rule_nesting_strictly_lifo() {
        let mgr = manager();
        let outer = PathRule::shared("db");
        let inner = PathRule::shared("db/accounts");

        mgr.begin_rule(Some(&outer), None).unwrap();
        mgr.begin_rule(Some(&inner), None).unwrap();

        // Ending out of order is an argument error.
        let err = mgr.end_rule(Some(&outer)).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalArgument { .. }));

        mgr.end_rule(Some(&inner)).unwrap();
        mgr.end_rule(Some(&outer)).unwrap();
    }

    #[test]
    fn test_non_contained_nested_rule_rejected() {
        let mgr = manager();
        let outer = PathRule::shared("db");
        let stranger = PathRule::shared("cache");

        mgr.begin_rule(Some(&outer), None).unwrap();
        let err = mgr.begin_rule(Some(&stranger), None).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalNesting { .. }));

        // The failed begin left the stack untouched.
        mgr.end_rule(Some(&outer)).unwrap();
        let err = mgr.end_rule(Some(&outer)).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalArgument { .. }));
    }

    #[test]
    fn test_null_rule_must_still_be_ended() {
        let mgr = manager();
        mgr.begin_rule(None, None).unwrap();

        let rule = PathRule::shared("db");
        let err = mgr.end_rule(Some(&rule)).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalArgument { .. }));

        mgr.end_rule(None).unwrap();
    }

    #[test]
    fn test_end_rule_without_begin_fails() {
        let mgr = manager();
        let rule = PathRule::shared("db");
        let err = mgr.end_rule(Some(&rule)).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalArgument { .. }));
    }

    #[test]
    fn test_join_on_empty_family_returns_immediately() {
        let mgr = manager();
        mgr.join(Some(&"nothing"), None).unwrap();
    }

    #[test]
    fn test_find_none_matches_all_live_jobs() {
        let mgr = manager();
        let job = Job::builder("delayed").work(|_m: &dyn ProgressMonitor| Ok(())).build();
        mgr.schedule(&job, Duration::from_secs(60)).unwrap();

        assert_eq!(mgr.find(None).len(), 1);
        assert!(mgr.find(Some(&"family")).is_empty());

        mgr.cancel(None);
        assert!(mgr.find(None).is_empty());
        assert_eq!(job.state(), JobState::None);
        assert!(job.status().is_some_and(|s| s.is_canceled()));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mgr = manager();
        mgr.shutdown();
        mgr.shutdown();
        let err = mgr
            .schedule(&Job::builder("late").work(|_m: &dyn ProgressMonitor| Ok(())).build(), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalState { .. }));
    }
}
