//! Bounded worker pool executing queued jobs
//!
//! Workers are real OS threads. The pool grows on demand up to the
//! configured maximum whenever ready work arrives and no worker is idle,
//! and shrinks back towards the minimum after a worker sits idle past the
//! configured timeout. A worker picks the highest-priority waiting job
//! whose rule conflicts with no active rule, runs it with a monitor from
//! the registered progress provider, and converts any fault raised by the
//! user work into a terminal error status — a failing job never kills the
//! pool.

use crate::errors::SchedulerError;
use crate::progress::{JobMonitor, NullProgressMonitor, ProgressMonitor};
use crate::rules;
use crate::scheduling::job::Job;
use crate::scheduling::job_manager::{ManagerCore, ManagerState};
use crate::scheduling::types::{JobEvent, JobState, JobStatus};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Make queued work runnable: spawn a worker if the pool can grow and no
/// idle worker is available, then wake the pool. Called under the state
/// lock whenever queue contents or active rules change.
pub(crate) fn signal_work(core: &Arc<ManagerCore>, state: &mut ManagerState) {
    if !state.shutdown
        && !state.queue.is_empty()
        && state.idle_workers == 0
        && state.total_workers < core.config.max_workers
    {
        state.worker_handles.retain(|h| !h.is_finished());
        state.worker_counter += 1;
        let name = format!("{}-{}", core.config.worker_name_prefix, state.worker_counter);
        let worker_core = Arc::clone(core);
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(worker_core))
        {
            Ok(handle) => {
                state.total_workers += 1;
                state.worker_handles.push(handle);
                debug!("Spawned worker thread '{}'", name);
            }
            Err(err) => error!("Failed to spawn worker thread '{}': {}", name, err),
        }
    }
    core.work_available.notify_all();
}

pub(crate) fn worker_loop(core: Arc<ManagerCore>) {
    let idle_timeout = core.config.idle_timeout();
    let mut guard = core.state.lock();
    loop {
        if guard.shutdown {
            break;
        }
        let active = guard.active_rules();
        if let Some(job) = guard.queue.dequeue_next(&active) {
            let cancel_flag = prepare_run(&mut guard, &job);
            drop(guard);
            execute_job(&core, &job, cancel_flag);
            // The handle must not be dropped while holding the state lock:
            // a job closure owning the last manager reference would cascade
            // into shutdown from here.
            drop(job);
            guard = core.state.lock();
            continue;
        }
        guard.idle_workers += 1;
        let timed_out = core
            .work_available
            .wait_for(&mut guard, idle_timeout)
            .timed_out();
        guard.idle_workers -= 1;
        if guard.shutdown {
            break;
        }
        if timed_out && guard.total_workers > core.config.min_workers && guard.queue.is_empty() {
            debug!("Idle worker terminating, pool above minimum");
            break;
        }
    }
    guard.total_workers -= 1;
}

/// Transition a dequeued job to Running and grant its rule to the calling
/// worker thread. Must run under the state lock, atomically with the
/// dequeue that selected the job.
fn prepare_run(state: &mut ManagerState, job: &Job) -> Arc<AtomicBool> {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    {
        let mut m = job.mutable();
        m.state = JobState::Running;
        m.cancel_flag = Some(cancel_flag.clone());
    }
    state.running.insert(job.id(), job.clone());
    let ctx = state.contexts.entry(thread::current().id()).or_default();
    ctx.current_job = Some(job.clone());
    if let Some(rule) = job.rule() {
        ctx.stack.push(Some(rule));
    }
    cancel_flag
}

/// Undo `prepare_run` and record the terminal status. Runs under the
/// state lock on the worker thread that executed the job.
fn complete_run(state: &mut ManagerState, job: &Job, status: JobStatus) {
    state.running.remove(&job.id());
    let tid = thread::current().id();
    if let Some(ctx) = state.contexts.get_mut(&tid) {
        if let Some(rule) = job.rule() {
            match ctx.stack.pop() {
                Some(Some(top)) if rules::same_rule(&top, &rule) => {}
                _ => {
                    warn!(
                        "Job '{}' finished with an unbalanced rule stack, clearing it",
                        job.name()
                    );
                    ctx.stack.clear();
                }
            }
        } else if !ctx.stack.is_empty() {
            warn!(
                "Job '{}' finished with {} unended rule(s), clearing them",
                job.name(),
                ctx.stack.len()
            );
            ctx.stack.clear();
        }
        ctx.current_job = None;
        if ctx.is_idle() {
            state.contexts.remove(&tid);
        }
    }
    let mut m = job.mutable();
    m.state = JobState::None;
    m.status = Some(status);
    m.cancel_flag = None;
    m.monitor = None;
}

fn execute_job(core: &Arc<ManagerCore>, job: &Job, cancel_flag: Arc<AtomicBool>) {
    let start = Instant::now();
    info!(
        "Starting execution of job '{}' (priority: {:?})",
        job.name(),
        job.priority()
    );

    let provider = core.progress.read().clone();
    let sink: Arc<dyn ProgressMonitor> =
        match catch_unwind(AssertUnwindSafe(|| provider.create_monitor(job))) {
            Ok(sink) => sink,
            Err(_) => {
                error!(
                    "Progress provider panicked creating a monitor for job '{}'",
                    job.name()
                );
                Arc::new(NullProgressMonitor::new())
            }
        };
    let monitor = Arc::new(JobMonitor::new(sink, cancel_flag));
    job.mutable().monitor = Some(monitor.clone());

    core.emit(job, &JobEvent::AboutToRun);
    core.emit(job, &JobEvent::Running);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        job.run_work(monitor.as_ref() as &dyn ProgressMonitor)
    }));

    let status = match outcome {
        Ok(Ok(())) => {
            if monitor.is_canceled() {
                JobStatus::Canceled
            } else {
                JobStatus::Ok
            }
        }
        Ok(Err(err)) => {
            let canceled = err
                .downcast_ref::<SchedulerError>()
                .is_some_and(SchedulerError::is_canceled);
            if canceled {
                debug!("Job '{}' canceled cooperatively", job.name());
                JobStatus::Canceled
            } else {
                warn!("Job '{}' failed: {:#}", job.name(), err);
                JobStatus::Error(Arc::new(SchedulerError::ExecutionFault(err)))
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Job '{}' panicked: {}", job.name(), message);
            JobStatus::Error(Arc::new(SchedulerError::ExecutionFault(anyhow::anyhow!(
                "job '{}' panicked: {}",
                job.name(),
                message
            ))))
        }
    };

    monitor.done();

    {
        let mut state = core.state.lock();
        complete_run(&mut state, job, status.clone());
        // Completion may have cleared a rule conflict for queued work.
        signal_work(core, &mut state);
    }
    core.change.notify_all();
    core.emit(job, &JobEvent::Done(status.clone()));

    let label = match &status {
        JobStatus::Ok => "ok",
        JobStatus::Canceled => "canceled",
        JobStatus::Error(_) => "error",
    };
    info!(
        "Job '{}' finished in {:?} ({})",
        job.name(),
        start.elapsed(),
        label
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
