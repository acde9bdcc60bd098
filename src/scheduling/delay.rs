//! Delay timer service
//!
//! A single dedicated thread promotes delay-scheduled sleeping jobs into
//! the waiting queue once their wake time elapses, then wakes the worker
//! pool. The thread parks on the manager's change condvar, so a newly
//! scheduled delay re-arms it immediately; a bounded tick keeps it honest
//! against clock edge cases.

use crate::scheduling::job_manager::ManagerCore;
use crate::scheduling::types::JobState;
use crate::scheduling::worker_pool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const MAX_TICK: Duration = Duration::from_millis(500);

pub(crate) fn timer_loop(core: Arc<ManagerCore>) {
    debug!("Delay timer started");
    let mut guard = core.state.lock();
    loop {
        if guard.shutdown {
            break;
        }
        let now = Instant::now();
        let mut due = Vec::new();
        guard.sleeping.retain(|entry| match entry.wake_at {
            Some(at) if at <= now => {
                due.push(entry.job.clone());
                false
            }
            _ => true,
        });
        if !due.is_empty() {
            for job in &due {
                job.mutable().state = JobState::Waiting;
                guard.queue.enqueue(job.clone());
                debug!("Delay elapsed for job '{}', now waiting", job.name());
            }
            worker_pool::signal_work(&core, &mut guard);
        }

        let next_due = guard.sleeping.iter().filter_map(|e| e.wake_at).min();
        let timeout = match next_due {
            Some(at) => at
                .saturating_duration_since(Instant::now())
                .min(MAX_TICK)
                .max(Duration::from_millis(1)),
            None => MAX_TICK,
        };
        core.change.wait_for(&mut guard, timeout);
    }
    drop(guard);
    debug!("Delay timer stopped");
}
