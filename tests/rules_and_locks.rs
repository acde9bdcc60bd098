//! Cross-thread rule and lock behavior: conflict blocking, cancellation of
//! blocked begins, lock release around rule waits, deadlock recovery, and
//! shutdown interruption.

use job_conductor::{
    Job, JobManager, JobState, NullProgressMonitor, PathRule, ProgressMonitor, SchedulerConfig,
    SchedulerError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn manager(config: SchedulerConfig) -> Arc<JobManager> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    Arc::new(JobManager::new(config).unwrap())
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn test_conflicting_begin_rule_blocks_until_holder_ends() {
    let mgr = manager(SchedulerConfig::default());
    let holder_in = Arc::new(AtomicBool::new(false));

    let mgr_t = mgr.clone();
    let holder_in_t = holder_in.clone();
    let holder = thread::spawn(move || {
        let rule = PathRule::shared("db");
        mgr_t.begin_rule(Some(&rule), None).unwrap();
        holder_in_t.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(300));
        mgr_t.end_rule(Some(&rule)).unwrap();
    });

    assert!(wait_until(Duration::from_secs(2), || {
        holder_in.load(Ordering::SeqCst)
    }));

    // A non-conflicting rule proceeds immediately.
    let unrelated = PathRule::shared("cache");
    let start = Instant::now();
    mgr.begin_rule(Some(&unrelated), None).unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    mgr.end_rule(Some(&unrelated)).unwrap();

    // A conflicting rule waits for the holder.
    let conflicting = PathRule::shared("db/accounts");
    let start = Instant::now();
    mgr.begin_rule(Some(&conflicting), None).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
    mgr.end_rule(Some(&conflicting)).unwrap();

    holder.join().unwrap();
}

#[test]
fn test_canceling_monitor_aborts_blocked_begin_rule() {
    let mgr = manager(SchedulerConfig::default());
    let holder_in = Arc::new(AtomicBool::new(false));

    let mgr_t = mgr.clone();
    let holder_in_t = holder_in.clone();
    let holder = thread::spawn(move || {
        let rule = PathRule::shared("db");
        mgr_t.begin_rule(Some(&rule), None).unwrap();
        holder_in_t.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(800));
        mgr_t.end_rule(Some(&rule)).unwrap();
    });

    assert!(wait_until(Duration::from_secs(2), || {
        holder_in.load(Ordering::SeqCst)
    }));

    let monitor = Arc::new(NullProgressMonitor::new());
    let canceler = monitor.clone();
    let cancel_thread = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        canceler.set_canceled(true);
    });

    let conflicting = PathRule::shared("db");
    let start = Instant::now();
    let err = mgr
        .begin_rule(Some(&conflicting), Some(&*monitor))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::OperationCanceled));
    assert!(start.elapsed() < Duration::from_millis(700));

    // The canceled begin left no rule on this thread's stack.
    let err = mgr.end_rule(Some(&conflicting)).unwrap_err();
    assert!(matches!(err, SchedulerError::IllegalArgument { .. }));

    cancel_thread.join().unwrap();
    holder.join().unwrap();
}

#[test]
fn test_begin_rule_releases_and_reacquires_locks() {
    let mgr = manager(SchedulerConfig::default());
    let lock = mgr.new_lock();
    let rule_holder_in = Arc::new(AtomicBool::new(false));
    let holder_done = Arc::new(AtomicBool::new(false));

    let mgr_t = mgr.clone();
    let lock_t = lock.clone();
    let rule_holder_in_t = rule_holder_in.clone();
    let holder_done_t = holder_done.clone();
    let holder = thread::spawn(move || {
        let rule = PathRule::shared("db");
        mgr_t.begin_rule(Some(&rule), None).unwrap();
        rule_holder_in_t.store(true, Ordering::SeqCst);
        // This blocks until the main thread parks inside begin_rule and
        // its lock is suspended; a correct implementation hands the lock
        // over instead of deadlocking.
        assert!(lock_t.acquire(None).unwrap());
        thread::sleep(Duration::from_millis(50));
        lock_t.release().unwrap();
        mgr_t.end_rule(Some(&rule)).unwrap();
        holder_done_t.store(true, Ordering::SeqCst);
    });

    assert!(lock.acquire(None).unwrap());
    assert!(wait_until(Duration::from_secs(2), || {
        rule_holder_in.load(Ordering::SeqCst)
    }));

    // Conflicts with the holder's rule; our lock must be released while
    // we wait and owned again once we return.
    let conflicting = PathRule::shared("db");
    mgr.begin_rule(Some(&conflicting), None).unwrap();
    assert!(lock.is_held_by_current_thread());
    assert!(wait_until(Duration::from_secs(1), || {
        holder_done.load(Ordering::SeqCst)
    }));

    mgr.end_rule(Some(&conflicting)).unwrap();
    lock.release().unwrap();
    holder.join().unwrap();
}

#[test]
fn test_deadlock_cycle_is_broken() {
    let mgr = manager(SchedulerConfig::default());
    let lock_a = mgr.new_lock();
    let lock_b = mgr.new_lock();
    let barrier = Arc::new(Barrier::new(2));
    let t1_done = Arc::new(AtomicBool::new(false));
    let t2_done = Arc::new(AtomicBool::new(false));

    let (a1, b1, bar1, done1) = (
        lock_a.clone(),
        lock_b.clone(),
        barrier.clone(),
        t1_done.clone(),
    );
    let t1 = thread::spawn(move || {
        assert!(a1.acquire(None).unwrap());
        bar1.wait();
        assert!(b1.acquire(None).unwrap());
        b1.release().unwrap();
        a1.release().unwrap();
        done1.store(true, Ordering::SeqCst);
    });

    let (a2, b2, bar2, done2) = (
        lock_a.clone(),
        lock_b.clone(),
        barrier.clone(),
        t2_done.clone(),
    );
    let t2 = thread::spawn(move || {
        assert!(b2.acquire(None).unwrap());
        bar2.wait();
        assert!(a2.acquire(None).unwrap());
        a2.release().unwrap();
        b2.release().unwrap();
        done2.store(true, Ordering::SeqCst);
    });

    // Both threads must make progress; a generous bound guards the test.
    assert!(wait_until(Duration::from_secs(10), || {
        t1_done.load(Ordering::SeqCst) && t2_done.load(Ordering::SeqCst)
    }));
    t1.join().unwrap();
    t2.join().unwrap();

    // Everything was released; either lock is immediately available.
    assert!(lock_a.acquire(Some(Duration::from_millis(100))).unwrap());
    lock_a.release().unwrap();
    assert!(lock_b.acquire(Some(Duration::from_millis(100))).unwrap());
    lock_b.release().unwrap();
}

#[test]
fn test_lock_waiters_are_granted_fifo() {
    let mgr = manager(SchedulerConfig::default());
    let lock = mgr.new_lock();
    let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    assert!(lock.acquire(None).unwrap());

    let mut handles = Vec::new();
    for (name, delay_ms) in [("first", 0u64), ("second", 80)] {
        let lock = lock.clone();
        let order = order.clone();
        handles.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            assert!(lock.acquire(None).unwrap());
            order.lock().unwrap().push(name);
            lock.release().unwrap();
        }));
    }

    // Give both waiters time to queue up, then let them through.
    thread::sleep(Duration::from_millis(250));
    lock.release().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), ["first", "second"]);
}

#[test]
fn test_queued_job_defers_to_explicitly_begun_rule() {
    let mgr = manager(SchedulerConfig::default());
    let rule = PathRule::shared("db");
    mgr.begin_rule(Some(&rule), None).unwrap();

    let job = Job::builder("db-writer")
        .rule(PathRule::shared("db/accounts"))
        .work(|_m: &dyn ProgressMonitor| Ok(()))
        .build();
    mgr.schedule(&job, Duration::ZERO).unwrap();

    thread::sleep(Duration::from_millis(300));
    assert_eq!(job.state(), JobState::Waiting);

    mgr.end_rule(Some(&rule)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        job.state() == JobState::None
    }));
    assert!(job.status().unwrap().is_ok());
}

#[test]
fn test_running_job_rule_blocks_conflicting_begin() {
    let mgr = manager(SchedulerConfig::default());
    let release = Arc::new(AtomicBool::new(false));
    let release_t = release.clone();
    let job = Job::builder("rule-holder")
        .rule(PathRule::shared("db"))
        .work(move |_m: &dyn ProgressMonitor| {
            while !release_t.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        })
        .build();
    mgr.schedule(&job, Duration::ZERO).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        job.state() == JobState::Running
    }));

    let monitor = Arc::new(NullProgressMonitor::new());
    let canceler = monitor.clone();
    let helper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        canceler.set_canceled(true);
    });

    // The running job's rule is active, so this begin must not proceed
    // while the job runs; the canceled monitor backs it out. The job is
    // only released afterwards, so the conflict holds for the whole wait.
    let conflicting = PathRule::shared("db");
    let err = mgr
        .begin_rule(Some(&conflicting), Some(&*monitor))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::OperationCanceled));
    assert_eq!(job.state(), JobState::Running);

    helper.join().unwrap();
    release.store(true, Ordering::SeqCst);
    mgr.join(None, None).unwrap();
}

#[test]
fn test_current_job_visible_from_work() {
    let mgr = manager(SchedulerConfig::default());
    let seen = Arc::new(Mutex::new(None::<String>));

    let mgr_inner = mgr.clone();
    let seen_inner = seen.clone();
    let job = Job::builder("introspective")
        .work(move |_m: &dyn ProgressMonitor| {
            let current = mgr_inner.current_job().map(|j| j.name().to_string());
            *seen_inner.lock().unwrap() = current;
            Ok(())
        })
        .build();

    assert!(mgr.current_job().is_none());
    mgr.schedule(&job, Duration::ZERO).unwrap();
    mgr.join(None, None).unwrap();

    assert_eq!(seen.lock().unwrap().as_deref(), Some("introspective"));
    mgr.shutdown();
}

#[test]
fn test_shutdown_interrupts_blocked_join() {
    let mgr = manager(SchedulerConfig::default());
    let job = Job::builder("long-haul")
        .work(|_m: &dyn ProgressMonitor| {
            thread::sleep(Duration::from_millis(400));
            Ok(())
        })
        .build();
    mgr.schedule(&job, Duration::ZERO).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        job.state() == JobState::Running
    }));

    let mgr_t = mgr.clone();
    let joiner = thread::spawn(move || mgr_t.join(None, None));
    thread::sleep(Duration::from_millis(100));
    mgr.shutdown();

    let result = joiner.join().unwrap();
    assert!(matches!(result, Err(SchedulerError::Interrupted)));
}
