//! Reentrant locks with global tracking and deadlock recovery
//!
//! All locks created by one manager share a single lock table, so the
//! deadlock detector can reason about every lock held by every thread.
//! Waiters queue FIFO per lock. When a requested wait would close a cycle
//! in the wait-for graph, the victim thread's locks are suspended (force
//! released, depths recorded) and transparently reacquired in their
//! original order once the victim's own wait completes — trading extra
//! work on the victim for guaranteed progress.

use super::deadlock;
use crate::errors::{SchedulerError, SchedulerResult};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Hook notified immediately before a thread blocks waiting for a lock and
/// immediately after a thread fully releases one. Single slot: setting a
/// new listener replaces the previous one (last writer wins).
#[allow(unused_variables)]
pub trait LockListener: Send + Sync {
    fn about_to_wait(&self, lock: &Lock) {}
    fn released(&self, lock: &Lock) {}
}

pub(crate) struct LockRecord {
    pub(crate) owner: Option<ThreadId>,
    pub(crate) depth: usize,
    pub(crate) waiters: VecDeque<ThreadId>,
}

impl LockRecord {
    pub(crate) fn new() -> Self {
        Self {
            owner: None,
            depth: 0,
            waiters: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn owned_by(owner: ThreadId) -> Self {
        Self {
            owner: Some(owner),
            depth: 1,
            waiters: VecDeque::new(),
        }
    }
}

pub(crate) struct ThreadLockInfo {
    /// Monotonic id assigned on first contact; the deadlock victim
    /// tie-break.
    pub(crate) internal_id: u64,
    /// Locks held, in acquisition order.
    pub(crate) held: Vec<u64>,
    /// The lock this thread is currently blocked on, if any.
    pub(crate) waiting_for: Option<u64>,
    /// Locks force-released from this thread by the deadlock detector,
    /// with their reentrancy depths, pending reacquisition.
    pub(crate) suspended: Vec<(u64, usize)>,
}

pub(crate) struct LockTable {
    pub(crate) locks: HashMap<u64, LockRecord>,
    pub(crate) threads: HashMap<ThreadId, ThreadLockInfo>,
    pub(crate) closed: bool,
    next_internal_id: u64,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self {
            locks: HashMap::new(),
            threads: HashMap::new(),
            closed: false,
            next_internal_id: 1,
        }
    }

    pub(crate) fn register_thread(&mut self, thread: ThreadId) {
        let next_id = &mut self.next_internal_id;
        self.threads.entry(thread).or_insert_with(|| {
            let info = ThreadLockInfo {
                internal_id: *next_id,
                held: Vec::new(),
                waiting_for: None,
                suspended: Vec::new(),
            };
            *next_id += 1;
            info
        });
    }

    #[cfg(test)]
    pub(crate) fn thread_info_mut(&mut self, thread: ThreadId) -> &mut ThreadLockInfo {
        self.threads.get_mut(&thread).expect("thread not registered")
    }

    /// Force-release every lock held by `victim`, recording depths for
    /// later reacquisition.
    fn suspend_thread_locks(&mut self, victim: ThreadId) {
        let held = match self.threads.get_mut(&victim) {
            Some(info) => std::mem::take(&mut info.held),
            None => return,
        };
        let mut suspended = Vec::with_capacity(held.len());
        for lock_id in held {
            if let Some(rec) = self.locks.get_mut(&lock_id) {
                suspended.push((lock_id, rec.depth));
                rec.owner = None;
                rec.depth = 0;
            }
        }
        if let Some(info) = self.threads.get_mut(&victim) {
            info.suspended.extend(suspended);
        }
    }

    fn remove_waiter(&mut self, thread: ThreadId, lock_id: u64) {
        if let Some(rec) = self.locks.get_mut(&lock_id) {
            rec.waiters.retain(|t| *t != thread);
        }
        if let Some(info) = self.threads.get_mut(&thread) {
            info.waiting_for = None;
        }
    }
}

/// Locks released around a blocking wait (`begin_rule`, `join`), restored
/// in original order afterwards.
#[must_use]
pub(crate) struct SuspendedLocks {
    entries: Vec<(u64, usize)>,
}

pub(crate) struct LockCore {
    table: Mutex<LockTable>,
    available: Condvar,
    listener: RwLock<Option<Arc<dyn LockListener>>>,
    next_lock_id: AtomicU64,
}

impl LockCore {
    fn acquire(self: &Arc<Self>, id: u64, timeout: Option<Duration>) -> SchedulerResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let acquired = self.acquire_core(id, deadline);
        // Whatever the outcome of the target acquisition, anything the
        // detector suspended from this thread must be restored before the
        // caller regains control.
        let drained = self.drain_suspended();
        match acquired {
            Ok(result) => drained.map(|_| result),
            Err(err) => Err(err),
        }
    }

    /// Raw wait loop for one lock. Does not touch the suspended list of
    /// the calling thread, so it is safe to use during reacquisition.
    fn acquire_core(self: &Arc<Self>, id: u64, deadline: Option<Instant>) -> SchedulerResult<bool> {
        let me = thread::current().id();
        let mut table = self.table.lock();
        if table.closed {
            return Err(SchedulerError::Interrupted);
        }
        table.register_thread(me);

        {
            let Some(rec) = table.locks.get_mut(&id) else {
                return Err(SchedulerError::illegal_state(format!(
                    "lock {id} is not registered with this manager"
                )));
            };
            if rec.owner == Some(me) {
                rec.depth += 1;
                return Ok(true);
            }
            if rec.owner.is_none() && rec.waiters.is_empty() {
                rec.owner = Some(me);
                rec.depth = 1;
                if let Some(info) = table.threads.get_mut(&me) {
                    info.held.push(id);
                }
                return Ok(true);
            }
            rec.waiters.push_back(me);
        }
        if let Some(info) = table.threads.get_mut(&me) {
            info.waiting_for = Some(id);
        }

        let mut announced = false;
        loop {
            let front_and_free = table
                .locks
                .get(&id)
                .is_some_and(|rec| rec.owner.is_none() && rec.waiters.front() == Some(&me));
            if front_and_free {
                if let Some(rec) = table.locks.get_mut(&id) {
                    rec.waiters.pop_front();
                    rec.owner = Some(me);
                    rec.depth = 1;
                }
                if let Some(info) = table.threads.get_mut(&me) {
                    info.waiting_for = None;
                    info.held.push(id);
                }
                return Ok(true);
            }

            if table.closed {
                table.remove_waiter(me, id);
                return Err(SchedulerError::Interrupted);
            }

            if let Some(victim) = deadlock::find_victim(&table, me, id) {
                warn!(
                    "Deadlock cycle detected while waiting for lock {}; suspending locks of victim thread {:?}",
                    id, victim
                );
                table.suspend_thread_locks(victim);
                self.available.notify_all();
                // Ownership changed; re-evaluate before parking.
                continue;
            }

            if let Some(d) = deadline {
                if Instant::now() >= d {
                    table.remove_waiter(me, id);
                    debug!("Timed out waiting for lock {}", id);
                    return Ok(false);
                }
            }

            if !announced {
                announced = true;
                let listener = self.listener.read().clone();
                if let Some(listener) = listener {
                    drop(table);
                    listener.about_to_wait(&Lock {
                        id,
                        core: Arc::clone(self),
                    });
                    table = self.table.lock();
                    continue;
                }
            }

            match deadline {
                Some(d) => {
                    self.available.wait_until(&mut table, d);
                }
                None => self.available.wait(&mut table),
            }
        }
    }

    fn release(self: &Arc<Self>, id: u64) -> SchedulerResult<()> {
        let me = thread::current().id();
        let fully_released = {
            let mut table = self.table.lock();
            let Some(rec) = table.locks.get_mut(&id) else {
                return Err(SchedulerError::illegal_state(format!(
                    "lock {id} is not registered with this manager"
                )));
            };
            if rec.owner != Some(me) {
                return Err(SchedulerError::illegal_state(format!(
                    "lock {id} released by a thread that does not own it"
                )));
            }
            rec.depth -= 1;
            if rec.depth == 0 {
                rec.owner = None;
                if let Some(info) = table.threads.get_mut(&me) {
                    info.held.retain(|l| *l != id);
                }
                self.available.notify_all();
                true
            } else {
                false
            }
        };
        if fully_released {
            if let Some(listener) = self.listener.read().clone() {
                listener.released(&Lock {
                    id,
                    core: Arc::clone(self),
                });
            }
        }
        Ok(())
    }

    /// Reacquire locks suspended from the calling thread by the deadlock
    /// detector. Loops because the thread can be victimized again while
    /// reacquiring.
    fn drain_suspended(self: &Arc<Self>) -> SchedulerResult<()> {
        let me = thread::current().id();
        loop {
            let batch = {
                let mut table = self.table.lock();
                match table.threads.get_mut(&me) {
                    Some(info) if !info.suspended.is_empty() => {
                        std::mem::take(&mut info.suspended)
                    }
                    _ => return Ok(()),
                }
            };
            debug!(
                "Reacquiring {} lock(s) suspended by deadlock recovery",
                batch.len()
            );
            self.restore(batch)?;
        }
    }

    fn restore(self: &Arc<Self>, entries: Vec<(u64, usize)>) -> SchedulerResult<()> {
        for (id, depth) in entries {
            self.acquire_core(id, None)?;
            let mut table = self.table.lock();
            if let Some(rec) = table.locks.get_mut(&id) {
                rec.depth = depth;
            }
        }
        Ok(())
    }
}

/// Reentrant mutual-exclusion primitive created by the manager's lock
/// factory. All locks from one manager know about each other and avoid
/// circular deadlock amongst themselves.
#[derive(Clone)]
pub struct Lock {
    id: u64,
    core: Arc<LockCore>,
}

impl Lock {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Acquire the lock, blocking up to `timeout` (`None` waits
    /// indefinitely). Reentrant for the owning thread. Returns `Ok(false)`
    /// on timeout. Fails with `Interrupted` if the manager shuts down
    /// while the caller is parked.
    pub fn acquire(&self, timeout: Option<Duration>) -> SchedulerResult<bool> {
        self.core.acquire(self.id, timeout)
    }

    /// Release one level of reentrancy; the lock is freed (and the next
    /// FIFO waiter granted) when the depth reaches zero.
    pub fn release(&self) -> SchedulerResult<()> {
        self.core.release(self.id)
    }

    /// Reentrancy depth of the current owner (0 when free).
    pub fn depth(&self) -> usize {
        self.core
            .table
            .lock()
            .locks
            .get(&self.id)
            .map_or(0, |rec| rec.depth)
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.core
            .table
            .lock()
            .locks
            .get(&self.id)
            .is_some_and(|rec| rec.owner == Some(thread::current().id()))
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock").field("id", &self.id).finish()
    }
}

/// Factory and registry for [`Lock`]s, owned by the job manager.
pub(crate) struct LockManager {
    core: Arc<LockCore>,
}

impl LockManager {
    pub(crate) fn new() -> Self {
        Self {
            core: Arc::new(LockCore {
                table: Mutex::new(LockTable::new()),
                available: Condvar::new(),
                listener: RwLock::new(None),
                next_lock_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn new_lock(&self) -> Lock {
        let id = self.core.next_lock_id.fetch_add(1, Ordering::Relaxed);
        self.core.table.lock().locks.insert(id, LockRecord::new());
        debug!("Created lock {}", id);
        Lock {
            id,
            core: Arc::clone(&self.core),
        }
    }

    pub(crate) fn set_listener(&self, listener: Option<Arc<dyn LockListener>>) {
        *self.core.listener.write() = listener;
    }

    /// Release every lock held by the calling thread, to be restored with
    /// [`LockManager::reacquire`] after a blocking wait.
    pub(crate) fn suspend_current_thread(&self) -> SuspendedLocks {
        let me = thread::current().id();
        let mut table = self.core.table.lock();
        let held = match table.threads.get_mut(&me) {
            Some(info) => std::mem::take(&mut info.held),
            None => Vec::new(),
        };
        let mut entries = Vec::with_capacity(held.len());
        for lock_id in held {
            if let Some(rec) = table.locks.get_mut(&lock_id) {
                entries.push((lock_id, rec.depth));
                rec.owner = None;
                rec.depth = 0;
            }
        }
        if !entries.is_empty() {
            debug!(
                "Suspended {} lock(s) around a blocking wait",
                entries.len()
            );
            self.core.available.notify_all();
        }
        SuspendedLocks { entries }
    }

    /// Restore locks released by [`LockManager::suspend_current_thread`],
    /// in their original acquisition order.
    pub(crate) fn reacquire(&self, suspended: SuspendedLocks) -> SchedulerResult<()> {
        if !suspended.entries.is_empty() {
            self.core.restore(suspended.entries)?;
        }
        self.core.drain_suspended()
    }

    /// Wake and interrupt every parked waiter; subsequent acquisitions
    /// fail with `Interrupted`.
    pub(crate) fn close(&self) {
        self.core.table.lock().closed = true;
        self.core.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_reentrant_acquire_release() {
        let manager = LockManager::new();
        let lock = manager.new_lock();

        assert!(lock.acquire(None).unwrap());
        assert!(lock.acquire(None).unwrap());
        assert_eq!(lock.depth(), 2);

        lock.release().unwrap();
        assert_eq!(lock.depth(), 1);
        assert!(lock.is_held_by_current_thread());

        lock.release().unwrap();
        assert_eq!(lock.depth(), 0);
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    fn test_release_by_non_owner_fails() {
        let manager = LockManager::new();
        let lock = manager.new_lock();

        let err = lock.release().unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalState { .. }));

        assert!(lock.acquire(None).unwrap());
        let other = lock.clone();
        let result = thread::spawn(move || other.release()).join().unwrap();
        assert!(result.is_err());
        lock.release().unwrap();
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let manager = LockManager::new();
        let lock = manager.new_lock();
        assert!(lock.acquire(None).unwrap());

        let contender = lock.clone();
        let acquired = thread::spawn(move || {
            contender
                .acquire(Some(Duration::from_millis(100)))
                .unwrap()
        })
        .join()
        .unwrap();
        assert!(!acquired);
        lock.release().unwrap();
    }

    #[test]
    fn test_suspend_and_reacquire_round_trip() {
        let manager = LockManager::new();
        let lock = manager.new_lock();
        assert!(lock.acquire(None).unwrap());
        assert!(lock.acquire(None).unwrap());

        let suspended = manager.suspend_current_thread();
        assert_eq!(lock.depth(), 0);
        assert!(!lock.is_held_by_current_thread());

        manager.reacquire(suspended).unwrap();
        assert_eq!(lock.depth(), 2);
        assert!(lock.is_held_by_current_thread());

        lock.release().unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn test_lock_listener_about_to_wait_fires() {
        struct Flagging {
            waited: AtomicBool,
        }
        impl LockListener for Flagging {
            fn about_to_wait(&self, _lock: &Lock) {
                self.waited.store(true, Ordering::SeqCst);
            }
        }

        let manager = LockManager::new();
        let listener = Arc::new(Flagging {
            waited: AtomicBool::new(false),
        });
        manager.set_listener(Some(listener.clone()));

        let lock = manager.new_lock();
        assert!(lock.acquire(None).unwrap());
        let contender = lock.clone();
        let handle = thread::spawn(move || {
            contender.acquire(Some(Duration::from_millis(200))).unwrap()
        });
        let _ = handle.join().unwrap();
        assert!(listener.waited.load(Ordering::SeqCst));
        lock.release().unwrap();
    }
}
