use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::current_thread_id;
use crate::object::ManagedObject;
use crate::{Bridge, BridgeError, BridgeResult, Handle};

/// Non-reentrant binary lock with native acquire/release semantics.
///
/// Releasing is allowed from any thread and releasing an unheld lock is a
/// no-op. The holder id exists only so a blocking acquire by the thread that
/// already holds the lock can fail instead of deadlocking.
pub struct NativeLock {
    state: Mutex<LockState>,
    cvar: Condvar,
}

#[derive(Default)]
struct LockState {
    locked: bool,
    holder: u64,
    waiters: usize,
}

impl NativeLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            cvar: Condvar::new(),
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut guard = self.state.lock();
        if guard.locked {
            return false;
        }
        guard.locked = true;
        guard.holder = current_thread_id();
        true
    }

    /// Returns whether the lock was taken. A blocking call waits until the
    /// lock is free, except when the caller is the current holder.
    pub fn acquire(&self, blocking: bool) -> bool {
        if !blocking {
            return self.try_acquire();
        }
        let me = current_thread_id();
        let mut guard = self.state.lock();
        if guard.locked && guard.holder == me {
            return false;
        }
        guard.waiters += 1;
        while guard.locked {
            self.cvar.wait(&mut guard);
        }
        guard.waiters -= 1;
        guard.locked = true;
        guard.holder = me;
        true
    }

    /// Marks the lock free and wakes at most one waiter. Returns whether it
    /// was held.
    pub fn release(&self) -> bool {
        let mut guard = self.state.lock();
        if !guard.locked {
            return false;
        }
        guard.locked = false;
        guard.holder = 0;
        self.cvar.notify_one();
        true
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn has_waiters(&self) -> bool {
        self.state.lock().waiters > 0
    }

    pub fn held_by_current_thread(&self) -> bool {
        let guard = self.state.lock();
        guard.locked && guard.holder == current_thread_id()
    }
}

impl Default for NativeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// Allocates a fresh, unheld lock and returns a new reference to it.
    pub fn allocate_lock(&self) -> Handle {
        self.store_unshared(ManagedObject::Lock(Arc::new(NativeLock::new())))
    }

    fn lock_object(&self, handle: Handle) -> BridgeResult<Arc<NativeLock>> {
        match self.retrieve(handle)? {
            ManagedObject::Lock(lock) => Ok(lock),
            other => Err(BridgeError::WrongKind {
                handle,
                expected: "lock",
                found: other.kind().name(),
            }),
        }
    }

    pub fn acquire_lock(&self, handle: Handle, blocking: bool) -> BridgeResult<bool> {
        let lock = self.lock_object(handle)?;
        Ok(lock.acquire(blocking))
    }

    pub fn release_lock(&self, handle: Handle) -> BridgeResult<()> {
        self.lock_object(handle)?.release();
        Ok(())
    }

    /// Drops the reference returned by `allocate_lock`.
    pub fn free_lock(&self, handle: Handle) -> BridgeResult<()> {
        let lock = self.lock_object(handle)?;
        if lock.has_waiters() {
            return Err(BridgeError::LockContractViolation(
                "freeing a lock with a blocked waiter",
            ));
        }
        drop(lock);
        self.dec_ref(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_thread_blocking_acquire_fails() {
        let lock = NativeLock::new();
        assert!(lock.acquire(true));
        assert!(lock.held_by_current_thread());
        assert!(!lock.acquire(true));
        assert!(!lock.acquire(false));
        assert!(lock.release());
        assert!(!lock.held_by_current_thread());
        assert!(!lock.is_locked());
        assert!(!lock.release());
    }

    #[test]
    fn release_from_another_thread_wakes_waiter() {
        let lock = Arc::new(NativeLock::new());
        assert!(lock.acquire(true));
        let (tx, rx) = mpsc::channel();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                assert!(lock.acquire(true));
                tx.send(()).unwrap();
                lock.release();
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        let releaser = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || assert!(lock.release()))
        };
        releaser.join().unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn bridge_lock_entry_points_check_kind() {
        let bridge = Bridge::with_defaults();
        let lock = bridge.allocate_lock();
        assert!(bridge.acquire_lock(lock, true).unwrap());
        bridge.release_lock(lock).unwrap();
        bridge.free_lock(lock).unwrap();
        assert!(!bridge.contains(lock));

        let not_a_lock = bridge.store(ManagedObject::Int(4));
        assert!(matches!(
            bridge.acquire_lock(not_a_lock, false),
            Err(BridgeError::WrongKind { expected: "lock", found: "int", .. })
        ));
    }
}
