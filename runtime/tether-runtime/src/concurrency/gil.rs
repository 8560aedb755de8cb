use std::num::NonZeroU64;

use super::{NativeLock, current_thread_id};
use crate::state::with_thread_state;
use crate::{Bridge, BridgeError, BridgeResult};

/// Result of `ensure_execution_lock`, to be handed back on release.
/// Discriminants follow the native `PyGILState_STATE` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EnsureState {
    AlreadyHeld = 0,
    Acquired = 1,
}

impl EnsureState {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Self {
        if raw == EnsureState::Acquired as i32 {
            EnsureState::Acquired
        } else {
            EnsureState::AlreadyHeld
        }
    }
}

/// Non-null token from the outermost save. Only the depth counter decides
/// whether a restore re-acquires; the token is bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedThread(NonZeroU64);

impl SavedThread {
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }

    /// `None` for the null token.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SavedThread)
    }
}

impl Bridge {
    pub fn execution_lock(&self) -> &NativeLock {
        &self.inner.gil
    }

    /// Whether the calling thread physically holds the execution lock.
    pub fn holds_execution_lock(&self) -> bool {
        with_thread_state(&self.inner, |state| state.holds_token).unwrap_or(false)
    }

    /// Blocks until the calling thread holds the execution lock. Nested calls
    /// on a thread that already holds it return immediately.
    pub fn ensure_execution_lock(&self) -> BridgeResult<EnsureState> {
        let gil = &self.inner.gil;
        with_thread_state(&self.inner, |state| {
            if state.holds_token {
                state.ensure_stack.push(false);
                return Ok(EnsureState::AlreadyHeld);
            }
            if !gil.acquire(true) {
                return Err(BridgeError::LockContractViolation(
                    "execution lock taken by this thread outside ensure/restore",
                ));
            }
            state.holds_token = true;
            state.ensure_stack.push(true);
            Ok(EnsureState::Acquired)
        })?
    }

    /// Undoes the innermost outstanding ensure. Only an ensure that acquired
    /// the lock releases it.
    pub fn release_execution_lock(&self, ensured: EnsureState) -> BridgeResult<()> {
        let gil = &self.inner.gil;
        with_thread_state(&self.inner, |state| {
            let Some(acquired) = state.ensure_stack.pop() else {
                return Err(BridgeError::LockContractViolation(
                    "release without a matching ensure",
                ));
            };
            if acquired != (ensured == EnsureState::Acquired) {
                tracing::warn!(?ensured, acquired, "ensure state does not match the innermost ensure");
            }
            if !acquired {
                return Ok(());
            }
            if !state.holds_token {
                state.ensure_stack.push(acquired);
                return Err(BridgeError::LockContractViolation(
                    "releasing an ensure while the execution lock is saved",
                ));
            }
            gil.release();
            state.holds_token = false;
            Ok(())
        })?
    }

    /// Logically gives up the execution lock. The outermost save physically
    /// releases it and returns a token; nested saves only count.
    pub fn save_execution_lock(&self) -> BridgeResult<Option<SavedThread>> {
        let gil = &self.inner.gil;
        with_thread_state(&self.inner, |state| {
            if state.save_depth > 0 {
                state.save_depth += 1;
                return Ok(None);
            }
            if !state.holds_token {
                return Err(BridgeError::LockContractViolation(
                    "saving the execution lock without holding it",
                ));
            }
            gil.release();
            state.holds_token = false;
            state.save_depth = 1;
            Ok(SavedThread::from_raw(current_thread_id()))
        })?
    }

    /// Matches one save. The restore that brings the depth back to 0
    /// re-acquires the lock, blocking if another thread holds it.
    pub fn restore_execution_lock(&self, token: Option<SavedThread>) -> BridgeResult<()> {
        let gil = &self.inner.gil;
        let me = current_thread_id();
        with_thread_state(&self.inner, |state| {
            if state.save_depth == 0 {
                return Err(BridgeError::LockContractViolation(
                    "restore with no outstanding save",
                ));
            }
            if let Some(token) = token {
                if token.as_raw() != me {
                    tracing::warn!(token = token.as_raw(), thread = me, "restoring a token saved by another thread");
                }
            }
            state.save_depth -= 1;
            if state.save_depth == 0 && !state.holds_token {
                let acquired = gil.acquire(true);
                debug_assert!(
                    acquired || gil.held_by_current_thread(),
                    "blocking acquire of the execution lock failed for a non-holder"
                );
                state.holds_token = true;
            }
            Ok(())
        })?
    }

    pub fn lock_execution(&self) -> BridgeResult<ExecutionGuard<'_>> {
        let state = self.ensure_execution_lock()?;
        Ok(ExecutionGuard {
            bridge: self,
            state,
        })
    }

    pub fn with_execution_lock<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&ExecutionGuard<'_>) -> R,
    {
        let guard = self.lock_execution()?;
        Ok(f(&guard))
    }

    pub fn allow_threads<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R,
    {
        let _released = AllowThreads::new(self)?;
        Ok(f())
    }
}

/// Holds one ensure for its lifetime.
pub struct ExecutionGuard<'a> {
    bridge: &'a Bridge,
    state: EnsureState,
}

impl ExecutionGuard<'_> {
    pub fn state(&self) -> EnsureState {
        self.state
    }

    pub fn bridge(&self) -> &Bridge {
        self.bridge
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.bridge.release_execution_lock(self.state) {
            tracing::error!(%err, "releasing execution lock guard");
        }
    }
}

/// Holds one save for its lifetime, restoring on drop.
pub struct AllowThreads<'a> {
    bridge: &'a Bridge,
    token: Option<SavedThread>,
}

impl<'a> AllowThreads<'a> {
    pub fn new(bridge: &'a Bridge) -> BridgeResult<Self> {
        let token = bridge.save_execution_lock()?;
        Ok(Self { bridge, token })
    }
}

impl Drop for AllowThreads<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.bridge.restore_execution_lock(self.token) {
            tracing::error!(%err, "restoring execution lock after allow_threads");
        }
    }
}
