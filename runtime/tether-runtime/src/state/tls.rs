use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::lifecycle::thread_teardown;
use crate::error::GuestException;
use crate::{BridgeError, BridgeInner, BridgeResult, Handle};

/// Everything one thread knows about one bridge.
pub(crate) struct ThreadState {
    pub(crate) owner: Weak<BridgeInner>,
    /// Outstanding saves not yet matched by a restore.
    pub(crate) save_depth: usize,
    /// One entry per outstanding ensure: whether that ensure acquired.
    pub(crate) ensure_stack: Vec<bool>,
    /// Whether this thread physically holds the execution lock.
    pub(crate) holds_token: bool,
    pub(crate) thread_dict: Option<Handle>,
    pub(crate) pending: Option<GuestException>,
    pub(crate) temps: Vec<Handle>,
}

impl ThreadState {
    fn new(owner: Weak<BridgeInner>) -> Self {
        Self {
            owner,
            save_depth: 0,
            ensure_stack: Vec::new(),
            holds_token: false,
            thread_dict: None,
            pending: None,
            temps: Vec::new(),
        }
    }
}

struct ThreadStateTable {
    states: RefCell<HashMap<u64, ThreadState>>,
}

impl Drop for ThreadStateTable {
    fn drop(&mut self) {
        let states = std::mem::take(self.states.get_mut());
        for (_, state) in states {
            thread_teardown(state);
        }
    }
}

thread_local! {
    static THREAD_STATES: ThreadStateTable = ThreadStateTable {
        states: RefCell::new(HashMap::new()),
    };
}

/// Runs `f` on the calling thread's state for `bridge`, creating it on first
/// touch. `f` must not re-enter this function.
pub(crate) fn with_thread_state<R>(
    bridge: &Arc<BridgeInner>,
    f: impl FnOnce(&mut ThreadState) -> R,
) -> BridgeResult<R> {
    THREAD_STATES
        .try_with(|table| {
            let mut states = table.states.borrow_mut();
            if !states.contains_key(&bridge.id) {
                // Bridges dropped since the last insert.
                states.retain(|_, state| state.owner.strong_count() > 0);
            }
            let state = states
                .entry(bridge.id)
                .or_insert_with(|| ThreadState::new(Arc::downgrade(bridge)));
            f(state)
        })
        .map_err(|_| BridgeError::ThreadStateUnavailable)
}
