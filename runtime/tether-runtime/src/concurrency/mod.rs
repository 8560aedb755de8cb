use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) mod gil;
pub(crate) mod locks;

pub use gil::{AllowThreads, EnsureState, ExecutionGuard, SavedThread};
pub use locks::NativeLock;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Small process-unique id for the calling thread; never 0.
pub(crate) fn current_thread_id() -> u64 {
    THREAD_ID
        .try_with(|slot| {
            let id = slot.get();
            if id != 0 {
                return id;
            }
            let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            slot.set(id);
            id
        })
        .unwrap_or(u64::MAX)
}
