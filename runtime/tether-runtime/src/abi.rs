//! C entry points over the process-wide bridge. Failures are logged and
//! reported with the native conventions (-1, 0 or null).

use tether_obj_model::ObjectHeader;

use crate::concurrency::{EnsureState, SavedThread};
use crate::{Bridge, BridgeResult, Handle};

fn report<T>(op: &str, result: BridgeResult<T>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(op, %err, "native entry point failed");
            fallback
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_incref(obj: *mut ObjectHeader) {
    report("Py_IncRef", Bridge::global().inc_ref(Handle::from_ptr(obj)), ());
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_decref(obj: *mut ObjectHeader) {
    report("Py_DecRef", Bridge::global().dec_ref(Handle::from_ptr(obj)), ());
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_refcount(obj: *mut ObjectHeader) -> isize {
    report("RefCount", Bridge::global().ref_count(Handle::from_ptr(obj)), -1)
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_free_temps() -> i32 {
    report("FreeTemps", Bridge::global().free_temps().map(|()| 0), -1)
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_allocate_lock() -> *mut ObjectHeader {
    Bridge::global().allocate_lock().as_ptr()
}

/// Returns 1 if the lock was taken, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn tether_acquire_lock(lock: *mut ObjectHeader, waitflag: i32) -> i32 {
    let acquired = Bridge::global().acquire_lock(Handle::from_ptr(lock), waitflag != 0);
    report("PyThread_acquire_lock", acquired.map(i32::from), 0)
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_release_lock(lock: *mut ObjectHeader) {
    report(
        "PyThread_release_lock",
        Bridge::global().release_lock(Handle::from_ptr(lock)),
        (),
    );
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_free_lock(lock: *mut ObjectHeader) {
    report(
        "PyThread_free_lock",
        Bridge::global().free_lock(Handle::from_ptr(lock)),
        (),
    );
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_gilstate_ensure() -> i32 {
    report(
        "PyGILState_Ensure",
        Bridge::global().ensure_execution_lock().map(EnsureState::as_raw),
        -1,
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_gilstate_release(state: i32) {
    report(
        "PyGILState_Release",
        Bridge::global().release_execution_lock(EnsureState::from_raw(state)),
        (),
    );
}

/// Returns the saved-thread token, or 0 for a nested save or on failure.
#[unsafe(no_mangle)]
pub extern "C" fn tether_save_thread() -> u64 {
    let saved = Bridge::global().save_execution_lock();
    report(
        "PyEval_SaveThread",
        saved.map(|token| token.map_or(0, SavedThread::as_raw)),
        0,
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_restore_thread(token: u64) {
    report(
        "PyEval_RestoreThread",
        Bridge::global().restore_execution_lock(SavedThread::from_raw(token)),
        (),
    );
}

/// Borrowed reference to the calling thread's dict, or null.
#[unsafe(no_mangle)]
pub extern "C" fn tether_threadstate_getdict() -> *mut ObjectHeader {
    report(
        "PyThreadState_GetDict",
        Bridge::global().current_thread_dict(),
        Handle::NULL,
    )
    .as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_err_occurred() -> i32 {
    report(
        "PyErr_Occurred",
        Bridge::global().exception_pending().map(i32::from),
        0,
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn tether_err_clear() {
    report(
        "PyErr_Clear",
        Bridge::global().set_pending_exception(None),
        (),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GuestException;

    #[test]
    fn lock_round_trip_through_c_entry_points() {
        let lock = tether_allocate_lock();
        assert!(!lock.is_null());
        assert_eq!(tether_refcount(lock), 1);
        assert_eq!(tether_acquire_lock(lock, 1), 1);
        assert_eq!(tether_acquire_lock(lock, 1), 0);
        assert_eq!(tether_acquire_lock(lock, 0), 0);
        tether_release_lock(lock);
        tether_free_lock(lock);
        assert_eq!(tether_refcount(lock), -1);
    }

    #[test]
    fn gil_and_error_slot_through_c_entry_points() {
        // Runs on its own thread so the global lock state is private to it.
        std::thread::spawn(|| {
            let state = tether_gilstate_ensure();
            assert_eq!(state, EnsureState::Acquired.as_raw());
            let token = tether_save_thread();
            assert_ne!(token, 0);
            assert_eq!(tether_save_thread(), 0);
            tether_restore_thread(0);
            tether_restore_thread(token);
            assert!(Bridge::global().holds_execution_lock());
            tether_gilstate_release(state);

            let dict = tether_threadstate_getdict();
            assert_eq!(tether_refcount(dict), 1);

            assert_eq!(tether_err_occurred(), 0);
            Bridge::global()
                .set_pending_exception(Some(GuestException::type_error("x")))
                .unwrap();
            assert_eq!(tether_err_occurred(), 1);
            tether_err_clear();
            assert_eq!(tether_err_occurred(), 0);
            assert_eq!(tether_free_temps(), 0);
        })
        .join()
        .unwrap();
    }
}
