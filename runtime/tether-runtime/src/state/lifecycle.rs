use super::tls::{ThreadState, with_thread_state};
use crate::object::{GuestDict, ManagedObject};
use crate::{Bridge, BridgeResult, Handle};

/// Thread-exit hook, run once per (thread, bridge) pair from the thread-local
/// destructor. Touches only the shared store and the execution lock.
pub(crate) fn thread_teardown(state: ThreadState) {
    let Some(inner) = state.owner.upgrade() else {
        return;
    };
    let bridge = Bridge { inner };
    let metrics = &bridge.inner.store.metrics;
    metrics.profile_hit(&metrics.thread_teardowns);

    let temps = state.temps.len();
    for handle in state.temps {
        if let Err(err) = bridge.dec_ref(handle) {
            tracing::error!(%err, "releasing pooled reference at thread exit");
        }
    }
    metrics.profile_add(&metrics.temps_freed, temps as u64);

    if state.holds_token {
        tracing::warn!(
            save_depth = state.save_depth,
            ensures = state.ensure_stack.len(),
            "thread exited while holding the execution lock; releasing it"
        );
        bridge.inner.gil.release();
    }

    if let Some(dict) = state.thread_dict {
        if let Err(err) = bridge.dec_ref(dict) {
            tracing::error!(%err, "dropping thread dict at thread exit");
        }
    }
    tracing::debug!(
        temps,
        had_dict = state.thread_dict.is_some(),
        "thread state torn down"
    );
}

impl Bridge {
    /// The calling thread's dictionary, created on first use. The returned
    /// handle is borrowed: the thread owns one reference until it exits.
    pub fn current_thread_dict(&self) -> BridgeResult<Handle> {
        if let Some(dict) = with_thread_state(&self.inner, |state| state.thread_dict)? {
            return Ok(dict);
        }
        let dict = self.store(ManagedObject::Dict(GuestDict::new()));
        if let Err(err) = with_thread_state(&self.inner, |state| state.thread_dict = Some(dict)) {
            self.dec_ref(dict)?;
            return Err(err);
        }
        tracing::debug!(handle = %dict, "created thread dict");
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Bridge, BridgeConfig, ManagedObject};

    #[test]
    fn thread_dict_is_created_once_per_thread() {
        let bridge = Bridge::with_defaults();
        let first = bridge.current_thread_dict().unwrap();
        let second = bridge.current_thread_dict().unwrap();
        assert_eq!(first, second);
        assert_eq!(bridge.ref_count(first).unwrap(), 1);

        let remote = bridge.clone();
        let other = std::thread::spawn(move || remote.current_thread_dict().unwrap())
            .join()
            .unwrap();
        assert_ne!(first, other);
        // The other thread's liveness reference went away with it.
        assert!(!bridge.contains(other));
    }

    #[test]
    fn thread_exit_drains_pool_and_releases_lock() {
        let bridge = Bridge::new(BridgeConfig::default().with_profile(true));
        let remote = bridge.clone();
        let pooled = std::thread::spawn(move || {
            let handle = remote.store_borrowed(ManagedObject::Int(7)).unwrap();
            remote.ensure_execution_lock().unwrap();
            handle
        })
        .join()
        .unwrap();
        assert!(!bridge.contains(pooled));
        assert!(!bridge.execution_lock().is_locked());
        let snap = bridge.metrics();
        assert_eq!(snap.thread_teardowns, 1);
        assert_eq!(snap.temps_freed, 1);
    }

    #[test]
    fn dropped_bridge_is_skipped_at_thread_exit() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let bridge = Bridge::with_defaults();
        let remote = bridge.clone();
        let worker = std::thread::spawn(move || {
            remote.current_thread_dict().unwrap();
            drop(remote);
            rx.recv().unwrap();
        });
        drop(bridge);
        tx.send(()).unwrap();
        worker.join().unwrap();
    }
}
