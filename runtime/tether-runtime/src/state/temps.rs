use super::tls::with_thread_state;
use crate::object::ManagedObject;
use crate::{Bridge, BridgeError, BridgeResult, Handle};

impl Bridge {
    /// Queues one owned reference to `handle` for release by the calling
    /// thread's next `free_temps`.
    pub fn remember_temp(&self, handle: Handle) -> BridgeResult<()> {
        with_thread_state(&self.inner, |state| state.temps.push(handle))
    }

    /// Stores `object` and pools the new reference, giving the caller a
    /// borrowed handle.
    pub fn store_borrowed(&self, object: ManagedObject) -> BridgeResult<Handle> {
        let handle = self.store(object);
        if let Err(err) = self.remember_temp(handle) {
            tracing::warn!(handle = %handle, %err, "borrowed reference could not be pooled");
            self.dec_ref(handle)?;
            return Err(err);
        }
        Ok(handle)
    }

    /// Releases every reference pooled by the calling thread. All pooled
    /// handles are released even if one fails; the first failure is returned.
    pub fn free_temps(&self) -> BridgeResult<()> {
        let temps = with_thread_state(&self.inner, |state| std::mem::take(&mut state.temps))?;
        if temps.is_empty() {
            return Ok(());
        }
        let metrics = &self.inner.store.metrics;
        metrics.profile_add(&metrics.temps_freed, temps.len() as u64);
        let mut first_err: Option<BridgeError> = None;
        for handle in temps {
            if let Err(err) = self.dec_ref(handle) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn pooled_temps(&self) -> BridgeResult<usize> {
        with_thread_state(&self.inner, |state| state.temps.len())
    }
}
