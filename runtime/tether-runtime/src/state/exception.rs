use super::tls::with_thread_state;
use crate::error::GuestException;
use crate::{Bridge, BridgeResult};

// The slot holds at most one exception; a new write replaces the old one.
impl Bridge {
    pub fn pending_exception(&self) -> BridgeResult<Option<GuestException>> {
        with_thread_state(&self.inner, |state| state.pending.clone())
    }

    pub fn set_pending_exception(&self, exception: Option<GuestException>) -> BridgeResult<()> {
        with_thread_state(&self.inner, |state| state.pending = exception)
    }

    pub fn take_pending_exception(&self) -> BridgeResult<Option<GuestException>> {
        with_thread_state(&self.inner, |state| state.pending.take())
    }

    pub fn exception_pending(&self) -> BridgeResult<bool> {
        with_thread_state(&self.inner, |state| state.pending.is_some())
    }
}
