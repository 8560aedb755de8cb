use crate::error::GuestException;
use crate::object::ManagedObject;
use crate::{Bridge, BridgeError, BridgeResult, Handle};

impl Bridge {
    /// Runs one native entry point under the execution lock, following the
    /// native calling convention: `f` returns a new reference, or null with a
    /// pending exception on failure.
    pub fn call_native<F>(&self, f: F) -> BridgeResult<ManagedObject>
    where
        F: FnOnce(&Bridge) -> Handle,
    {
        self.call_native_with(&[], |bridge, _| f(bridge))
    }

    /// Like `call_native`, but stores `args` first and releases the argument
    /// handles once `f` returns.
    pub fn call_native_with<F>(&self, args: &[ManagedObject], f: F) -> BridgeResult<ManagedObject>
    where
        F: FnOnce(&Bridge, &[Handle]) -> Handle,
    {
        let _guard = self.lock_execution()?;
        let handles: Vec<Handle> = args.iter().cloned().map(|arg| self.store(arg)).collect();
        let result = f(self, &handles);
        let mut outcome = self.finish_call(result);
        for handle in handles {
            if let Err(err) = self.dec_ref(handle) {
                outcome = outcome.and(Err(err));
            }
        }
        let freed = self.free_temps();
        let object = outcome?;
        freed?;
        Ok(object)
    }

    fn finish_call(&self, result: Handle) -> BridgeResult<ManagedObject> {
        if let Some(exception) = self.take_pending_exception()? {
            if !result.is_null() {
                self.dec_ref(result)?;
            }
            return Err(BridgeError::Guest(exception));
        }
        if result.is_null() {
            return Err(BridgeError::Guest(GuestException::system_error(
                "error return without exception set",
            )));
        }
        let object = self.retrieve(result)?;
        self.dec_ref(result)?;
        Ok(object)
    }
}
