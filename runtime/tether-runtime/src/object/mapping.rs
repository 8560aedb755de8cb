use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ManagedObject;
use crate::error::GuestException;
use crate::{Bridge, BridgeResult, Handle};

/// Shared string-keyed mapping. Clones alias the same storage.
#[derive(Clone, Default)]
pub struct GuestDict(Arc<Mutex<HashMap<String, ManagedObject>>>);

impl GuestDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<ManagedObject> {
        self.0.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: ManagedObject) -> Option<ManagedObject> {
        self.0.lock().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<ManagedObject> {
        self.0.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.lock().contains_key(key)
    }

    pub fn ptr_eq(&self, other: &GuestDict) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for GuestDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestDict").field("len", &self.len()).finish()
    }
}

impl Bridge {
    /// New empty dict; the caller owns the returned reference.
    pub fn dict_new(&self) -> Handle {
        self.store(ManagedObject::Dict(GuestDict::new()))
    }

    // Non-dict handles record a pending TypeError and yield None.
    fn dict_for(&self, handle: Handle, op: &str) -> BridgeResult<Option<GuestDict>> {
        match self.retrieve(handle)? {
            ManagedObject::Dict(dict) => Ok(Some(dict)),
            other => {
                self.set_pending_exception(Some(GuestException::type_error(format!(
                    "{op}: expected dict, got {}",
                    other.kind().name()
                ))))?;
                Ok(None)
            }
        }
    }

    pub fn dict_size(&self, handle: Handle) -> BridgeResult<isize> {
        Ok(match self.dict_for(handle, "PyDict_Size")? {
            Some(dict) => dict.len() as isize,
            None => -1,
        })
    }

    /// Stores the object behind `value` under `key`. The caller keeps its
    /// reference to `value`.
    pub fn dict_set_item_string(&self, handle: Handle, key: &str, value: Handle) -> BridgeResult<i32> {
        let value = self.retrieve(value)?;
        let Some(dict) = self.dict_for(handle, "PyDict_SetItemString")? else {
            return Ok(-1);
        };
        dict.insert(key, value);
        Ok(0)
    }

    /// Borrowed lookup: the returned handle is pooled and needs no release.
    /// A missing key yields `Handle::NULL` without a pending exception.
    pub fn dict_get_item_string(&self, handle: Handle, key: &str) -> BridgeResult<Handle> {
        let Some(dict) = self.dict_for(handle, "PyDict_GetItemString")? else {
            return Ok(Handle::NULL);
        };
        match dict.get(key) {
            Some(value) => self.store_borrowed(value),
            None => Ok(Handle::NULL),
        }
    }
}
