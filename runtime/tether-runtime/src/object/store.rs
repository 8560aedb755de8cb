use std::alloc::{Layout, handle_alloc_error};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::{Mutex, RwLock};
use tether_obj_model::{DeallocFn, HandleTable, HeaderAllocator, ObjectHeader};

use super::{ManagedObject, ObjectKind};
use crate::state::metrics::StoreMetrics;
use crate::{BridgeError, BridgeResult, Handle};

const HEADER_LAYOUT: Layout = Layout::new::<ObjectHeader>();

struct StoreEntry {
    object: ManagedObject,
    identity: Option<usize>,
    // False for headers adopted through `store_bridge`.
    owned: bool,
}

/// Handle table plus the native header blocks backing each handle.
///
/// The refcount lives only in the header so native code that bumps
/// `ob_refcnt` directly stays consistent with `inc_ref`/`dec_ref`. A header
/// is only dereferenced while its entry is present and its shard is locked.
pub(crate) struct ObjectStore {
    table: HandleTable<StoreEntry>,
    // Lock order: `identities` before any table shard.
    identities: Mutex<HashMap<usize, Handle>>,
    types: RwLock<HashMap<ObjectKind, usize>>,
    deallocs: RwLock<HashMap<usize, DeallocFn>>,
    allocator: Arc<dyn HeaderAllocator>,
    trace: bool,
    pub(crate) metrics: StoreMetrics,
}

impl ObjectStore {
    pub(crate) fn new(allocator: Arc<dyn HeaderAllocator>, trace: bool, profile: bool) -> Self {
        Self {
            table: HandleTable::new(),
            identities: Mutex::new(HashMap::new()),
            types: RwLock::new(HashMap::new()),
            deallocs: RwLock::new(HashMap::new()),
            allocator,
            trace,
            metrics: StoreMetrics::new(profile),
        }
    }

    /// Returns the existing handle for `object` with one more reference, or a
    /// fresh handle with refcount 1.
    pub(crate) fn store(&self, object: ManagedObject) -> Handle {
        self.metrics.profile_hit(&self.metrics.stores);
        let Some(identity) = object.identity() else {
            return self.insert_fresh(object, None);
        };
        let mut identities = self.identities.lock();
        if let Some(&existing) = identities.get(&identity) {
            let bumped = self.table.read(existing, |entry| {
                (entry.identity == Some(identity)).then(|| Self::bump(existing))
            });
            if let Some(Some(count)) = bumped {
                self.metrics.profile_hit(&self.metrics.dedup_hits);
                if self.trace {
                    tracing::trace!(handle = %existing, refcnt = count, "store (shared)");
                }
                return existing;
            }
        }
        let handle = self.insert_fresh(object, Some(identity));
        identities.insert(identity, handle);
        handle
    }

    pub(crate) fn store_unshared(&self, object: ManagedObject) -> Handle {
        self.metrics.profile_hit(&self.metrics.stores);
        self.insert_fresh(object, None)
    }

    fn insert_fresh(&self, object: ManagedObject, identity: Option<usize>) -> Handle {
        let tag = self.type_tag_for(object.kind());
        let raw = self.allocator.allocate(HEADER_LAYOUT);
        if raw.is_null() {
            handle_alloc_error(HEADER_LAYOUT);
        }
        let header = raw.cast::<ObjectHeader>();
        // SAFETY: `raw` is a fresh, suitably aligned block of HEADER_LAYOUT.
        unsafe { header.write(ObjectHeader::new(1, tag)) };
        let handle = Handle::from_ptr(header);
        self.table.insert(
            handle,
            StoreEntry {
                object,
                identity,
                owned: true,
            },
        );
        if self.trace {
            tracing::trace!(handle = %handle, type_tag = tag, "store");
        }
        handle
    }

    /// # Safety
    /// `handle` must address a live header that outlives its entry.
    pub(crate) unsafe fn store_bridge(
        &self,
        handle: Handle,
        object: ManagedObject,
    ) -> BridgeResult<()> {
        if handle.is_null() {
            return Err(BridgeError::NullHandle { op: "StoreBridge" });
        }
        let mut identities = self.identities.lock();
        let identity = object
            .identity()
            .filter(|identity| !identities.contains_key(identity));
        self.table.with_slot(handle, |slot| {
            if slot.is_some() {
                return Err(BridgeError::AlreadyStored(handle));
            }
            *slot = Some(StoreEntry {
                object,
                identity,
                owned: false,
            });
            Ok(())
        })?;
        if let Some(identity) = identity {
            identities.insert(identity, handle);
        }
        self.metrics.profile_hit(&self.metrics.stores);
        if self.trace {
            tracing::trace!(handle = %handle, "store (bridged)");
        }
        Ok(())
    }

    fn bump(handle: Handle) -> isize {
        // SAFETY: callers hold the shard lock with the entry present.
        let header = unsafe { handle.header() };
        header.ob_refcnt.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn retrieve(&self, handle: Handle) -> BridgeResult<ManagedObject> {
        self.table
            .read(handle, |entry| entry.object.clone())
            .ok_or_else(|| BridgeError::not_found("Retrieve", handle))
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.table.contains(handle)
    }

    pub(crate) fn inc_ref(&self, handle: Handle) -> BridgeResult<()> {
        let count = self
            .table
            .read(handle, |_| Self::bump(handle))
            .ok_or_else(|| BridgeError::not_found("IncRef", handle))?;
        self.metrics.profile_hit(&self.metrics.increfs);
        if self.trace {
            tracing::trace!(handle = %handle, refcnt = count, "incref");
        }
        Ok(())
    }

    /// Drops one reference. The reference that brings the count to 0 frees
    /// the header block before returning.
    pub(crate) fn dec_ref(&self, handle: Handle) -> BridgeResult<()> {
        let (count, released) = self.table.with_slot(handle, |slot| {
            if slot.is_none() {
                return Err(BridgeError::not_found("DecRef", handle));
            }
            // SAFETY: the entry is present and the shard is write-locked.
            let header = unsafe { handle.header() };
            let count = header.ref_count();
            if count <= 0 {
                return Err(BridgeError::BadRefCount(handle));
            }
            header.set_ref_count(count - 1);
            if count > 1 {
                Ok((count - 1, None))
            } else {
                Ok((0, slot.take()))
            }
        })?;
        self.metrics.profile_hit(&self.metrics.decrefs);
        if self.trace {
            tracing::trace!(handle = %handle, refcnt = count, "decref");
        }
        if let Some(entry) = released {
            self.release(handle, entry);
        }
        Ok(())
    }

    fn release(&self, handle: Handle, entry: StoreEntry) {
        if let Some(identity) = entry.identity {
            let mut identities = self.identities.lock();
            if identities.get(&identity) == Some(&handle) {
                identities.remove(&identity);
            }
        }
        self.free_block(handle, entry.owned);
        self.metrics.profile_hit(&self.metrics.releases);
        if self.trace {
            tracing::trace!(handle = %handle, "free");
        }
        // The payload outlives the identity mapping so its address cannot be
        // recycled while the stale mapping is still visible.
        drop(entry);
    }

    /// Runs the destructor registered for the header's current `ob_type`,
    /// then frees the block if the store allocated it.
    fn free_block(&self, handle: Handle, owned: bool) {
        // SAFETY: the entry is gone, so no other path can reach this block.
        let tag = unsafe { handle.header() }.type_tag();
        let dealloc = self.deallocs.read().get(&tag).copied();
        if let Some(dealloc) = dealloc {
            // SAFETY: registered destructors take any header of their type.
            unsafe { dealloc(handle.as_ptr()) };
        }
        if owned {
            // SAFETY: allocated by `insert_fresh` with HEADER_LAYOUT.
            unsafe {
                self.allocator
                    .deallocate(handle.as_ptr().cast::<u8>(), HEADER_LAYOUT)
            };
        }
    }

    pub(crate) fn ref_count(&self, handle: Handle) -> BridgeResult<isize> {
        self.table
            .read(handle, |_| {
                // SAFETY: entry present under the shard read lock.
                let header = unsafe { handle.header() };
                header.ref_count()
            })
            .ok_or_else(|| BridgeError::not_found("RefCount", handle))
    }

    pub(crate) fn type_tag(&self, handle: Handle) -> BridgeResult<usize> {
        self.table
            .read(handle, |_| {
                // SAFETY: entry present under the shard read lock.
                let header = unsafe { handle.header() };
                header.type_tag()
            })
            .ok_or_else(|| BridgeError::not_found("TypeTag", handle))
    }

    pub(crate) fn register_type_block(
        &self,
        kind: ObjectKind,
        address: usize,
        dealloc: Option<DeallocFn>,
    ) {
        self.types.write().insert(kind, address);
        let mut deallocs = self.deallocs.write();
        match dealloc {
            Some(dealloc) => deallocs.insert(address, dealloc),
            None => deallocs.remove(&address),
        };
    }

    fn type_tag_for(&self, kind: ObjectKind) -> usize {
        self.types
            .read()
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_tag())
    }

    pub(crate) fn live_count(&self) -> usize {
        self.table.len()
    }
}

impl Drop for ObjectStore {
    fn drop(&mut self) {
        self.identities.get_mut().clear();
        let live = self.table.drain();
        if !live.is_empty() {
            tracing::debug!(live = live.len(), "freeing remaining header blocks");
        }
        for (handle, entry) in live {
            self.free_block(handle, entry.owned);
            drop(entry);
        }
    }
}
