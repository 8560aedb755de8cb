//! Handle bridge for hosting native extension modules.
//!
//! A [`Bridge`] maps opaque native handles to host objects with manual
//! reference counts, keeps a per-thread pool of borrowed references, and
//! serializes guest-visible execution behind one execution lock with
//! per-thread save/restore nesting.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

pub mod abi;
pub mod concurrency;
pub mod config;
mod dispatch;
pub mod error;
pub mod object;
pub mod state;

pub use concurrency::{AllowThreads, EnsureState, ExecutionGuard, NativeLock, SavedThread};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, GuestException};
pub use object::{GuestDict, ManagedObject, ObjectKind};
pub use state::MetricsSnapshot;
pub use tether_obj_model::{
    DeallocFn, HEADER_SIZE, Handle, HeaderAllocator, ObjectHeader, REFCNT_OFFSET,
    SystemAllocator, TYPE_OFFSET,
};

use object::ObjectStore;

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL_BRIDGE: Lazy<Bridge> = Lazy::new(|| Bridge::new(BridgeConfig::from_env()));

pub(crate) struct BridgeInner {
    pub(crate) id: u64,
    pub(crate) store: ObjectStore,
    pub(crate) gil: NativeLock,
    config: BridgeConfig,
}

/// Shared handle to one object store and its execution lock. Clones refer
/// to the same bridge.
#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Arc<BridgeInner>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let store = ObjectStore::new(
            Arc::clone(&config.allocator),
            config.trace_refcounts,
            config.profile,
        );
        Self {
            inner: Arc::new(BridgeInner {
                id: NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed),
                store,
                gil: NativeLock::new(),
                config,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BridgeConfig::default())
    }

    /// Process-wide bridge used by the C entry points, configured from the
    /// environment on first use.
    pub fn global() -> &'static Bridge {
        &GLOBAL_BRIDGE
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.store.metrics.snapshot()
    }

    /// Returns a new reference to `object`, reusing its handle if it is
    /// already stored.
    pub fn store(&self, object: ManagedObject) -> Handle {
        self.inner.store.store(object)
    }

    /// Always allocates a fresh handle, even for an object already stored.
    pub fn store_unshared(&self, object: ManagedObject) -> Handle {
        self.inner.store.store_unshared(object)
    }

    pub fn retrieve(&self, handle: Handle) -> BridgeResult<ManagedObject> {
        self.inner.store.retrieve(handle)
    }

    pub fn inc_ref(&self, handle: Handle) -> BridgeResult<()> {
        self.inner.store.inc_ref(handle)
    }

    /// The release that brings the count to 0 frees the handle's header
    /// block before returning.
    pub fn dec_ref(&self, handle: Handle) -> BridgeResult<()> {
        self.inner.store.dec_ref(handle)
    }

    pub fn ref_count(&self, handle: Handle) -> BridgeResult<isize> {
        self.inner.store.ref_count(handle)
    }

    /// `ob_type` as currently written in the handle's header.
    pub fn type_tag(&self, handle: Handle) -> BridgeResult<usize> {
        self.inner.store.type_tag(handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.inner.store.contains(handle)
    }

    pub fn live_count(&self) -> usize {
        self.inner.store.live_count()
    }

    /// Later stores of `kind` write `address` into `ob_type`. A `dealloc`
    /// runs for any header whose `ob_type` reads `address` when its last
    /// reference is released.
    pub fn register_type_block(
        &self,
        kind: ObjectKind,
        address: usize,
        dealloc: Option<DeallocFn>,
    ) {
        self.inner.store.register_type_block(kind, address, dealloc);
    }

    /// Maps a header block that native code allocated itself to `object`.
    /// The header's refcount and type are left as native code wrote them.
    ///
    /// # Safety
    /// `handle` must address a live, aligned [`ObjectHeader`] that stays valid
    /// until its last reference is released or the bridge is dropped. The
    /// bridge never frees it; the destructor registered for its type does.
    pub unsafe fn store_bridge(&self, handle: Handle, object: ManagedObject) -> BridgeResult<()> {
        unsafe { self.inner.store.store_bridge(handle, object) }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.inner.id)
            .field("live", &self.live_count())
            .field("config", &self.inner.config)
            .finish()
    }
}
