//! Native-visible object representation for Tether.
//! Every stored object is addressed by a `Handle`: the address of a header
//! block laid out exactly as extension code expects (`ob_refcnt`, `ob_type`).

use std::fmt;
use std::mem::offset_of;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

pub mod alloc;
pub mod handle_table;

pub use alloc::{HeaderAllocator, SystemAllocator};
pub use handle_table::HandleTable;

/// Header at the start of every block handed to native code.
///
/// Extension code reads and writes these fields through fixed offsets, never
/// through an accessor, so the layout must not change.
#[repr(C)]
#[derive(Debug)]
pub struct ObjectHeader {
    pub ob_refcnt: AtomicIsize,
    pub ob_type: AtomicUsize,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<ObjectHeader>();
pub const REFCNT_OFFSET: usize = offset_of!(ObjectHeader, ob_refcnt);
pub const TYPE_OFFSET: usize = offset_of!(ObjectHeader, ob_type);

/// Native destructor registered for a type block (`tp_dealloc`). Called with
/// the header whose last reference was released.
pub type DeallocFn = unsafe extern "C" fn(*mut ObjectHeader);

impl ObjectHeader {
    pub const fn new(ref_count: isize, type_tag: usize) -> Self {
        Self {
            ob_refcnt: AtomicIsize::new(ref_count),
            ob_type: AtomicUsize::new(type_tag),
        }
    }

    pub fn ref_count(&self) -> isize {
        self.ob_refcnt.load(Ordering::Acquire)
    }

    pub fn set_ref_count(&self, count: isize) {
        self.ob_refcnt.store(count, Ordering::Release);
    }

    pub fn type_tag(&self) -> usize {
        self.ob_type.load(Ordering::Acquire)
    }

    pub fn set_type_tag(&self, tag: usize) {
        self.ob_type.store(tag, Ordering::Release);
    }
}

/// Opaque address-like token identifying a stored object.
///
/// Equality is identity. A live handle is never reused: its address stays
/// allocated until the last reference is released.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    /// Sentinel returned by lookups that miss.
    pub const NULL: Handle = Handle(0);

    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub fn from_ptr(ptr: *mut ObjectHeader) -> Self {
        Self(ptr as usize)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn as_ptr(self) -> *mut ObjectHeader {
        self.0 as *mut ObjectHeader
    }

    /// # Safety
    /// The handle must address a live header block for the whole of `'a`.
    pub unsafe fn header<'a>(self) -> &'a ObjectHeader {
        debug_assert!(!self.is_null(), "dereferencing the null handle");
        unsafe { &*self.as_ptr() }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_native_abi() {
        let word = std::mem::size_of::<usize>();
        assert_eq!(REFCNT_OFFSET, 0);
        assert_eq!(TYPE_OFFSET, word);
        assert_eq!(HEADER_SIZE, 2 * word);
        assert_eq!(std::mem::align_of::<ObjectHeader>(), word);
    }

    #[test]
    fn header_fields_are_readable_through_raw_offsets() {
        let header = ObjectHeader::new(3, 0xdead);
        let base = &header as *const ObjectHeader as *const u8;
        let refcnt = unsafe { *(base.add(REFCNT_OFFSET) as *const isize) };
        let tag = unsafe { *(base.add(TYPE_OFFSET) as *const usize) };
        assert_eq!(refcnt, 3);
        assert_eq!(tag, 0xdead);
    }

    #[test]
    fn null_handle() {
        assert!(Handle::NULL.is_null());
        assert!(!Handle::from_addr(0x1000).is_null());
        assert_eq!(Handle::default(), Handle::NULL);
        assert_eq!(format!("{}", Handle::from_addr(0x1000)), "0x1000");
    }
}
