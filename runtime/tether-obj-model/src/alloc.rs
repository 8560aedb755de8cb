//! Raw memory for native-visible header blocks.

use std::alloc::Layout;

/// Source of header blocks.
///
/// Implementations return null on failure; callers treat that as fatal.
pub trait HeaderAllocator: Send + Sync {
    fn allocate(&self, layout: Layout) -> *mut u8;

    /// # Safety
    /// `ptr` must come from `allocate` on this allocator with the same layout
    /// and must not be freed twice.
    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl HeaderAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> *mut u8 {
        unsafe { std::alloc::alloc_zeroed(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr, layout) }
    }
}
