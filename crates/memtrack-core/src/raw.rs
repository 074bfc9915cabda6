//! Host allocation primitives.
//!
//! The concrete implementations live in `memtrack-mem`. We keep only the trait
//! here so collaborators and test harnesses can supply their own host without
//! depending on the tracker.

use std::alloc::Layout;
use std::ptr::NonNull;

/// Raw allocate/resize/release of host memory.
///
/// The tracker is the only caller. It never passes a zero-sized layout and
/// only hands back pointers it received from the same implementation.
///
/// # Safety
///
/// Implementors must uphold the `std::alloc::GlobalAlloc` contract: a returned
/// pointer is valid for reads and writes of `layout.size()` bytes, aligned to
/// `layout.align()`, and stays valid until it is passed to `realloc` or
/// `dealloc`. `alloc_zeroed` must return zero-filled memory.
pub unsafe trait RawAlloc {
    /// Allocate uninitialized memory. `None` means the host is out of memory.
    ///
    /// # Safety
    /// `layout` must have a non-zero size.
    unsafe fn alloc(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Allocate zero-filled memory.
    ///
    /// # Safety
    /// `layout` must have a non-zero size.
    unsafe fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resize an allocation. On `None` the old allocation is untouched.
    ///
    /// # Safety
    /// `ptr` must be live, allocated by `self` with `layout`, and `new_size`
    /// must be non-zero and not overflow `isize` when rounded to the alignment.
    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// Return memory to the host.
    ///
    /// # Safety
    /// `ptr` must be live and allocated by `self` with `layout`.
    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout);
}

// SAFETY: shared handles forward every call to the referenced host, so a test
// can keep a reference to the host it lent to a tracker.
unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &A {
    unsafe fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).alloc_zeroed(layout)
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        (**self).realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).dealloc(ptr, layout)
    }
}
