//! Host allocators the tracker can sit on.
//!
//! `SystemAlloc` is the production host. `CountingAlloc` wraps any host with
//! shared counters and failure injection so tests can observe every raw
//! allocation and release the tracker performs.

use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use memtrack_core::raw::RawAlloc;
use serde::Serialize;

/// Delegates to the process's system allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAlloc;

// SAFETY: every method forwards to `System`, which upholds the GlobalAlloc
// contract the trait requires.
unsafe impl RawAlloc for SystemAlloc {
    unsafe fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(System.alloc(layout))
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(System.alloc_zeroed(layout))
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        NonNull::new(System.realloc(ptr.as_ptr(), layout, new_size))
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        System.dealloc(ptr.as_ptr(), layout)
    }
}

/// Point-in-time view of a `CountingAlloc`'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AllocCounts {
    pub allocs: usize,
    pub zeroed_allocs: usize,
    pub reallocs: usize,
    pub deallocs: usize,
    /// Regions handed out and not yet returned.
    pub live: usize,
    pub live_bytes: usize,
    /// Releases of regions this host never handed out (or already took back).
    pub unknown_frees: usize,
}

#[derive(Default)]
struct Shared {
    allocs: AtomicUsize,
    zeroed_allocs: AtomicUsize,
    reallocs: AtomicUsize,
    deallocs: AtomicUsize,
    unknown_frees: AtomicUsize,
    fail_allocs: AtomicUsize,
    fail_reallocs: AtomicUsize,
    live: Mutex<HashMap<usize, usize>>,
}

impl Shared {
    fn live(&self) -> MutexGuard<'_, HashMap<usize, usize>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Consume one pending injected failure, if any.
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Instrumented host: counts every raw operation and can be told to fail.
///
/// Clones share counters, so a test keeps one handle while the tracker owns
/// another and can still inspect what happened after the tracker is gone.
#[derive(Clone)]
pub struct CountingAlloc<A: RawAlloc = SystemAlloc> {
    inner: A,
    shared: Arc<Shared>,
}

impl CountingAlloc<SystemAlloc> {
    pub fn new() -> Self {
        Self::wrap(SystemAlloc)
    }
}

impl Default for CountingAlloc<SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAlloc> CountingAlloc<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Make the next `n` allocations (plain or zeroed) report out-of-memory.
    pub fn fail_next_allocs(&self, n: usize) {
        self.shared.fail_allocs.store(n, Ordering::Release);
    }

    /// Make the next `n` resizes report out-of-memory.
    pub fn fail_next_reallocs(&self, n: usize) {
        self.shared.fail_reallocs.store(n, Ordering::Release);
    }

    pub fn counts(&self) -> AllocCounts {
        let live = self.shared.live();
        AllocCounts {
            allocs: self.shared.allocs.load(Ordering::Acquire),
            zeroed_allocs: self.shared.zeroed_allocs.load(Ordering::Acquire),
            reallocs: self.shared.reallocs.load(Ordering::Acquire),
            deallocs: self.shared.deallocs.load(Ordering::Acquire),
            live: live.len(),
            live_bytes: live.values().sum(),
            unknown_frees: self.shared.unknown_frees.load(Ordering::Acquire),
        }
    }

    /// Whether `addr` is a region this host currently has outstanding.
    pub fn is_live(&self, addr: usize) -> bool {
        self.shared.live().contains_key(&addr)
    }

    fn record_alloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        if let Some(p) = ptr {
            self.shared.live().insert(p.as_ptr() as usize, size);
        }
        ptr
    }
}

// SAFETY: forwards to `inner` after bookkeeping; an unknown pointer passed to
// `dealloc` is counted and never forwarded.
unsafe impl<A: RawAlloc> RawAlloc for CountingAlloc<A> {
    unsafe fn alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        if Shared::take_failure(&self.shared.fail_allocs) {
            return None;
        }
        self.shared.allocs.fetch_add(1, Ordering::AcqRel);
        self.record_alloc(self.inner.alloc(layout), layout.size())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        if Shared::take_failure(&self.shared.fail_allocs) {
            return None;
        }
        self.shared.zeroed_allocs.fetch_add(1, Ordering::AcqRel);
        self.record_alloc(self.inner.alloc_zeroed(layout), layout.size())
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if Shared::take_failure(&self.shared.fail_reallocs) {
            return None;
        }
        let moved = self.inner.realloc(ptr, layout, new_size)?;
        self.shared.reallocs.fetch_add(1, Ordering::AcqRel);
        let mut live = self.shared.live();
        live.remove(&(ptr.as_ptr() as usize));
        live.insert(moved.as_ptr() as usize, new_size);
        Some(moved)
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        let known = self.shared.live().remove(&(ptr.as_ptr() as usize)).is_some();
        if !known {
            self.shared.unknown_frees.fetch_add(1, Ordering::AcqRel);
            return;
        }
        self.shared.deallocs.fetch_add(1, Ordering::AcqRel);
        self.inner.dealloc(ptr, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_round_trip_through_host() {
        let host = CountingAlloc::new();
        let layout = Layout::from_size_align(32, 16).unwrap();
        unsafe {
            let p = host.alloc(layout).unwrap();
            assert!(host.is_live(p.as_ptr() as usize));
            let q = host.realloc(p, layout, 64).unwrap();
            let grown = Layout::from_size_align(64, 16).unwrap();
            assert_eq!(host.counts().live_bytes, 64);
            host.dealloc(q, grown);
        }
        let c = host.counts();
        assert_eq!(c.allocs, 1);
        assert_eq!(c.reallocs, 1);
        assert_eq!(c.deallocs, 1);
        assert_eq!(c.live, 0);
        assert_eq!(c.unknown_frees, 0);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let host = CountingAlloc::new();
        let layout = Layout::from_size_align(8, 16).unwrap();
        host.fail_next_allocs(1);
        unsafe {
            assert!(host.alloc(layout).is_none());
            let p = host.alloc_zeroed(layout).unwrap();
            assert_eq!(std::slice::from_raw_parts(p.as_ptr(), 8), &[0u8; 8]);
            host.dealloc(p, layout);
        }
        assert_eq!(host.counts().zeroed_allocs, 1);
        assert_eq!(host.counts().allocs, 0);
    }

    #[test]
    fn clones_share_counters() {
        let host = CountingAlloc::new();
        let other = host.clone();
        let layout = Layout::from_size_align(4, 16).unwrap();
        unsafe {
            let p = other.alloc(layout).unwrap();
            assert_eq!(host.counts().live, 1);
            other.dealloc(p, layout);
        }
        assert_eq!(host.counts().deallocs, 1);
    }
}
