//! Budget-bounded tracking allocator.
//!
//! A `Tracker` owns every region it hands out until `release` or teardown
//! takes it back. Each live region is one entry in a flat table, looked up
//! by address identity with a linear scan (tracked sets here are small).
//!
//! Invariants:
//! - `used` always equals the sum of entry sizes.
//! - `used <= max` after every successful admission. Lowering the ceiling with
//!   `set_max_bytes` does not evict anything, so `used` may sit above `max`
//!   until the caller releases memory.
//! - No two entries share an address.
//! - Tracked memory is always initialized (plain allocations and grown tails
//!   are zero-filled), which is what makes the safe byte views sound.

use std::alloc::Layout;
use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;

use serde::Serialize;

use memtrack_core::config::TrackerConfig;
use memtrack_core::id::{Addr, TrackerId};
use memtrack_core::raw::RawAlloc;

use crate::error::{Error, Result};
use crate::raw::SystemAlloc;
use crate::stats::TrackerStats;

/// Alignment of every tracked region; what `malloc` guarantees on 64-bit hosts.
const ALIGN: usize = 16;

#[derive(Clone, Copy)]
struct Entry {
    ptr: NonNull<u8>,
    /// Logical size, the amount charged against the budget.
    size: usize,
    /// Physical layout handed to the host.
    layout: Layout,
}

impl Entry {
    fn addr(&self) -> Addr {
        Addr::from_ptr(self.ptr)
    }
}

/// Zero-size requests still take one physical byte so every entry has its
/// own host address.
fn layout_for(size: usize) -> Result<Layout> {
    Layout::from_size_align(size.max(1), ALIGN).map_err(|_| Error::AllocFailed { bytes: size })
}

/// What a teardown gave back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Teardown {
    pub entries: usize,
    pub bytes: usize,
}

pub struct Tracker<A: RawAlloc = SystemAlloc> {
    id: TrackerId,
    entries: Vec<Entry>,
    used: usize,
    max: usize,
    max_entries: Option<usize>,
    stats: TrackerStats,
    raw: A,
}

impl Tracker<SystemAlloc> {
    /// Create a tracker on the system allocator. `max_bytes == 0` selects the
    /// 128 MiB default ceiling.
    pub fn new(max_bytes: usize) -> Self {
        Self::with_config(&TrackerConfig::with_max_bytes(max_bytes))
    }

    pub fn with_config(cfg: &TrackerConfig) -> Self {
        Self::with_allocator(cfg, SystemAlloc)
    }
}

impl<A: RawAlloc> Tracker<A> {
    pub fn with_allocator(cfg: &TrackerConfig, raw: A) -> Self {
        Self {
            id: TrackerId::next(),
            entries: Vec::with_capacity(cfg.initial_slots),
            used: 0,
            max: cfg.effective_max_bytes(),
            max_entries: cfg.max_entries,
            stats: TrackerStats::default(),
            raw,
        }
    }

    pub fn id(&self) -> TrackerId {
        self.id
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn max_bytes(&self) -> usize {
        self.max
    }

    /// Headroom left under the ceiling; zero while over a lowered ceiling.
    pub fn free_bytes(&self) -> usize {
        self.max.saturating_sub(self.used)
    }

    /// Overwrite the ceiling. Live allocations are never evicted, so this may
    /// leave `used_bytes() > max_bytes()` until the caller releases memory.
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            tracker = %self.id,
            old = self.max,
            new = max_bytes,
            used = self.used,
            "ceiling changed"
        );
        self.max = max_bytes;
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Number of live tracked allocations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.position(addr).is_some()
    }

    /// Logical size of a tracked allocation.
    pub fn size_of(&self, addr: Addr) -> Option<usize> {
        self.entry(addr).map(|e| e.size)
    }

    /// Live entries as `(addr, size)`. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (Addr, usize)> + '_ {
        self.entries.iter().map(|e| (e.addr(), e.size))
    }

    /// The host this tracker allocates from.
    pub fn host(&self) -> &A {
        &self.raw
    }

    /// Allocate `size` bytes, zero-filled.
    pub fn alloc(&mut self, size: usize) -> Result<Addr> {
        self.admit(size)?;
        let layout = layout_for(size)?;
        // SAFETY: `layout_for` never produces a zero-sized layout.
        let ptr = unsafe { self.raw.alloc(layout) }.ok_or(Error::AllocFailed { bytes: size })?;
        // SAFETY: fresh region of `layout.size()` writable bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
        self.track(ptr, size, layout)
    }

    /// Allocate `count * elem_size` zeroed bytes through the host's zeroed
    /// primitive. Admission is checked against the total.
    pub fn alloc_zeroed(&mut self, count: usize, elem_size: usize) -> Result<Addr> {
        let Some(size) = count.checked_mul(elem_size) else {
            self.stats.rejected += 1;
            return Err(Error::BudgetExceeded {
                requested: usize::MAX,
                used: self.used,
                max: self.max,
            });
        };
        self.admit(size)?;
        let layout = layout_for(size)?;
        // SAFETY: `layout_for` never produces a zero-sized layout.
        let ptr =
            unsafe { self.raw.alloc_zeroed(layout) }.ok_or(Error::AllocFailed { bytes: size })?;
        self.track(ptr, size, layout)
    }

    /// Allocate exactly `data.len()` bytes and copy `data` in.
    pub fn alloc_bytes(&mut self, data: &[u8]) -> Result<Addr> {
        let addr = self.alloc(data.len())?;
        self.write(addr, 0, data)?;
        Ok(addr)
    }

    /// Resize a tracked allocation, possibly moving it.
    ///
    /// Only growth is subject to the ceiling, and only by the delta. On any
    /// failure the original allocation and its entry are left as they were.
    pub fn grow(&mut self, addr: Addr, new_size: usize) -> Result<Addr> {
        let idx = self.position(addr).ok_or(Error::NotTracked { addr })?;
        let old = self.entries[idx];
        if new_size > old.size {
            self.admit(new_size - old.size)?;
        }
        let layout = layout_for(new_size)?;
        // SAFETY: `old.ptr` is live with `old.layout`; the new size is non-zero
        // and was validated against `ALIGN` by `layout_for`.
        let ptr = unsafe { self.raw.realloc(old.ptr, old.layout, layout.size()) }
            .ok_or(Error::AllocFailed { bytes: new_size })?;
        if layout.size() > old.layout.size() {
            let tail = layout.size() - old.layout.size();
            // SAFETY: the tail lies inside the resized region and is not yet
            // initialized.
            unsafe { ptr::write_bytes(ptr.as_ptr().add(old.layout.size()), 0, tail) };
        }

        self.entries[idx] = Entry {
            ptr,
            size: new_size,
            layout,
        };
        self.used = self.used - old.size + new_size;
        self.stats.grows += 1;
        self.stats.record_used(self.used);
        Ok(Addr::from_ptr(ptr))
    }

    /// Release a tracked allocation. Unknown or already released addresses are
    /// ignored.
    ///
    /// Removal moves the last entry into the freed slot, so entry order is not
    /// preserved.
    pub fn release(&mut self, addr: Addr) {
        let Some(idx) = self.position(addr) else {
            self.stats.unknown_releases += 1;
            #[cfg(feature = "tracing")]
            tracing::trace!(tracker = %self.id, %addr, "release of untracked address ignored");
            return;
        };
        let entry = self.entries.swap_remove(idx);
        self.used -= entry.size;
        self.stats.releases += 1;
        // SAFETY: the entry was live and allocated by `self.raw` with this layout.
        unsafe { self.raw.dealloc(entry.ptr, entry.layout) };
    }

    /// Release everything still tracked and consume the tracker.
    pub fn teardown(mut self) -> Teardown {
        self.release_all()
    }

    /// Read-only view of a tracked allocation's bytes.
    pub fn bytes(&self, addr: Addr) -> Option<&[u8]> {
        let entry = self.entry(addr)?;
        // SAFETY: the region is live, initialized, and at least `size` bytes;
        // the shared borrow of `self` keeps it from being released or moved.
        Some(unsafe { slice::from_raw_parts(entry.ptr.as_ptr(), entry.size) })
    }

    /// Mutable view of a tracked allocation's bytes.
    pub fn bytes_mut(&mut self, addr: Addr) -> Option<&mut [u8]> {
        let entry = *self.entry(addr)?;
        // SAFETY: as in `bytes`, and the exclusive borrow of `self` rules out
        // any other view of the region.
        Some(unsafe { slice::from_raw_parts_mut(entry.ptr.as_ptr(), entry.size) })
    }

    /// Copy `data` into a tracked allocation at `offset`.
    pub fn write(&mut self, addr: Addr, offset: usize, data: &[u8]) -> Result<()> {
        let buf = self.bytes_mut(addr).ok_or(Error::NotTracked { addr })?;
        let size = buf.len();
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= size)
            .ok_or(Error::OutOfBounds {
                addr,
                offset,
                len: data.len(),
                size,
            })?;
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// A tracked allocation read as UTF-8 text.
    pub fn str_at(&self, addr: Addr) -> Option<&str> {
        std::str::from_utf8(self.bytes(addr)?).ok()
    }

    fn admit(&mut self, requested: usize) -> Result<()> {
        match self.used.checked_add(requested) {
            Some(total) if total <= self.max => Ok(()),
            _ => {
                self.stats.rejected += 1;
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    tracker = %self.id,
                    requested,
                    used = self.used,
                    max = self.max,
                    "admission rejected"
                );
                Err(Error::BudgetExceeded {
                    requested,
                    used: self.used,
                    max: self.max,
                })
            }
        }
    }

    /// Record a fresh host region. If the table cannot take another entry the
    /// region goes straight back to the host.
    fn track(&mut self, ptr: NonNull<u8>, size: usize, layout: Layout) -> Result<Addr> {
        if let Err(e) = self.reserve_slot() {
            // SAFETY: `ptr` was just allocated by `self.raw` with `layout` and
            // never escaped.
            unsafe { self.raw.dealloc(ptr, layout) };
            return Err(e);
        }
        self.entries.push(Entry { ptr, size, layout });
        self.used += size;
        self.stats.allocs += 1;
        self.stats.record_used(self.used);
        Ok(Addr::from_ptr(ptr))
    }

    /// Make room for one more entry, growing the table by a single slot.
    fn reserve_slot(&mut self) -> Result<()> {
        let entries = self.entries.len();
        if self.max_entries.is_some_and(|limit| entries >= limit) {
            return Err(Error::TrackingFailed { entries });
        }
        if entries == self.entries.capacity() {
            self.entries
                .try_reserve_exact(1)
                .map_err(|_| Error::TrackingFailed { entries })?;
        }
        Ok(())
    }

    fn position(&self, addr: Addr) -> Option<usize> {
        self.entries.iter().position(|e| e.addr() == addr)
    }

    fn entry(&self, addr: Addr) -> Option<&Entry> {
        self.entries.iter().find(|e| e.addr() == addr)
    }

    fn release_all(&mut self) -> Teardown {
        let mut report = Teardown::default();
        for entry in self.entries.drain(..) {
            report.entries += 1;
            report.bytes += entry.size;
            // SAFETY: every entry is live and was allocated by `self.raw` with
            // its stored layout; draining removes it from the table.
            unsafe { self.raw.dealloc(entry.ptr, entry.layout) };
        }
        self.used = 0;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            tracker = %self.id,
            entries = report.entries,
            bytes = report.bytes,
            "teardown"
        );
        report
    }
}

impl<A: RawAlloc> Drop for Tracker<A> {
    fn drop(&mut self) {
        // `teardown` already emptied the table
        if !self.entries.is_empty() {
            self.release_all();
        }
    }
}

impl<A: RawAlloc> fmt::Debug for Tracker<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .field("used", &self.used)
            .field("max", &self.max)
            .finish()
    }
}
