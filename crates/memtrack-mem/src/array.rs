//! Tracker-backed dynamic arrays.
//!
//! A `DynArray` is a size-tagged buffer of pointer-sized slots, each holding
//! the `Addr` of another tracked allocation (a string, a record, or another
//! array's record). The array record, the slot buffer, and optionally every
//! element are all tracker allocations, and the whole structure goes back to
//! the tracker in one call to [`Tracker::release_array`].
//!
//! Layout of the record allocation: `[ elements: usize ][ count: usize ]`,
//! native endian, rewritten whenever either changes.

use memtrack_core::id::{Addr, TrackerId};
use memtrack_core::raw::RawAlloc;

use crate::error::{Error, Result};
use crate::tracker::Tracker;

const SLOT: usize = Addr::SLOT_BYTES;
pub const RECORD_BYTES: usize = 2 * SLOT;

/// Handle to a tracker-backed array. Dropping the handle frees nothing; pass
/// it to `Tracker::release_array` (or tear the tracker down).
#[must_use = "release the array through its tracker"]
#[derive(Debug)]
pub struct DynArray {
    owner: TrackerId,
    record: Addr,
    elements: Addr,
    count: usize,
    slots: usize,
}

impl DynArray {
    pub fn new<A: RawAlloc>(mt: &mut Tracker<A>) -> Result<Self> {
        Self::with_slots(mt, 0)
    }

    /// Create an empty array with `slots` zeroed slots reserved.
    pub fn with_slots<A: RawAlloc>(mt: &mut Tracker<A>, slots: usize) -> Result<Self> {
        let record = mt.alloc(RECORD_BYTES)?;
        let elements = match mt.alloc_zeroed(slots, SLOT) {
            Ok(addr) => addr,
            Err(e) => {
                mt.release(record);
                return Err(e);
            }
        };
        let array = Self {
            owner: mt.id(),
            record,
            elements,
            count: 0,
            slots,
        };
        array.sync_record(mt);
        Ok(array)
    }

    pub fn owner(&self) -> TrackerId {
        self.owner
    }

    /// Address of the array record itself.
    pub fn record(&self) -> Addr {
        self.record
    }

    /// Address of the slot buffer. Changes when a push grows the buffer.
    pub fn elements(&self) -> Addr {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slots currently backed by the element buffer.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Append an element, growing the slot buffer by exactly one slot when
    /// full. On failure the array is unchanged.
    pub fn push<A: RawAlloc>(&mut self, mt: &mut Tracker<A>, value: Addr) -> Result<()> {
        if self.count == self.slots {
            let slots = self.slots + 1;
            self.elements = mt.grow(self.elements, slots * SLOT)?;
            self.slots = slots;
        }
        self.write_slot(mt, self.count, value)?;
        self.count += 1;
        self.sync_record(mt);
        Ok(())
    }

    pub fn get<A: RawAlloc>(&self, mt: &Tracker<A>, index: usize) -> Option<Addr> {
        if index >= self.count {
            return None;
        }
        let start = index * SLOT;
        let slot = mt.bytes(self.elements)?.get(start..start + SLOT)?;
        Some(Addr::from_ne_bytes(slot.try_into().ok()?))
    }

    /// Overwrite element `index`, returning the value it held.
    pub fn set<A: RawAlloc>(
        &mut self,
        mt: &mut Tracker<A>,
        index: usize,
        value: Addr,
    ) -> Result<Addr> {
        let old = self.get(mt, index).ok_or_else(|| self.out_of_bounds(index))?;
        self.write_slot(mt, index, value)?;
        Ok(old)
    }

    /// Remove element `index` by moving the last element into its slot.
    /// Element order is not preserved. The removed `Addr` is returned for
    /// the caller to release.
    pub fn swap_remove<A: RawAlloc>(&mut self, mt: &mut Tracker<A>, index: usize) -> Result<Addr> {
        let removed = self.get(mt, index).ok_or_else(|| self.out_of_bounds(index))?;
        let last = self.count - 1;
        if index != last {
            let moved = self.get(mt, last).ok_or_else(|| self.out_of_bounds(last))?;
            self.write_slot(mt, index, moved)?;
        }
        self.write_slot(mt, last, Addr::new(0))?;
        self.count = last;
        self.sync_record(mt);
        Ok(removed)
    }

    pub fn iter<'t, A: RawAlloc>(&'t self, mt: &'t Tracker<A>) -> impl Iterator<Item = Addr> + 't {
        (0..self.count).filter_map(move |i| self.get(mt, i))
    }

    fn write_slot<A: RawAlloc>(
        &self,
        mt: &mut Tracker<A>,
        index: usize,
        value: Addr,
    ) -> Result<()> {
        mt.write(self.elements, index * SLOT, &value.to_ne_bytes())
    }

    fn sync_record<A: RawAlloc>(&self, mt: &mut Tracker<A>) {
        if let Some(rec) = mt.bytes_mut(self.record) {
            rec[..SLOT].copy_from_slice(&self.elements.get().to_ne_bytes());
            rec[SLOT..RECORD_BYTES].copy_from_slice(&self.count.to_ne_bytes());
        }
    }

    fn out_of_bounds(&self, index: usize) -> Error {
        Error::OutOfBounds {
            addr: self.elements,
            offset: index.saturating_mul(SLOT),
            len: SLOT,
            size: self.count * SLOT,
        }
    }
}

impl<A: RawAlloc> Tracker<A> {
    /// Structured bulk free of a `DynArray`.
    ///
    /// With `nested`, every element is first released as an independent
    /// allocation (one level deep: an array of strings, or an array whose
    /// elements are records). Then the slot buffer and the record go.
    /// An array built on another tracker is left alone.
    pub fn release_array(&mut self, array: DynArray, nested: bool) {
        if array.owner != self.id() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                tracker = %self.id(),
                owner = %array.owner,
                "release_array on foreign array ignored"
            );
            return;
        }
        if nested {
            for index in 0..array.len() {
                if let Some(item) = array.get(self, index) {
                    self.release(item);
                }
            }
        }
        self.release(array.elements);
        self.release(array.record);
    }
}
