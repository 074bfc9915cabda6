//! memtrack-mem: budget-bounded tracking allocator.
//!
//! Every byte a subsystem uses is obtained from a [`Tracker`], which records
//! each live allocation, enforces a ceiling before admitting new or grown
//! allocations, and frees everything still live on teardown. Collaborators
//! build [`DynArray`]s on top of it and release them with
//! [`Tracker::release_array`].
//!
//! A tracker is a per-subsystem resource: it is neither `Send` nor `Sync`.

pub mod array;
pub mod error;
pub mod raw;
pub mod stats;
pub mod tracker;

pub use array::DynArray;
pub use error::{Error, Result};
pub use memtrack_core::id::{Addr, TrackerId};
pub use raw::{AllocCounts, CountingAlloc, SystemAlloc};
pub use stats::TrackerStats;
pub use tracker::{Teardown, Tracker};
