//! Strongly-typed identifiers used across the workspace.
//!
//! Downstream crates (mem, shell) should *not* pass raw pointers or integers
//! around as allocation handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(TrackerId);

static NEXT_TRACKER: AtomicU64 = AtomicU64::new(1);

impl TrackerId {
    /// Hand out a process-unique id for a freshly created tracker.
    pub fn next() -> Self {
        Self(NEXT_TRACKER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a tracked allocation: the numeric address the host returned.
///
/// An `Addr` grants no access on its own. Bytes are only reachable through the
/// tracker that owns the allocation, so a stale or foreign `Addr` simply fails
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Addr(usize);

impl Addr {
    /// Width of an `Addr` when stored in a pointer-sized slot.
    pub const SLOT_BYTES: usize = std::mem::size_of::<usize>();

    pub const fn new(v: usize) -> Self {
        Self(v)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub fn from_ptr(ptr: NonNull<u8>) -> Self {
        Self(ptr.as_ptr() as usize)
    }

    pub fn to_ne_bytes(self) -> [u8; Self::SLOT_BYTES] {
        self.0.to_ne_bytes()
    }

    pub fn from_ne_bytes(bytes: [u8; Self::SLOT_BYTES]) -> Self {
        Self(usize::from_ne_bytes(bytes))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
