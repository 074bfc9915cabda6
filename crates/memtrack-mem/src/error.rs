use memtrack_core::id::Addr;
use thiserror::Error;

/// Result type local to memtrack-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("memory budget exceeded: requested {requested} bytes, used {used}, max {max}")]
    BudgetExceeded {
        requested: usize,
        used: usize,
        max: usize,
    },

    #[error("host allocation failed for {bytes} bytes")]
    AllocFailed { bytes: usize },

    /// The entry table could not grow; the raw allocation was already returned.
    #[error("could not track allocation: entry table full at {entries} entries")]
    TrackingFailed { entries: usize },

    #[error("address {addr} is not tracked")]
    NotTracked { addr: Addr },

    #[error("range {offset}..{offset}+{len} out of bounds for {size}-byte allocation at {addr}")]
    OutOfBounds {
        addr: Addr,
        offset: usize,
        len: usize,
        size: usize,
    },
}
