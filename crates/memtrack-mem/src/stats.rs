//! Lightweight usage counters kept by every tracker.
//!
//! Keep this cheap: plain integers, updated on the success/failure paths of
//! the tracker operations. Nothing here feeds back into admission decisions.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Highest `used_bytes` value observed.
    pub peak_bytes: usize,
    pub allocs: u64,
    pub grows: u64,
    pub releases: u64,
    /// Requests turned away by admission control.
    pub rejected: u64,
    /// Releases of addresses the tracker did not own.
    pub unknown_releases: u64,
}

impl TrackerStats {
    /// Record a new "used bytes" value; updates peak if higher.
    pub(crate) fn record_used(&mut self, used_bytes: usize) {
        if used_bytes > self.peak_bytes {
            self.peak_bytes = used_bytes;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(used_bytes, peak = self.peak_bytes, "mem usage");
    }
}
