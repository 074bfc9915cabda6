//! Convenient re-exports for downstream crates.

pub use crate::config::{ShellConfig, TrackerConfig, DEFAULT_MAX_BYTES};
pub use crate::error::{Error, Result};
pub use crate::id::{Addr, TrackerId};
pub use crate::raw::RawAlloc;
