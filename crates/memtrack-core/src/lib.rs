//! memtrack-core: shared vocabulary for the memtrack workspace.
//!
//! Holds identifiers, configuration, and the host allocation trait. The
//! tracker itself lives in `memtrack-mem`; keeping only types and traits here
//! lets any crate name the API without pulling in the allocator.

pub mod config;
pub mod error;
pub mod id;
pub mod prelude;
pub mod raw;

pub use config::{ShellConfig, TrackerConfig};
pub use error::{Error, Result};
pub use id::{Addr, TrackerId};
pub use raw::RawAlloc;
