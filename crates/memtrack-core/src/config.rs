//! Tracker and shell configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ceiling used when a tracker is created with `max_bytes == 0`.
pub const DEFAULT_MAX_BYTES: usize = 128 * 1024 * 1024; // 128 MiB

/// Ceiling of an interactive shell session unless configured otherwise.
pub const DEFAULT_SESSION_MAX_BYTES: usize = 8 * 1024 * 1024; // 8 MiB

pub const DEFAULT_INITIAL_SLOTS: usize = 2;

pub const DEFAULT_PROMPT: &str = "(cmd) # ";

pub const DEFAULT_PRODUCT: &str = "memtrack shell";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Admission ceiling in bytes. Zero selects `DEFAULT_MAX_BYTES`.
    pub max_bytes: usize,

    /// Entry-table slots reserved up front.
    pub initial_slots: usize,

    /// Optional hard limit on live entries. Reaching it makes table growth fail.
    pub max_entries: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_bytes: 0,
            initial_slots: DEFAULT_INITIAL_SLOTS,
            max_entries: None,
        }
    }
}

impl TrackerConfig {
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    /// The ceiling a tracker built from this config starts with.
    pub fn effective_max_bytes(&self) -> usize {
        if self.max_bytes == 0 {
            DEFAULT_MAX_BYTES
        } else {
            self.max_bytes
        }
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `MEMTRACK_MAX_BYTES`: admission ceiling in bytes
    /// - `MEMTRACK_INITIAL_SLOTS`: initial entry-table slots
    /// - `MEMTRACK_MAX_ENTRIES`: hard limit on live entries
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(s) = std::env::var("MEMTRACK_MAX_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                self.max_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("MEMTRACK_INITIAL_SLOTS") {
            if let Ok(v) = s.parse::<usize>() {
                self.initial_slots = v;
            }
        }

        if let Ok(s) = std::env::var("MEMTRACK_MAX_ENTRIES") {
            if let Ok(v) = s.parse::<usize>() {
                self.max_entries = Some(v);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Session tracker settings. `reset-mem` rebuilds the tracker from these.
    pub tracker: TrackerConfig,

    pub prompt: String,

    /// Run `help` before the first prompt.
    pub show_help_at_start: bool,

    /// Product line printed by `version` and `help`.
    pub product: String,

    /// Optional source location printed under the product line.
    pub source_url: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::with_max_bytes(DEFAULT_SESSION_MAX_BYTES),
            prompt: DEFAULT_PROMPT.to_string(),
            show_help_at_start: false,
            product: DEFAULT_PRODUCT.to_string(),
            source_url: None,
        }
    }
}

impl ShellConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Besides the `MEMTRACK_*` tracker variables:
    /// - `MEMTRACK_PROMPT`: prompt string
    /// - `MEMTRACK_HELP_AT_START`: `1`/`true` to print help on startup
    /// - `MEMTRACK_PRODUCT`: product line
    /// - `MEMTRACK_SOURCE_URL`: source location line
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.tracker.apply_env();

        if let Ok(s) = std::env::var("MEMTRACK_PROMPT") {
            cfg.prompt = s;
        }

        if let Ok(s) = std::env::var("MEMTRACK_HELP_AT_START") {
            cfg.show_help_at_start = matches!(s.as_str(), "1" | "true" | "yes");
        }

        if let Ok(s) = std::env::var("MEMTRACK_PRODUCT") {
            cfg.product = s;
        }

        if let Ok(s) = std::env::var("MEMTRACK_SOURCE_URL") {
            cfg.source_url = Some(s).filter(|s| !s.is_empty());
        }

        cfg
    }

    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracker.max_entries == Some(0) {
            return Err(Error::Config("max_entries must be at least 1".into()));
        }
        Ok(())
    }
}
