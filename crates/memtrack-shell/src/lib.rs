#![forbid(unsafe_code)]
//! memtrack-shell: a small line-oriented command shell whose every byte of
//! session state lives in a `memtrack_mem::Tracker`.
//!
//! - `token`: splits a line into tokens and stores them in a tracked array.
//! - `vars`: typed variables kept as tracked records.
//! - `commands`: caller-owned table of user commands.
//! - `shell`: dispatch of built-ins, assignments, and user commands.
//! - `repl`: the interactive loop.

pub mod commands;
pub mod error;
pub mod repl;
pub mod shell;
pub mod token;
pub mod vars;

pub use commands::{CommandContext, CommandTable};
pub use error::{Result, ShellError};
pub use repl::Repl;
pub use shell::{Outcome, Shell};
pub use vars::{Value, VarTable};
