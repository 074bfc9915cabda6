//! Command shell: one line in, one outcome out.
//!
//! A `Shell` owns the session tracker and the variable table. Every line is
//! parsed into a tracked token array, acted on, and bulk-freed before
//! `execute` returns, whatever the result.

use std::io::Write;

use memtrack_core::config::{ShellConfig, TrackerConfig};
use memtrack_mem::{DynArray, Teardown, Tracker};

use crate::commands::{CommandContext, CommandTable};
use crate::error::{Result, ShellError};
use crate::token::{parse, read_tokens};
use crate::vars::{validate_name, Value, VarTable};

pub const BUILTINS: &[&str] = &[
    "print",
    "clear",
    "exit",
    "unset",
    "show-memusg",
    "version",
    "help",
];

/// What the caller should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue(u8),
    /// `exit` was run; the shell never terminates the process itself.
    Exit(i32),
}

/// `NAME=VALUE`, `NAME =VALUE` or `NAME = VALUE`.
struct Assignment {
    name: String,
    value: String,
}

impl Assignment {
    fn detect(tokens: &[String]) -> Option<Self> {
        let first = tokens.first()?;
        if let Some(pos) = first.find('=').filter(|&p| p > 0) {
            let mut parts = vec![&first[pos + 1..]];
            parts.extend(tokens[1..].iter().map(String::as_str));
            return Some(Self {
                name: first[..pos].to_string(),
                value: join_nonempty_head(&parts),
            });
        }
        let rest = tokens.get(1)?.strip_prefix('=')?;
        let mut parts = vec![rest];
        parts.extend(tokens[2..].iter().map(String::as_str));
        Some(Self {
            name: first.clone(),
            value: join_nonempty_head(&parts),
        })
    }
}

/// Join with single spaces, dropping an empty leading part (`a = b`).
fn join_nonempty_head(parts: &[&str]) -> String {
    match parts.split_first() {
        Some((head, tail)) if head.is_empty() => tail.join(" "),
        _ => parts.join(" "),
    }
}

pub struct Shell {
    cfg: ShellConfig,
    tracker: Tracker,
    vars: VarTable,
}

impl Shell {
    pub fn new(cfg: ShellConfig) -> Result<Self> {
        let mut tracker = Tracker::with_config(&cfg.tracker);
        let vars = VarTable::new(&mut tracker)?;
        Ok(Self { cfg, tracker, vars })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.cfg
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    pub fn vars(&self) -> &VarTable {
        &self.vars
    }

    pub fn variable(&self, name: &str) -> Result<Option<Value>> {
        self.vars.get(&self.tracker, name)
    }

    /// Run one line.
    pub fn execute(
        &mut self,
        line: &str,
        commands: &CommandTable,
        out: &mut dyn Write,
    ) -> Result<Outcome> {
        let mut array = parse(line, &mut self.tracker)?;
        let result = self.run_parsed(&mut array, commands, out);
        self.tracker.release_array(array, true);
        result
    }

    /// Tear the session tracker down and start over with an empty one using
    /// the current ceiling. Every variable is gone afterwards.
    ///
    /// The replacement session is built first; if it cannot be set up the
    /// current tracker and variables stay as they were.
    pub fn reset_memory(&mut self) -> Result<Teardown> {
        let cfg = TrackerConfig {
            max_bytes: self.tracker.max_bytes(),
            ..self.cfg.tracker.clone()
        };
        let mut tracker = Tracker::with_config(&cfg);
        let vars = VarTable::new(&mut tracker)?;

        self.vars = vars;
        let report = std::mem::replace(&mut self.tracker, tracker).teardown();
        tracing::debug!(
            entries = report.entries,
            bytes = report.bytes,
            "session memory reset"
        );
        Ok(report)
    }

    /// End the session, releasing everything it still holds.
    pub fn close(self) -> Teardown {
        self.tracker.teardown()
    }

    fn run_parsed(
        &mut self,
        array: &mut DynArray,
        commands: &CommandTable,
        out: &mut dyn Write,
    ) -> Result<Outcome> {
        let tokens = read_tokens(array, &self.tracker)?;
        if tokens.is_empty() {
            return Ok(Outcome::Continue(0));
        }
        if let Some(assign) = Assignment::detect(&tokens) {
            self.assign(assign)?;
            return Ok(Outcome::Continue(0));
        }
        self.expand(array)?;
        let args = read_tokens(array, &self.tracker)?;
        self.dispatch(&args, commands, out)
    }

    fn assign(&mut self, assign: Assignment) -> Result<()> {
        validate_name(&assign.name)?;
        let value = match assign.value.strip_prefix('$').filter(|n| !n.is_empty()) {
            Some(source) => self
                .variable(source)?
                .ok_or_else(|| ShellError::UnknownVariable(source.to_string()))?,
            None => Value::infer(&assign.value),
        };
        self.vars.set(&mut self.tracker, &assign.name, value)
    }

    /// Replace every `$NAME` token with the variable's text, as a fresh
    /// tracked token.
    fn expand(&mut self, array: &mut DynArray) -> Result<()> {
        for index in 0..array.len() {
            let Some(addr) = array.get(&self.tracker, index) else {
                continue;
            };
            let name = match self.tracker.str_at(addr).and_then(|t| t.strip_prefix('$')) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };
            let value = self
                .variable(&name)?
                .ok_or(ShellError::UnknownVariable(name))?;

            let text = self.tracker.alloc_bytes(value.to_string().as_bytes())?;
            match array.set(&mut self.tracker, index, text) {
                Ok(old) => self.tracker.release(old),
                Err(e) => {
                    self.tracker.release(text);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        args: &[String],
        commands: &CommandTable,
        out: &mut dyn Write,
    ) -> Result<Outcome> {
        tracing::debug!(command = %args[0], argc = args.len(), "dispatch");
        match args[0].as_str() {
            "print" => {
                if args.len() < 2 {
                    return Ok(Outcome::Continue(1));
                }
                writeln!(out, "{}", args[1..].join(" "))?;
            }
            "clear" => write!(out, "\x1bc")?,
            "exit" => {
                let code = match args.get(1) {
                    None => 0,
                    Some(arg) => arg
                        .parse::<i32>()
                        .map_err(|_| ShellError::NumericArgument("exit"))?,
                };
                return Ok(Outcome::Exit(code));
            }
            "unset" => {
                let name = args.get(1).ok_or(ShellError::MissingArgument("unset"))?;
                if self.vars.remove(&mut self.tracker, name)?.is_none() {
                    return Err(ShellError::UnknownVariable(name.clone()));
                }
            }
            "show-memusg" => writeln!(out, "{} bytes free", self.tracker.free_bytes())?,
            "version" => self.write_version(out)?,
            "help" => {
                self.write_version(out)?;
                self.write_help(commands, out)?;
            }
            _ => {
                let mut ctx = CommandContext {
                    args,
                    tracker: &mut self.tracker,
                    out,
                };
                return commands.dispatch(&mut ctx).map(Outcome::Continue);
            }
        }
        Ok(Outcome::Continue(0))
    }

    fn write_version(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "{}", self.cfg.product)?;
        if let Some(url) = &self.cfg.source_url {
            writeln!(out, "src at {url}")?;
        }
        writeln!(out)?;
        writeln!(out, "memtrack v{}", env!("CARGO_PKG_VERSION"))?;
        Ok(())
    }

    fn write_help(&self, commands: &CommandTable, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Built-in commands: {}", BUILTINS.join(", "))?;
        if commands.is_empty() {
            writeln!(out, "No user-defined commands loaded")?;
        } else {
            writeln!(out, "{} user-defined commands loaded", commands.len())?;
            let names: Vec<&str> = commands.names().collect();
            writeln!(out, "User-defined commands: {}", names.join(", "))?;
        }
        Ok(())
    }
}
