//! User command table.
//!
//! The embedding program owns the table and passes it to every dispatch call;
//! nothing here is process-wide. Commands are looked up by name in
//! registration order.

use std::io::Write;

use memtrack_mem::Tracker;

use crate::error::{Result, ShellError};

/// Everything a user command gets to work with.
pub struct CommandContext<'a> {
    /// The full command line after variable expansion; `args[0]` is the name.
    pub args: &'a [String],
    /// The session tracker. Anything a command allocates here is charged to
    /// the session and freed by `reset-mem` or session teardown.
    pub tracker: &'a mut Tracker,
    pub out: &'a mut dyn Write,
}

pub type Handler = Box<dyn Fn(&mut CommandContext<'_>) -> Result<u8>>;

struct Command {
    name: String,
    handler: Handler,
}

#[derive(Default)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Names must be unique within the table.
    pub fn register<F>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut CommandContext<'_>) -> Result<u8> + 'static,
    {
        if self.contains(name) {
            return Err(ShellError::DuplicateCommand(name.to_string()));
        }
        self.commands.push(Command {
            name: name.to_string(),
            handler: Box::new(handler),
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.iter().any(|c| c.name == name)
    }

    /// Run the command named by `ctx.args[0]`.
    pub fn dispatch(&self, ctx: &mut CommandContext<'_>) -> Result<u8> {
        let name = ctx.args.first().map(String::as_str).unwrap_or_default();
        let command = self
            .commands
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))?;
        (command.handler)(ctx)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.commands.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
