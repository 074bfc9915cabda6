//! Interactive read-eval-print loop.
//!
//! Beyond the shell's own built-ins the loop understands three session
//! commands: `exit-shell`, `show-exitval` (toggle printing each line's return
//! value) and `reset-mem`.

use std::io::{BufRead, Write};

use memtrack_mem::Teardown;

use crate::commands::CommandTable;
use crate::error::{Result, ShellError};
use crate::shell::{Outcome, Shell};

pub struct Repl<'c> {
    shell: Shell,
    commands: &'c CommandTable,
    show_exit: bool,
}

impl<'c> Repl<'c> {
    pub fn new(shell: Shell, commands: &'c CommandTable) -> Self {
        Self {
            shell,
            commands,
            show_exit: false,
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut Shell {
        &mut self.shell
    }

    /// Run until `exit-shell`, `exit` or end of input. Returns the process
    /// exit code the session asked for.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<i32> {
        if self.shell.config().show_help_at_start {
            self.step("help", &mut out)?;
        }
        self.step("show-memusg", &mut out)?;

        let mut line = String::new();
        loop {
            write!(out, "{}", self.shell.config().prompt)?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                return Ok(0);
            }
            let cmd = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

            let code = match cmd.trim() {
                "exit-shell" => return Ok(0),
                "show-exitval" => {
                    self.show_exit = !self.show_exit;
                    0
                }
                "reset-mem" => match self.shell.reset_memory() {
                    Ok(_) => {
                        writeln!(out, "Memory has been reset")?;
                        0
                    }
                    Err(ShellError::Io(e)) => return Err(ShellError::Io(e)),
                    Err(e) => {
                        writeln!(out, "{e}")?;
                        e.exit_code()
                    }
                },
                _ => match self.step(cmd, &mut out)? {
                    Outcome::Continue(code) => code,
                    Outcome::Exit(code) => return Ok(code),
                },
            };
            if self.show_exit {
                writeln!(out, "\nretVal = {code}")?;
            }
        }
    }

    /// End the session and release its memory.
    pub fn finish(self) -> Teardown {
        self.shell.close()
    }

    /// Execute one line, reporting line errors to `out`. Only output
    /// failures escape.
    fn step<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Outcome> {
        match self.shell.execute(line, self.commands, &mut *out) {
            Ok(outcome) => Ok(outcome),
            Err(ShellError::Io(e)) => Err(ShellError::Io(e)),
            Err(e) => {
                tracing::debug!(error = %e, "line failed");
                writeln!(out, "{e}")?;
                Ok(Outcome::Continue(e.exit_code()))
            }
        }
    }
}
