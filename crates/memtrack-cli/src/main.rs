//! memtrack CLI: run the tracked-memory shell interactively or over a script.

use clap::{Args, Parser, Subcommand};
use memtrack_core::config::ShellConfig;
use memtrack_shell::{CommandContext, CommandTable, Outcome, Repl, Shell};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memtrack")]
#[command(about = "Line-oriented shell whose session memory is budget-bounded and tracked", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session on stdin/stdout
    Shell {
        #[command(flatten)]
        opts: SessionOpts,
    },

    /// Execute a script file line by line
    Run {
        /// Path to the script
        #[arg(short, long)]
        script: PathBuf,

        #[command(flatten)]
        opts: SessionOpts,
    },
}

#[derive(Args, Default)]
struct SessionOpts {
    /// Session memory ceiling in bytes (overrides config)
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Maximum number of live tracked entries (overrides config)
    #[arg(long)]
    max_entries: Option<usize>,

    /// Prompt string (overrides config)
    #[arg(long)]
    prompt: Option<String>,

    /// Print help before the first prompt
    #[arg(long)]
    help_at_start: bool,

    /// JSON shell config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Shell { opts } => run_shell(&opts),
        Commands::Run { script, opts } => run_script(&script, &opts),
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_shell(opts: &SessionOpts) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(opts)?;
    let commands = user_commands()?;
    let shell = Shell::new(config)?;

    let mut repl = Repl::new(shell, &commands);
    let code = repl.run(io::stdin().lock(), io::stdout().lock())?;
    let report = repl.finish();
    tracing::debug!(entries = report.entries, bytes = report.bytes, "session closed");
    Ok(code)
}

fn run_script(path: &Path, opts: &SessionOpts) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(opts)?;
    let commands = user_commands()?;
    let mut shell = Shell::new(config)?;

    let file = io::BufReader::new(fs::File::open(path)?);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut code = 0;
    for line in file.lines() {
        let line = line?;
        match shell.execute(&line, &commands, &mut out) {
            Ok(Outcome::Continue(c)) => code = i32::from(c),
            Ok(Outcome::Exit(c)) => {
                code = c;
                break;
            }
            Err(e) => {
                writeln!(out, "{}", e)?;
                code = i32::from(e.exit_code());
            }
        }
    }
    out.flush()?;

    let report = shell.close();
    tracing::debug!(entries = report.entries, bytes = report.bytes, "script finished");
    Ok(code)
}

/// Defaults, then environment, then the config file, then flags.
fn load_config(opts: &SessionOpts) -> Result<ShellConfig, Box<dyn std::error::Error>> {
    let mut config = ShellConfig::from_env();
    if let Some(path) = &opts.config {
        let text = fs::read_to_string(path)?;
        config = overlay_json(&config, &text)?;
    }
    apply_flags(&mut config, opts);
    config.validate()?;
    Ok(config)
}

/// Apply a JSON document on top of `base`; only fields present in the
/// document change.
fn overlay_json(base: &ShellConfig, text: &str) -> Result<ShellConfig, Box<dyn std::error::Error>> {
    let mut merged = serde_json::to_value(base)?;
    let doc: serde_json::Value = serde_json::from_str(text)?;
    merge(&mut merged, doc);
    Ok(ShellConfig::from_json(&merged.to_string())?)
}

fn merge(base: &mut serde_json::Value, doc: serde_json::Value) {
    match (base, doc) {
        (serde_json::Value::Object(base), serde_json::Value::Object(doc)) => {
            for (key, value) in doc {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_flags(config: &mut ShellConfig, opts: &SessionOpts) {
    if let Some(max) = opts.max_bytes {
        config.tracker.max_bytes = max;
    }
    if let Some(entries) = opts.max_entries {
        config.tracker.max_entries = Some(entries);
    }
    if let Some(prompt) = &opts.prompt {
        config.prompt = prompt.clone();
    }
    if opts.help_at_start {
        config.show_help_at_start = true;
    }
}

fn user_commands() -> memtrack_shell::Result<CommandTable> {
    let mut commands = CommandTable::new();
    commands.register("stats", stats_command)?;
    Ok(commands)
}

/// `stats`: dump the session tracker's counters as JSON.
fn stats_command(ctx: &mut CommandContext<'_>) -> memtrack_shell::Result<u8> {
    let tracker = &*ctx.tracker;
    let doc = serde_json::json!({
        "tracker": tracker.id().to_string(),
        "used_bytes": tracker.used_bytes(),
        "max_bytes": tracker.max_bytes(),
        "entries": tracker.len(),
        "stats": tracker.stats(),
    });
    writeln!(ctx.out, "{}", serde_json::to_string_pretty(&doc)?)?;
    Ok(0)
}
