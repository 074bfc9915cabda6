//! End-to-end shell session tests

use std::io::{Cursor, Write};

use memtrack_core::config::{ShellConfig, TrackerConfig};
use memtrack_mem::Error as MemError;
use memtrack_shell::{CommandTable, Outcome, Repl, Shell, ShellError, Value};

fn session(cfg: ShellConfig, commands: &CommandTable, input: &str) -> (i32, String) {
    let shell = Shell::new(cfg).expect("shell failed");
    let mut repl = Repl::new(shell, commands);
    let mut out = Vec::new();
    let code = repl.run(Cursor::new(input), &mut out).expect("session failed");
    (code, String::from_utf8(out).expect("utf8 output"))
}

#[test]
fn test_variables_round_trip_through_print() {
    let input = "\
name = \"memtrack shell\"
count=42
ratio=0.5
flag=true
print $name $count $ratio $flag
exit-shell
";
    let (code, out) = session(ShellConfig::default(), &CommandTable::new(), input);
    assert_eq!(code, 0);
    assert!(out.contains("memtrack shell 42 0.500000 true\n"));
}

#[test]
fn test_variable_types_are_inferred() {
    let mut shell = Shell::new(ShellConfig::default()).expect("shell failed");
    let commands = CommandTable::new();
    let mut sink = Vec::new();
    for line in ["i=7", "f=1.25", "b=false", "s=word", "copy=$f"] {
        shell.execute(line, &commands, &mut sink).expect("assignment failed");
    }
    assert_eq!(shell.variable("i").unwrap(), Some(Value::Int(7)));
    assert_eq!(shell.variable("f").unwrap(), Some(Value::Float(1.25)));
    assert_eq!(shell.variable("b").unwrap(), Some(Value::Bool(false)));
    assert_eq!(shell.variable("s").unwrap(), Some(Value::Str("word".into())));
    assert_eq!(shell.variable("copy").unwrap(), Some(Value::Float(1.25)));
    assert_eq!(shell.vars().len(), 5);
}

#[test]
fn test_exit_codes_and_retval() {
    let input = "show-exitval\nprint\nprint ok\nmissing-cmd\nexit 4\n";
    let (code, out) = session(ShellConfig::default(), &CommandTable::new(), input);
    assert_eq!(code, 4);
    assert!(out.contains("\nretVal = 1\n"));
    assert!(out.contains("ok\n\nretVal = 0\n"));
    assert!(out.contains("missing-cmd: command not found\n\nretVal = 255\n"));
}

#[test]
fn test_help_at_start_lists_user_commands() {
    let mut commands = CommandTable::new();
    commands
        .register("hello", |ctx| {
            writeln!(ctx.out, "hello")?;
            Ok(0)
        })
        .expect("register failed");

    let cfg = ShellConfig {
        show_help_at_start: true,
        source_url: Some("https://example.invalid/memtrack".into()),
        ..ShellConfig::default()
    };
    let (_, out) = session(cfg, &commands, "");
    assert!(out.starts_with("memtrack shell\nsrc at https://example.invalid/memtrack\n"));
    assert!(out.contains(&format!("memtrack v{}", env!("CARGO_PKG_VERSION"))));
    assert!(out.contains("1 user-defined commands loaded\nUser-defined commands: hello\n"));
}

#[test]
fn test_session_ceiling_applies_to_lines() {
    let cfg = ShellConfig {
        tracker: TrackerConfig::with_max_bytes(256),
        ..ShellConfig::default()
    };
    let mut shell = Shell::new(cfg).expect("shell failed");
    let commands = CommandTable::new();
    let long = format!("print {}", "x".repeat(400));

    let mut sink = Vec::new();
    let err = shell
        .execute(&long, &commands, &mut sink)
        .expect_err("line should not fit");
    assert!(matches!(err, ShellError::Mem(MemError::BudgetExceeded { .. })));
    assert_eq!(err.exit_code(), 1);

    // the failed line left nothing behind
    let (entries, used) = (shell.tracker().len(), shell.tracker().used_bytes());
    shell.execute("print fits", &commands, &mut sink).expect("short line failed");
    assert_eq!(shell.tracker().len(), entries);
    assert_eq!(shell.tracker().used_bytes(), used);
}

#[test]
fn test_user_command_allocations_are_reset() {
    let mut commands = CommandTable::new();
    commands
        .register("hold", |ctx| {
            ctx.tracker.alloc(1000)?;
            Ok(0)
        })
        .expect("register failed");

    let mut shell = Shell::new(ShellConfig::default()).expect("shell failed");
    let mut sink = Vec::new();
    let baseline = shell.tracker().used_bytes();
    assert_eq!(
        shell.execute("hold", &commands, &mut sink).expect("hold failed"),
        Outcome::Continue(0)
    );
    assert_eq!(shell.tracker().used_bytes(), baseline + 1000);

    let report = shell.reset_memory().expect("reset failed");
    assert_eq!(report.bytes, baseline + 1000);
    assert_eq!(shell.tracker().used_bytes(), baseline);
}

#[test]
fn test_unterminated_quote_is_reported() {
    let (_, out) = session(
        ShellConfig::default(),
        &CommandTable::new(),
        "print \"open\nexit-shell\n",
    );
    assert!(out.contains("unterminated quote starting at byte 6\n"));
}

#[test]
fn test_invalid_assignment_name() {
    let mut shell = Shell::new(ShellConfig::default()).expect("shell failed");
    let mut sink = Vec::new();
    let err = shell
        .execute("9lives=1", &CommandTable::new(), &mut sink)
        .expect_err("name should be rejected");
    assert!(matches!(err, ShellError::InvalidName(name) if name == "9lives"));
}
