//! Builtin commands executed inside the shell process.
//!
//! Dispatch is a tagged variant resolved once from `argv[0]`. The stage
//! runner wires up the streams (including any redirections) before the
//! builtin runs, so every write below already lands on the stage's
//! logical stdout or stderr.

use crate::command::ExitCode;
use crate::external::find_command_path;
use crate::interpreter::ShellContext;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Commands handled by the shell itself rather than by spawning a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exit,
    Echo,
    Type,
    Cd,
    Pwd,
    History,
}

impl Builtin {
    /// All builtin names, sorted. Used by `type` and by the completion
    /// source.
    pub const NAMES: [&'static str; 6] = ["cd", "echo", "exit", "history", "pwd", "type"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exit" => Some(Builtin::Exit),
            "echo" => Some(Builtin::Echo),
            "type" => Some(Builtin::Type),
            "cd" => Some(Builtin::Cd),
            "pwd" => Some(Builtin::Pwd),
            "history" => Some(Builtin::History),
            _ => None,
        }
    }

    /// Execute the builtin with the stage's wired streams.
    ///
    /// `args` is the argument vector without the command name itself.
    /// I/O errors (a closed conduit, a full disk) propagate to the stage
    /// runner, which turns them into an exit status.
    pub fn run(
        self,
        args: &[String],
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        ctx: &ShellContext,
    ) -> io::Result<ExitCode> {
        match self {
            Builtin::Exit => run_exit(args, stderr, ctx),
            Builtin::Echo => run_echo(args, stdout),
            Builtin::Type => run_type(args, stdout, ctx),
            Builtin::Cd => run_cd(args, stderr, ctx),
            Builtin::Pwd => run_pwd(stdout, ctx),
            Builtin::History => run_history(args, stdout, stderr, ctx),
        }
    }
}

fn run_exit(args: &[String], stderr: &mut dyn Write, ctx: &ShellContext) -> io::Result<ExitCode> {
    match args {
        [] => {
            ctx.persist_history();
            std::process::exit(0)
        }
        [code] => match code.parse::<ExitCode>() {
            Ok(code) => {
                ctx.persist_history();
                std::process::exit(code)
            }
            Err(_) => {
                writeln!(stderr, "exit: {}: numeric argument required", code)?;
                Ok(2)
            }
        },
        _ => {
            writeln!(stderr, "exit: too many arguments")?;
            Ok(2)
        }
    }
}

fn run_echo(args: &[String], stdout: &mut dyn Write) -> io::Result<ExitCode> {
    writeln!(stdout, "{}", args.join(" "))?;
    Ok(0)
}

fn run_type(args: &[String], stdout: &mut dyn Write, ctx: &ShellContext) -> io::Result<ExitCode> {
    let Some(name) = args.first() else {
        return Ok(0);
    };
    if Builtin::from_name(name).is_some() {
        writeln!(stdout, "{} is a shell builtin", name)?;
        return Ok(0);
    }
    let search_paths = ctx.env_var("PATH").unwrap_or_default();
    match find_command_path(OsStr::new(&search_paths), Path::new(name)) {
        Some(path) => {
            writeln!(stdout, "{} is {}", name, path.display())?;
            Ok(0)
        }
        None => {
            writeln!(stdout, "{}: not found", name)?;
            Ok(1)
        }
    }
}

fn run_cd(args: &[String], stderr: &mut dyn Write, ctx: &ShellContext) -> io::Result<ExitCode> {
    let target = match args.first().map(String::as_str) {
        None | Some("~") => match ctx.env_var("HOME") {
            Some(home) => PathBuf::from(home),
            None => {
                writeln!(stderr, "cd: HOME not set")?;
                return Ok(1);
            }
        },
        Some(path) => PathBuf::from(path),
    };
    match ctx.change_dir(&target) {
        Ok(()) => Ok(0),
        Err(_) => {
            writeln!(stderr, "cd: {}: No such file or directory", target.display())?;
            Ok(1)
        }
    }
}

fn run_pwd(stdout: &mut dyn Write, ctx: &ShellContext) -> io::Result<ExitCode> {
    writeln!(stdout, "{}", ctx.current_dir().display())?;
    Ok(0)
}

fn run_history(
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    ctx: &ShellContext,
) -> io::Result<ExitCode> {
    match args {
        [] => print_entries(ctx, stdout, None),
        [count] if !count.starts_with('-') => match count.parse::<usize>() {
            Ok(count) => print_entries(ctx, stdout, Some(count)),
            Err(_) => {
                writeln!(stderr, "history: {}: numeric argument required", count)?;
                Ok(2)
            }
        },
        [flag, path] => {
            let result = match flag.as_str() {
                "-r" => ctx.with_history(|history| history.load_from_file(path)),
                "-w" => ctx.with_history(|history| history.save_all(path)),
                "-a" => ctx.with_history(|history| history.append_session(path)),
                _ => {
                    writeln!(stderr, "history: {}: invalid option", flag)?;
                    return Ok(2);
                }
            };
            match result {
                Ok(()) => Ok(0),
                Err(err) => {
                    writeln!(stderr, "history: {}: {}", path, err)?;
                    Ok(1)
                }
            }
        }
        _ => {
            writeln!(stderr, "history: usage: history [n | -r file | -w file | -a file]")?;
            Ok(2)
        }
    }
}

fn print_entries(
    ctx: &ShellContext,
    stdout: &mut dyn Write,
    limit: Option<usize>,
) -> io::Result<ExitCode> {
    // Snapshot so the store is not locked while writing into a conduit
    // that may block.
    let entries = ctx.history_snapshot();
    let start = match limit {
        Some(limit) if limit < entries.len() => entries.len() - limit,
        _ => 0,
    };
    for (index, entry) in entries.iter().enumerate().skip(start) {
        writeln!(stdout, "{:5}  {}", index + 1, entry)?;
    }
    Ok(0)
}
