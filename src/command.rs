//! Core command data model and the stream plumbing shared by builtin and
//! external execution.

use crate::lexer::RedirectKind;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells.
pub type ExitCode = i32;

/// A single redirection directive attached to a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub kind: RedirectKind,
    pub filename: String,
}

/// One pipeline stage: an argument vector plus its redirections in
/// declaration order. When two directives target the same stream, the
/// later one wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub argv: Vec<String>,
    pub redirections: Vec<Redirection>,
}

/// Abstraction over a readable input stream that can also be converted
/// into a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any `Send` type that implements
/// `Read` and `Into<Stdio>` (files, pipe read ends).
pub trait Stdin: Read + Send {
    /// Convert this input into a [`Stdio`] handle suitable for
    /// `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio> + Send> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted
/// into a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any `Send` type that implements
/// `Write` and `Into<Stdio>`.
pub trait Stdout: Write + Send {
    /// Convert this output into a [`Stdio`] handle suitable for
    /// `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio> + Send> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// The three logical streams of one pipeline stage.
///
/// A stage starts with its inherited streams (the shell's own, or conduit
/// ends) and then applies its redirections on top, replacing streams one
/// by one. Each stream is owned by the stage and released on drop.
pub struct StageIo {
    pub stdin: Box<dyn Stdin>,
    pub stdout: Box<dyn Stdout>,
    pub stderr: Box<dyn Stdout>,
}

/// Error raised when a redirection target cannot be opened.
#[derive(Debug)]
pub struct RedirectError {
    pub filename: String,
    pub source: std::io::Error,
}

impl fmt::Display for RedirectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.filename, self.source)
    }
}

impl std::error::Error for RedirectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl StageIo {
    /// Apply the command's redirections in declaration order.
    ///
    /// All targets are opened before any stream is replaced, so a failed
    /// open leaves the inherited streams untouched. Parent directories of
    /// each target are created as needed.
    pub fn apply_redirections(&mut self, command: &Command) -> Result<(), RedirectError> {
        let mut opened = Vec::with_capacity(command.redirections.len());
        for redirection in &command.redirections {
            let file = open_target(redirection).map_err(|source| RedirectError {
                filename: redirection.filename.clone(),
                source,
            })?;
            opened.push((redirection.kind, file));
        }
        for (kind, file) in opened {
            match kind {
                RedirectKind::In => self.stdin = Box::new(file),
                RedirectKind::OutTrunc | RedirectKind::OutAppend => self.stdout = Box::new(file),
                RedirectKind::ErrTrunc | RedirectKind::ErrAppend => self.stderr = Box::new(file),
            }
        }
        Ok(())
    }
}

fn open_target(redirection: &Redirection) -> std::io::Result<File> {
    let path = Path::new(&redirection.filename);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    match redirection.kind {
        RedirectKind::In => File::open(path),
        RedirectKind::OutTrunc | RedirectKind::ErrTrunc => File::create(path),
        RedirectKind::OutAppend | RedirectKind::ErrAppend => {
            OpenOptions::new().create(true).append(true).open(path)
        }
    }
}
