//! The interactive shell: shared execution context and the REPL driver.

use crate::command::ExitCode;
use crate::editor::{self, PROMPT};
use crate::env::Environment;
use crate::history::HistoryStore;
use crate::lexer;
use crate::parser;
use crate::pipeline;
use anyhow::{Context as _, Result};
use rustyline::error::ReadlineError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State shared by the REPL driver and the pipeline stages it dispatches.
///
/// Builtins execute inside stage threads, so the mutable pieces sit
/// behind mutexes. Lock poisoning is absorbed; a panicking stage must not
/// wedge the rest of the session.
pub struct ShellContext {
    env: Mutex<Environment>,
    history: Mutex<HistoryStore>,
    histfile: Option<PathBuf>,
}

impl ShellContext {
    pub fn new(env: Environment, histfile: Option<PathBuf>) -> Self {
        Self {
            env: Mutex::new(env),
            history: Mutex::new(HistoryStore::new()),
            histfile,
        }
    }

    fn env_lock(&self) -> MutexGuard<'_, Environment> {
        self.env.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn history_lock(&self) -> MutexGuard<'_, HistoryStore> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env_lock().get_var(key)
    }

    pub fn current_dir(&self) -> PathBuf {
        self.env_lock().current_dir.clone()
    }

    /// Snapshot of the environment, for spawning external processes.
    pub fn environment(&self) -> Environment {
        self.env_lock().clone()
    }

    /// Change both the process working directory and the tracked one.
    pub fn change_dir(&self, target: &Path) -> io::Result<()> {
        let mut env = self.env_lock();
        let resolved = if target.is_absolute() {
            target.to_path_buf()
        } else {
            env.current_dir.join(target)
        };
        std::env::set_current_dir(&resolved)?;
        env.current_dir = std::env::current_dir().unwrap_or(resolved);
        Ok(())
    }

    pub fn record_history(&self, line: &str) {
        self.history_lock().record(line);
    }

    pub fn history_snapshot(&self) -> Vec<String> {
        self.history_lock().entries().to_vec()
    }

    /// Run an operation against the history store under its lock.
    pub fn with_history<T>(&self, op: impl FnOnce(&mut HistoryStore) -> T) -> T {
        op(&mut self.history_lock())
    }

    /// Path of the configured history file, when one is set.
    pub fn histfile(&self) -> Option<&Path> {
        self.histfile.as_deref()
    }

    /// Write the full history to the configured file, when one is set.
    /// Called on every shutdown path and by the `exit` builtin.
    pub fn persist_history(&self) {
        let Some(path) = &self.histfile else { return };
        match self.history_lock().save_all(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "history saved"),
            Err(err) => tracing::debug!(path = %path.display(), %err, "history save failed"),
        }
    }
}

/// The interactive shell. Owns the shared context and drives the
/// read-eval-print loop.
pub struct Shell {
    ctx: ShellContext,
}

impl Shell {
    /// Create a shell. The history file is `histfile_override` when
    /// given, otherwise the `HISTFILE` environment variable; when set,
    /// its entries are loaded and the session marker placed after them.
    pub fn new(histfile_override: Option<PathBuf>) -> Self {
        let env = Environment::new();
        let histfile = histfile_override.or_else(|| {
            env.get_var("HISTFILE")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });
        let ctx = ShellContext::new(env, histfile);
        if let Some(path) = ctx.histfile().map(Path::to_path_buf) {
            ctx.with_history(|history| {
                // A missing file on first start is normal.
                let _ = history.load_from_file(&path);
                history.start_session();
            });
        }
        Shell { ctx }
    }

    pub fn context(&self) -> &ShellContext {
        &self.ctx
    }

    /// Run the read-eval-print loop until end of input or `exit`.
    pub fn run(&self) -> Result<()> {
        let candidates = editor::completion_candidates(&self.ctx.environment());
        tracing::debug!(candidates = candidates.len(), "completion source ready");
        let mut rl =
            editor::create_editor(candidates).context("failed to initialize line editor")?;

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());
                    self.ctx.record_history(&line);
                    if trimmed == "exit" {
                        self.ctx.persist_history();
                        break;
                    }
                    self.eval(trimmed);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    self.ctx.persist_history();
                    break;
                }
                Err(err) => {
                    self.ctx.persist_history();
                    eprintln!("shoal: {}", err);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Lex, build and execute one input line.
    ///
    /// Syntax problems are reported to stderr and discard the line; they
    /// never end the session.
    pub fn eval(&self, line: &str) -> ExitCode {
        let tokens = match lexer::split_into_tokens(line) {
            Ok(tokens) => tokens,
            Err(err) => {
                eprintln!("shoal: {}", err);
                return 2;
            }
        };
        let stages = match parser::parse_pipeline(tokens) {
            Ok(stages) => stages,
            Err(err) => {
                eprintln!("shoal: syntax error: {}", err);
                return 2;
            }
        };
        pipeline::run(&self.ctx, stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("shoal_interp_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn startup_load_places_the_session_marker() {
        let dir = make_unique_temp_dir("startup");
        let path = dir.join("histfile");
        fs::write(&path, "old one\nold two\n").unwrap();

        let shell = Shell::new(Some(path.clone()));
        let ctx = shell.context();
        assert_eq!(ctx.history_snapshot(), ["old one", "old two"]);
        assert_eq!(ctx.with_history(|h| h.session_start()), 2);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_histfile_is_tolerated() {
        let dir = make_unique_temp_dir("nofile");
        let path = dir.join("does_not_exist_yet");

        let shell = Shell::new(Some(path.clone()));
        assert!(shell.context().history_snapshot().is_empty());

        shell.context().record_history("echo hi");
        shell.context().persist_history();
        assert_eq!(fs::read_to_string(&path).unwrap(), "echo hi\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn persist_without_a_histfile_is_a_no_op() {
        let ctx = ShellContext::new(Environment::new(), None);
        ctx.record_history("anything");
        ctx.persist_history();
    }

    #[test]
    #[cfg(unix)]
    fn eval_runs_a_pipeline_end_to_end() {
        let dir = make_unique_temp_dir("eval");
        let out = dir.join("out.txt");

        let shell = Shell::new(None);
        let status = shell.eval(&format!("echo hello world > {}", out.display()));
        assert_eq!(status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello world\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn pwd_output_can_be_redirected() {
        let dir = make_unique_temp_dir("pwdout");
        let out = dir.join("out.txt");

        let shell = Shell::new(None);
        assert_eq!(shell.eval(&format!("pwd > {}", out.display())), 0);
        let expected = format!("{}\n", shell.context().current_dir().display());
        assert_eq!(fs::read_to_string(&out).unwrap(), expected);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn eval_reports_syntax_errors_without_ending_the_session() {
        let shell = Shell::new(None);
        assert_eq!(shell.eval("echo 'oops"), 2);
        assert_eq!(shell.eval("echo hi >"), 2);
        if cfg!(unix) {
            // The shell is still usable afterwards.
            assert_eq!(shell.eval("echo fine > /dev/null"), 0);
        }
    }
}
