//! Interactive line editing and tab completion.
//!
//! The editor is rustyline with a custom helper. The helper owns the
//! completion source (computed once at startup) and implements the
//! bash-style progressive disclosure protocol: an ambiguous prefix rings
//! the bell on the first tab and enumerates the candidates on the
//! second. rustyline's own bell is disabled so that every bell the user
//! hears comes from the protocol.

use crate::builtin::Builtin;
use crate::env::Environment;
use rustyline::completion::{Completer, Pair};
use rustyline::config::BellStyle;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, Editor, Helper};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};

/// The interactive prompt.
pub const PROMPT: &str = "$ ";

/// Names offered by tab completion: the builtins plus the basename of
/// every regular file in every `PATH` directory, de-duplicated and
/// sorted. Staleness is acceptable; the scan runs once at startup.
pub fn completion_candidates(env: &Environment) -> Vec<String> {
    let mut names: BTreeSet<String> = Builtin::NAMES.iter().map(|s| s.to_string()).collect();
    if let Some(search_paths) = env.get_var("PATH") {
        for dir in std::env::split_paths(&search_paths) {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if !entry.path().is_file() {
                    continue;
                }
                if let Ok(name) = entry.file_name().into_string() {
                    names.insert(name);
                }
            }
        }
    }
    names.into_iter().collect()
}

/// Progressive-disclosure state: the buffer prefix the last tab was seen
/// with, and how many tabs arrived in a row for it.
#[derive(Debug, Default)]
struct CompletionState {
    last_prefix: String,
    tab_count: u32,
}

impl CompletionState {
    /// Register one tab press against `prefix` and return the updated
    /// consecutive count. Any change of prefix (i.e. any edit) restarts
    /// the count.
    fn press_tab(&mut self, prefix: &str) -> u32 {
        if self.last_prefix == prefix {
            self.tab_count += 1;
        } else {
            self.last_prefix = prefix.to_string();
            self.tab_count = 1;
        }
        self.tab_count
    }

    fn reset(&mut self) {
        self.last_prefix.clear();
        self.tab_count = 0;
    }
}

/// rustyline helper implementing the two-tab completion protocol.
pub struct ShellHelper {
    candidates: Vec<String>,
    state: RefCell<CompletionState>,
}

impl ShellHelper {
    pub fn new(mut candidates: Vec<String>) -> Self {
        candidates.sort();
        candidates.dedup();
        Self {
            candidates,
            state: RefCell::new(CompletionState::default()),
        }
    }

    fn matches_for(&self, word: &str) -> Vec<&str> {
        self.candidates
            .iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(String::as_str)
            .collect()
    }
}

/// The word being completed: everything after the last whitespace before
/// the cursor.
fn current_word(prefix: &str) -> (usize, &str) {
    let start = prefix.rfind(char::is_whitespace).map_or(0, |i| i + 1);
    (start, &prefix[start..])
}

fn bell() {
    let mut out = io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let prefix = &line[..pos];
        let (start, word) = current_word(prefix);
        let matches = self.matches_for(word);
        let mut state = self.state.borrow_mut();
        let presses = state.press_tab(prefix);

        match matches.len() {
            0 => {
                bell();
                Ok((start, Vec::new()))
            }
            1 => {
                state.reset();
                let candidate = matches[0];
                Ok((
                    start,
                    vec![Pair {
                        display: candidate.to_string(),
                        replacement: format!("{} ", candidate),
                    }],
                ))
            }
            _ => {
                if presses == 1 {
                    bell();
                } else {
                    // The listing starts on a fresh line; the prompt and
                    // the current buffer are redrawn underneath it.
                    let mut out = io::stdout();
                    let _ = write!(out, "\n{}\n{}{}", matches.join("  "), PROMPT, line);
                    let _ = out.flush();
                }
                Ok((start, Vec::new()))
            }
        }
    }
}

impl Helper for ShellHelper {}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

/// Build the interactive editor with completion wired in.
pub fn create_editor(candidates: Vec<String>) -> rustyline::Result<Editor<ShellHelper, DefaultHistory>> {
    let config = Config::builder()
        .completion_type(CompletionType::List)
        .bell_style(BellStyle::None)
        .build();
    let mut editor = Editor::with_config(config)?;
    editor.set_helper(Some(ShellHelper::new(candidates)));
    Ok(editor)
}
