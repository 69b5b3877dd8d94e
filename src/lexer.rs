//! Lexical analysis (word splitting) for shell input lines.
//!
//! The scanner is a single pass over the characters of one line. Quoting
//! follows the POSIX rules for single quotes, double quotes and
//! backslashes: a backslash outside quotes preserves the next character
//! literally, a backslash inside double quotes is special only before
//! `$`, `` ` ``, `"` and `\`, and inside single quotes nothing is
//! special. Operators are recognized in a post-pass, and only when they
//! form a whole word that no quoting touched.

use std::fmt;

/// Kind of redirection operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `>` or `1>`: replace stdout, truncating the target.
    OutTrunc,
    /// `>>` or `1>>`: replace stdout, appending to the target.
    OutAppend,
    /// `2>`: replace stderr, truncating the target.
    ErrTrunc,
    /// `2>>`: replace stderr, appending to the target.
    ErrAppend,
    /// `<`: replace stdin with an existing file.
    In,
}

impl RedirectKind {
    /// Canonical lexeme for this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            RedirectKind::OutTrunc => ">",
            RedirectKind::OutAppend => ">>",
            RedirectKind::ErrTrunc => "2>",
            RedirectKind::ErrAppend => "2>>",
            RedirectKind::In => "<",
        }
    }

    fn from_lexeme(word: &str) -> Option<Self> {
        match word {
            ">" | "1>" => Some(RedirectKind::OutTrunc),
            ">>" | "1>>" => Some(RedirectKind::OutAppend),
            "2>" => Some(RedirectKind::ErrTrunc),
            "2>>" => Some(RedirectKind::ErrAppend),
            "<" => Some(RedirectKind::In),
            _ => None,
        }
    }
}

/// A token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word with all quoting and escapes already resolved.
    Word(String),
    /// The pipe operator, `|`.
    Pipe,
    /// A redirection operator.
    Redirect(RedirectKind),
}

impl Token {
    /// Textual value of the token: the word itself, or the operator lexeme.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(word) => word,
            Token::Pipe => "|",
            Token::Redirect(kind) => kind.symbol(),
        }
    }
}

/// Errors that can occur during lexical analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    /// A closing quote (single or double) was not found before end of input.
    UnterminatedQuote,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedQuote => write!(f, "unterminated quote"),
        }
    }
}

impl std::error::Error for LexError {}

/// A word accumulated by the scanner. `protected` records whether any of
/// its characters was contributed under quoting or escaping; such words
/// are never reclassified as operators.
struct RawWord {
    text: String,
    protected: bool,
}

struct Lexer {
    buf: String,
    protected: bool,
    in_quotes: bool,
    quote_char: char,
    preserve_next_literal: bool,
    backslash_in_quotes: bool,
    words: Vec<RawWord>,
}

impl Lexer {
    fn new() -> Self {
        Lexer {
            buf: String::new(),
            protected: false,
            in_quotes: false,
            quote_char: '\0',
            preserve_next_literal: false,
            backslash_in_quotes: false,
            words: Vec::new(),
        }
    }

    fn scan(mut self, line: &str) -> Result<Vec<RawWord>, LexError> {
        for ch in line.chars() {
            if self.preserve_next_literal {
                self.buf.push(ch);
                self.preserve_next_literal = false;
                continue;
            }
            if self.backslash_in_quotes {
                if matches!(ch, '$' | '`' | '"' | '\\') {
                    self.buf.push(ch);
                } else {
                    self.buf.push('\\');
                    self.buf.push(ch);
                }
                self.backslash_in_quotes = false;
                continue;
            }
            match ch {
                '\'' | '"' => {
                    self.protected = true;
                    if !self.in_quotes {
                        self.in_quotes = true;
                        self.quote_char = ch;
                    } else if ch == self.quote_char {
                        self.in_quotes = false;
                        self.quote_char = '\0';
                    } else {
                        self.buf.push(ch);
                    }
                }
                '\\' => {
                    self.protected = true;
                    if !self.in_quotes {
                        self.preserve_next_literal = true;
                    } else if self.quote_char == '"' {
                        self.backslash_in_quotes = true;
                    } else {
                        self.buf.push(ch);
                    }
                }
                ' ' | '\t' => {
                    if self.in_quotes {
                        self.buf.push(ch);
                    } else {
                        self.flush_word();
                    }
                }
                other => self.buf.push(other),
            }
        }
        if self.in_quotes {
            return Err(LexError::UnterminatedQuote);
        }
        // A trailing lone backslash escapes nothing and is dropped.
        self.flush_word();
        Ok(self.words)
    }

    fn flush_word(&mut self) {
        if !self.buf.is_empty() {
            self.words.push(RawWord {
                text: std::mem::take(&mut self.buf),
                protected: self.protected,
            });
        }
        self.protected = false;
    }
}

/// Split one input line into tokens.
///
/// The scan accumulates words under the quoting rules above; a post-pass
/// then reclassifies every unprotected word whose text equals an operator
/// lexeme (`|`, `<`, `>`, `>>`, `1>`, `1>>`, `2>`, `2>>`). A quoted or
/// escaped operator stays an ordinary word.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexError> {
    let words = Lexer::new().scan(line)?;
    Ok(words
        .into_iter()
        .map(|word| {
            if word.protected {
                return Token::Word(word.text);
            }
            if word.text == "|" {
                return Token::Pipe;
            }
            match RedirectKind::from_lexeme(&word.text) {
                Some(kind) => Token::Redirect(kind),
                None => Token::Word(word.text),
            }
        })
        .collect())
}
