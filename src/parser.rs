//! Folding token sequences into pipeline stages.
//!
//! The grammar after lexing is flat: pipe operators separate stages, and
//! within a stage every redirection operator binds the word that follows
//! it. Everything else is argv material, in order.

use crate::command::{Command, Redirection};
use crate::lexer::Token;
use std::fmt;

/// Errors that can occur while folding tokens into commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A redirection operator was the last token of its stage.
    MissingRedirectTarget,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingRedirectTarget => write!(f, "missing redirect target"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Split a token sequence on pipe operators into per-stage groups.
///
/// Empty groups are kept (for example the trailing group of `echo x |`);
/// the pipeline executor skips them at dispatch time.
pub fn split_stages(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut stages = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        if matches!(token, Token::Pipe) {
            stages.push(std::mem::take(&mut current));
        } else {
            current.push(token);
        }
    }
    stages.push(current);
    stages
}

/// Fold the tokens of a single stage into a [`Command`].
///
/// A redirection operator consumes the next token as its target filename,
/// whatever that token is. A stage with no tokens builds a command with an
/// empty argv, which the executor treats as a skipped stage.
pub fn build_command(tokens: Vec<Token>) -> Result<Command, ParseError> {
    let mut argv = Vec::new();
    let mut redirections = Vec::new();
    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Redirect(kind) => match tokens.next() {
                Some(target) => redirections.push(Redirection {
                    kind,
                    filename: target.text().to_string(),
                }),
                None => return Err(ParseError::MissingRedirectTarget),
            },
            other => argv.push(other.text().to_string()),
        }
    }
    Ok(Command { argv, redirections })
}

/// Build the full pipeline for one input line's tokens.
pub fn parse_pipeline(tokens: Vec<Token>) -> Result<Vec<Command>, ParseError> {
    split_stages(tokens).into_iter().map(build_command).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{split_into_tokens, RedirectKind};

    fn pipeline(line: &str) -> Result<Vec<Command>, ParseError> {
        parse_pipeline(split_into_tokens(line).unwrap())
    }

    #[test]
    fn single_stage_without_redirections() {
        let stages = pipeline("echo hello world").unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].argv, vec!["echo", "hello", "world"]);
        assert!(stages[0].redirections.is_empty());
    }

    #[test]
    fn redirections_are_collected_in_order() {
        let stages = pipeline("sort < in > out 2>> err").unwrap();
        assert_eq!(stages[0].argv, vec!["sort"]);
        let redirections = &stages[0].redirections;
        assert_eq!(redirections.len(), 3);
        assert_eq!(redirections[0].kind, RedirectKind::In);
        assert_eq!(redirections[0].filename, "in");
        assert_eq!(redirections[1].kind, RedirectKind::OutTrunc);
        assert_eq!(redirections[1].filename, "out");
        assert_eq!(redirections[2].kind, RedirectKind::ErrAppend);
        assert_eq!(redirections[2].filename, "err");
    }

    #[test]
    fn redirection_may_precede_arguments() {
        let stages = pipeline("> out echo hi").unwrap();
        assert_eq!(stages[0].argv, vec!["echo", "hi"]);
        assert_eq!(stages[0].redirections.len(), 1);
        assert_eq!(stages[0].redirections[0].filename, "out");
    }

    #[test]
    fn pipes_split_stages() {
        let stages = pipeline("cat f | grep x | wc -l").unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].argv, vec!["cat", "f"]);
        assert_eq!(stages[1].argv, vec!["grep", "x"]);
        assert_eq!(stages[2].argv, vec!["wc", "-l"]);
    }

    #[test]
    fn trailing_pipe_yields_empty_stage() {
        let stages = pipeline("echo x |").unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].argv, vec!["echo", "x"]);
        assert!(stages[1].argv.is_empty());
    }

    #[test]
    fn trailing_redirection_fails() {
        assert_eq!(pipeline("echo hi >"), Err(ParseError::MissingRedirectTarget));
        assert_eq!(
            pipeline("cat f | sort 2>>"),
            Err(ParseError::MissingRedirectTarget)
        );
    }

    #[test]
    fn no_tokens_build_an_empty_command() {
        let command = build_command(Vec::new()).unwrap();
        assert!(command.argv.is_empty());
        assert!(command.redirections.is_empty());
    }
}
