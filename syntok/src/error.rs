//! Error types for rule compilation, tokenization and reader I/O.
//!
//! Mirrors the split used by the automata/parsing layers this crate is
//! adapted from: a `*ParseError` for syntax problems in user-supplied input,
//! a `*CompileError` for problems only visible once the whole rule set is
//! assembled, and a boxed, caller-supplied I/O error for reader failures.

use std::fmt;
use thiserror::Error;

/// A failure parsing a single regex pattern (§4.1).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("unexpected end of pattern at byte {0}")]
    UnexpectedEnd(usize),
    #[error("unbalanced parentheses at byte {0}")]
    UnbalancedParens(usize),
    #[error("postfix operator '{op}' at byte {pos} has no preceding atom")]
    DanglingPostfix { pos: usize, op: char },
    #[error("character class starting at byte {0} was never closed")]
    UnterminatedClass(usize),
    #[error("truncated escape sequence at byte {0}")]
    TruncatedEscape(usize),
    #[error("alternation at byte {0} has an empty left-hand side")]
    EmptyAlternationSide(usize),
    #[error("trailing unparsed input starting at byte {0}")]
    TrailingInput(usize),
}

/// A failure compiling a rule set into a [`crate::rules::CompiledRuleSet`] (§7).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CompileError {
    #[error("a rule set must have at least one rule")]
    EmptyRuleSet,
    #[error("rule {0}'s pattern failed to parse: {1}")]
    Pattern(usize, ParseError),
    #[error("rule set would compile to {0} DFA states, exceeding the configured limit of {1}")]
    TooManyStates(usize, usize),
    #[error("pattern {0} exceeds the configured maximum length of {1} bytes")]
    PatternTooLong(usize, usize),
    #[error("rule set has {0} roles, exceeding the configured limit of {1}")]
    TooManyRoles(usize, usize),
}

/// A failure reading from (or rewinding) the caller-supplied byte reader (§4.4, §6).
#[derive(Debug, Error)]
pub enum IoError {
    #[error("reader failed: {0}")]
    Reader(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("cannot rewind {requested} bytes, only {available} are buffered")]
    Rewind { requested: u64, available: u64 },
}

impl IoError {
    pub fn reader(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        IoError::Reader(Box::new(err))
    }
}

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                IoError::Rewind {
                    requested: r1,
                    available: a1,
                },
                IoError::Rewind {
                    requested: r2,
                    available: a2,
                },
            ) => r1 == r2 && a1 == a2,
            (IoError::Reader(a), IoError::Reader(b)) => fmt::format(format_args!("{a}")) == fmt::format(format_args!("{b}")),
            _ => false,
        }
    }
}
