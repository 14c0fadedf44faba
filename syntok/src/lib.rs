//! # syntok
//!
//! `syntok` is an incremental syntax-tokenization core: a byte-oriented
//! regex engine compiled down through an NFA and a minimized DFA, driven by
//! longest-match semantics, with a tokenizer that falls back to Unicode
//! grapheme-cluster boundaries when no rule matches, and a position-keyed
//! tree of tokens that can be brought back in sync with a single text edit
//! in time proportional to what actually changed rather than the size of
//! the whole document.
//!
//! ## Usage
//!
//! ```rust
//! use syntok::dfa::ByteReader;
//! use syntok::error::IoError;
//! use syntok::rules::{CompiledRuleSet, CompileOptions, Rule};
//! use syntok::token::RoleTag;
//! use syntok::tokenizer::ReaderAt;
//!
//! struct SliceReaderAt<'a> {
//!     bytes: &'a [u8],
//! }
//!
//! struct SliceReader<'a> {
//!     bytes: &'a [u8],
//!     pos: usize,
//! }
//!
//! impl<'a> ByteReader for SliceReader<'a> {
//!     fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
//!         let remaining = self.bytes.len().saturating_sub(self.pos);
//!         let n = remaining.min(buf.len());
//!         buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
//!         self.pos += n;
//!         Ok(n)
//!     }
//!
//!     fn seek_backward(&mut self, n: u64) -> Result<(), IoError> {
//!         self.pos -= n as usize;
//!         Ok(())
//!     }
//! }
//!
//! impl<'a> ReaderAt for SliceReaderAt<'a> {
//!     fn reader_at(&mut self, pos: u64) -> Box<dyn ByteReader + '_> {
//!         Box::new(SliceReader { bytes: self.bytes, pos: pos as usize })
//!     }
//! }
//!
//! fn main() {
//!     let rules = vec![
//!         Rule::new("[a-zA-Z_][a-zA-Z0-9_]*", RoleTag::Identifier),
//!         Rule::new("[0-9]+", RoleTag::Number),
//!     ];
//!     let compiled = CompiledRuleSet::compile(&rules, CompileOptions::default()).unwrap();
//!
//!     let text = b"x1 42";
//!     let mut reader_at = SliceReaderAt { bytes: text };
//!     let mut tree = syntok::rules::tokenize(&compiled, &mut reader_at, text.len() as u64).unwrap();
//!
//!     let tokens: Vec<_> = tree.iter_from_position(0).collect();
//!     assert_eq!(tokens[0].role, RoleTag::Identifier);
//!     assert_eq!(tokens[2].role, RoleTag::Number);
//! }
//! ```
//!
//! ## Pipeline
//!
//! * [`regex`] parses a pattern into an [`regex::Expr`] tree.
//! * [`nfa`] compiles a set of rule patterns into one Thompson NFA via
//!   [`nfa::Nfa::from_rules`].
//! * [`dfa`] turns that NFA into a dense-table DFA ([`dfa::compile`]) and
//!   reduces it to an equivalent minimal DFA ([`dfa::minimize`]), and
//!   [`dfa::DfaDriver`] drives it over a [`dfa::ByteReader`] to find the
//!   longest match starting at a position.
//! * [`grapheme`] implements UAX #29 grapheme-cluster segmentation, the
//!   unit the tokenizer advances by during error recovery.
//! * [`tokenizer`] combines the DFA driver and grapheme segmentation into a
//!   token stream, plus incremental re-tokenization after a single edit.
//! * [`tree`] stores the resulting tokens in a position-keyed structure
//!   supporting efficient position queries and edit-driven shifts.
//! * [`rules`] is the surface most callers want: compile a rule set once,
//!   then call [`rules::tokenize`] and [`rules::retokenize`].

pub mod dfa;
pub mod error;
pub mod grapheme;
pub mod nfa;
pub mod regex;
pub mod rules;
pub mod token;
pub mod tokenizer;
pub mod tree;
