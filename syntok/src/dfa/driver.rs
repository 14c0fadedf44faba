//! `match_longest`: runs a compiled [`super::Dfa`] over a caller-supplied
//! reader to find the longest accepted prefix (§4.4).

use crate::error::IoError;

use super::{Dfa, DEAD_STATE};
use crate::nfa::{END_ANCHOR, START_ANCHOR};

/// The reader protocol the driver consumes (§6 "Reader protocol", §9
/// "Reader rewind"). `read` returns `0` at EOF; `seek_backward` rewinds the
/// logical read position by `n` bytes so the caller can resume just past the
/// accepted prefix.
pub trait ByteReader {
    /// Reads up to `buf.len()` bytes, returning the number read (`0` at EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;
    /// Rewinds the logical read position by `n` bytes.
    fn seek_backward(&mut self, n: u64) -> Result<(), IoError>;
}

/// Outcome of [`DfaDriver::match_longest`] (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub accepted: bool,
    pub end_pos: u64,
    pub lookahead_pos: u64,
    pub actions: Vec<usize>,
    pub bytes_read_since_last_accept: usize,
    /// Total units read from `reader` during this call, counted once per
    /// `read` that actually advanced `pos` (§4.4 "per-codepoint position
    /// increment"). Diagnostic only — driving logic never branches on it.
    pub codepoints_read: u64,
}

/// A read-only handle on a compiled [`Dfa`], driving it byte-by-byte over a
/// [`ByteReader`] (§4.4).
pub struct DfaDriver<'a> {
    dfa: &'a Dfa,
}

impl<'a> DfaDriver<'a> {
    pub fn new(dfa: &'a Dfa) -> Self {
        DfaDriver { dfa }
    }

    /// Finds the longest accepted prefix starting at `start_pos` (§4.4).
    ///
    /// `start_pos` and `text_len` are in whatever unit the caller's reader
    /// uses consistently (bytes or codepoints; see §4.4 "Per-codepoint
    /// position increment") — the driver only ever adds `1` per unit read,
    /// it never interprets the unit itself.
    pub fn match_longest(
        &self,
        reader: &mut dyn ByteReader,
        start_pos: u64,
        text_len: u64,
    ) -> Result<MatchResult, IoError> {
        let mut state = self.dfa.start;
        if start_pos == 0 {
            state = self.dfa.transition(state, START_ANCHOR);
        }

        let mut pos = start_pos;
        let mut best_end: Option<u64> = None;
        let mut best_actions: Vec<usize> = Vec::new();
        let mut bytes_since_accept: usize = 0;
        let mut codepoints_read: u64 = 0;

        if state != DEAD_STATE && pos == text_len {
            let end_state = self.dfa.transition(state, END_ANCHOR);
            if self.dfa.is_accepting(end_state) {
                best_end = Some(pos);
                best_actions = self.dfa.accept_actions[end_state].clone();
            }
        }

        let mut buf = [0u8; 1];
        while state != DEAD_STATE && pos < text_len {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            state = self.dfa.transition(state, buf[0] as u16);
            pos += 1;
            bytes_since_accept += 1;
            codepoints_read += 1;

            if state == DEAD_STATE {
                break;
            }

            let mut effective_state = state;
            if pos == text_len {
                effective_state = self.dfa.transition(state, END_ANCHOR);
            }
            if self.dfa.is_accepting(effective_state) {
                best_end = Some(pos);
                best_actions = self.dfa.accept_actions[effective_state].clone();
                bytes_since_accept = 0;
            }
        }

        match best_end {
            Some(end_pos) => Ok(MatchResult {
                accepted: true,
                end_pos,
                lookahead_pos: pos,
                actions: best_actions,
                bytes_read_since_last_accept: bytes_since_accept,
                codepoints_read,
            }),
            None => Ok(MatchResult {
                accepted: false,
                end_pos: start_pos,
                lookahead_pos: pos,
                actions: Vec::new(),
                bytes_read_since_last_accept: bytes_since_accept,
                codepoints_read,
            }),
        }
    }
}
