//! The tokenizer (§4.6): composes [`crate::dfa::DfaDriver`] and
//! [`crate::grapheme::GraphemeClusterIter`] over a rule table to segment
//! input into a [`crate::tree::TokenTree`].
//!
//! Conceptually a three-state machine — `MATCHING`, `RECOVERING`, `DONE` —
//! though the implementation below folds that into [`Tokenizer::advance`]'s
//! control flow rather than an explicit enum, since every transition is
//! local to one call.

mod incremental;

pub use incremental::retokenize_after_edit;

use crate::dfa::{ByteReader, Dfa, DfaDriver};
use crate::error::IoError;
use crate::grapheme::tables::{classify, is_extended_pictographic};
use crate::token::{RoleTag, Token};
use crate::tree::TokenTree;

/// The DFA plus its rule-index-to-role mapping (§6 `RoleTag`), the minimum
/// a tokenizer needs — kept separate from [`crate::rules::CompiledRuleSet`]
/// so this module doesn't depend upward on rule compilation.
pub struct RuleTable<'a> {
    pub dfa: &'a Dfa,
    pub roles: &'a [RoleTag],
}

/// A factory for positioned readers (§6 `reader_at_pos`). Each call may
/// hand back an independent reader seeked to `pos`; the tokenizer never
/// assumes continuity between readers it requests.
pub trait ReaderAt {
    fn reader_at(&mut self, pos: u64) -> Box<dyn ByteReader + '_>;
}

/// Drives one pass of tokenization from a starting position, holding the
/// in-progress error-recovery span (if any) and a matched token deferred
/// behind it (§4.6 "emit that first and defer the matched token").
pub struct Tokenizer {
    pos: u64,
    pending_recovery: Option<Token>,
    deferred_match: Option<Token>,
    done: bool,
}

impl Tokenizer {
    pub fn new(start_pos: u64) -> Self {
        Tokenizer {
            pos: start_pos,
            pending_recovery: None,
            deferred_match: None,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Produces the next token, or `None` once the tokenizer has reached
    /// `text_len` and flushed any pending recovery span (§4.6 `DONE`).
    pub fn advance(
        &mut self,
        rules: &RuleTable,
        reader_at_pos: &mut dyn ReaderAt,
        text_len: u64,
    ) -> Result<Option<Token>, IoError> {
        if let Some(t) = self.deferred_match.take() {
            return Ok(Some(t));
        }
        loop {
            if self.pos >= text_len {
                self.done = true;
                return Ok(self.pending_recovery.take());
            }

            let mut reader = reader_at_pos.reader_at(self.pos);
            let result = DfaDriver::new(rules.dfa).match_longest(&mut *reader, self.pos, text_len)?;
            drop(reader);

            if result.accepted && result.end_pos > self.pos {
                let rule_idx = *result.actions.iter().min().expect("accepted match has an action");
                let matched = Token::new(self.pos, result.end_pos, result.lookahead_pos, rules.roles[rule_idx]);
                self.pos = result.end_pos;
                return Ok(Some(match self.pending_recovery.take() {
                    Some(rec) => {
                        self.deferred_match = Some(matched);
                        rec
                    }
                    None => matched,
                }));
            }

            let mut reader = reader_at_pos.reader_at(self.pos);
            let (cluster_end, lookahead) = advance_one_grapheme_cluster(&mut *reader, self.pos, text_len)?;
            let lookahead = lookahead.max(result.lookahead_pos);
            log::debug!("no rule matched at {}, entering RECOVERING up to {}", self.pos, cluster_end);
            match &mut self.pending_recovery {
                Some(rec) => {
                    rec.end = cluster_end;
                    rec.lookahead = rec.lookahead.max(lookahead);
                }
                None => {
                    self.pending_recovery = Some(Token::new(self.pos, cluster_end, lookahead, RoleTag::None));
                }
            }
            self.pos = cluster_end;
        }
    }
}

/// Tokenizes the whole of `[0, text_len)` from scratch (§4.6
/// `tokenize_all`).
pub fn tokenize_all(rules: &RuleTable, reader_at_pos: &mut dyn ReaderAt, text_len: u64) -> Result<TokenTree, IoError> {
    log::debug!("tokenize_all: text_len={text_len}");
    let mut tree = TokenTree::new(text_len);
    let mut tokenizer = Tokenizer::new(0);
    let mut count = 0usize;
    while let Some(token) = tokenizer.advance(rules, reader_at_pos, text_len)? {
        tree.insert_token(token);
        count += 1;
    }
    log::debug!("tokenize_all: produced {count} tokens");
    Ok(tree)
}

/// How many bytes of lookahead the bounded grapheme-cluster decode below is
/// willing to buffer before giving up and breaking conservatively. Real
/// grapheme clusters (even long ZWJ emoji sequences) are vastly shorter
/// than this in practice.
const GRAPHEME_LOOKAHEAD_BUDGET: usize = 64;

/// Decodes UTF-8 codepoints starting at `start_pos` up to a bounded budget
/// and returns the end of the first grapheme cluster plus how far the scan
/// had to read to decide it (§4.5, §4.6 "extend... by one grapheme
/// cluster"). Malformed lead bytes are treated as a one-byte codepoint of
/// their raw value, since recovery must make progress over any input.
fn advance_one_grapheme_cluster(
    reader: &mut dyn ByteReader,
    start_pos: u64,
    text_len: u64,
) -> Result<(u64, u64), IoError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; GRAPHEME_LOOKAHEAD_BUDGET];
    let remaining = text_len.saturating_sub(start_pos).min(GRAPHEME_LOOKAHEAD_BUDGET as u64) as usize;
    let mut filled = 0;
    while filled < remaining {
        let n = reader.read(&mut chunk[filled..remaining])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.extend_from_slice(&chunk[..filled]);

    let codepoints = decode_lossy_utf8(&buf, start_pos);
    if codepoints.is_empty() {
        return Ok((start_pos, start_pos));
    }

    let mut iter = codepoints.iter();
    let first = *iter.next().unwrap();
    let mut prev_prop = classify(first.value);
    let mut in_extended_pictographic = is_extended_pictographic(first.value);
    let mut ri_run_is_odd = prev_prop == crate::grapheme::tables::GraphemeClusterBreak::RegionalIndicator;
    let mut end_pos = first.byte_pos + codepoint_width(first.value);

    for cp in iter {
        let prop = classify(cp.value);
        let joined = crate::grapheme::keeps_joined(prev_prop, prop, in_extended_pictographic, ri_run_is_odd);
        if !joined {
            break;
        }
        in_extended_pictographic = if prop == crate::grapheme::tables::GraphemeClusterBreak::ExtendedPictographic {
            true
        } else if prop == crate::grapheme::tables::GraphemeClusterBreak::Extend
            || prop == crate::grapheme::tables::GraphemeClusterBreak::ZWJ
        {
            in_extended_pictographic
        } else {
            false
        };
        ri_run_is_odd = if prop == crate::grapheme::tables::GraphemeClusterBreak::RegionalIndicator {
            !ri_run_is_odd || prev_prop != crate::grapheme::tables::GraphemeClusterBreak::RegionalIndicator
        } else {
            false
        };
        prev_prop = prop;
        end_pos = cp.byte_pos + codepoint_width(cp.value);
    }

    Ok((end_pos, end_pos))
}

fn codepoint_width(value: u32) -> u64 {
    match value {
        0..=0x7f => 1,
        0x80..=0x7ff => 2,
        0x800..=0xffff => 3,
        _ => 4,
    }
}

fn decode_lossy_utf8(bytes: &[u8], base_pos: u64) -> Vec<crate::grapheme::Codepoint> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let b0 = bytes[i];
        let (value, len) = if b0 < 0x80 {
            (b0 as u32, 1)
        } else if b0 & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            (((b0 as u32 & 0x1F) << 6) | (bytes[i + 1] as u32 & 0x3F), 2)
        } else if b0 & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            (
                ((b0 as u32 & 0x0F) << 12) | ((bytes[i + 1] as u32 & 0x3F) << 6) | (bytes[i + 2] as u32 & 0x3F),
                3,
            )
        } else if b0 & 0xF8 == 0xF0 && i + 3 < bytes.len() {
            (
                ((b0 as u32 & 0x07) << 18)
                    | ((bytes[i + 1] as u32 & 0x3F) << 12)
                    | ((bytes[i + 2] as u32 & 0x3F) << 6)
                    | (bytes[i + 3] as u32 & 0x3F),
                4,
            )
        } else {
            (b0 as u32, 1)
        };
        out.push(crate::grapheme::Codepoint {
            byte_pos: base_pos + i as u64,
            value,
        });
        i += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfa::compile;
    use crate::dfa::minimize;
    use crate::nfa::Nfa;
    use crate::regex::Regex;

    struct SliceReaderAt<'a> {
        bytes: &'a [u8],
    }

    struct SliceReader<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl<'a> ByteReader for SliceReader<'a> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
            let remaining = self.bytes.len().saturating_sub(self.pos);
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn seek_backward(&mut self, n: u64) -> Result<(), IoError> {
            self.pos -= n as usize;
            Ok(())
        }
    }

    impl<'a> ReaderAt for SliceReaderAt<'a> {
        fn reader_at(&mut self, pos: u64) -> Box<dyn ByteReader + '_> {
            Box::new(SliceReader {
                bytes: self.bytes,
                pos: pos as usize,
            })
        }
    }

    fn compiled_rules(patterns: &[&str]) -> (Dfa, Vec<RoleTag>) {
        let exprs: Vec<_> = patterns.iter().map(|p| Regex::parse(p).unwrap().tree).collect();
        let nfa = Nfa::from_rules(&exprs);
        let dfa = minimize(&compile(&nfa));
        let roles = vec![RoleTag::Identifier; patterns.len()];
        (dfa, roles)
    }

    #[test]
    fn tokenizes_simple_identifiers_and_recovers_gaps() {
        let (dfa, roles) = compiled_rules(&["[a-z]+"]);
        let rules = RuleTable { dfa: &dfa, roles: &roles };
        let text = b"ab  cd";
        let mut reader_at = SliceReaderAt { bytes: text };
        let mut tree = tokenize_all(&rules, &mut reader_at, text.len() as u64).unwrap();
        let tokens: Vec<Token> = tree.iter_from_position(0).collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!((tokens[0].start, tokens[0].end, tokens[0].role), (0, 2, RoleTag::Identifier));
        assert_eq!((tokens[1].start, tokens[1].end, tokens[1].role), (2, 4, RoleTag::None));
        assert_eq!((tokens[2].start, tokens[2].end, tokens[2].role), (4, 6, RoleTag::Identifier));
    }

    #[test]
    fn coverage_is_total_and_non_overlapping() {
        let (dfa, roles) = compiled_rules(&["[a-z]+"]);
        let rules = RuleTable { dfa: &dfa, roles: &roles };
        let text = b"!!ab!!";
        let mut reader_at = SliceReaderAt { bytes: text };
        let mut tree = tokenize_all(&rules, &mut reader_at, text.len() as u64).unwrap();
        let tokens: Vec<Token> = tree.iter_from_position(0).collect();
        let mut cursor = 0u64;
        for t in &tokens {
            assert_eq!(t.start, cursor);
            cursor = t.end;
        }
        assert_eq!(cursor, text.len() as u64);
    }
}
