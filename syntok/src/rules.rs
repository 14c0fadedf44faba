//! Rule-set compilation and the top-level `tokenize`/`retokenize` entry
//! points (§6, §7): the surface a host actually calls, built on top of the
//! regex/NFA/DFA pipeline and the tokenizer.

use crate::dfa::{compile, minimize, Dfa};
use crate::error::{CompileError, IoError};
use crate::nfa::Nfa;
use crate::regex::Regex;
use crate::token::{Edit, RoleTag};
use crate::tokenizer::{self, ReaderAt, RuleTable};
use crate::tree::TokenTree;

/// One rule as supplied by the host: a pattern plus the role its matches
/// should carry (§6). Rules are tried in declaration order; when several
/// rules match the same longest span, the earliest one wins (§4.4).
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub role: RoleTag,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, role: RoleTag) -> Self {
        Rule {
            pattern: pattern.into(),
            role,
        }
    }
}

/// Compile-time limits a host can tune (§6 `CompileOptions`), guarding
/// against pathological rule sets blowing up subset construction.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub max_dfa_states: usize,
    pub max_pattern_len: usize,
    /// Upper bound on the number of rules (and thus role-table entries) a
    /// rule set may declare (§7 "role-tag table overflow").
    pub max_roles: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            max_dfa_states: 4096,
            max_pattern_len: 4096,
            max_roles: 4096,
        }
    }
}

/// The output of [`CompiledRuleSet::compile`]: a minimized DFA plus its
/// rule-index-to-role mapping, ready to drive [`tokenize`]/[`retokenize`]
/// (§7).
#[derive(Debug)]
pub struct CompiledRuleSet {
    dfa: Dfa,
    roles: Vec<RoleTag>,
}

impl CompiledRuleSet {
    /// Parses every rule's pattern, unions them into one NFA, and compiles
    /// that down to a minimized DFA (§4.1–§4.3).
    pub fn compile(rules: &[Rule], options: CompileOptions) -> Result<Self, CompileError> {
        if rules.is_empty() {
            return Err(CompileError::EmptyRuleSet);
        }
        if rules.len() > options.max_roles {
            return Err(CompileError::TooManyRoles(rules.len(), options.max_roles));
        }
        let mut exprs = Vec::with_capacity(rules.len());
        for (i, rule) in rules.iter().enumerate() {
            if rule.pattern.len() > options.max_pattern_len {
                return Err(CompileError::PatternTooLong(i, options.max_pattern_len));
            }
            let parsed = Regex::parse(&rule.pattern).map_err(|e| CompileError::Pattern(i, e))?;
            exprs.push(parsed.tree);
        }

        let nfa = Nfa::from_rules(&exprs);
        let dfa = minimize(&compile(&nfa));
        if dfa.num_states > options.max_dfa_states {
            return Err(CompileError::TooManyStates(dfa.num_states, options.max_dfa_states));
        }

        let roles = rules.iter().map(|r| r.role).collect();
        Ok(CompiledRuleSet { dfa, roles })
    }

    pub fn num_states(&self) -> usize {
        self.dfa.num_states
    }

    fn rule_table(&self) -> RuleTable<'_> {
        RuleTable {
            dfa: &self.dfa,
            roles: &self.roles,
        }
    }
}

/// Tokenizes the whole of `[0, text_len)` from scratch (§4.6, §6
/// `tokenize`).
pub fn tokenize(rules: &CompiledRuleSet, reader_at_pos: &mut dyn ReaderAt, text_len: u64) -> Result<TokenTree, IoError> {
    tokenizer::tokenize_all(&rules.rule_table(), reader_at_pos, text_len)
}

/// Incrementally brings `tree` back in sync with the text after a single
/// edit, touching only the tokens the edit could have affected (§4.6, §6
/// `retokenize`).
pub fn retokenize(
    tree: &mut TokenTree,
    edit: Edit,
    rules: &CompiledRuleSet,
    reader_at_pos: &mut dyn ReaderAt,
) -> Result<(), IoError> {
    tokenizer::retokenize_after_edit(tree, edit, &rules.rule_table(), reader_at_pos)
}


/// Quantified properties (§8), fuzzed with `proptest` rather than pinned to
/// fixed scenarios (those live in `tests` above as S1-S6 analogues).
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::dfa::{ByteReader, DfaDriver, DEAD_STATE};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// A small recursive pattern grammar over `{a,b,c}` — enough to exercise
    /// concatenation, union and star without drowning proptest in a huge
    /// search space.
    fn arb_pattern() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())];
        leaf.prop_recursive(4, 64, 4, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a}{b}")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}|{b})")),
                inner.prop_map(|a| format!("({a})*")),
            ]
        })
    }

    fn nfa_accepts(nfa: &Nfa, input: &[u8]) -> bool {
        let mut states = nfa.epsilon_closure(&BTreeSet::from([nfa.start]));
        for &b in input {
            states = nfa.epsilon_closure(&nfa.step(&states, b as u16));
            if states.is_empty() {
                return false;
            }
        }
        states.iter().any(|&s| nfa.states[s].accept)
    }

    fn dfa_accepts(dfa: &Dfa, input: &[u8]) -> bool {
        let mut state = dfa.start;
        for &b in input {
            state = dfa.transition(state, b as u16);
            if state == DEAD_STATE {
                return false;
            }
        }
        dfa.is_accepting(state)
    }

    fn longest_accepted_prefix(nfa: &Nfa, input: &[u8]) -> Option<usize> {
        (0..=input.len()).rev().find(|&len| nfa_accepts(nfa, &input[..len]))
    }

    struct ByteSliceReader<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl<'a> ByteReader for ByteSliceReader<'a> {
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

    struct VecReaderAt {
        bytes: Vec<u8>,
    }

    struct VecReader<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl<'a> ByteReader for VecReader<'a> {
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

    impl ReaderAt for VecReaderAt {
        fn reader_at(&mut self, pos: u64) -> Box<dyn ByteReader + '_> {
            Box::new(VecReader {
                bytes: &self.bytes,
                pos: pos as usize,
            })
        }
    }

    fn sample_rule_defs() -> Vec<Rule> {
        vec![
            Rule::new("[a-z]+", RoleTag::Identifier),
            Rule::new("[0-9]+", RoleTag::Number),
            Rule::new("\\+|\\-", RoleTag::Operator),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property 1: `parse` -> NFA -> minimized DFA accepts exactly the
        /// language a direct NFA simulation agrees on.
        #[test]
        fn regex_round_trip_nfa_and_dfa_agree(pattern in arb_pattern(), input in "[abc]{0,8}") {
            let expr = Regex::parse(&pattern).unwrap().tree;
            let nfa = Nfa::from_expr(&expr);
            let dfa = minimize(&compile(&nfa));
            prop_assert_eq!(nfa_accepts(&nfa, input.as_bytes()), dfa_accepts(&dfa, input.as_bytes()));
        }

        /// Property 2: minimization never grows the DFA and never changes
        /// the language it accepts.
        #[test]
        fn minimization_preserves_language_and_never_grows(pattern in arb_pattern(), input in "[abc]{0,8}") {
            let expr = Regex::parse(&pattern).unwrap().tree;
            let dfa = compile(&Nfa::from_expr(&expr));
            let minimized = minimize(&dfa);
            prop_assert!(minimized.num_states <= dfa.num_states);
            prop_assert_eq!(dfa_accepts(&dfa, input.as_bytes()), dfa_accepts(&minimized, input.as_bytes()));
        }

        /// Property 3: `match_longest` finds the same end position a brute
        /// force search over NFA-accepted prefixes would.
        #[test]
        fn match_longest_finds_the_longest_accepted_prefix(pattern in arb_pattern(), input in "[abc]{0,8}") {
            let expr = Regex::parse(&pattern).unwrap().tree;
            let nfa = Nfa::from_expr(&expr);
            let dfa = minimize(&compile(&nfa));
            let mut reader = ByteSliceReader { bytes: input.as_bytes(), pos: 0 };
            let result = DfaDriver::new(&dfa)
                .match_longest(&mut reader, 0, input.len() as u64)
                .unwrap();
            match longest_accepted_prefix(&nfa, input.as_bytes()) {
                None => prop_assert!(!result.accepted),
                Some(len) => {
                    prop_assert!(result.accepted);
                    prop_assert_eq!(result.end_pos, len as u64);
                }
            }
        }

        /// Properties 4 and 5: tokens tile `[0, text_len)` exactly, in
        /// order, and every lookahead lies in `[end, text_len]`.
        #[test]
        fn tokenization_covers_text_with_monotone_lookahead(text in "[a-z0-9 +-]{0,24}") {
            let rules = CompiledRuleSet::compile(&sample_rule_defs(), CompileOptions::default()).unwrap();
            let mut reader_at = VecReaderAt { bytes: text.clone().into_bytes() };
            let mut tree = tokenize(&rules, &mut reader_at, text.len() as u64).unwrap();
            let tokens: Vec<_> = tree.iter_from_position(0).collect();

            let mut cursor = 0u64;
            for t in &tokens {
                prop_assert_eq!(t.start, cursor);
                prop_assert!(t.lookahead >= t.end);
                prop_assert!(t.lookahead <= text.len() as u64);
                cursor = t.end;
            }
            prop_assert_eq!(cursor, text.len() as u64);
        }

        /// Property 6: retokenizing after one random edit matches
        /// tokenizing the edited text from scratch.
        #[test]
        fn retokenize_after_random_edit_matches_from_scratch_tokenize(
            text in "[a-z0-9 +-]{0,24}",
            edit_pos_frac in 0.0f64..1.0,
            delete_len_frac in 0.0f64..1.0,
            insert in "[a-z0-9]{0,6}",
        ) {
            let rules = CompiledRuleSet::compile(&sample_rule_defs(), CompileOptions::default()).unwrap();
            let mut reader_at = VecReaderAt { bytes: text.clone().into_bytes() };
            let mut tree = tokenize(&rules, &mut reader_at, text.len() as u64).unwrap();

            let text_len = text.len() as u64;
            let pos = ((text_len as f64) * edit_pos_frac) as u64;
            let pos = pos.min(text_len);
            let max_delete = text_len - pos;
            let num_deleted = ((max_delete as f64) * delete_len_frac) as u64;

            let mut edited_bytes = text.clone().into_bytes();
            edited_bytes.splice(pos as usize..(pos + num_deleted) as usize, insert.bytes());
            let edit = Edit {
                pos,
                num_inserted: insert.len() as u64,
                num_deleted,
            };

            let mut edited_reader_at = VecReaderAt { bytes: edited_bytes.clone() };
            retokenize(&mut tree, edit, &rules, &mut edited_reader_at).unwrap();

            let mut from_scratch_reader_at = VecReaderAt { bytes: edited_bytes.clone() };
            let mut from_scratch = tokenize(&rules, &mut from_scratch_reader_at, edited_bytes.len() as u64).unwrap();

            let incremental: Vec<_> = tree.iter_from_position(0).collect();
            let full: Vec<_> = from_scratch.iter_from_position(0).collect();
            prop_assert_eq!(incremental, full);
        }
    }
}
