//! Thompson-style NFA construction from a parsed [`crate::regex::Expr`]
//! tree, and the ε-closure helper the DFA subset construction drives (§4.2).
//!
//! The alphabet is widened from the 256 byte values by two synthetic
//! columns, [`START_ANCHOR`] and [`END_ANCHOR`], fed by the driver at
//! `start_pos == 0` and `pos == text_len` respectively (§4.4). Transition
//! labels are thus `u16` even though ordinary transitions only ever use the
//! low byte.

use std::collections::BTreeSet;

use crate::regex::Expr;

/// Synthetic column carrying the start-of-text anchor transition.
pub const START_ANCHOR: u16 = 256;
/// Synthetic column carrying the end-of-text anchor transition.
pub const END_ANCHOR: u16 = 257;
/// Total transition-table width: 256 literal bytes plus the two anchors.
pub const ALPHABET_LEN: usize = 258;

/// One state of an [`Nfa`]: its outgoing labeled transitions, its
/// ε-transitions, and (if accepting) the rule indices it accepts for (§3).
#[derive(Debug, Clone, Default)]
pub struct NfaState {
    pub transitions: Vec<(u16, usize)>,
    pub epsilons: Vec<usize>,
    pub accept: bool,
    pub accept_actions: Vec<usize>,
}

/// A non-deterministic finite automaton over [`ALPHABET_LEN`] columns.
/// State `0` need not be the start state in general, but every [`Nfa`]
/// produced by [`Nfa::from_rules`] places it at `nfa.start` explicitly (§3).
#[derive(Debug, Clone)]
pub struct Nfa {
    pub states: Vec<NfaState>,
    pub start: usize,
}

impl Nfa {
    /// Builds the union of `exprs`, one rule per entry, tagging each
    /// operand's accept state with its index in `exprs` as its sole accept
    /// action (§4.2 "When unioning rule NFAs"). `exprs` must be non-empty.
    pub fn from_rules(exprs: &[Expr]) -> Nfa {
        assert!(!exprs.is_empty(), "a rule NFA union needs at least one rule");
        let mut builder = Builder::default();
        let mut fragment_starts = Vec::with_capacity(exprs.len());
        for (rule_idx, expr) in exprs.iter().enumerate() {
            let (start, accept) = builder.build(expr);
            builder.states[accept].accept = true;
            builder.states[accept].accept_actions = vec![rule_idx];
            fragment_starts.push(start);
        }
        let new_start = builder.new_state();
        for s in fragment_starts {
            builder.states[new_start].epsilons.push(s);
        }
        Nfa {
            states: builder.states,
            start: new_start,
        }
    }

    /// Builds the NFA for a single expression tree, useful for inspecting
    /// one rule's automaton in isolation (e.g. in tests).
    pub fn from_expr(expr: &Expr) -> Nfa {
        Nfa::from_rules(std::slice::from_ref(expr))
    }

    /// The ε-closure of `states`: every state reachable from `states` using
    /// only ε-transitions, including `states` themselves.
    pub fn epsilon_closure(&self, states: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut closure: BTreeSet<usize> = states.clone();
        let mut stack: Vec<usize> = states.iter().copied().collect();
        while let Some(s) = stack.pop() {
            for &next in &self.states[s].epsilons {
                if closure.insert(next) {
                    stack.push(next);
                }
            }
        }
        closure
    }

    /// The set of states reachable from `states` on transition label `label`
    /// (a byte value `0..=255`, or [`START_ANCHOR`]/[`END_ANCHOR`]).
    ///
    /// The two anchor columns are *assertions*, not consumed input: a state
    /// with no explicit anchor transition passes through unchanged rather
    /// than vanishing, so feeding an anchor column never kills a rule that
    /// doesn't mention `^`/`$` (§4.2, §4.4). Literal byte columns have no
    /// such passthrough — an unmatched byte transition simply drops the
    /// state, as in ordinary subset construction.
    pub fn step(&self, states: &BTreeSet<usize>, label: u16) -> BTreeSet<usize> {
        let is_anchor = label == START_ANCHOR || label == END_ANCHOR;
        let mut out = BTreeSet::new();
        for &s in states {
            let mut matched = false;
            for &(l, target) in &self.states[s].transitions {
                if l == label {
                    out.insert(target);
                    matched = true;
                }
            }
            if is_anchor && !matched {
                out.insert(s);
            }
        }
        out
    }
}

#[derive(Default)]
struct Builder {
    states: Vec<NfaState>,
}

impl Builder {
    fn new_state(&mut self) -> usize {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    /// Builds `expr` into a fresh fragment and returns `(start, accept)`.
    /// The accept state returned here is purely structural: whether it ends
    /// up accepting a rule is decided by the caller (§4.2).
    fn build(&mut self, expr: &Expr) -> (usize, usize) {
        match expr {
            Expr::EmptyLanguage => (self.new_state(), self.new_state()),
            Expr::EmptyString => {
                let start = self.new_state();
                let accept = self.new_state();
                self.states[start].epsilons.push(accept);
                (start, accept)
            }
            Expr::Literal(b) => {
                let start = self.new_state();
                let accept = self.new_state();
                self.states[start].transitions.push((*b as u16, accept));
                (start, accept)
            }
            Expr::Class(class) => {
                let start = self.new_state();
                let accept = self.new_state();
                for b in 0u16..256 {
                    if class.matches(b as u8) {
                        self.states[start].transitions.push((b, accept));
                    }
                }
                (start, accept)
            }
            Expr::Concat(items) => {
                let mut items = items.iter();
                let (start, mut accept) = self
                    .build(items.next().expect("Concat has at least one operand"));
                for item in items {
                    let (s, a) = self.build(item);
                    self.states[accept].epsilons.push(s);
                    accept = a;
                }
                (start, accept)
            }
            Expr::Union(items) => {
                let start = self.new_state();
                let accept = self.new_state();
                for item in items {
                    let (s, a) = self.build(item);
                    self.states[start].epsilons.push(s);
                    self.states[a].epsilons.push(accept);
                }
                (start, accept)
            }
            Expr::Star(inner) => {
                let start = self.new_state();
                let accept = self.new_state();
                let (s, a) = self.build(inner);
                self.states[start].epsilons.push(s);
                self.states[start].epsilons.push(accept);
                self.states[a].epsilons.push(s);
                self.states[a].epsilons.push(accept);
                (start, accept)
            }
            Expr::Group(inner) => self.build(inner),
            Expr::StartAnchor => {
                let start = self.new_state();
                let accept = self.new_state();
                self.states[start].transitions.push((START_ANCHOR, accept));
                (start, accept)
            }
            Expr::EndAnchor => {
                let start = self.new_state();
                let accept = self.new_state();
                self.states[start].transitions.push((END_ANCHOR, accept));
                (start, accept)
            }
        }
    }
}
