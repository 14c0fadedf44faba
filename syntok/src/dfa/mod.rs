//! Subset construction and minimization (§4.3): turns a unioned rule [`Nfa`]
//! into a dense-table [`Dfa`], then reduces it to an equivalent DFA with no
//! redundant states.

mod driver;

pub use driver::{ByteReader, DfaDriver, MatchResult};

use std::collections::HashMap;

use crate::nfa::{Nfa, ALPHABET_LEN};

/// Reserved id of the dead state: every DFA has one, even if minimization
/// leaves it unreachable (§3 "state 0 reserved as the dead state").
pub const DEAD_STATE: usize = 0;

/// A deterministic finite automaton stored as a dense `num_states ×
/// [`ALPHABET_LEN`]` transition table (§9 "Generated jump tables").
#[derive(Debug, Clone)]
pub struct Dfa {
    pub num_states: usize,
    table: Vec<usize>,
    /// Sorted, deduplicated accept-action list per state; empty for
    /// non-accepting states.
    pub accept_actions: Vec<Vec<usize>>,
    pub start: usize,
}

impl Dfa {
    pub fn transition(&self, state: usize, column: u16) -> usize {
        self.table[state * ALPHABET_LEN + column as usize]
    }

    fn set_transition(&mut self, state: usize, column: u16, target: usize) {
        self.table[state * ALPHABET_LEN + column as usize] = target;
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        !self.accept_actions[state].is_empty()
    }

    fn new(num_states: usize, start: usize) -> Dfa {
        Dfa {
            num_states,
            table: vec![DEAD_STATE; num_states * ALPHABET_LEN],
            accept_actions: vec![Vec::new(); num_states],
            start,
        }
    }
}

/// Subset-constructs a DFA from `nfa` (§4.3). The dead state (the empty NFA
/// subset) is always allocated at [`DEAD_STATE`], whether or not it ends up
/// reachable.
pub fn compile(nfa: &Nfa) -> Dfa {
    use std::collections::{BTreeSet, HashSet, VecDeque};

    let mut ids: HashMap<BTreeSet<usize>, usize> = HashMap::new();
    let mut sets: Vec<BTreeSet<usize>> = Vec::new();

    let dead_set: BTreeSet<usize> = BTreeSet::new();
    ids.insert(dead_set.clone(), DEAD_STATE);
    sets.push(dead_set);

    let start_set = nfa.epsilon_closure(&BTreeSet::from([nfa.start]));
    let start_id = sets.len();
    sets.push(start_set.clone());
    ids.insert(start_set, start_id);

    let mut queue: VecDeque<usize> = VecDeque::from([start_id]);
    let mut queued: HashSet<usize> = HashSet::from([start_id]);
    let mut transitions: HashMap<usize, [usize; ALPHABET_LEN]> = HashMap::new();

    while let Some(id) = queue.pop_front() {
        let set = sets[id].clone();
        let mut row = [DEAD_STATE; ALPHABET_LEN];
        for column in 0u16..ALPHABET_LEN as u16 {
            let stepped = nfa.step(&set, column);
            if stepped.is_empty() {
                continue;
            }
            let closure = nfa.epsilon_closure(&stepped);
            let target_id = match ids.get(&closure) {
                Some(&existing) => existing,
                None => {
                    let new_id = sets.len();
                    sets.push(closure.clone());
                    ids.insert(closure, new_id);
                    new_id
                }
            };
            row[column as usize] = target_id;
            if queued.insert(target_id) {
                queue.push_back(target_id);
            }
        }
        transitions.insert(id, row);
    }

    let num_states = sets.len();
    let mut dfa = Dfa::new(num_states, start_id);
    for (id, set) in sets.iter().enumerate() {
        let mut actions: Vec<usize> = set
            .iter()
            .flat_map(|&s| nfa.states[s].accept_actions.iter().copied())
            .collect();
        actions.sort_unstable();
        actions.dedup();
        dfa.accept_actions[id] = actions;

        if let Some(row) = transitions.get(&id) {
            for (column, &target) in row.iter().enumerate() {
                dfa.set_transition(id, column as u16, target);
            }
        }
    }
    dfa
}

/// Hopcroft-style partition refinement (§4.3), implemented as Moore's
/// iterative whole-partition refinement to a fixed point rather than a
/// worklist of candidate splitters: with a bounded, dense alphabet the two
/// give the same result and the simpler version is easier to get right by
/// hand.
pub fn minimize(dfa: &Dfa) -> Dfa {
    let n = dfa.num_states;

    let mut block_of = vec![0usize; n];
    {
        let mut seen: HashMap<(bool, Vec<usize>), usize> = HashMap::new();
        for state in 0..n {
            let key = (state == DEAD_STATE, dfa.accept_actions[state].clone());
            let next_id = seen.len();
            let id = *seen.entry(key).or_insert(next_id);
            block_of[state] = id;
        }
    }

    loop {
        let mut seen: HashMap<(usize, Vec<usize>), usize> = HashMap::new();
        let mut new_block_of = vec![0usize; n];
        for state in 0..n {
            let signature: Vec<usize> = (0..ALPHABET_LEN as u16)
                .map(|c| block_of[dfa.transition(state, c)])
                .collect();
            let key = (block_of[state], signature);
            let next_id = seen.len();
            let id = *seen.entry(key).or_insert(next_id);
            new_block_of[state] = id;
        }
        if new_block_of == block_of {
            break;
        }
        block_of = new_block_of;
    }

    let num_blocks = block_of.iter().max().map(|&m| m + 1).unwrap_or(0);
    // Renumber so the dead state's block keeps index 0 (§3 invariant).
    let dead_block = block_of[DEAD_STATE];
    let mut remap = vec![usize::MAX; num_blocks];
    remap[dead_block] = 0;
    let mut next = 1;
    for b in 0..num_blocks {
        if remap[b] == usize::MAX {
            remap[b] = next;
            next += 1;
        }
    }

    let new_start = remap[block_of[dfa.start]];
    let mut minimized = Dfa::new(num_blocks, new_start);
    let mut filled = vec![false; num_blocks];
    for state in 0..n {
        let new_id = remap[block_of[state]];
        if filled[new_id] {
            continue;
        }
        filled[new_id] = true;
        minimized.accept_actions[new_id] = dfa.accept_actions[state].clone();
        for c in 0..ALPHABET_LEN as u16 {
            let target_block = remap[block_of[dfa.transition(state, c)]];
            minimized.set_transition(new_id, c, target_block);
        }
    }
    minimized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfa::Nfa;
    use crate::regex::Regex;

    fn compile_pattern(pattern: &str) -> Dfa {
        let expr = Regex::parse(pattern).unwrap().tree;
        let nfa = Nfa::from_expr(&expr);
        compile(&nfa)
    }

    fn run(dfa: &Dfa, input: &[u8]) -> bool {
        let mut state = dfa.start;
        for &b in input {
            state = dfa.transition(state, b as u16);
            if state == DEAD_STATE {
                return false;
            }
        }
        dfa.is_accepting(state)
    }

    #[test]
    fn literal_concat_matches_exactly() {
        let dfa = compile_pattern("ab");
        assert!(run(&dfa, b"ab"));
        assert!(!run(&dfa, b"a"));
        assert!(!run(&dfa, b"abc"));
    }

    #[test]
    fn star_matches_any_repetition() {
        let dfa = compile_pattern("a*");
        assert!(run(&dfa, b""));
        assert!(run(&dfa, b"aaaa"));
        assert!(!run(&dfa, b"aaab"));
    }

    #[test]
    fn minimize_preserves_language() {
        let dfa = compile_pattern("(a|b)*abb");
        let minimized = minimize(&dfa);
        for input in [&b"abb"[..], b"aabb", b"bababb", b"ab", b"a", b""] {
            assert_eq!(run(&dfa, input), run(&minimized, input), "input={input:?}");
        }
        assert!(minimized.num_states <= dfa.num_states);
    }

    #[test]
    fn dead_state_has_no_outgoing_non_self_transition() {
        let dfa = compile_pattern("a");
        for c in 0..ALPHABET_LEN as u16 {
            assert_eq!(dfa.transition(DEAD_STATE, c), DEAD_STATE);
        }
    }
}
