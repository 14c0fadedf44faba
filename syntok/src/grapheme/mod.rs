//! Unicode UAX #29 grapheme-cluster segmentation (rules GB1–GB13, GB999),
//! used as the tokenizer's error-recovery step (§4.5): when no rule matches,
//! the tokenizer must still advance by *something*, and a user-perceived
//! character is the natural unit.
//!
//! Property lookups are a compact, hand-maintained table (§9 "Unicode
//! property tables") rather than a generated two-level trie over the full
//! Unicode data files — build-tooling to regenerate it from
//! `GraphemeBreakProperty.txt` is out of scope here, so the table below
//! covers the ranges that matter for the rules this module implements and
//! falls back to `Other` elsewhere.

pub(crate) mod tables;

use tables::{classify, is_extended_pictographic, GraphemeClusterBreak as Gcb};

/// One decoded codepoint plus its byte offset in the source, the unit this
/// module's iterators consume and report breaks in terms of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codepoint {
    pub byte_pos: u64,
    pub value: u32,
}

/// Forward grapheme-cluster break iterator (§4.5). Consumes codepoints one
/// at a time from `source` and yields the byte offset of each valid break,
/// including one at the very start (GB1) and one at the very end (GB2).
pub struct GraphemeClusterIter<I: Iterator<Item = Codepoint>> {
    source: std::iter::Peekable<I>,
    prev_prop: Option<Gcb>,
    in_extended_pictographic: bool,
    ri_run_is_odd: bool,
    emitted_start: bool,
    done: bool,
    end_pos: Option<u64>,
}

impl<I: Iterator<Item = Codepoint>> GraphemeClusterIter<I> {
    pub fn new(source: I) -> Self {
        GraphemeClusterIter {
            source: source.peekable(),
            prev_prop: None,
            in_extended_pictographic: false,
            ri_run_is_odd: false,
            emitted_start: false,
            done: false,
            end_pos: None,
        }
    }
}

impl<I: Iterator<Item = Codepoint>> Iterator for GraphemeClusterIter<I> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if !self.emitted_start {
            self.emitted_start = true;
            let first_pos = self.source.peek().map(|c| c.byte_pos).unwrap_or(0);
            return Some(first_pos); // GB1
        }
        if self.done {
            return None;
        }

        loop {
            let cp = match self.source.next() {
                Some(cp) => cp,
                None => {
                    self.done = true;
                    return self.end_pos; // GB2
                }
            };
            let prop = classify(cp.value);
            let is_pict = is_extended_pictographic(cp.value);
            let next_pos = self
                .source
                .peek()
                .map(|c| c.byte_pos)
                .unwrap_or(cp.byte_pos + codepoint_width(cp.value));
            self.end_pos = Some(next_pos);

            let prev = match self.prev_prop {
                None => {
                    self.prev_prop = Some(prop);
                    self.in_extended_pictographic = is_pict;
                    self.ri_run_is_odd = prop == Gcb::RegionalIndicator;
                    continue;
                }
                Some(p) => p,
            };

            let breaks = !keeps_joined(prev, prop, self.in_extended_pictographic, self.ri_run_is_odd);

            self.in_extended_pictographic = if prop == Gcb::ExtendedPictographic {
                true
            } else if prop == Gcb::Extend || prop == Gcb::ZWJ {
                self.in_extended_pictographic
            } else {
                false
            };
            self.ri_run_is_odd = if prop == Gcb::RegionalIndicator {
                !self.ri_run_is_odd || prev != Gcb::RegionalIndicator
            } else {
                false
            };
            self.prev_prop = Some(prop);

            if breaks {
                return Some(cp.byte_pos);
            }
        }
    }
}

/// Implements GB3, GB6–GB9b, GB11–GB13; everything else breaks (GB4, GB5,
/// GB999).
pub(crate) fn keeps_joined(prev: Gcb, next: Gcb, in_extended_pictographic: bool, ri_run_is_odd: bool) -> bool {
    use Gcb::*;
    match (prev, next) {
        (CR, LF) => true, // GB3
        (L, L) | (L, V) | (L, LV) | (L, LVT) => true, // GB6
        (LV, V) | (V, V) | (LV, T) | (V, T) => true, // GB7
        (LVT, T) | (T, T) => true, // GB8
        (_, Extend) | (_, ZWJ) => true, // GB9
        (_, SpacingMark) => true, // GB9a
        (Prepend, _) => true, // GB9b
        (ZWJ, ExtendedPictographic) if in_extended_pictographic => true, // GB11
        (RegionalIndicator, RegionalIndicator) => ri_run_is_odd, // GB12/GB13
        _ => false,
    }
}

/// Width in bytes a codepoint occupies when UTF-8 encoded, used only to
/// derive a trailing position when the source has been fully consumed.
fn codepoint_width(value: u32) -> u64 {
    match value {
        0..=0x7f => 1,
        0x80..=0x7ff => 2,
        0x800..=0xffff => 3,
        _ => 4,
    }
}

trait ClampBreak {
    fn and_then_break(self, min: u64) -> u64;
}
impl ClampBreak for u64 {
    fn and_then_break(self, min: u64) -> u64 {
        self.max(min)
    }
}

/// Reverse grapheme-cluster break iterator (§4.5). `source` must be
/// cloneable so the iterator can perform the bounded lookahead GB11/GB12-13
/// need (their forward rules depend on context that, read backward, lies
/// *ahead* of the current codepoint).
pub struct ReverseGraphemeClusterIter<I> {
    codepoints: Vec<Codepoint>,
    idx: usize,
    text_end: u64,
    emitted_end: bool,
    done: bool,
    _marker: std::marker::PhantomData<I>,
}

impl<I: Iterator<Item = Codepoint> + Clone> ReverseGraphemeClusterIter<I> {
    /// Builds a reverse iterator over the full codepoint sequence `source`
    /// yields. `text_end` is the byte offset one past the last codepoint.
    pub fn new(source: I, text_end: u64) -> Self {
        let codepoints: Vec<Codepoint> = source.collect();
        let idx = codepoints.len();
        ReverseGraphemeClusterIter {
            codepoints,
            idx,
            text_end,
            emitted_end: false,
            done: false,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<I> Iterator for ReverseGraphemeClusterIter<I> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if !self.emitted_end {
            self.emitted_end = true;
            return Some(self.text_end); // GB2, read backward first
        }
        if self.done {
            return None;
        }
        if self.idx == 0 {
            self.done = true;
            return Some(0); // GB1
        }

        loop {
            if self.idx == 0 {
                self.done = true;
                return Some(0);
            }
            let next = self.codepoints[self.idx - 1];
            let next_prop = classify(next.value);

            if self.idx == self.codepoints.len() {
                self.idx -= 1;
                continue;
            }

            let prev = self.codepoints[self.idx];
            let prev_prop = classify(prev.value);

            let in_extended_pictographic = pictographic_run_ends_at(&self.codepoints, self.idx - 1);
            let ri_run_is_odd = regional_indicator_run_parity(&self.codepoints, self.idx - 1);

            self.idx -= 1;

            let joined = keeps_joined(next_prop, prev_prop, in_extended_pictographic, ri_run_is_odd);
            if !joined {
                return Some(prev.byte_pos);
            }
        }
    }
}

/// Whether the run of `ZWJ`/`Extend` immediately before `idx` is itself
/// preceded by an `Extended_Pictographic` codepoint (the context GB11
/// needs, scanned forward from a backward cursor).
fn pictographic_run_ends_at(codepoints: &[Codepoint], idx: usize) -> bool {
    let mut i = idx;
    while i > 0 {
        let prop = classify(codepoints[i - 1].value);
        if prop == Gcb::Extend || prop == Gcb::ZWJ {
            i -= 1;
            continue;
        }
        return prop == Gcb::ExtendedPictographic;
    }
    false
}

/// Parity of the run of `Regional_Indicator` codepoints ending just before
/// `idx` (the context GB12/GB13 need).
fn regional_indicator_run_parity(codepoints: &[Codepoint], idx: usize) -> bool {
    let mut count = 0usize;
    let mut i = idx;
    while i > 0 && classify(codepoints[i - 1].value) == Gcb::RegionalIndicator {
        count += 1;
        i -= 1;
    }
    count % 2 == 1
}


/// Property 7 (§8 "grapheme conformance"), fuzzed rather than pinned to the
/// full GraphemeBreakTest.txt suite: the forward and reverse iterators must
/// always land on the same breakpoint set, for any mix of the codepoint
/// categories whose interaction rules (GB3, GB9-GB9b, GB11, GB12-13) this
/// module hand-implements.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const INTERESTING_CODEPOINTS: [char; 9] = [
        'a',
        '\r',
        '\n',
        '\u{0301}', // combining acute accent (Extend)
        '\u{200d}', // ZWJ
        '\u{1f600}', // grinning face (Extended_Pictographic)
        '\u{1f1fa}', // regional indicator U
        '\u{1f1f8}', // regional indicator S
        '\u{0600}', // Arabic number sign (Prepend)
    ];

    fn arb_text() -> impl Strategy<Value = String> {
        proptest::collection::vec(proptest::sample::select(INTERESTING_CODEPOINTS.to_vec()), 0..12)
            .prop_map(|chars| chars.into_iter().collect())
    }

    fn cps_owned(s: &str) -> Vec<Codepoint> {
        s.char_indices()
            .map(|(i, c)| Codepoint {
                byte_pos: i as u64,
                value: c as u32,
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn forward_and_reverse_iterators_agree_on_breakpoints(text in arb_text()) {
            let codepoints = cps_owned(&text);
            let mut forward: Vec<u64> = GraphemeClusterIter::new(codepoints.clone().into_iter()).collect();
            forward.sort_unstable();
            forward.dedup();

            let mut backward: Vec<u64> = ReverseGraphemeClusterIter::<std::vec::IntoIter<Codepoint>>::new(
                codepoints.into_iter(),
                text.len() as u64,
            )
            .collect();
            backward.sort_unstable();
            backward.dedup();

            prop_assert_eq!(forward.first().copied(), Some(0));
            prop_assert_eq!(forward.last().copied(), Some(text.len() as u64));
            prop_assert_eq!(forward, backward);
        }
    }
}
