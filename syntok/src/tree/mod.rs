//! `TokenTree`: an ordered, position-keyed container of [`Token`]s (§3, §4.7).
//!
//! Implemented as an arena-backed AVL tree ordered by `token.start`, with a
//! lazy shift `delta` on every node (§9 "Lazy shift"): shifting a whole
//! subtree is an O(1) update to its root (`token.shift` plus `delta +=`),
//! and `delta` is pushed down to children one level at a time, only when a
//! traversal actually visits them. Every node also carries
//! `max_lookahead`, the maximum `lookahead` in its subtree, which turns
//! `find_first_affected` into an O(log n) descent instead of a linear scan.
//!
//! Arena slots freed by deletion are not recycled; a freelist would be a
//! natural follow-up for long-running editor sessions but isn't needed for
//! correctness.

use crate::token::{saturating_add_signed, shift_magnitude, Edit, Token};

#[derive(Clone)]
struct Node {
    token: Token,
    left: Option<usize>,
    right: Option<usize>,
    height: u8,
    delta: i64,
    max_lookahead: u64,
}

/// An ordered container of tokens supporting the position-keyed queries and
/// edit-driven mutations incremental re-tokenization needs (§4.7).
#[derive(Clone)]
pub struct TokenTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    text_len: u64,
}

impl Default for TokenTree {
    fn default() -> Self {
        TokenTree {
            nodes: Vec::new(),
            root: None,
            text_len: 0,
        }
    }
}

impl TokenTree {
    pub fn new(text_len: u64) -> Self {
        TokenTree {
            nodes: Vec::new(),
            root: None,
            text_len,
        }
    }

    /// Total length of the text this tree was built over (§6 `len_text`).
    pub fn len_text(&self) -> u64 {
        self.text_len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn new_node(&mut self, token: Token) -> usize {
        self.nodes.push(Node {
            token,
            left: None,
            right: None,
            height: 1,
            delta: 0,
            max_lookahead: token.lookahead,
        });
        self.nodes.len() - 1
    }

    fn height(&self, id: Option<usize>) -> i32 {
        id.map(|i| self.nodes[i].height as i32).unwrap_or(0)
    }

    fn max_lookahead(&self, id: Option<usize>) -> u64 {
        id.map(|i| self.nodes[i].max_lookahead).unwrap_or(0)
    }

    fn balance_factor(&self, id: usize) -> i32 {
        self.height(self.nodes[id].left) - self.height(self.nodes[id].right)
    }

    fn update_node(&mut self, id: usize) {
        let h = 1 + self.height(self.nodes[id].left).max(self.height(self.nodes[id].right));
        self.nodes[id].height = h as u8;
        let own = self.nodes[id].token.lookahead;
        let m = own
            .max(self.max_lookahead(self.nodes[id].left))
            .max(self.max_lookahead(self.nodes[id].right));
        self.nodes[id].max_lookahead = m;
    }

    /// Pushes `id`'s pending delta onto its direct children, resolving
    /// their token positions and aggregates, then clears it. Every
    /// traversal that descends from `id` must call this first.
    fn push_down(&mut self, id: usize) {
        let delta = self.nodes[id].delta;
        if delta == 0 {
            return;
        }
        if let Some(l) = self.nodes[id].left {
            self.apply_delta(l, delta);
        }
        if let Some(r) = self.nodes[id].right {
            self.apply_delta(r, delta);
        }
        self.nodes[id].delta = 0;
    }

    fn apply_delta(&mut self, id: usize, delta: i64) {
        self.nodes[id].token.shift(delta);
        self.nodes[id].delta += delta;
        self.nodes[id].max_lookahead = saturating_add_signed(self.nodes[id].max_lookahead, delta);
    }

    fn rotate_left(&mut self, id: usize) -> usize {
        let r = self.nodes[id].right.expect("rotate_left needs a right child");
        self.push_down(r);
        let r_left = self.nodes[r].left;
        self.nodes[id].right = r_left;
        self.nodes[r].left = Some(id);
        self.update_node(id);
        self.update_node(r);
        r
    }

    fn rotate_right(&mut self, id: usize) -> usize {
        let l = self.nodes[id].left.expect("rotate_right needs a left child");
        self.push_down(l);
        let l_right = self.nodes[l].right;
        self.nodes[id].left = l_right;
        self.nodes[l].right = Some(id);
        self.update_node(id);
        self.update_node(l);
        l
    }

    fn rebalance(&mut self, id: usize) -> usize {
        self.update_node(id);
        let bf = self.balance_factor(id);
        if bf > 1 {
            let left = self.nodes[id].left.unwrap();
            if self.balance_factor(left) < 0 {
                let new_left = self.rotate_left(left);
                self.nodes[id].left = Some(new_left);
                self.update_node(id);
            }
            self.rotate_right(id)
        } else if bf < -1 {
            let right = self.nodes[id].right.unwrap();
            if self.balance_factor(right) > 0 {
                let new_right = self.rotate_right(right);
                self.nodes[id].right = Some(new_right);
                self.update_node(id);
            }
            self.rotate_left(id)
        } else {
            id
        }
    }

    /// Inserts `token`, ordered by `token.start` (§4.7 `insert_token`).
    pub fn insert_token(&mut self, token: Token) {
        self.root = self.insert_rec(self.root, token);
    }

    fn insert_rec(&mut self, id: Option<usize>, token: Token) -> Option<usize> {
        match id {
            None => Some(self.new_node(token)),
            Some(i) => {
                self.push_down(i);
                if token.start < self.nodes[i].token.start {
                    let new_left = self.insert_rec(self.nodes[i].left, token);
                    self.nodes[i].left = new_left;
                } else {
                    let new_right = self.insert_rec(self.nodes[i].right, token);
                    self.nodes[i].right = new_right;
                }
                Some(self.rebalance(i))
            }
        }
    }

    fn delete_key_rec(&mut self, id: Option<usize>, key_start: u64) -> Option<usize> {
        let i = id?;
        self.push_down(i);
        use std::cmp::Ordering::*;
        match key_start.cmp(&self.nodes[i].token.start) {
            Less => {
                let nl = self.delete_key_rec(self.nodes[i].left, key_start);
                self.nodes[i].left = nl;
                Some(self.rebalance(i))
            }
            Greater => {
                let nr = self.delete_key_rec(self.nodes[i].right, key_start);
                self.nodes[i].right = nr;
                Some(self.rebalance(i))
            }
            Equal => match (self.nodes[i].left, self.nodes[i].right) {
                (None, None) => None,
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (Some(_), Some(r)) => {
                    let (succ, new_right) = self.remove_min(r);
                    self.nodes[i].token = succ;
                    self.nodes[i].right = new_right;
                    Some(self.rebalance(i))
                }
            },
        }
    }

    fn remove_min(&mut self, id: usize) -> (Token, Option<usize>) {
        self.push_down(id);
        match self.nodes[id].left {
            None => (self.nodes[id].token, self.nodes[id].right),
            Some(l) => {
                let (min_token, new_left) = self.remove_min(l);
                self.nodes[id].left = new_left;
                (min_token, Some(self.rebalance(id)))
            }
        }
    }

    fn remove_by_start(&mut self, start: u64) {
        self.root = self.delete_key_rec(self.root, start);
    }

    /// The smallest-`start` stack needed to begin an in-order traversal at
    /// the first node with `start >= key`.
    fn lower_bound_stack(&mut self, key: u64) -> Vec<usize> {
        let mut stack = Vec::new();
        let mut cur = self.root;
        while let Some(i) = cur {
            self.push_down(i);
            if self.nodes[i].token.start >= key {
                stack.push(i);
                cur = self.nodes[i].left;
            } else {
                cur = self.nodes[i].right;
            }
        }
        stack
    }

    fn find_straddling_start(&mut self, pos: u64) -> Option<u64> {
        let mut cur = self.root;
        while let Some(i) = cur {
            self.push_down(i);
            let t = self.nodes[i].token;
            if t.contains(pos) {
                return Some(t.start);
            } else if pos < t.start {
                cur = self.nodes[i].left;
            } else {
                cur = self.nodes[i].right;
            }
        }
        None
    }

    /// Begins yielding tokens with `end > p` (or `start >= p` if none
    /// straddles `p`), in order (§4.7 `iter_from_position`).
    pub fn iter_from_position(&mut self, p: u64) -> TreeCursor<'_> {
        let key = self.find_straddling_start(p).unwrap_or(p);
        let stack = self.lower_bound_stack(key);
        TreeCursor { tree: self, stack }
    }

    /// The earliest token whose lookahead interval `(start, lookahead]`
    /// could be invalidated by an edit at `edit_pos`: the smallest-`start`
    /// token with `lookahead >= edit_pos` (§4.6, §4.7
    /// `iter_from_first_affected`).
    pub fn find_first_affected(&mut self, edit_pos: u64) -> Option<Token> {
        self.find_first_affected_rec(self.root, edit_pos)
    }

    fn find_first_affected_rec(&mut self, id: Option<usize>, pos: u64) -> Option<Token> {
        let i = id?;
        self.push_down(i);
        if self.max_lookahead(self.nodes[i].left) >= pos {
            if let Some(found) = self.find_first_affected_rec(self.nodes[i].left, pos) {
                return Some(found);
            }
        }
        if self.nodes[i].token.lookahead >= pos {
            return Some(self.nodes[i].token);
        }
        self.find_first_affected_rec(self.nodes[i].right, pos)
    }

    /// Adds `delta` to every token with `start >= threshold` (§4.7
    /// `shift_positions_after_edit`'s core primitive): O(log n) node
    /// touches via the lazy `delta` field, not O(n).
    pub fn shift_from(&mut self, threshold: u64, delta: i64) {
        self.shift_from_rec(self.root, threshold, delta);
    }

    fn shift_from_rec(&mut self, id: Option<usize>, threshold: u64, delta: i64) {
        let i = match id {
            Some(i) => i,
            None => return,
        };
        self.push_down(i);
        if self.nodes[i].token.start >= threshold {
            self.nodes[i].token.shift(delta);
            self.nodes[i].max_lookahead = saturating_add_signed(self.nodes[i].max_lookahead, delta);
            if let Some(r) = self.nodes[i].right {
                self.apply_delta(r, delta);
            }
            self.shift_from_rec(self.nodes[i].left, threshold, delta);
            self.update_node(i);
        } else {
            self.shift_from_rec(self.nodes[i].right, threshold, delta);
            self.update_node(i);
        }
    }

    /// Extends the token whose `[start, end)` contains `pos` by `extra_len`
    /// bytes, bumping both its `end` and `lookahead` (§4.6 step 1, §4.7
    /// `extend_token_intersecting_pos`).
    pub fn extend_token_intersecting_pos(&mut self, pos: u64, extra_len: u64) {
        if let Some(id) = self.find_node_containing(self.root, pos) {
            self.nodes[id].token.end = self.nodes[id].token.end.saturating_add(extra_len);
            self.nodes[id].token.lookahead = self.nodes[id].token.lookahead.saturating_add(extra_len);
            self.nodes[id].max_lookahead = self.nodes[id].max_lookahead.max(self.nodes[id].token.lookahead);
            self.bump_ancestor_aggregates(self.nodes[id].token.start);
        }
    }

    fn find_node_containing(&mut self, id: Option<usize>, pos: u64) -> Option<usize> {
        let i = id?;
        self.push_down(i);
        let t = self.nodes[i].token;
        if t.contains(pos) {
            Some(i)
        } else if pos < t.start {
            self.find_node_containing(self.nodes[i].left, pos)
        } else {
            self.find_node_containing(self.nodes[i].right, pos)
        }
    }

    /// Recomputes `max_lookahead` along the search path to `start`, used
    /// after an in-place mutation that doesn't change tree shape.
    fn bump_ancestor_aggregates(&mut self, start: u64) {
        self.bump_ancestor_aggregates_rec(self.root, start);
    }

    fn bump_ancestor_aggregates_rec(&mut self, id: Option<usize>, start: u64) {
        let i = match id {
            Some(i) => i,
            None => return,
        };
        if start < self.nodes[i].token.start {
            self.bump_ancestor_aggregates_rec(self.nodes[i].left, start);
        } else if start > self.nodes[i].token.start {
            self.bump_ancestor_aggregates_rec(self.nodes[i].right, start);
        }
        self.update_node(i);
    }

    /// Deletes the sub-range `[start, start+len)` in token space,
    /// truncating tokens that straddle the boundary and removing
    /// wholly-covered ones (§4.6 step 1, §4.7 `delete_range`). Does *not*
    /// shift the remainder; callers combine this with [`Self::shift_from`]
    /// per the edit semantics in §4.6.
    pub fn delete_range(&mut self, start: u64, len: u64) {
        if len == 0 {
            return;
        }
        let end = start.saturating_add(len);
        let victims: Vec<Token> = {
            let mut cursor = self.iter_from_position(start);
            let mut v = Vec::new();
            while let Some(t) = cursor.next() {
                if t.start >= end {
                    break;
                }
                v.push(t);
            }
            v
        };
        for t in &victims {
            self.remove_by_start(t.start);
        }
        for t in &victims {
            if t.start < start && t.end > start {
                // left-straddling: shrink to [start, start)
                let mut truncated = *t;
                truncated.end = start;
                truncated.lookahead = truncated.lookahead.max(truncated.end);
                if !truncated.is_empty() {
                    self.insert_token(truncated);
                }
            }
            if t.start < end && t.end > end {
                // right-straddling: start moves to end, shrinking the span
                let mut truncated = *t;
                truncated.start = end;
                if !truncated.is_empty() {
                    self.insert_token(truncated);
                }
            }
        }
    }

    /// Applies the position-shift step of an edit (§4.6 step 1): extends or
    /// inserts a placeholder for insertions, truncates/removes for
    /// deletions, then shifts the remainder of the tree.
    pub fn apply_edit_shift(&mut self, edit: Edit) {
        if edit.num_inserted > 0 {
            if edit.pos >= self.text_len {
                let inserted_end = edit.pos.saturating_add(edit.num_inserted);
                let placeholder = Token::new(edit.pos, inserted_end, inserted_end, crate::token::RoleTag::None);
                self.insert_token(placeholder);
            } else if self.find_straddling_start(edit.pos).is_some() {
                // Provisional: extends whichever token half-open-contains
                // `pos`, then shifts the rest including that same token per
                // the contract's literal `start >= pos` threshold. This step
                // only has to produce a plausible pre-retokenization tree;
                // `retokenize_after_edit`'s reparse pass recomputes the real
                // boundaries from the first affected token onward.
                self.extend_token_intersecting_pos(edit.pos, edit.num_inserted);
                self.shift_from(edit.pos, shift_magnitude(edit.num_inserted));
            } else {
                self.shift_from(edit.pos, shift_magnitude(edit.num_inserted));
            }
            self.text_len = self.text_len.saturating_add(edit.num_inserted);
        }
        if edit.num_deleted > 0 {
            self.delete_range(edit.pos, edit.num_deleted);
            self.shift_from(
                edit.pos.saturating_add(edit.num_deleted),
                -shift_magnitude(edit.num_deleted),
            );
            self.text_len = self.text_len.saturating_sub(edit.num_deleted);
        }
    }
}

/// A stateful cursor over a [`TokenTree`], yielding tokens in ascending
/// `start` order from the position it was constructed at (§9 "Lazy
/// evaluation / cursor objects"). Borrows the tree mutably because reading
/// through it performs lazy push-downs.
pub struct TreeCursor<'a> {
    tree: &'a mut TokenTree,
    stack: Vec<usize>,
}

impl<'a> TreeCursor<'a> {
    pub fn next(&mut self) -> Option<Token> {
        let i = self.stack.pop()?;
        let token = self.tree.nodes[i].token;
        let mut cur = self.tree.nodes[i].right;
        while let Some(c) = cur {
            self.tree.push_down(c);
            self.stack.push(c);
            cur = self.tree.nodes[c].left;
        }
        Some(token)
    }
}

impl<'a> Iterator for TreeCursor<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        TreeCursor::next(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::RoleTag;

    fn tok(start: u64, end: u64, lookahead: u64) -> Token {
        Token::new(start, end, lookahead, RoleTag::Identifier)
    }

    fn collect_all(tree: &mut TokenTree) -> Vec<Token> {
        tree.iter_from_position(0).collect()
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut tree = TokenTree::new(30);
        tree.insert_token(tok(10, 15, 15));
        tree.insert_token(tok(0, 5, 5));
        tree.insert_token(tok(20, 25, 25));
        let all = collect_all(&mut tree);
        let starts: Vec<u64> = all.iter().map(|t| t.start).collect();
        assert_eq!(starts, vec![0, 10, 20]);
    }

    #[test]
    fn shift_from_only_moves_suffix() {
        let mut tree = TokenTree::new(30);
        tree.insert_token(tok(0, 5, 5));
        tree.insert_token(tok(10, 15, 15));
        tree.insert_token(tok(20, 25, 25));
        tree.shift_from(10, 3);
        let all = collect_all(&mut tree);
        assert_eq!(all[0].start, 0);
        assert_eq!(all[1].start, 13);
        assert_eq!(all[2].start, 23);
    }

    #[test]
    fn find_first_affected_finds_earliest_lookahead_past_pos() {
        let mut tree = TokenTree::new(30);
        tree.insert_token(tok(0, 5, 5));
        tree.insert_token(tok(5, 10, 10));
        tree.insert_token(tok(10, 15, 20));
        let found = tree.find_first_affected(12).unwrap();
        assert_eq!(found.start, 10);
    }

    #[test]
    fn delete_range_truncates_straddling_tokens() {
        let mut tree = TokenTree::new(30);
        tree.insert_token(tok(0, 10, 10));
        tree.insert_token(tok(10, 20, 20));
        tree.delete_range(5, 10);
        let all = collect_all(&mut tree);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].start, 0);
        assert_eq!(all[0].end, 5);
        assert_eq!(all[1].start, 15);
        assert_eq!(all[1].end, 20);
    }

    #[test]
    fn apply_edit_shift_with_max_insert_saturates_without_panicking() {
        let mut tree = TokenTree::new(30);
        tree.insert_token(tok(10, 15, 15));
        tree.apply_edit_shift(Edit {
            pos: 10,
            num_inserted: u64::MAX,
            num_deleted: 0,
        });
        let all = collect_all(&mut tree);
        assert!(all[0].start >= 10);
        assert_eq!(all[0].end, u64::MAX);
        assert_eq!(all[0].lookahead, u64::MAX);
        assert!(all[0].start <= all[0].end);
    }

    #[test]
    fn shift_from_with_oversized_negative_delta_floors_at_zero() {
        let mut tree = TokenTree::new(30);
        tree.insert_token(tok(10, 15, 15));
        tree.insert_token(tok(20, 25, 25));
        tree.shift_from(0, i64::MIN);
        let all = collect_all(&mut tree);
        for t in &all {
            assert_eq!((t.start, t.end, t.lookahead), (0, 0, 0));
        }
    }

    #[test]
    fn many_inserts_stay_balanced_and_sorted() {
        let mut tree = TokenTree::new(1000);
        for i in 0..200u64 {
            let start = i * 3;
            tree.insert_token(tok(start, start + 2, start + 2));
        }
        let all = collect_all(&mut tree);
        assert_eq!(all.len(), 200);
        for pair in all.windows(2) {
            assert!(pair[0].start < pair[1].start);
        }
    }
}
