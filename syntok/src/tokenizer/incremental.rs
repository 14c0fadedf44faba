//! Incremental re-tokenization (§4.6 steps 2–4): after the tree's positions
//! have been shifted for an edit, re-run the tokenizer starting at the
//! earliest token whose lookahead could have seen the edit, and stop as
//! soon as a freshly produced token exactly matches a token already in the
//! (shifted) tree — the point past which re-tokenizing is guaranteed to
//! reproduce what's already there.

use super::{ReaderAt, RuleTable, Tokenizer};
use crate::error::IoError;
use crate::token::{Edit, Token};
use crate::tree::TokenTree;

/// Applies `edit` to `tree` and brings its tokens back in sync with the
/// post-edit text read through `reader_at_pos` (§4.6).
pub fn retokenize_after_edit(
    tree: &mut TokenTree,
    edit: Edit,
    rules: &RuleTable,
    reader_at_pos: &mut dyn ReaderAt,
) -> Result<(), IoError> {
    log::debug!("retokenize_after_edit: pos={} inserted={} deleted={}", edit.pos, edit.num_inserted, edit.num_deleted);
    tree.apply_edit_shift(edit);
    let text_len = tree.len_text();

    let affected_start = tree.find_first_affected(edit.pos).map(|t| t.start).unwrap_or(edit.pos);
    let resume_after = edit.pos.saturating_add(edit.num_inserted);

    let mut tokenizer = Tokenizer::new(affected_start);
    let mut new_tokens = Vec::new();
    let mut rescan_end = affected_start;
    let mut reached_stable_region = false;

    while let Some(new_tok) = tokenizer.advance(rules, reader_at_pos, text_len)? {
        rescan_end = new_tok.end;
        reached_stable_region = new_tok.start > resume_after && matches_existing_token(tree, new_tok);
        new_tokens.push(new_tok);
        if reached_stable_region {
            break;
        }
    }
    if !reached_stable_region {
        log::warn!(
            "retokenize_after_edit: reparse-termination invariant never triggered, rescanned to EOF ({rescan_end})"
        );
    }

    tree.delete_range(affected_start, rescan_end.saturating_sub(affected_start));
    for t in new_tokens {
        tree.insert_token(t);
    }
    Ok(())
}

/// Whether the tree already has a token identical to `candidate` starting
/// at the same position — the reparse-termination check.
fn matches_existing_token(tree: &mut TokenTree, candidate: Token) -> bool {
    match tree.iter_from_position(candidate.start).next() {
        Some(existing) => existing == candidate,
        None => false,
    }
}
