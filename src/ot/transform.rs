//! Pairwise operational transform, `transform(a, b)`.
//!
//! `b` is the already-applied, older operation; `a` is rebased over it. The
//! tiebreak for same-position concurrent inserts uses the lexicographically
//! smaller `client_id` as the "winner", which stays put while the loser
//! shifts — this is what makes every interleaving of concurrent submissions
//! converge to the same final content.

use super::op::{Operation, OperationType};

/// Rebase `a` over already-applied `b`, returning the transformed `a`.
///
/// Does not touch `a.base_version`; callers bump that separately once the
/// full fold over concurrent history completes.
pub fn transform(a: &Operation, b: &Operation) -> Operation {
    match b.op_type {
        OperationType::Insert => transform_over_insert(a, b),
        OperationType::Delete => transform_over_delete(a, b),
        OperationType::Noop => a.clone(),
    }
}

fn transform_over_insert(a: &Operation, b: &Operation) -> Operation {
    let b_len = b.content_len();
    let mut out = a.clone();

    if a.position < b.position {
        // unchanged
    } else if a.position > b.position {
        out.position += b_len;
    } else {
        // a.position == b.position: deterministic tiebreak.
        if a.client_id < b.client_id {
            // a wins: stays put.
        } else {
            out.position += b_len;
        }
    }
    out
}

fn transform_over_delete(a: &Operation, b: &Operation) -> Operation {
    match a.op_type {
        OperationType::Insert => {
            let new_pos = shift_point_over_delete(a.position, b);
            let mut out = a.clone();
            out.position = new_pos;
            out
        }
        OperationType::Delete => clip_delete_over_delete(a, b),
        OperationType::Noop => a.clone(),
    }
}

/// Shifts a single point (an insert position, or one endpoint of a delete
/// range) across an already-applied delete `b`.
fn shift_point_over_delete(pos: usize, b: &Operation) -> usize {
    let b_len = b.content_len();
    let b_end = b.position + b_len;
    if pos <= b.position {
        pos
    } else if pos >= b_end {
        pos - b_len
    } else {
        // pos falls inside [b.position, b_end): the text there is gone.
        b.position
    }
}

/// Clips a's delete range against b's already-applied delete range.
fn clip_delete_over_delete(a: &Operation, b: &Operation) -> Operation {
    let a_len = a.content_len();
    let b_len = b.content_len();
    let a_end = a.position + a_len;
    let b_end = b.position + b_len;

    let overlap_start = a.position.max(b.position);
    let overlap_end = a_end.min(b_end);
    let overlap = overlap_end.saturating_sub(overlap_start);
    let remaining_len = a_len.saturating_sub(overlap);

    let mut out = a.clone();
    if remaining_len == 0 {
        return out.into_noop();
    }

    let new_start = if a.position <= b.position {
        a.position
    } else if a.position < b_end {
        b.position
    } else {
        a.position - b_len
    };

    out.position = new_start;
    out.content = take_chars(&a.content, remaining_len);
    out
}

/// Returns the first `n` chars of `s`, used when clipping a delete's
/// `content` down to its new, shorter length — only the length is
/// authoritative, so the actual characters retained are immaterial.
fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
