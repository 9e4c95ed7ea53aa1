//! Canonical vote arithmetic. Every vote control (comment, reply, page-level)
//! goes through `resolve`; nothing else derives score deltas.

use serde::Serialize;

use crate::models::vote::VoteType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteResolution {
    pub next: VoteType,
    /// Change to `up_count - down_count`.
    pub delta: i64,
}

/// Applies a requested vote to the current one.
///
/// Requesting the vote already held clears it; requesting the opposite vote
/// flips it. Requesting `None` clears whatever is held.
pub fn resolve(current: VoteType, requested: VoteType) -> VoteResolution {
    let next = if current == requested {
        VoteType::None
    } else {
        requested
    };
    VoteResolution {
        next,
        delta: transition_delta(current, next),
    }
}

/// Score change implied by moving a viewer's vote from `from` to `to`.
pub fn transition_delta(from: VoteType, to: VoteType) -> i64 {
    to.weight() - from.weight()
}
