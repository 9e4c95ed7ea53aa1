//! Reconciliation gate. Compares the vote a committed write actually
//! recorded against what was sent. A mismatch means the same viewer voted
//! through another client concurrently; the gate does not merge, it re-fetches
//! and takes tallies and viewer vote from the backend (last fetch wins).

use std::time::Duration;

use tracing::debug;

use crate::backend::VoteBackend;
use crate::errors::TrustError;
use crate::models::vote::{EntityId, VoteType, VoteableEntity};
use crate::votes::committer::ClientVoteState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Confirmed,
    /// Not an error: the caller must re-fetch before any further local math.
    Mismatch { sent: VoteType, recorded: VoteType },
}

pub fn check_commit(sent: VoteType, recorded: VoteType) -> CommitOutcome {
    if sent == recorded {
        CommitOutcome::Confirmed
    } else {
        CommitOutcome::Mismatch { sent, recorded }
    }
}

/// Replaces every optimistic value with the fetched authoritative ones.
pub fn apply_refetch(state: &mut ClientVoteState, entity: &VoteableEntity, viewer_vote: VoteType) {
    state.confirmed_score = entity.score();
    state.committed_vote = viewer_vote;
    state.displayed_vote = viewer_vote;
    state.displayed_score = state.confirmed_score;
    state.loaded = true;
}

/// Fetches the entity and the viewer's vote together, bounded by `limit`.
/// Issues exactly one request of each.
pub async fn refetch(
    backend: &dyn VoteBackend,
    id: &EntityId,
    limit: Duration,
) -> Result<(VoteableEntity, VoteType), TrustError> {
    debug!(entity = %id, "re-fetching authoritative vote state");
    let fetch = async {
        tokio::try_join!(backend.fetch_voteable_entity(id), backend.fetch_viewer_vote(id))
    };
    match tokio::time::timeout(limit, fetch).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TrustError::StaleWriteTimeout(limit)),
    }
}
