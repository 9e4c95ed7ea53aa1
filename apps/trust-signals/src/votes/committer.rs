//! Debounced vote committer — the synchronous half of the vote engine.
//!
//! `VoteCommitter` owns one entity's `ClientVoteState` and turns every input
//! (toggle, timer expiry, write/fetch settlement) into a state change plus an
//! `Effect` for the session driver to carry out. It never blocks and never
//! touches the network itself, so every transition is testable without a
//! runtime.
//!
//! Invariant after every transition:
//! `displayed_score == confirmed_score + transition_delta(committed_vote, displayed_vote)`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::TrustError;
use crate::models::vote::{EntityId, VoteType, VoteableEntity};
use crate::votes::reconcile::{apply_refetch, check_commit, CommitOutcome};
use crate::votes::resolver::{resolve, transition_delta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    /// No write pending.
    Idle,
    /// Quiet-period timer armed; nothing sent yet.
    Pending,
    /// Write sent, awaiting the backend.
    InFlight,
    /// Authoritative re-fetch outstanding (initial hydration or reconciliation).
    Fetching,
}

/// Per-entity, per-viewer vote state as the UI sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientVoteState {
    pub entity_id: EntityId,
    pub displayed_vote: VoteType,
    pub displayed_score: i64,
    pub committed_vote: VoteType,
    /// Score last confirmed by the backend, including `committed_vote`.
    pub confirmed_score: i64,
    pub phase: CommitPhase,
    /// False until seeded or fetched from the backend.
    pub loaded: bool,
    /// Non-blocking notification for the last failed write or fetch.
    pub last_error: Option<String>,
    /// Bumped on every published change; lets pollers detect missed updates.
    pub revision: u64,
}

impl ClientVoteState {
    pub fn is_consistent(&self) -> bool {
        self.displayed_score
            == self.confirmed_score + transition_delta(self.committed_vote, self.displayed_vote)
    }
}

/// Last known server values used to mount a vote control without a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSeed {
    pub score: i64,
    pub vote: VoteType,
}

/// Work the session driver must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Nothing,
    /// (Re)start the quiet-period timer, cancelling any armed one.
    ArmTimer,
    /// Send exactly one write of this vote.
    Write(VoteType),
    /// Fetch the entity and the viewer's vote from the backend.
    Fetch,
}

#[derive(Debug)]
pub struct VoteCommitter {
    state: ClientVoteState,
    /// Vote carried by the outstanding write.
    in_flight: Option<VoteType>,
    /// Toggles made while the write was in flight, already reflected in the
    /// displayed state.
    flight_toggles: Vec<VoteType>,
    /// Toggles held back while a fetch is outstanding; replayed afterwards.
    buffered: Vec<VoteType>,
    /// Vote the backend reported on a mismatching commit.
    recorded_on_mismatch: Option<VoteType>,
}

impl VoteCommitter {
    pub fn seeded(entity_id: EntityId, seed: VoteSeed) -> Self {
        Self::with_state(ClientVoteState {
            entity_id,
            displayed_vote: seed.vote,
            displayed_score: seed.score,
            committed_vote: seed.vote,
            confirmed_score: seed.score,
            phase: CommitPhase::Idle,
            loaded: true,
            last_error: None,
            revision: 0,
        })
    }

    /// A committer with no server values yet. The caller must perform the
    /// returned `Effect::Fetch` to hydrate it.
    pub fn unloaded(entity_id: EntityId) -> (Self, Effect) {
        let committer = Self::with_state(ClientVoteState {
            entity_id,
            displayed_vote: VoteType::None,
            displayed_score: 0,
            committed_vote: VoteType::None,
            confirmed_score: 0,
            phase: CommitPhase::Fetching,
            loaded: false,
            last_error: None,
            revision: 0,
        });
        (committer, Effect::Fetch)
    }

    fn with_state(state: ClientVoteState) -> Self {
        Self {
            state,
            in_flight: None,
            flight_toggles: Vec::new(),
            buffered: Vec::new(),
            recorded_on_mismatch: None,
        }
    }

    pub fn state(&self) -> &ClientVoteState {
        &self.state
    }

    pub fn phase(&self) -> CommitPhase {
        self.state.phase
    }

    pub fn bump_revision(&mut self) {
        self.state.revision += 1;
    }

    /// Local toggle. The displayed state changes immediately unless a fetch
    /// is outstanding, in which case the request is replayed after it. An
    /// idle committer that never hydrated fetches again first.
    pub fn toggle(&mut self, requested: VoteType) -> Effect {
        if self.state.phase == CommitPhase::Idle && !self.state.loaded {
            debug!(entity = %self.state.entity_id, %requested, "not hydrated, fetching before toggle");
            self.buffered.push(requested);
            self.state.phase = CommitPhase::Fetching;
            return Effect::Fetch;
        }
        match self.state.phase {
            CommitPhase::Fetching => {
                debug!(entity = %self.state.entity_id, %requested, "toggle buffered until fetch settles");
                self.buffered.push(requested);
                Effect::Nothing
            }
            CommitPhase::InFlight => {
                self.apply_locally(requested);
                self.flight_toggles.push(requested);
                Effect::Nothing
            }
            CommitPhase::Idle | CommitPhase::Pending => {
                self.apply_locally(requested);
                self.state.phase = CommitPhase::Pending;
                Effect::ArmTimer
            }
        }
    }

    /// Quiet period elapsed. Sends the final vote, or nothing if the user
    /// toggled back to the committed value.
    pub fn timer_fired(&mut self) -> Effect {
        if self.state.phase != CommitPhase::Pending {
            return Effect::Nothing;
        }
        if self.state.displayed_vote == self.state.committed_vote {
            debug!(entity = %self.state.entity_id, "toggles cancelled out, no write");
            self.state.phase = CommitPhase::Idle;
            return Effect::Nothing;
        }
        let vote = self.state.displayed_vote;
        debug!(entity = %self.state.entity_id, %vote, "quiet period over, writing");
        self.state.phase = CommitPhase::InFlight;
        self.in_flight = Some(vote);
        Effect::Write(vote)
    }

    /// Commits a pending vote right away. Used when the last view unmounts.
    pub fn flush(&mut self) -> Effect {
        self.timer_fired()
    }

    pub fn write_succeeded(&mut self, recorded: VoteType) -> Effect {
        let Some(sent) = self.in_flight.take() else {
            return Effect::Nothing;
        };
        self.state.confirmed_score += transition_delta(self.state.committed_vote, sent);
        self.state.committed_vote = sent;
        self.state.loaded = true;

        match check_commit(sent, recorded) {
            CommitOutcome::Confirmed => {
                self.flight_toggles.clear();
                self.settle_or_rearm()
            }
            CommitOutcome::Mismatch { sent, recorded } => {
                info!(
                    entity = %self.state.entity_id,
                    %sent,
                    %recorded,
                    "backend recorded a different vote, re-fetching"
                );
                // Optimistic math is discarded; the user's later toggles are
                // replayed against the fetched state.
                self.state.displayed_vote = self.state.committed_vote;
                self.state.displayed_score = self.state.confirmed_score;
                self.buffered = std::mem::take(&mut self.flight_toggles);
                self.recorded_on_mismatch = Some(recorded);
                self.state.phase = CommitPhase::Fetching;
                Effect::Fetch
            }
        }
    }

    /// Rolls the displayed state back to the last committed values. Toggles
    /// made during the failed flight are dropped with it.
    pub fn write_failed(&mut self, error: &TrustError) -> Effect {
        if self.in_flight.take().is_none() {
            return Effect::Nothing;
        }
        self.state.displayed_vote = self.state.committed_vote;
        self.state.displayed_score = self.state.confirmed_score;
        self.state.last_error = Some(error.user_message().to_string());
        self.flight_toggles.clear();
        self.state.phase = CommitPhase::Idle;
        Effect::Nothing
    }

    pub fn fetch_succeeded(&mut self, entity: &VoteableEntity, viewer_vote: VoteType) -> Effect {
        if self.state.phase != CommitPhase::Fetching {
            return Effect::Nothing;
        }
        apply_refetch(&mut self.state, entity, viewer_vote);
        self.recorded_on_mismatch = None;
        self.replay_buffered()
    }

    /// Keeps the best authoritative value available: the vote the backend
    /// reported on the mismatching write. A failed hydration has no baseline
    /// to replay against, so its buffered toggles are dropped.
    pub fn fetch_failed(&mut self, error: &TrustError) -> Effect {
        if self.state.phase != CommitPhase::Fetching {
            return Effect::Nothing;
        }
        self.state.last_error = Some(error.user_message().to_string());
        if !self.state.loaded {
            debug!(
                entity = %self.state.entity_id,
                dropped = self.buffered.len(),
                "hydration failed, dropping buffered toggles"
            );
            self.buffered.clear();
            self.state.phase = CommitPhase::Idle;
            return Effect::Nothing;
        }
        if let Some(recorded) = self.recorded_on_mismatch.take() {
            self.state.confirmed_score += transition_delta(self.state.committed_vote, recorded);
            self.state.committed_vote = recorded;
            self.state.displayed_vote = recorded;
            self.state.displayed_score = self.state.confirmed_score;
        }
        self.replay_buffered()
    }

    /// Failure of whatever operation is outstanding.
    pub fn operation_failed(&mut self, error: &TrustError) -> Effect {
        match self.state.phase {
            CommitPhase::InFlight => self.write_failed(error),
            CommitPhase::Fetching => self.fetch_failed(error),
            CommitPhase::Idle | CommitPhase::Pending => Effect::Nothing,
        }
    }

    fn apply_locally(&mut self, requested: VoteType) {
        let resolution = resolve(self.state.displayed_vote, requested);
        self.state.displayed_vote = resolution.next;
        self.state.displayed_score += resolution.delta;
        self.state.last_error = None;
    }

    fn replay_buffered(&mut self) -> Effect {
        self.state.phase = CommitPhase::Idle;
        let buffered = std::mem::take(&mut self.buffered);
        for requested in buffered {
            self.apply_locally(requested);
        }
        self.settle_or_rearm()
    }

    fn settle_or_rearm(&mut self) -> Effect {
        if self.state.displayed_vote != self.state.committed_vote {
            self.state.phase = CommitPhase::Pending;
            Effect::ArmTimer
        } else {
            self.state.phase = CommitPhase::Idle;
            Effect::Nothing
        }
    }
}
