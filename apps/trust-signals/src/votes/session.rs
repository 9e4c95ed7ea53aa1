//! Session driver — the asynchronous half of the vote engine.
//!
//! One tokio task per mounted entity owns the quiet-period timer and the
//! single outstanding backend operation. Toggles are applied synchronously
//! by the caller through `SessionCore::apply`; the driver only hears about
//! the resulting `Effect`.
//!
//! At most one write or fetch is outstanding per entity. Once sent, a write
//! runs to completion; the outer timeout turns a stuck write into a failure.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::backend::{BackendError, VoteBackend};
use crate::errors::TrustError;
use crate::models::vote::{EntityId, VoteType, VoteableEntity};
use crate::votes::committer::{ClientVoteState, CommitPhase, Effect, VoteCommitter};
use crate::votes::reconcile::refetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTimings {
    /// Debounce window. Each toggle restarts it.
    pub quiet_period: Duration,
    /// Outer bound on a write or a re-fetch.
    pub write_timeout: Duration,
}

impl Default for VoteTimings {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Committer plus the channel its snapshots are published on.
pub struct SessionCore {
    committer: Mutex<VoteCommitter>,
    publish: watch::Sender<ClientVoteState>,
}

impl SessionCore {
    pub fn new(committer: VoteCommitter) -> Arc<Self> {
        let (publish, _) = watch::channel(committer.state().clone());
        Arc::new(Self {
            committer: Mutex::new(committer),
            publish,
        })
    }

    /// Runs one transition and publishes the resulting state.
    pub fn apply<F>(&self, transition: F) -> (Effect, ClientVoteState)
    where
        F: FnOnce(&mut VoteCommitter) -> Effect,
    {
        let mut committer = self.committer.lock().unwrap_or_else(PoisonError::into_inner);
        let effect = transition(&mut committer);
        committer.bump_revision();
        debug_assert!(committer.state().is_consistent());
        let snapshot = committer.state().clone();
        self.publish.send_replace(snapshot.clone());
        (effect, snapshot)
    }

    pub fn phase(&self) -> CommitPhase {
        self.committer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase()
    }

    pub fn snapshot(&self) -> ClientVoteState {
        self.publish.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientVoteState> {
        self.publish.subscribe()
    }
}

enum Settled {
    Write(Result<VoteType, TrustError>),
    Fetch(Result<(VoteableEntity, VoteType), TrustError>),
}

/// Drives one entity until every view has unmounted and nothing is pending.
///
/// `wake` carries effects produced by toggles; it closes when the last
/// handle drops, at which point a pending vote is flushed instead of lost.
/// `previous` is the task of an earlier session for the same entity that is
/// still settling; this session waits for it so writes stay ordered.
pub async fn drive(
    core: Arc<SessionCore>,
    backend: Arc<dyn VoteBackend>,
    timings: VoteTimings,
    mut wake: mpsc::UnboundedReceiver<Effect>,
    initial: Effect,
    previous: Option<JoinHandle<()>>,
) {
    let entity_id = core.snapshot().entity_id;

    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let mut deadline: Option<Instant> = None;
    let mut operation: Option<JoinHandle<Settled>> = None;
    let mut unmounted = false;
    let mut effect = initial;

    loop {
        match effect {
            Effect::Nothing => {}
            Effect::ArmTimer => {
                deadline = Some(Instant::now() + timings.quiet_period);
            }
            Effect::Write(vote) => {
                deadline = None;
                operation = Some(spawn_write(backend.clone(), entity_id.clone(), vote, timings));
            }
            Effect::Fetch => {
                deadline = None;
                operation = Some(spawn_fetch(backend.clone(), entity_id.clone(), timings));
            }
        }

        if unmounted && operation.is_none() {
            if core.phase() == CommitPhase::Pending {
                effect = core.apply(|c| c.flush()).0;
                continue;
            }
            break;
        }

        // Toggles first, so a re-armed timer is seen before the old one fires.
        effect = tokio::select! {
            biased;

            message = wake.recv(), if !unmounted => match message {
                Some(effect) => effect,
                None => {
                    debug!(entity = %entity_id, "last view unmounted");
                    unmounted = true;
                    Effect::Nothing
                }
            },
            _ = wait_until(deadline), if deadline.is_some() => {
                deadline = None;
                core.apply(|c| c.timer_fired()).0
            }
            settled = settle(&mut operation), if operation.is_some() => {
                operation = None;
                match settled {
                    Ok(Settled::Write(Ok(recorded))) => core.apply(|c| c.write_succeeded(recorded)).0,
                    Ok(Settled::Write(Err(e))) => {
                        warn!(entity = %entity_id, "vote write failed, rolling back: {e}");
                        core.apply(|c| c.write_failed(&e)).0
                    }
                    Ok(Settled::Fetch(Ok((entity, vote)))) => {
                        core.apply(|c| c.fetch_succeeded(&entity, vote)).0
                    }
                    Ok(Settled::Fetch(Err(e))) => {
                        warn!(entity = %entity_id, "vote state fetch failed: {e}");
                        core.apply(|c| c.fetch_failed(&e)).0
                    }
                    Err(join_error) => {
                        let e = TrustError::NetworkFailure(BackendError::Terminal(format!(
                            "store task aborted: {join_error}"
                        )));
                        warn!(entity = %entity_id, "{e}");
                        core.apply(|c| c.operation_failed(&e)).0
                    }
                }
            }
        };
    }

    debug!(entity = %entity_id, "vote session ended");
}

fn spawn_write(
    backend: Arc<dyn VoteBackend>,
    id: EntityId,
    vote: VoteType,
    timings: VoteTimings,
) -> JoinHandle<Settled> {
    tokio::spawn(async move {
        let limit = timings.write_timeout;
        let result = match tokio::time::timeout(limit, backend.commit_vote(&id, vote)).await {
            Ok(Ok(recorded)) => Ok(recorded),
            Ok(Err(e)) => Err(TrustError::NetworkFailure(e)),
            Err(_) => Err(TrustError::StaleWriteTimeout(limit)),
        };
        Settled::Write(result)
    })
}

fn spawn_fetch(backend: Arc<dyn VoteBackend>, id: EntityId, timings: VoteTimings) -> JoinHandle<Settled> {
    tokio::spawn(async move {
        Settled::Fetch(refetch(backend.as_ref(), &id, timings.write_timeout).await)
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn settle(
    operation: &mut Option<JoinHandle<Settled>>,
) -> Result<Settled, tokio::task::JoinError> {
    match operation {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
