//! Shared per-entity vote state.
//!
//! Every view of the same entity (feed card, standalone page, popup) mounts
//! through one `VoteStore` and receives a `VoteHandle` onto the same session,
//! so optimistic counts never diverge between views. Sessions are reference
//! counted: when the last handle drops, a pending vote is flushed and the
//! session ends once nothing is outstanding. Fire-and-forget toggles hold a
//! store-owned handle until their session is idle again, so they get the
//! same quiet period as mounted views.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::VoteBackend;
use crate::models::vote::{EntityId, VoteType};
use crate::votes::committer::{ClientVoteState, CommitPhase, Effect, VoteCommitter, VoteSeed};
use crate::votes::session::{drive, SessionCore, VoteTimings};

struct Mount {
    core: Arc<SessionCore>,
    wake: mpsc::UnboundedSender<Effect>,
}

struct SessionEntry {
    mount: Weak<Mount>,
    task: JoinHandle<()>,
}

/// A mounted view's grip on an entity's vote session.
#[derive(Clone)]
pub struct VoteHandle {
    mount: Arc<Mount>,
}

impl VoteHandle {
    /// Applies the toggle immediately and returns the optimistic state.
    /// The write happens later, after the quiet period.
    pub fn toggle(&self, requested: VoteType) -> ClientVoteState {
        let (effect, snapshot) = self.mount.core.apply(|c| c.toggle(requested));
        if effect != Effect::Nothing && self.mount.wake.send(effect).is_err() {
            warn!(entity = %snapshot.entity_id, "vote session is gone, toggle will not be committed");
        }
        snapshot
    }

    pub fn state(&self) -> ClientVoteState {
        self.mount.core.snapshot()
    }

    /// Receives every state change, for views that re-render reactively.
    pub fn subscribe(&self) -> watch::Receiver<ClientVoteState> {
        self.mount.core.subscribe()
    }
}

pub struct VoteStore {
    backend: Arc<dyn VoteBackend>,
    timings: VoteTimings,
    sessions: Mutex<HashMap<EntityId, SessionEntry>>,
    /// Handles kept alive on behalf of `toggle_vote` callers.
    held: Arc<Mutex<HashMap<EntityId, VoteHandle>>>,
}

impl VoteStore {
    pub fn new(backend: Arc<dyn VoteBackend>, timings: VoteTimings) -> Self {
        Self {
            backend,
            timings,
            sessions: Mutex::new(HashMap::new()),
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins the live session for `entity_id`, or starts one.
    ///
    /// A new session starts from `seed` when given, otherwise it fetches the
    /// entity first. The seed is ignored when joining a live session or when
    /// an earlier session for the entity is still settling a write.
    /// Must be called from within a Tokio runtime.
    pub fn mount(&self, entity_id: EntityId, seed: Option<VoteSeed>) -> VoteHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        let mut previous = None;
        if let Some(entry) = sessions.remove(&entity_id) {
            if let Some(mount) = entry.mount.upgrade() {
                sessions.insert(entity_id, entry);
                return VoteHandle { mount };
            }
            if !entry.task.is_finished() {
                previous = Some(entry.task);
            }
        }
        sessions.retain(|_, entry| entry.mount.strong_count() > 0 || !entry.task.is_finished());

        let (committer, initial) = match seed {
            Some(seed) if previous.is_none() => {
                (VoteCommitter::seeded(entity_id.clone(), seed), Effect::Nothing)
            }
            _ => VoteCommitter::unloaded(entity_id.clone()),
        };
        let seeded = initial == Effect::Nothing;
        debug!(entity = %entity_id, seeded, "starting vote session");

        let core = SessionCore::new(committer);
        let (wake, wake_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(
            core.clone(),
            self.backend.clone(),
            self.timings,
            wake_rx,
            initial,
            previous,
        ));
        let mount = Arc::new(Mount { core, wake });
        sessions.insert(
            entity_id,
            SessionEntry {
                mount: Arc::downgrade(&mount),
                task,
            },
        );
        VoteHandle { mount }
    }

    /// Handle onto a live session, without starting one.
    pub fn get(&self, entity_id: &EntityId) -> Option<VoteHandle> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(entity_id)
            .and_then(|entry| entry.mount.upgrade())
            .map(|mount| VoteHandle { mount })
    }

    /// Fire-and-forget toggle. Joins the live session when there is one;
    /// otherwise starts one that hydrates from the backend first. Either way
    /// the session is held until it is idle again, so rapid calls coalesce
    /// into one write after the quiet period.
    pub fn toggle_vote(&self, entity_id: EntityId, requested: VoteType) -> ClientVoteState {
        let handle = self.mount(entity_id.clone(), None);
        let snapshot = handle.toggle(requested);
        self.hold_until_idle(entity_id, handle);
        snapshot
    }

    fn hold_until_idle(&self, entity_id: EntityId, handle: VoteHandle) {
        {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            if held.contains_key(&entity_id) {
                return;
            }
            held.insert(entity_id.clone(), handle.clone());
        }

        let held = self.held.clone();
        let mut changes = handle.subscribe();
        drop(handle);
        tokio::spawn(async move {
            loop {
                if changes.borrow_and_update().phase == CommitPhase::Idle {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
            let mut held = held.lock().unwrap_or_else(PoisonError::into_inner);
            let released = held.remove(&entity_id);
            drop(held);
            debug!(entity = %entity_id, "released fire-and-forget vote session");
            drop(released);
        });
    }

    /// Number of entities with at least one mounted view.
    pub fn mounted(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .values()
            .filter(|entry| entry.mount.strong_count() > 0)
            .count()
    }
}
