use std::sync::PoisonError;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::errors::AppError;
use crate::models::vote::{EntityId, VoteType};
use crate::state::AppState;
use crate::votes::committer::{ClientVoteState, VoteSeed};

/// Upper bound on a single long-poll.
const MAX_WAIT_MS: u64 = 30_000;

#[derive(Deserialize)]
pub struct ToggleRequest {
    pub vote: VoteType,
}

#[derive(Deserialize)]
pub struct WaitQuery {
    pub wait_ms: Option<u64>,
    /// Revision the caller last saw. A newer one is returned without waiting.
    pub since: Option<u64>,
}

fn entity_id(raw: String) -> Result<EntityId, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::Validation("entity id must not be empty".to_string()));
    }
    Ok(EntityId(raw))
}

/// PUT /api/v1/votes/:entity_id
/// Mounts a view of the entity. An optional body seeds the last known server values.
pub async fn handle_mount(
    State(state): State<AppState>,
    Path(id): Path<String>,
    seed: Option<Json<VoteSeed>>,
) -> Result<Json<ClientVoteState>, AppError> {
    let id = entity_id(id)?;
    let mut mounts = state.mounts.lock().unwrap_or_else(PoisonError::into_inner);
    let handle = mounts
        .entry(id.clone())
        .or_insert_with(|| state.votes.mount(id, seed.map(|Json(s)| s)));
    Ok(Json(handle.state()))
}

/// GET /api/v1/votes/:entity_id
pub async fn handle_get_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClientVoteState>, AppError> {
    let id = entity_id(id)?;
    let handle = state
        .votes
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Entity {id} is not mounted")))?;
    Ok(Json(handle.state()))
}

/// GET /api/v1/votes/:entity_id/changes
/// Long-poll: returns at once if the state moved past `since`, otherwise after
/// the next change or once `wait_ms` elapses.
pub async fn handle_wait_for_change(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<ClientVoteState>, AppError> {
    let id = entity_id(id)?;
    let handle = state
        .votes
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Entity {id} is not mounted")))?;

    let mut changes = handle.subscribe();
    let current = changes.borrow_and_update().revision;
    if query.since.is_some_and(|seen| seen != current) {
        return Ok(Json(changes.borrow().clone()));
    }
    let wait = Duration::from_millis(query.wait_ms.unwrap_or(MAX_WAIT_MS).min(MAX_WAIT_MS));
    let _ = tokio::time::timeout(wait, changes.changed()).await;
    let latest = changes.borrow().clone();
    Ok(Json(latest))
}

/// POST /api/v1/votes/:entity_id/toggle
/// Returns the optimistic state; the write is committed after the quiet period.
pub async fn handle_toggle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Result<(StatusCode, Json<ClientVoteState>), AppError> {
    let id = entity_id(id)?;
    let snapshot = state.votes.toggle_vote(id, req.vote);
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// DELETE /api/v1/votes/:entity_id
pub async fn handle_unmount(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = entity_id(id)?;
    let removed = state
        .mounts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    match removed {
        Some(handle) => {
            drop(handle);
            debug!("{id} unmounted, {} entities still mounted", state.votes.mounted());
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(AppError::NotFound(format!("Entity {id} is not mounted"))),
    }
}
