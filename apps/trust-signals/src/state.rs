use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::vote::EntityId;
use crate::risk::monitor::RiskMonitor;
use crate::votes::store::{VoteHandle, VoteStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub risk: RiskMonitor,
    pub votes: Arc<VoteStore>,
    /// Handles held on behalf of UI views mounted over the bridge.
    pub mounts: Arc<Mutex<HashMap<EntityId, VoteHandle>>>,
}
