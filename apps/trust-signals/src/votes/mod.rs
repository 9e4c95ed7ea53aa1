// Vote reconciliation
// toggle → resolver (sync, optimistic) → committer (debounced) → backend write
// → reconciliation gate → re-fetch on mismatch.

pub mod committer;
pub mod handlers;
pub mod reconcile;
pub mod resolver;
pub mod session;
pub mod store;
