//! Pagination and reconciliation between the remote feed and the local cache.
//!
//! [`SyncEngine`] is the only writer of [`SyncState`] and [`PageCursor`];
//! everything else observes through [`SyncEngine::subscribe`] or snapshots.

mod engine;
mod state;

pub use engine::{LoadOutcome, SyncEngine};
pub use state::{PageCursor, SyncError, SyncPhase, SyncState};
