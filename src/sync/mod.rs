//! Multi-device sync
//!
//! Offline clients exchange change-sets with the server and converge through
//! record-level last-write-wins merges keyed on the client's `updated_at`.

mod memory;
mod merge;
mod service;
mod store;
mod types;

pub use memory::MemorySyncStore;
pub use merge::{completion_supersedes, goal_supersedes, merge_completion, merge_goal, MergeOutcome};
pub use service::SyncService;
pub use store::{SqliteSyncStore, SyncStore};
pub use types::{CompletionChange, GoalChange, SyncRequest, SyncResponse};
