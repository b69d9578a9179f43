//! Last-write-wins merge rules
//!
//! Pure decisions for a single client change against the current server
//! record. Nothing here touches storage; the caller passes in the server
//! clock so the same inputs always give the same decision.

use chrono::{DateTime, Utc};

use super::types::{CompletionChange, GoalChange};
use crate::models::{Completion, Goal};

/// Result of merging one client change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome<T> {
    /// The client's version wins; persist this record
    Apply(T),
    /// The server state stands (or there is nothing to do)
    Keep,
}

impl<T> MergeOutcome<T> {
    pub fn should_apply(&self) -> bool {
        matches!(self, MergeOutcome::Apply(_))
    }
}

/// Merge a client goal change with the server goal.
///
/// A goal the server has never seen is always created. An existing goal is
/// replaced wholesale only when the client clock is strictly newer; equal
/// timestamps keep the server version.
pub fn merge_goal(
    change: &GoalChange,
    server: Option<&Goal>,
    now: DateTime<Utc>,
) -> MergeOutcome<Goal> {
    let tombstone = change.deleted.then_some(change.updated_at);

    let Some(server) = server else {
        return MergeOutcome::Apply(Goal {
            id: change.id.clone(),
            name: change.name.clone(),
            color: change.color.clone(),
            position: change.position,
            owner: None,
            created_at: now,
            updated_at: change.updated_at,
            archived_at: None,
            deleted_at: tombstone,
        });
    };

    if change.updated_at > server.updated_at {
        return MergeOutcome::Apply(Goal {
            name: change.name.clone(),
            color: change.color.clone(),
            position: change.position,
            updated_at: change.updated_at,
            deleted_at: tombstone,
            ..server.clone()
        });
    }

    MergeOutcome::Keep
}

/// Merge a client completion change with the server completion.
///
/// Ties resolve in favour of completing: an equal-timestamp "done" revives a
/// tombstoned mark, while an equal-timestamp "not done" never removes an
/// active one.
pub fn merge_completion(
    change: &CompletionChange,
    server: Option<&Completion>,
    now: DateTime<Utc>,
) -> MergeOutcome<Completion> {
    let Some(server) = server else {
        if !change.completed {
            // Nothing to remove
            return MergeOutcome::Keep;
        }
        return MergeOutcome::Apply(Completion {
            id: change.completion_id(),
            goal_id: change.goal_id.clone(),
            date: change.date,
            created_at: now,
            updated_at: change.updated_at,
            deleted_at: None,
        });
    };

    let client_newer = change.updated_at > server.updated_at;
    let same_time = change.updated_at == server.updated_at;
    let revives_tie = same_time && change.completed && !server.is_active();

    if !(client_newer || revives_tie) {
        return MergeOutcome::Keep;
    }

    let mut merged = server.clone();
    merged.updated_at = change.updated_at;
    merged.deleted_at = if change.completed {
        None
    } else {
        Some(change.updated_at)
    };
    MergeOutcome::Apply(merged)
}

/// Storage-level gate for goal writes: the incoming record must be strictly
/// newer than what is stored.
pub fn goal_supersedes(incoming: &Goal, stored: &Goal) -> bool {
    incoming.updated_at > stored.updated_at
}

/// Storage-level gate for completion writes. Mirrors the merge tie-break so
/// an equal-timestamp revive is not lost at the store.
pub fn completion_supersedes(incoming: &Completion, stored: &Completion) -> bool {
    incoming.updated_at > stored.updated_at
        || (incoming.updated_at == stored.updated_at
            && incoming.is_active()
            && !stored.is_active())
}
